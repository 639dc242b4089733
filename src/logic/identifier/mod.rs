//! Identifier Deriver
//!
//! Content-derived ids: the same semantic entity always maps to the same id,
//! across records, cycles and process restarts.
//!
//! Id = `{stix-type}--{uuid5(STIX namespace, canonical JSON)}` where the
//! canonical JSON holds only the contributing properties of the kind, with
//! sorted keys and no whitespace.

pub mod canonical;

use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::logic::objects::{ObjectKind, ObservableKind};
use canonical::HashAlgorithm;

/// STIX 2.1 namespace for deterministic identifiers
pub const STIX_NAMESPACE: Uuid = Uuid::from_u128(0x00abedb4_aa42_466c_9c01_fed23315a9b7);

/// Raw fields handed to the deriver
pub type CanonicalFields = Map<String, Value>;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IdentifierError {
    #[error("{kind}: missing required field '{field}'")]
    MissingField { kind: &'static str, field: &'static str },

    #[error("{kind}: invalid '{field}' ({reason})")]
    InvalidValue {
        kind: &'static str,
        field: &'static str,
        reason: String,
    },
}

// ============================================================================
// DERIVED ID
// ============================================================================

/// Result of a derivation: the id and the canonical contributing fields
#[derive(Debug, Clone, PartialEq)]
pub struct Derived {
    pub id: String,
    pub canonical: CanonicalFields,
}

impl Derived {
    /// Canonical string value of a contributing field
    pub fn canonical_str(&self, field: &str) -> Option<&str> {
        self.canonical.get(field).and_then(Value::as_str)
    }
}

/// Derive the id of `kind` from its fields.
///
/// Pure function: no clock, no randomness, no global state.
pub fn derive(kind: ObjectKind, fields: &CanonicalFields) -> Result<Derived, IdentifierError> {
    let stix_type = kind.stix_type();
    let canonical = contributing_fields(kind, fields)?;

    // serde_json::Map is ordered, so this is the sorted-key compact form
    let payload = Value::Object(canonical.clone()).to_string();
    let uuid = Uuid::new_v5(&STIX_NAMESPACE, payload.as_bytes());

    Ok(Derived {
        id: format!("{}--{}", stix_type, uuid),
        canonical,
    })
}

/// Shorthand for single-value observables
pub fn derive_observable(kind: ObservableKind, value: &str) -> Result<Derived, IdentifierError> {
    let mut fields = CanonicalFields::new();
    match kind {
        ObservableKind::File => {
            let mut hashes = Map::new();
            let algo = canonical::hash(value)
                .map(|(algo, _)| algo.stix_name())
                .unwrap_or("SHA-256");
            hashes.insert(algo.to_string(), Value::from(value));
            fields.insert("hashes".to_string(), Value::Object(hashes));
        }
        ObservableKind::AutonomousSystem => {
            fields.insert("number".to_string(), Value::from(value));
        }
        _ => {
            fields.insert("value".to_string(), Value::from(value));
        }
    }
    derive(ObjectKind::Observable(kind), &fields)
}

/// Shorthand for relationships
pub fn derive_relationship(
    relationship_type: &str,
    source_id: &str,
    target_id: &str,
) -> Result<Derived, IdentifierError> {
    let mut fields = CanonicalFields::new();
    fields.insert("relationship_type".to_string(), Value::from(relationship_type));
    fields.insert("source_ref".to_string(), Value::from(source_id));
    fields.insert("target_ref".to_string(), Value::from(target_id));
    derive(ObjectKind::Relationship, &fields)
}

// ============================================================================
// CONTRIBUTING PROPERTIES
// ============================================================================

fn contributing_fields(
    kind: ObjectKind,
    fields: &CanonicalFields,
) -> Result<CanonicalFields, IdentifierError> {
    let stix_type = kind.stix_type();
    let mut out = CanonicalFields::new();

    match kind {
        ObjectKind::Observable(ObservableKind::File) => {
            let (algo, digest) = preferred_hash(stix_type, fields)?;
            out.insert("hashes".to_string(), single_hash(algo, digest));
        }
        ObjectKind::Observable(ObservableKind::AutonomousSystem) => {
            let raw = match fields.get("number") {
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::String(s)) => s.clone(),
                Some(_) => return Err(invalid(stix_type, "number", "not a number".to_string())),
                None => return Err(missing(stix_type, "number")),
            };
            let number = canonical::as_number(&raw).map_err(|e| invalid(stix_type, "number", e))?;
            out.insert("number".to_string(), Value::from(number));
        }
        ObjectKind::Observable(observable) => {
            let raw = required_str(stix_type, fields, "value")?;
            let value = canonical::observable_value(observable, raw)
                .map_err(|e| invalid(stix_type, "value", e))?;
            out.insert("value".to_string(), Value::from(value));
        }
        ObjectKind::Identity => {
            let name = canonical::name(required_str(stix_type, fields, "name")?);
            let class = canonical::name(required_str(stix_type, fields, "identity_class")?);
            out.insert("name".to_string(), Value::from(name));
            out.insert("identity_class".to_string(), Value::from(class));
        }
        ObjectKind::MarkingDefinition => {
            let definition_type = canonical::name(required_str(stix_type, fields, "definition_type")?);
            let definition = fields
                .get("definition")
                .filter(|v| v.is_object())
                .ok_or_else(|| missing(stix_type, "definition"))?;
            out.insert("definition_type".to_string(), Value::from(definition_type));
            out.insert("definition".to_string(), definition.clone());
        }
        ObjectKind::NetworkTraffic => {
            let dst_ref = required_str(stix_type, fields, "dst_ref")?;
            if !canonical::is_object_id(dst_ref) {
                return Err(invalid(stix_type, "dst_ref", format!("not an object id '{}'", dst_ref)));
            }
            let raw_port = match fields.get("dst_port") {
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::String(s)) => s.clone(),
                Some(_) => return Err(invalid(stix_type, "dst_port", "not a number".to_string())),
                None => return Err(missing(stix_type, "dst_port")),
            };
            let port = canonical::port(&raw_port).map_err(|e| invalid(stix_type, "dst_port", e))?;
            let protocols = fields
                .get("protocols")
                .and_then(Value::as_array)
                .filter(|list| !list.is_empty())
                .ok_or_else(|| missing(stix_type, "protocols"))?
                .iter()
                .map(|p| {
                    p.as_str()
                        .ok_or_else(|| "not a string".to_string())
                        .and_then(canonical::protocol)
                        .map(Value::from)
                        .map_err(|e| invalid(stix_type, "protocols", e))
                })
                .collect::<Result<Vec<_>, _>>()?;
            out.insert("dst_ref".to_string(), Value::from(dst_ref));
            out.insert("dst_port".to_string(), Value::from(port));
            out.insert("protocols".to_string(), Value::Array(protocols));
        }
        ObjectKind::Indicator => {
            let pattern = required_str(stix_type, fields, "pattern")?;
            out.insert("pattern".to_string(), Value::from(pattern));
        }
        ObjectKind::Malware => {
            let name = canonical::name(required_str(stix_type, fields, "name")?);
            out.insert("name".to_string(), Value::from(name));
        }
        ObjectKind::Artifact => {
            let (algo, digest) = preferred_hash(stix_type, fields)?;
            if algo != HashAlgorithm::Sha256 {
                return Err(invalid(stix_type, "hashes", "SHA-256 required".to_string()));
            }
            out.insert("hashes".to_string(), single_hash(algo, digest));
        }
        ObjectKind::Relationship => {
            let relationship_type = canonical::name(required_str(stix_type, fields, "relationship_type")?);
            out.insert("relationship_type".to_string(), Value::from(relationship_type));
            for field in ["source_ref", "target_ref"] {
                let id = required_str(stix_type, fields, field)?;
                if !canonical::is_object_id(id) {
                    return Err(invalid(stix_type, field, format!("not an object id '{}'", id)));
                }
                out.insert(field.to_string(), Value::from(id));
            }
        }
    }

    Ok(out)
}

/// Pick the most preferred valid hash from a `hashes` dictionary.
/// The digest length must match the declared algorithm.
fn preferred_hash(
    stix_type: &'static str,
    fields: &CanonicalFields,
) -> Result<(HashAlgorithm, String), IdentifierError> {
    let hashes = fields
        .get("hashes")
        .and_then(Value::as_object)
        .ok_or_else(|| missing(stix_type, "hashes"))?;

    let mut best: Option<(HashAlgorithm, String)> = None;
    for (name, value) in hashes {
        let declared = HashAlgorithm::from_name(name)
            .ok_or_else(|| invalid(stix_type, "hashes", format!("unknown algorithm '{}'", name)))?;
        let raw = value
            .as_str()
            .ok_or_else(|| invalid(stix_type, "hashes", format!("{} is not a string", name)))?;
        let (inferred, digest) = canonical::hash(raw).map_err(|e| invalid(stix_type, "hashes", e))?;
        if inferred != declared {
            return Err(invalid(
                stix_type,
                "hashes",
                format!("{} digest has the wrong length", declared.stix_name()),
            ));
        }
        if best.as_ref().map_or(true, |(b, _)| declared.preference() < b.preference()) {
            best = Some((declared, digest));
        }
    }

    best.ok_or_else(|| missing(stix_type, "hashes"))
}

fn single_hash(algo: HashAlgorithm, digest: String) -> Value {
    let mut map = Map::new();
    map.insert(algo.stix_name().to_string(), Value::from(digest));
    Value::Object(map)
}

fn required_str<'a>(
    kind: &'static str,
    fields: &'a CanonicalFields,
    field: &'static str,
) -> Result<&'a str, IdentifierError> {
    match fields.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim()),
        Some(Value::String(_)) | Some(Value::Null) | None => Err(missing(kind, field)),
        Some(_) => Err(invalid(kind, field, "not a string".to_string())),
    }
}

fn missing(kind: &'static str, field: &'static str) -> IdentifierError {
    IdentifierError::MissingField { kind, field }
}

fn invalid(kind: &'static str, field: &'static str, reason: String) -> IdentifierError {
    IdentifierError::InvalidValue { kind, field, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> CanonicalFields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_same_value_same_id() {
        let a = derive_observable(ObservableKind::Ipv4Addr, "1.2.3.4").unwrap();
        let b = derive_observable(ObservableKind::Ipv4Addr, "001.2.3.004").unwrap();
        assert_eq!(a.id, b.id);
        assert!(a.id.starts_with("ipv4-addr--"));
        assert_eq!(a.canonical_str("value"), Some("1.2.3.4"));
    }

    #[test]
    fn test_cosmetic_variants_converge() {
        let a = derive_observable(ObservableKind::DomainName, "Evil.Example.COM.").unwrap();
        let b = derive_observable(ObservableKind::DomainName, "evil.example.com").unwrap();
        assert_eq!(a.id, b.id);

        let a = derive_observable(ObservableKind::Ipv6Addr, "2001:db8:0:0::1").unwrap();
        let b = derive_observable(ObservableKind::Ipv6Addr, "2001:DB8::1").unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_kind_is_part_of_id() {
        let ip = derive_observable(ObservableKind::Ipv4Addr, "1.2.3.4").unwrap();
        let url = derive_observable(ObservableKind::Url, "http://1.2.3.4/").unwrap();
        assert_ne!(ip.id, url.id);
    }

    #[test]
    fn test_uuid_is_v5_in_stix_namespace() {
        let derived = derive_observable(ObservableKind::Ipv4Addr, "1.2.3.4").unwrap();
        let (_, uuid) = derived.id.split_once("--").unwrap();
        let expected = Uuid::new_v5(&STIX_NAMESPACE, br#"{"value":"1.2.3.4"}"#);
        assert_eq!(uuid, expected.to_string());
    }

    #[test]
    fn test_file_prefers_sha256() {
        let sha256 = "A".repeat(64);
        let md5 = "b".repeat(32);
        let both = derive(
            ObjectKind::Observable(ObservableKind::File),
            &fields(json!({"hashes": {"MD5": md5, "SHA-256": sha256}})),
        )
        .unwrap();
        let only = derive_observable(ObservableKind::File, &"a".repeat(64)).unwrap();
        assert_eq!(both.id, only.id);
    }

    #[test]
    fn test_hash_length_must_match_algorithm() {
        let err = derive(
            ObjectKind::Observable(ObservableKind::File),
            &fields(json!({"hashes": {"SHA-256": "a".repeat(32)}})),
        )
        .unwrap_err();
        assert!(matches!(err, IdentifierError::InvalidValue { field: "hashes", .. }));
    }

    #[test]
    fn test_missing_and_invalid_fields() {
        let err = derive(ObjectKind::Indicator, &CanonicalFields::new()).unwrap_err();
        assert_eq!(err, IdentifierError::MissingField { kind: "indicator", field: "pattern" });

        let err = derive_observable(ObservableKind::Ipv4Addr, "999.1.1.1").unwrap_err();
        assert!(matches!(err, IdentifierError::InvalidValue { field: "value", .. }));
    }

    #[test]
    fn test_network_traffic_keyed_on_destination() {
        let ip = derive_observable(ObservableKind::Ipv4Addr, "192.0.2.1").unwrap();
        let a = derive(
            ObjectKind::NetworkTraffic,
            &fields(json!({"dst_ref": ip.id, "dst_port": 8080, "protocols": ["TCP"]})),
        )
        .unwrap();
        let b = derive(
            ObjectKind::NetworkTraffic,
            &fields(json!({"dst_ref": ip.id, "dst_port": "8080", "protocols": ["tcp"]})),
        )
        .unwrap();
        assert_eq!(a.id, b.id);
        assert!(a.id.starts_with("network-traffic--"));
        assert_eq!(a.canonical["dst_port"], 8080);

        let other_port = derive(
            ObjectKind::NetworkTraffic,
            &fields(json!({"dst_ref": ip.id, "dst_port": 443, "protocols": ["tcp"]})),
        )
        .unwrap();
        assert_ne!(a.id, other_port.id);

        let err = derive(
            ObjectKind::NetworkTraffic,
            &fields(json!({"dst_ref": "1.2.3.4", "dst_port": 80, "protocols": ["tcp"]})),
        )
        .unwrap_err();
        assert!(matches!(err, IdentifierError::InvalidValue { field: "dst_ref", .. }));

        let err = derive(
            ObjectKind::NetworkTraffic,
            &fields(json!({"dst_ref": ip.id, "dst_port": 80, "protocols": []})),
        )
        .unwrap_err();
        assert_eq!(err, IdentifierError::MissingField { kind: "network-traffic", field: "protocols" });
    }

    #[test]
    fn test_identity_name_case_insensitive() {
        let a = derive(
            ObjectKind::Identity,
            &fields(json!({"name": "Acme  Intel", "identity_class": "organization"})),
        )
        .unwrap();
        let b = derive(
            ObjectKind::Identity,
            &fields(json!({"name": "acme intel", "identity_class": "Organization"})),
        )
        .unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_relationship_requires_object_ids() {
        let ip = derive_observable(ObservableKind::Ipv4Addr, "1.2.3.4").unwrap();
        let rel = derive_relationship("based-on", &ip.id, &ip.id).unwrap();
        assert!(rel.id.starts_with("relationship--"));
        assert!(derive_relationship("based-on", "nope", &ip.id).is_err());

        let other = derive_relationship("related-to", &ip.id, &ip.id).unwrap();
        assert_ne!(rel.id, other.id);
    }

    #[test]
    fn test_autonomous_system_number_forms() {
        let a = derive_observable(ObservableKind::AutonomousSystem, "AS13335").unwrap();
        let b = derive(
            ObjectKind::Observable(ObservableKind::AutonomousSystem),
            &fields(json!({"number": 13335})),
        )
        .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.canonical.get("number"), Some(&json!(13335)));
    }
}
