//! STIX Serialization
//!
//! Turns candidates into STIX 2.1 JSON objects and builds indicator patterns.

use serde_json::{Map, Value};

use super::types::{CandidateObject, ObservableKind, RelationshipCandidate};

/// STIX spec version stamped on every object
pub const SPEC_VERSION: &str = "2.1";

/// Custom property carrying the 0-100 score
pub const SCORE_PROPERTY: &str = "x_score";

// ============================================================================
// OBJECTS
// ============================================================================

/// Serialize a candidate object. `source_ref` is never written.
pub fn object_to_stix(object: &CandidateObject) -> Value {
    let mut map = Map::new();
    map.insert("type".to_string(), Value::from(object.kind.stix_type()));
    map.insert("spec_version".to_string(), Value::from(SPEC_VERSION));
    map.insert("id".to_string(), Value::from(object.id.clone()));

    for (key, value) in &object.attributes {
        map.insert(key.clone(), value.clone());
    }

    if !object.labels.is_empty() {
        let labels: Vec<Value> = object.labels.iter().cloned().map(Value::from).collect();
        map.insert("labels".to_string(), Value::Array(labels));
    }

    if object.kind.carries_score() {
        map.insert(SCORE_PROPERTY.to_string(), Value::from(object.effective_score()));
    }

    Value::Object(map)
}

pub fn relationship_to_stix(relationship: &RelationshipCandidate) -> Value {
    let mut map = Map::new();
    map.insert("type".to_string(), Value::from("relationship"));
    map.insert("spec_version".to_string(), Value::from(SPEC_VERSION));
    map.insert("id".to_string(), Value::from(relationship.id.clone()));
    map.insert(
        "relationship_type".to_string(),
        Value::from(relationship.relationship_type.clone()),
    );
    map.insert("source_ref".to_string(), Value::from(relationship.source_id.clone()));
    map.insert("target_ref".to_string(), Value::from(relationship.target_id.clone()));

    for (key, value) in &relationship.attributes {
        map.entry(key.clone()).or_insert_with(|| value.clone());
    }

    Value::Object(map)
}

// ============================================================================
// PATTERNS
// ============================================================================

/// Build a STIX pattern matching one canonical observable value.
///
/// File patterns need the hash algorithm, passed as `hash_algo`.
pub fn indicator_pattern(kind: ObservableKind, value: &str, hash_algo: Option<&str>) -> String {
    let escaped = escape_pattern_value(value);
    match kind {
        ObservableKind::File => {
            let algo = hash_algo.unwrap_or("SHA-256");
            format!("[file:hashes.'{}' = '{}']", algo, escaped)
        }
        ObservableKind::AutonomousSystem => {
            format!("[autonomous-system:number = {}]", value)
        }
        other => format!("[{}:value = '{}']", other.stix_type(), escaped),
    }
}

fn escape_pattern_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
