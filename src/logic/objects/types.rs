//! Object Types
//!
//! Candidate objects produced by the normalizer.
//! No merge logic here - only data structures.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// OBJECT KIND
// ============================================================================

/// Closed set of object kinds the connector produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectKind {
    Identity,
    MarkingDefinition,
    Observable(ObservableKind),
    /// Port/protocol flow towards an observable (`dst_ref`)
    NetworkTraffic,
    Artifact,
    Malware,
    Indicator,
    Relationship,
}

impl ObjectKind {
    /// STIX `type` property (also the id prefix)
    pub fn stix_type(&self) -> &'static str {
        match self {
            ObjectKind::Identity => "identity",
            ObjectKind::MarkingDefinition => "marking-definition",
            ObjectKind::Observable(kind) => kind.stix_type(),
            ObjectKind::NetworkTraffic => "network-traffic",
            ObjectKind::Artifact => "artifact",
            ObjectKind::Malware => "malware",
            ObjectKind::Indicator => "indicator",
            ObjectKind::Relationship => "relationship",
        }
    }

    /// Emission order: anchors first, relationships last
    pub fn emit_rank(&self) -> u8 {
        match self {
            ObjectKind::MarkingDefinition => 0,
            ObjectKind::Identity => 1,
            ObjectKind::Observable(_) => 2,
            ObjectKind::NetworkTraffic => 3,
            ObjectKind::Artifact => 4,
            ObjectKind::Malware => 5,
            ObjectKind::Indicator => 6,
            ObjectKind::Relationship => 7,
        }
    }

    /// Anchors are kept every cycle regardless of score
    pub fn is_anchor(&self) -> bool {
        matches!(self, ObjectKind::Identity | ObjectKind::MarkingDefinition)
    }

    /// Every non-anchor object is held to the min-score floor
    pub fn is_floored(&self) -> bool {
        !self.is_anchor()
    }

    /// Kinds that publish their score as `x_score`
    pub fn carries_score(&self) -> bool {
        matches!(
            self,
            ObjectKind::Observable(_) | ObjectKind::NetworkTraffic | ObjectKind::Indicator
        )
    }

    pub fn is_observable(&self) -> bool {
        matches!(self, ObjectKind::Observable(_))
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stix_type())
    }
}

// ============================================================================
// OBSERVABLE KIND
// ============================================================================

/// Cyber observable subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObservableKind {
    Ipv4Addr,
    Ipv6Addr,
    DomainName,
    Url,
    EmailAddr,
    File,
    AutonomousSystem,
}

impl ObservableKind {
    pub fn stix_type(&self) -> &'static str {
        match self {
            ObservableKind::Ipv4Addr => "ipv4-addr",
            ObservableKind::Ipv6Addr => "ipv6-addr",
            ObservableKind::DomainName => "domain-name",
            ObservableKind::Url => "url",
            ObservableKind::EmailAddr => "email-addr",
            ObservableKind::File => "file",
            ObservableKind::AutonomousSystem => "autonomous-system",
        }
    }

    /// Platform-facing name (main observable type of an indicator)
    pub fn display_name(&self) -> &'static str {
        match self {
            ObservableKind::Ipv4Addr => "IPv4-Addr",
            ObservableKind::Ipv6Addr => "IPv6-Addr",
            ObservableKind::DomainName => "Domain-Name",
            ObservableKind::Url => "Url",
            ObservableKind::EmailAddr => "Email-Addr",
            ObservableKind::File => "StixFile",
            ObservableKind::AutonomousSystem => "Autonomous-System",
        }
    }
}

impl FromStr for ObservableKind {
    type Err = String;

    /// Accepts the vendor spellings seen across feeds
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "ipv4" | "ip" | "ipv4-addr" | "ip-address" => Ok(ObservableKind::Ipv4Addr),
            "ipv6" | "ipv6-addr" => Ok(ObservableKind::Ipv6Addr),
            "domain" | "domain-name" | "hostname" | "fqdn" => Ok(ObservableKind::DomainName),
            "url" | "uri" => Ok(ObservableKind::Url),
            "email" | "email-addr" => Ok(ObservableKind::EmailAddr),
            "file" | "hash" | "md5" | "sha1" | "sha256" | "sha512" | "file-md5" | "file-sha1"
            | "file-sha256" | "stixfile" => Ok(ObservableKind::File),
            "asn" | "as" | "autonomous-system" => Ok(ObservableKind::AutonomousSystem),
            other => Err(format!("unknown observable type '{}'", other)),
        }
    }
}

// ============================================================================
// TLP MARKING
// ============================================================================

/// Traffic Light Protocol level carried by the marking anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TlpLevel {
    Clear,
    Green,
    Amber,
    AmberStrict,
    Red,
}

impl TlpLevel {
    /// Value of the `definition.tlp` property
    pub fn as_str(&self) -> &'static str {
        match self {
            TlpLevel::Clear => "clear",
            TlpLevel::Green => "green",
            TlpLevel::Amber => "amber",
            TlpLevel::AmberStrict => "amber+strict",
            TlpLevel::Red => "red",
        }
    }

    /// Human readable name of the marking
    pub fn marking_name(&self) -> &'static str {
        match self {
            TlpLevel::Clear => "TLP:CLEAR",
            TlpLevel::Green => "TLP:GREEN",
            TlpLevel::Amber => "TLP:AMBER",
            TlpLevel::AmberStrict => "TLP:AMBER+STRICT",
            TlpLevel::Red => "TLP:RED",
        }
    }
}

impl FromStr for TlpLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        match lowered.strip_prefix("tlp:").unwrap_or(&lowered) {
            "clear" | "white" => Ok(TlpLevel::Clear),
            "green" => Ok(TlpLevel::Green),
            "amber" => Ok(TlpLevel::Amber),
            "amber+strict" | "amber-strict" => Ok(TlpLevel::AmberStrict),
            "red" => Ok(TlpLevel::Red),
            other => Err(format!("unknown TLP level '{}'", other)),
        }
    }
}

// ============================================================================
// SOURCE REFERENCE
// ============================================================================

/// Pointer back to the raw record, diagnostics only (never serialized downstream)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRef {
    pub feed: String,
    pub index: usize,
}

impl SourceRef {
    pub fn new(feed: impl Into<String>, index: usize) -> Self {
        Self { feed: feed.into(), index }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.feed, self.index)
    }
}

// ============================================================================
// CANDIDATE OBJECT
// ============================================================================

/// A typed graph node produced by normalization
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateObject {
    pub kind: ObjectKind,
    /// Content-derived id (`type--uuid`)
    pub id: String,
    /// Kind-specific properties, emitted as-is
    pub attributes: BTreeMap<String, Value>,
    /// 0-100, absent for kinds without a score
    pub score: Option<u8>,
    pub labels: BTreeSet<String>,
    pub source_ref: Option<SourceRef>,
}

impl CandidateObject {
    pub fn new(kind: ObjectKind, id: String) -> Self {
        Self {
            kind,
            id,
            attributes: BTreeMap::new(),
            score: None,
            labels: BTreeSet::new(),
            source_ref: None,
        }
    }

    /// Builder-style attribute setter; `Null` values are not stored
    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set_attr(key, value);
        self
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if !value.is_null() {
            self.attributes.insert(key.to_string(), value);
        }
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn with_score(mut self, score: Option<u8>) -> Self {
        self.score = score;
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.add_labels(labels);
        self
    }

    /// Set-union of labels, trimmed and lowercased, empties skipped
    pub fn add_labels<I, S>(&mut self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for label in labels {
            let label = label.as_ref().trim().to_lowercase();
            if !label.is_empty() {
                self.labels.insert(label);
            }
        }
    }

    pub fn with_source(mut self, source_ref: Option<SourceRef>) -> Self {
        self.source_ref = source_ref;
        self
    }

    /// Score used by the floor filter: absent counts as 0
    pub fn effective_score(&self) -> u8 {
        self.score.unwrap_or(0)
    }
}

// ============================================================================
// RELATIONSHIP CANDIDATE
// ============================================================================

/// Directed edge between two derived ids; endpoints may be forward references
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipCandidate {
    pub id: String,
    pub relationship_type: String,
    pub source_id: String,
    pub target_id: String,
    pub attributes: BTreeMap<String, Value>,
    pub source_ref: Option<SourceRef>,
}

impl RelationshipCandidate {
    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.attributes.insert(key.to_string(), value);
        }
        self
    }

    /// Both endpoint ids
    pub fn endpoints(&self) -> [&str; 2] {
        [&self.source_id, &self.target_id]
    }
}
