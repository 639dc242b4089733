//! Object Model
//!
//! Typed graph nodes and edges shared by the normalizer, graph builder
//! and emitter.

pub mod stix;
pub mod types;

pub use stix::{indicator_pattern, object_to_stix, relationship_to_stix, SCORE_PROPERTY};
pub use types::{
    CandidateObject, ObjectKind, ObservableKind, RelationshipCandidate, SourceRef, TlpLevel,
};
