//! Record Normalizer
//!
//! Reshapes one raw vendor record into typed candidate objects
//! and relationships.
//!
//! Flow per record:
//! 1. Classify the record shape (closed dispatch, see `shapes`)
//! 2. Decode it into the typed shape struct
//! 3. Run the shape's normalization function
//! 4. Apply the score floor (anchors exempt)
//!
//! A failing record returns an error for that record only; the caller keeps
//! going with the rest of the batch.

pub mod context;
pub mod score;
pub mod shapes;

#[cfg(test)]
mod tests;

use serde_json::Value;
use thiserror::Error;

use crate::logic::identifier::IdentifierError;
use crate::logic::objects::{CandidateObject, RelationshipCandidate, SourceRef};

pub use context::{Context, SourceConfig};
pub use shapes::{RecordShape, ShapeKind};

// ============================================================================
// TYPES
// ============================================================================

/// Raw record as returned by a source client
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub source_ref: SourceRef,
    pub body: Value,
}

impl RawRecord {
    pub fn new(source_ref: SourceRef, body: Value) -> Self {
        Self { source_ref, body }
    }
}

/// Graph fragment produced from one record
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub objects: Vec<CandidateObject>,
    pub relationships: Vec<RelationshipCandidate>,
    /// Objects removed by the score floor
    pub filtered: usize,
}

/// Per-record failure. Never aborts the batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("unsupported record shape")]
    Unsupported,

    #[error("invalid field '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("invalid identifying fields: {0}")]
    InvalidFields(#[from] IdentifierError),
}

impl NormalizeError {
    /// Short cause used for skip counters
    pub fn cause(&self) -> &'static str {
        match self {
            NormalizeError::Unsupported => "unsupported",
            NormalizeError::Validation { .. } | NormalizeError::InvalidFields(_) => "invalid",
        }
    }
}

// ============================================================================
// NORMALIZER
// ============================================================================

/// Stateless apart from its anchors; safe to share across feed tasks
pub struct Normalizer {
    context: Context,
}

impl Normalizer {
    pub fn new(config: SourceConfig) -> Result<Self, NormalizeError> {
        Ok(Self {
            context: Context::new(config)?,
        })
    }

    pub fn config(&self) -> &SourceConfig {
        &self.context.config
    }

    /// Author identity and TLP marking, emitted every cycle
    pub fn anchors(&self) -> Vec<CandidateObject> {
        vec![self.context.marking.clone(), self.context.author.clone()]
    }

    pub fn normalize(&self, record: &RawRecord) -> Result<Normalized, NormalizeError> {
        let shape = RecordShape::parse(&record.body)?;
        let mut out = self.context.output(record.source_ref.clone());
        shape.normalize(&mut out)?;

        let normalized = out.finish();
        tracing::trace!(
            source = %record.source_ref,
            shape = shape.kind().as_str(),
            objects = normalized.objects.len(),
            relationships = normalized.relationships.len(),
            "Record normalized"
        );
        Ok(normalized)
    }
}
