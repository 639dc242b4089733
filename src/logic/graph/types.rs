//! Graph Types

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::logic::objects::{CandidateObject, RelationshipCandidate};

/// Result of adding an object to the builder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First occurrence of this id
    Inserted,
    /// Merged into an existing object
    Merged,
}

/// Relationship dropped at finalize because an endpoint never showed up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedRelationship {
    pub id: String,
    pub relationship_type: String,
    pub missing: Vec<String>,
}

/// Counters for one cycle's build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub records_seen: usize,
    pub records_normalized: usize,
    pub skipped_unsupported: usize,
    pub skipped_invalid: usize,
    pub objects_merged: usize,
    pub objects_filtered: usize,
    pub relationships_duplicate: usize,
    pub relationships_dropped: usize,
}

impl BuildReport {
    pub fn records_skipped(&self) -> usize {
        self.skipped_unsupported + self.skipped_invalid
    }

    /// Graph integrity warnings (dropped relationships)
    pub fn warnings(&self) -> usize {
        self.relationships_dropped
    }
}

/// Finalized, self-contained object graph for one cycle.
///
/// Every relationship endpoint resolves to an object in `objects`.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub objects: BTreeMap<String, CandidateObject>,
    pub relationships: Vec<RelationshipCandidate>,
    /// Ids referenced by dropped relationships but never added
    pub unresolved: BTreeSet<String>,
    pub dropped: Vec<DroppedRelationship>,
    pub report: BuildReport,
}

impl Graph {
    pub fn get(&self, id: &str) -> Option<&CandidateObject> {
        self.objects.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Objects plus relationships
    pub fn len(&self) -> usize {
        self.objects.len() + self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
