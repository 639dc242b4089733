//! Graph Builder
//!
//! Merges candidates from many records into one de-duplicated graph.
//!
//! Merge rules for objects sharing an id:
//! - attributes: first writer wins per key (a missing / null key is filled)
//! - labels: set union
//! - score: max
//!
//! Relationships are held until `finalize`, so endpoints may arrive in any
//! order within the cycle.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use super::types::{BuildReport, DroppedRelationship, Graph, MergeOutcome};
use crate::logic::normalizer::{NormalizeError, Normalized, Normalizer, RawRecord};
use crate::logic::objects::{CandidateObject, RelationshipCandidate, SourceRef};

pub struct GraphBuilder {
    objects: BTreeMap<String, CandidateObject>,
    pending: Vec<RelationshipCandidate>,
    anchors: Vec<CandidateObject>,
    report: BuildReport,
}

impl GraphBuilder {
    /// New builder seeded with the cycle's anchors
    pub fn new(anchors: Vec<CandidateObject>) -> Self {
        let mut builder = Self {
            objects: BTreeMap::new(),
            pending: Vec::new(),
            anchors: anchors.clone(),
            report: BuildReport::default(),
        };
        for anchor in anchors {
            builder.add_object(anchor);
        }
        builder
    }

    pub fn add_object(&mut self, object: CandidateObject) -> MergeOutcome {
        match self.objects.get_mut(&object.id) {
            Some(existing) => {
                merge_into(existing, object);
                self.report.objects_merged += 1;
                MergeOutcome::Merged
            }
            None => {
                self.objects.insert(object.id.clone(), object);
                MergeOutcome::Inserted
            }
        }
    }

    /// Endpoints are resolved at finalize
    pub fn add_relationship(&mut self, relationship: RelationshipCandidate) {
        self.pending.push(relationship);
    }

    /// Take in one record's fragment
    pub fn absorb(&mut self, normalized: Normalized) {
        self.report.records_seen += 1;
        self.report.records_normalized += 1;
        self.report.objects_filtered += normalized.filtered;

        for object in normalized.objects {
            self.add_object(object);
        }
        for relationship in normalized.relationships {
            self.add_relationship(relationship);
        }
    }

    /// Normalize and absorb one raw record; failures are counted, not raised
    pub fn ingest(&mut self, normalizer: &Normalizer, record: &RawRecord) -> bool {
        match normalizer.normalize(record) {
            Ok(normalized) => {
                self.absorb(normalized);
                true
            }
            Err(e) => {
                self.record_failure(&record.source_ref, &e);
                false
            }
        }
    }

    /// Count a record that failed normalization elsewhere (e.g. a feed task)
    pub fn record_failure(&mut self, source_ref: &SourceRef, error: &NormalizeError) {
        self.report.records_seen += 1;
        match error {
            NormalizeError::Unsupported => self.report.skipped_unsupported += 1,
            _ => self.report.skipped_invalid += 1,
        }
        tracing::debug!(source = %source_ref, cause = error.cause(), error = %error, "Record skipped");
    }

    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    /// Resolve relationships and hand over the finished graph.
    ///
    /// Relationships are de-duplicated by id (first occurrence kept).
    /// Any relationship with an endpoint missing from the object set is
    /// dropped and reported as a warning.
    pub fn finalize(mut self) -> Graph {
        for anchor in std::mem::take(&mut self.anchors) {
            if !self.objects.contains_key(&anchor.id) {
                tracing::warn!("Anchor {} missing at finalize, re-adding", anchor.id);
                self.objects.insert(anchor.id.clone(), anchor);
            }
        }

        let mut seen = HashSet::new();
        let mut relationships = Vec::new();
        let mut dropped = Vec::new();
        let mut unresolved = std::collections::BTreeSet::new();

        for relationship in std::mem::take(&mut self.pending) {
            if !seen.insert(relationship.id.clone()) {
                self.report.relationships_duplicate += 1;
                continue;
            }

            let missing: Vec<String> = relationship
                .endpoints()
                .iter()
                .filter(|id| !self.objects.contains_key(**id))
                .map(|id| id.to_string())
                .collect();

            if missing.is_empty() {
                relationships.push(relationship);
            } else {
                tracing::warn!(
                    relationship = %relationship.id,
                    missing = ?missing,
                    "Dropping relationship with unresolved endpoint"
                );
                unresolved.extend(missing.iter().cloned());
                dropped.push(DroppedRelationship {
                    id: relationship.id,
                    relationship_type: relationship.relationship_type,
                    missing,
                });
            }
        }

        self.report.relationships_dropped = dropped.len();

        Graph {
            objects: self.objects,
            relationships,
            unresolved,
            dropped,
            report: self.report,
        }
    }
}

/// Merge `incoming` into `existing` (same id)
fn merge_into(existing: &mut CandidateObject, incoming: CandidateObject) {
    for (key, value) in incoming.attributes {
        let slot = existing.attributes.entry(key).or_insert(Value::Null);
        if slot.is_null() {
            *slot = value;
        }
    }

    existing.labels.extend(incoming.labels);

    existing.score = match (existing.score, incoming.score) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };

    if existing.source_ref.is_none() {
        existing.source_ref = incoming.source_ref;
    }
}
