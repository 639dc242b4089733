//! Normalization Context
//!
//! Per-connector anchors (author identity + TLP marking) and the per-record
//! output builder every shape writes into.

use std::collections::HashSet;

use serde_json::{json, Value};

use super::{NormalizeError, Normalized};
use crate::logic::identifier::{self, canonical, CanonicalFields};
use crate::logic::objects::{
    indicator_pattern, CandidateObject, ObjectKind, ObservableKind, RelationshipCandidate,
    SourceRef, TlpLevel,
};

// ============================================================================
// SOURCE CONFIG
// ============================================================================

/// Source-level settings the normalizer needs
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Author identity name
    pub author_name: String,
    /// Marking applied to every non-anchor object
    pub tlp: TlpLevel,
    /// Floor for scored kinds
    pub min_score: u8,
    /// Emit an indicator next to each primary observable
    pub create_indicator: bool,
    /// Score for records that carry none (blocklists, beacons)
    pub default_score: u8,
    /// Extra labels put on every non-anchor object
    pub labels: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        use crate::constants;

        Self {
            author_name: constants::DEFAULT_CONNECTOR_NAME.to_string(),
            tlp: TlpLevel::AmberStrict,
            min_score: constants::DEFAULT_MIN_SCORE,
            create_indicator: true,
            default_score: constants::DEFAULT_FEED_SCORE,
            labels: Vec::new(),
        }
    }
}

// ============================================================================
// CONTEXT
// ============================================================================

pub struct Context {
    pub config: SourceConfig,
    pub author: CandidateObject,
    pub marking: CandidateObject,
}

impl Context {
    pub fn new(config: SourceConfig) -> Result<Self, NormalizeError> {
        let author_name = config.author_name.trim().to_string();
        let mut fields = CanonicalFields::new();
        fields.insert("name".to_string(), Value::from(author_name.clone()));
        fields.insert("identity_class".to_string(), Value::from("organization"));
        let author_id = identifier::derive(ObjectKind::Identity, &fields)?;
        let author = CandidateObject::new(ObjectKind::Identity, author_id.id)
            .with_attr("name", author_name)
            .with_attr("identity_class", "organization");

        let definition = json!({ "tlp": config.tlp.as_str() });
        let mut fields = CanonicalFields::new();
        fields.insert("definition_type".to_string(), Value::from("tlp"));
        fields.insert("definition".to_string(), definition.clone());
        let marking_id = identifier::derive(ObjectKind::MarkingDefinition, &fields)?;
        let marking = CandidateObject::new(ObjectKind::MarkingDefinition, marking_id.id)
            .with_attr("name", config.tlp.marking_name())
            .with_attr("definition_type", "tlp")
            .with_attr("definition", definition);

        Ok(Self { config, author, marking })
    }

    pub fn output(&self, source_ref: SourceRef) -> RecordOutput<'_> {
        RecordOutput {
            ctx: self,
            source_ref,
            objects: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Stamp author, marking and configured labels
    fn stamp(&self, object: &mut CandidateObject) {
        object.set_attr("created_by_ref", self.author.id.clone());
        object.set_attr("object_marking_refs", json!([self.marking.id]));
        object.add_labels(&self.config.labels);
    }
}

// ============================================================================
// RECORD OUTPUT
// ============================================================================

/// Objects and edges collected from one raw record
pub struct RecordOutput<'a> {
    ctx: &'a Context,
    source_ref: SourceRef,
    objects: Vec<CandidateObject>,
    relationships: Vec<RelationshipCandidate>,
}

/// Handle on an observable just added
#[derive(Debug, Clone)]
pub struct ObservableRef {
    pub id: String,
    pub kind: ObservableKind,
    /// Canonical value (hash digest for files, number for AS)
    pub value: String,
    pub hash_algo: Option<&'static str>,
}

impl<'a> RecordOutput<'a> {
    pub fn config(&self) -> &SourceConfig {
        &self.ctx.config
    }

    /// Add a non-anchor object, stamped with author and marking
    pub fn push(&mut self, mut object: CandidateObject) -> String {
        self.ctx.stamp(&mut object);
        object.source_ref = Some(self.source_ref.clone());
        let id = object.id.clone();
        self.objects.push(object);
        id
    }

    /// Canonicalize `raw`, derive its id and add the observable
    pub fn observable(
        &mut self,
        kind: ObservableKind,
        raw: &str,
        score: Option<u8>,
        labels: &[String],
    ) -> Result<ObservableRef, NormalizeError> {
        let derived = identifier::derive_observable(kind, raw)?;
        let mut object = CandidateObject::new(ObjectKind::Observable(kind), derived.id.clone())
            .with_score(score)
            .with_labels(labels);

        let (value, hash_algo) = match kind {
            ObservableKind::File => {
                let (algo, digest) =
                    canonical::hash(raw).map_err(|reason| NormalizeError::Validation {
                        field: "hash".to_string(),
                        reason,
                    })?;
                object.set_attr("hashes", json!({ algo.stix_name(): digest }));
                (digest, Some(algo.stix_name()))
            }
            ObservableKind::AutonomousSystem => {
                let number = derived.canonical.get("number").cloned().unwrap_or(Value::Null);
                object.set_attr("number", number.clone());
                (number.to_string(), None)
            }
            _ => {
                let value = derived.canonical_str("value").unwrap_or(raw).to_string();
                object.set_attr("value", value.clone());
                (value, None)
            }
        };

        let id = self.push(object);
        Ok(ObservableRef { id, kind, value, hash_algo })
    }

    /// Indicator whose pattern matches `observable`, linked with `based-on`
    pub fn indicator_for(
        &mut self,
        observable: &ObservableRef,
        score: Option<u8>,
        labels: &[String],
        extra: Vec<(&str, Value)>,
    ) -> Result<String, NormalizeError> {
        let pattern = indicator_pattern(observable.kind, &observable.value, observable.hash_algo);
        let mut fields = CanonicalFields::new();
        fields.insert("pattern".to_string(), Value::from(pattern.clone()));
        let derived = identifier::derive(ObjectKind::Indicator, &fields)?;

        let mut object = CandidateObject::new(ObjectKind::Indicator, derived.id)
            .with_attr("name", observable.value.clone())
            .with_attr("pattern", pattern)
            .with_attr("pattern_type", "stix")
            .with_attr("x_main_observable_type", observable.kind.display_name())
            .with_score(score)
            .with_labels(labels);
        for (key, value) in extra {
            object.set_attr(key, value);
        }

        let indicator_id = self.push(object);
        self.relate("based-on", &indicator_id, &observable.id)?;
        Ok(indicator_id)
    }

    /// Add a relationship between two derived ids
    pub fn relate(
        &mut self,
        relationship_type: &str,
        source_id: &str,
        target_id: &str,
    ) -> Result<String, NormalizeError> {
        let derived = identifier::derive_relationship(relationship_type, source_id, target_id)?;
        let relationship = RelationshipCandidate {
            id: derived.id.clone(),
            relationship_type: relationship_type.to_string(),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            attributes: Default::default(),
            source_ref: Some(self.source_ref.clone()),
        }
        .with_attr("created_by_ref", self.ctx.author.id.clone())
        .with_attr("object_marking_refs", json!([self.ctx.marking.id]));

        self.relationships.push(relationship);
        Ok(derived.id)
    }

    /// Apply the score floor and hand the record's graph fragment over.
    ///
    /// Every non-anchor object below the floor is dropped, an absent score
    /// counting as 0. Relationships touching a filtered object go with it.
    pub fn finish(self) -> Normalized {
        let min_score = self.ctx.config.min_score;
        let mut filtered_ids = HashSet::new();
        let mut objects = Vec::with_capacity(self.objects.len());

        for object in self.objects {
            if object.kind.is_floored() && object.effective_score() < min_score {
                tracing::debug!(
                    id = %object.id,
                    score = object.effective_score(),
                    min_score,
                    source = %self.source_ref,
                    "Object below score floor"
                );
                filtered_ids.insert(object.id);
            } else {
                objects.push(object);
            }
        }

        let relationships: Vec<RelationshipCandidate> = self
            .relationships
            .into_iter()
            .filter(|rel| rel.endpoints().iter().all(|id| !filtered_ids.contains(*id)))
            .collect();

        Normalized {
            objects,
            relationships,
            filtered: filtered_ids.len(),
        }
    }
}
