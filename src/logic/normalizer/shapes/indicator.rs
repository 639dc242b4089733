//! Indicator records (vendor IOC feeds)
//!
//! Always yields indicator + observable + `based-on`. A malware family adds
//! a Malware object and an `indicates` edge from the indicator; the malware
//! takes the indicator's score so both clear or miss the floor together.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{present, resolve_kind, NormalizeError};
use crate::logic::identifier::{self, CanonicalFields};
use crate::logic::normalizer::context::RecordOutput;
use crate::logic::normalizer::score;
use crate::logic::objects::{CandidateObject, ObjectKind};

/// Kill chain used for tactic names
const KILL_CHAIN_NAME: &str = "mitre-attack";

#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorRecord {
    pub indicator_type: String,
    pub indicator_data: String,
    #[serde(default)]
    pub malware_family: Option<String>,
    #[serde(default)]
    pub confidence: Option<Value>,
    #[serde(default)]
    pub score: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub valid_from: Option<String>,
    #[serde(default, alias = "expiration")]
    pub valid_until: Option<String>,
    #[serde(default, alias = "mitre_tactics")]
    pub kill_chain_phases: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl IndicatorRecord {
    /// `confidence` first, then `score`; absent means 0
    pub fn score(&self) -> u8 {
        self.confidence
            .as_ref()
            .and_then(score::from_value)
            .or_else(|| self.score.as_ref().and_then(score::from_value))
            .unwrap_or(0)
    }
}

pub fn normalize(record: &IndicatorRecord, out: &mut RecordOutput<'_>) -> Result<(), NormalizeError> {
    let kind = resolve_kind(Some(record.indicator_type.as_str()), &record.indicator_data)?;
    let score = record.score();
    let labels = record.tags.clone().unwrap_or_default();

    let observable = out.observable(kind, &record.indicator_data, Some(score), &labels)?;

    let mut extra = Vec::new();
    if let Some(description) = present(&record.description) {
        extra.push(("description", Value::from(description)));
    }
    if let Some(valid_from) = present(&record.valid_from) {
        extra.push(("valid_from", Value::from(valid_from)));
    }
    if let Some(valid_until) = present(&record.valid_until) {
        extra.push(("valid_until", Value::from(valid_until)));
    }
    if let Some(phases) = &record.kill_chain_phases {
        let phases: Vec<Value> = phases
            .iter()
            .map(|p| p.trim().to_lowercase().replace(' ', "-"))
            .filter(|p| !p.is_empty())
            .map(|p| json!({"kill_chain_name": KILL_CHAIN_NAME, "phase_name": p}))
            .collect();
        if !phases.is_empty() {
            extra.push(("kill_chain_phases", Value::Array(phases)));
        }
    }

    let indicator_id = out.indicator_for(&observable, Some(score), &labels, extra)?;

    if let Some(family) = present(&record.malware_family) {
        let mut fields = CanonicalFields::new();
        fields.insert("name".to_string(), Value::from(family));
        let derived = identifier::derive(ObjectKind::Malware, &fields)?;

        let malware = CandidateObject::new(ObjectKind::Malware, derived.id)
            .with_attr("name", family)
            .with_attr("is_family", true)
            .with_score(Some(score))
            .with_labels(&labels);
        let malware_id = out.push(malware);
        out.relate("indicates", &indicator_id, &malware_id)?;
    }

    Ok(())
}
