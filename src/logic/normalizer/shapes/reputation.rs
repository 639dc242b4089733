//! Reputation records (IP / domain reputation lists)
//!
//! `{"value": "1.2.3.4", "categories": {"spam": 30, "botnet": 90}}`
//! → observable scored by its worst category, plus an optional indicator.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::{resolve_kind, NormalizeError};
use crate::logic::normalizer::context::RecordOutput;
use crate::logic::normalizer::score;

#[derive(Debug, Clone, Deserialize)]
pub struct ReputationRecord {
    pub value: String,
    pub categories: Map<String, Value>,
    /// Explicit observable type, detected from the value when absent
    #[serde(default, alias = "type")]
    pub value_type: Option<String>,
    #[serde(default)]
    pub first_seen: Option<String>,
    #[serde(default)]
    pub last_seen: Option<String>,
}

pub fn normalize(record: &ReputationRecord, out: &mut RecordOutput<'_>) -> Result<(), NormalizeError> {
    let kind = resolve_kind(record.value_type.as_deref(), &record.value)?;
    let score = score::from_categories(&record.categories);
    let labels: Vec<String> = record.categories.keys().cloned().collect();

    let observable = out.observable(kind, &record.value, Some(score), &labels)?;

    if out.config().create_indicator {
        let mut extra = Vec::new();
        if let Some(first_seen) = &record.first_seen {
            extra.push(("valid_from", Value::from(first_seen.clone())));
        }
        if let Some(last_seen) = &record.last_seen {
            extra.push(("x_last_seen", Value::from(last_seen.clone())));
        }
        out.indicator_for(&observable, Some(score), &labels, extra)?;
    }

    Ok(())
}
