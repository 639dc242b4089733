//! Blocklist entries (one line of a plain-text feed)

use serde::Deserialize;

use super::{resolve_kind, NormalizeError};
use crate::logic::normalizer::context::RecordOutput;

#[derive(Debug, Clone, Deserialize)]
pub struct BlocklistRecord {
    pub feed: String,
    pub value: String,
    /// Set by the text feed source from its configured kind
    #[serde(default)]
    pub observable_type: Option<String>,
}

pub fn normalize(record: &BlocklistRecord, out: &mut RecordOutput<'_>) -> Result<(), NormalizeError> {
    let kind = resolve_kind(record.observable_type.as_deref(), &record.value)?;
    let score = out.config().default_score;
    let labels = vec![record.feed.clone()];

    let observable = out.observable(kind, &record.value, Some(score), &labels)?;
    if out.config().create_indicator {
        out.indicator_for(&observable, Some(score), &labels, Vec::new())?;
    }
    Ok(())
}
