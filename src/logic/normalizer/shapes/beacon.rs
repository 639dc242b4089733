//! Beacon records (C2 beacon sightings)
//!
//! The `base` observable was seen talking to actor infrastructure.
//! Actor ip / hostname become observables (+ indicators), each linked to
//! the base with `related-to`. `"NA"` means absent.

use serde::Deserialize;

use super::{present, resolve_kind, NormalizeError};
use crate::logic::normalizer::context::RecordOutput;
use crate::logic::normalizer::score;
use crate::logic::objects::ObservableKind;

#[derive(Debug, Clone, Deserialize)]
pub struct BeaconRecord {
    pub base: String,
    #[serde(default, alias = "actorip")]
    pub actor_ip: Option<String>,
    #[serde(default, alias = "actorhostname")]
    pub actor_hostname: Option<String>,
    #[serde(default, alias = "actorasn")]
    pub actor_asn: Option<String>,
    #[serde(default, alias = "tstamp")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub score: Option<serde_json::Value>,
}

pub fn normalize(record: &BeaconRecord, out: &mut RecordOutput<'_>) -> Result<(), NormalizeError> {
    let score = record
        .score
        .as_ref()
        .and_then(score::from_value)
        .unwrap_or(out.config().default_score);
    let base_kind = resolve_kind(None, &record.base)?;
    let base = out.observable(base_kind, &record.base, Some(score), &[])?;

    let mut actors = Vec::new();
    if let Some(ip) = present(&record.actor_ip) {
        // IPv4 first, IPv6 otherwise
        match resolve_kind(None, ip) {
            Ok(kind @ (ObservableKind::Ipv4Addr | ObservableKind::Ipv6Addr)) => actors.push((kind, ip)),
            _ => tracing::debug!(value = %ip, "Skipping unparseable actor ip"),
        }
    }
    if let Some(hostname) = present(&record.actor_hostname) {
        actors.push((ObservableKind::DomainName, hostname));
    }

    for (kind, value) in actors {
        let actor = match out.observable(kind, value, Some(score), &[]) {
            Ok(actor) => actor,
            Err(e) => {
                tracing::debug!(value = %value, error = %e, "Skipping invalid actor value");
                continue;
            }
        };

        if out.config().create_indicator {
            let mut extra = Vec::new();
            if let Some(ts) = present(&record.timestamp) {
                extra.push(("valid_from", serde_json::Value::from(ts)));
            }
            out.indicator_for(&actor, Some(score), &[], extra)?;
        }
        out.relate("related-to", &base.id, &actor.id)?;
    }

    if let Some(asn) = present(&record.actor_asn) {
        if let Ok(asn) = out.observable(ObservableKind::AutonomousSystem, asn, Some(score), &[]) {
            out.relate("related-to", &base.id, &asn.id)?;
        }
    }

    Ok(())
}
