//! Scan events (internet scanning reports)
//!
//! One row per scanned host: ip / hostname / asn observables, labels from
//! the `;`-separated tag field, score from the severity word. A row with
//! both `port` and `protocol` also yields the network traffic towards the
//! primary observable.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{present, resolve_kind, split_tags, NormalizeError};
use crate::logic::identifier::{self, canonical, CanonicalFields};
use crate::logic::normalizer::context::{ObservableRef, RecordOutput};
use crate::logic::normalizer::score;
use crate::logic::objects::{CandidateObject, ObjectKind, ObservableKind};

#[derive(Debug, Clone, Deserialize)]
pub struct ScanRecord {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub asn: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub port: Option<Value>,
    #[serde(default)]
    pub protocol: Option<String>,
}

pub fn normalize(record: &ScanRecord, out: &mut RecordOutput<'_>) -> Result<(), NormalizeError> {
    let score = present(&record.severity)
        .and_then(score::from_level)
        .unwrap_or(0);
    let labels = present(&record.tag).map(split_tags).unwrap_or_default();

    if present(&record.ip).is_none() && present(&record.hostname).is_none() {
        return Err(NormalizeError::Validation {
            field: "ip".to_string(),
            reason: "neither ip nor hostname present".to_string(),
        });
    }

    let ip = match present(&record.ip) {
        Some(ip) => {
            let kind = resolve_kind(None, ip)?;
            if !matches!(kind, ObservableKind::Ipv4Addr | ObservableKind::Ipv6Addr) {
                return Err(NormalizeError::Validation {
                    field: "ip".to_string(),
                    reason: format!("not an ip address '{}'", ip),
                });
            }
            Some(out.observable(kind, ip, Some(score), &labels)?)
        }
        None => None,
    };

    let hostname = match present(&record.hostname) {
        // Hostname is the primary value only when no ip is given
        Some(host) if ip.is_none() => Some(out.observable(ObservableKind::DomainName, host, Some(score), &labels)?),
        Some(host) => out
            .observable(ObservableKind::DomainName, host, Some(score), &labels)
            .map_err(|e| tracing::debug!(value = %host, error = %e, "Skipping invalid hostname"))
            .ok(),
        None => None,
    };

    let asn = scalar(record.asn.as_ref()).and_then(|asn| {
        out.observable(ObservableKind::AutonomousSystem, &asn, Some(score), &labels)
            .map_err(|e| tracing::debug!(value = %asn, error = %e, "Skipping invalid asn"))
            .ok()
    });

    let primary: Option<&ObservableRef> = ip.as_ref().or(hostname.as_ref());
    if let Some(primary) = primary {
        for related in [&hostname, &asn].into_iter().flatten() {
            if related.id != primary.id {
                out.relate("related-to", &primary.id, &related.id)?;
            }
        }

        if let Some(traffic_id) = network_traffic(record, primary, score, &labels, out) {
            out.relate("related-to", &primary.id, &traffic_id)?;
        }
    }

    Ok(())
}

/// Traffic towards `dst`; `None` unless both port and protocol are valid
fn network_traffic(
    record: &ScanRecord,
    dst: &ObservableRef,
    score: u8,
    labels: &[String],
    out: &mut RecordOutput<'_>,
) -> Option<String> {
    let raw_port = scalar(record.port.as_ref())?;
    let raw_protocol = present(&record.protocol)?;

    let (port, protocol) = match (canonical::port(&raw_port), canonical::protocol(raw_protocol)) {
        (Ok(port), Ok(protocol)) => (port, protocol),
        (Err(e), _) | (_, Err(e)) => {
            tracing::debug!(port = %raw_port, protocol = %raw_protocol, error = %e, "Skipping network traffic");
            return None;
        }
    };

    let mut fields = CanonicalFields::new();
    fields.insert("dst_ref".to_string(), Value::from(dst.id.clone()));
    fields.insert("dst_port".to_string(), Value::from(port));
    fields.insert("protocols".to_string(), json!([protocol]));
    let derived = identifier::derive(ObjectKind::NetworkTraffic, &fields)
        .map_err(|e| tracing::debug!(error = %e, "Skipping network traffic"))
        .ok()?;

    let observed = present(&record.timestamp).and_then(observed_at);
    let traffic = CandidateObject::new(ObjectKind::NetworkTraffic, derived.id)
        .with_attr("dst_ref", dst.id.clone())
        .with_attr("dst_port", port)
        .with_attr("protocols", json!([protocol]))
        .with_attr("is_active", false)
        .with_attr("start", observed.clone())
        .with_attr("end", observed)
        .with_attr(
            "x_description",
            format!("Network Traffic {} - {}:{}", dst.value, protocol, port),
        )
        .with_score(Some(score))
        .with_labels(labels);

    Some(out.push(traffic))
}

/// Scan timestamps come as RFC 3339 or `YYYY-MM-DD HH:MM:SS` (UTC)
fn observed_at(raw: &str) -> Option<String> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|naive| Utc.from_utc_datetime(&naive))
        })
        .ok()?;
    Some(parsed.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn scalar(raw: Option<&Value>) -> Option<String> {
    match raw? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}
