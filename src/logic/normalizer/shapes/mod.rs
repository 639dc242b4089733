//! Record Shapes
//!
//! Closed set of supported vendor record shapes. A record is classified
//! once by ordered predicates, then decoded into the typed struct of its
//! shape (all optional fields are `Option`, absence never fails).
//!
//! Order matters: the first matching predicate wins.
//! 1. Reputation   - `categories` + `value`
//! 2. Indicator    - `indicator_type` + `indicator_data`
//! 3. Beacon       - `base` + actor ip / hostname
//! 4. ScanEvent    - `ip` / `hostname` + `timestamp` / `tag` / `severity`
//! 5. Report       - `file_name` + `content`
//! 6. Blocklist    - `feed` + `value`

pub mod beacon;
pub mod blocklist;
pub mod indicator;
pub mod report;
pub mod reputation;
pub mod scan;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::context::RecordOutput;
use super::NormalizeError;
use crate::logic::identifier::canonical;
use crate::logic::objects::ObservableKind;

pub use beacon::BeaconRecord;
pub use blocklist::BlocklistRecord;
pub use indicator::IndicatorRecord;
pub use report::ReportRecord;
pub use reputation::ReputationRecord;
pub use scan::ScanRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Reputation,
    Indicator,
    Beacon,
    ScanEvent,
    Report,
    Blocklist,
}

impl ShapeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeKind::Reputation => "reputation",
            ShapeKind::Indicator => "indicator",
            ShapeKind::Beacon => "beacon",
            ShapeKind::ScanEvent => "scan_event",
            ShapeKind::Report => "report",
            ShapeKind::Blocklist => "blocklist",
        }
    }

    /// Ordered shape predicates, evaluated once per record
    pub fn classify(body: &Map<String, Value>) -> Option<ShapeKind> {
        let has = |key: &str| body.get(key).is_some_and(|v| !v.is_null());
        let has_any = |keys: &[&str]| keys.iter().any(|k| has(k));

        if has("categories") && has("value") {
            Some(ShapeKind::Reputation)
        } else if has("indicator_type") && has("indicator_data") {
            Some(ShapeKind::Indicator)
        } else if has("base")
            && has_any(&["actor_ip", "actorip", "actor_hostname", "actorhostname"])
        {
            Some(ShapeKind::Beacon)
        } else if has_any(&["ip", "hostname"]) && has_any(&["timestamp", "tag", "severity"]) {
            Some(ShapeKind::ScanEvent)
        } else if has("file_name") && has("content") {
            Some(ShapeKind::Report)
        } else if has("feed") && has("value") {
            Some(ShapeKind::Blocklist)
        } else {
            None
        }
    }
}

/// A classified, decoded record
#[derive(Debug, Clone)]
pub enum RecordShape {
    Reputation(ReputationRecord),
    Indicator(IndicatorRecord),
    Beacon(BeaconRecord),
    ScanEvent(ScanRecord),
    Report(ReportRecord),
    Blocklist(BlocklistRecord),
}

impl RecordShape {
    /// Classify and decode. Non-object bodies and unknown shapes are unsupported.
    pub fn parse(body: &Value) -> Result<Self, NormalizeError> {
        let map = body.as_object().ok_or(NormalizeError::Unsupported)?;
        let kind = ShapeKind::classify(map).ok_or(NormalizeError::Unsupported)?;

        Ok(match kind {
            ShapeKind::Reputation => RecordShape::Reputation(decode(body, kind)?),
            ShapeKind::Indicator => RecordShape::Indicator(decode(body, kind)?),
            ShapeKind::Beacon => RecordShape::Beacon(decode(body, kind)?),
            ShapeKind::ScanEvent => RecordShape::ScanEvent(decode(body, kind)?),
            ShapeKind::Report => RecordShape::Report(decode(body, kind)?),
            ShapeKind::Blocklist => RecordShape::Blocklist(decode(body, kind)?),
        })
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            RecordShape::Reputation(_) => ShapeKind::Reputation,
            RecordShape::Indicator(_) => ShapeKind::Indicator,
            RecordShape::Beacon(_) => ShapeKind::Beacon,
            RecordShape::ScanEvent(_) => ShapeKind::ScanEvent,
            RecordShape::Report(_) => ShapeKind::Report,
            RecordShape::Blocklist(_) => ShapeKind::Blocklist,
        }
    }

    /// One normalization function per shape
    pub fn normalize(&self, out: &mut RecordOutput<'_>) -> Result<(), NormalizeError> {
        match self {
            RecordShape::Reputation(record) => reputation::normalize(record, out),
            RecordShape::Indicator(record) => indicator::normalize(record, out),
            RecordShape::Beacon(record) => beacon::normalize(record, out),
            RecordShape::ScanEvent(record) => scan::normalize(record, out),
            RecordShape::Report(record) => report::normalize(record, out),
            RecordShape::Blocklist(record) => blocklist::normalize(record, out),
        }
    }
}

fn decode<T: DeserializeOwned>(body: &Value, kind: ShapeKind) -> Result<T, NormalizeError> {
    T::deserialize(body).map_err(|e| NormalizeError::Validation {
        field: kind.as_str().to_string(),
        reason: e.to_string(),
    })
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// Trimmed value, with empty strings and vendor placeholders treated as absent
pub fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("na") && !v.eq_ignore_ascii_case("n/a"))
}

/// Guess the observable kind of a bare value
pub fn detect_observable(value: &str) -> Option<ObservableKind> {
    let value = value.trim();
    if canonical::ipv4(value).is_ok() {
        Some(ObservableKind::Ipv4Addr)
    } else if canonical::ipv6(value).is_ok() {
        Some(ObservableKind::Ipv6Addr)
    } else if value.contains("://") && canonical::url(value).is_ok() {
        Some(ObservableKind::Url)
    } else if value.contains('@') && canonical::email(value).is_ok() {
        Some(ObservableKind::EmailAddr)
    } else if canonical::hash(value).is_ok() {
        Some(ObservableKind::File)
    } else if canonical::domain(value).is_ok() {
        Some(ObservableKind::DomainName)
    } else {
        None
    }
}

/// Explicit type hint if it parses, otherwise detection
pub fn resolve_kind(hint: Option<&str>, value: &str) -> Result<ObservableKind, NormalizeError> {
    if let Some(kind) = hint.and_then(|h| h.parse().ok()) {
        return Ok(kind);
    }
    detect_observable(value).ok_or_else(|| NormalizeError::Validation {
        field: "value".to_string(),
        reason: format!("cannot determine observable type of '{}'", value),
    })
}

/// Split a vendor tag list (`a;b`, `a,b`) into labels
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split([';', ','])
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify(value: Value) -> Option<ShapeKind> {
        ShapeKind::classify(value.as_object().unwrap())
    }

    #[test]
    fn test_dispatch_order() {
        // Reputation wins over Blocklist when both predicates hold
        assert_eq!(
            classify(json!({"value": "1.2.3.4", "categories": {}, "feed": "x"})),
            Some(ShapeKind::Reputation)
        );
        assert_eq!(
            classify(json!({"indicator_type": "ipv4", "indicator_data": "1.2.3.4", "ip": "1.2.3.4", "tag": "x"})),
            Some(ShapeKind::Indicator)
        );
        assert_eq!(
            classify(json!({"base": "1.2.3.4", "actorip": "5.6.7.8"})),
            Some(ShapeKind::Beacon)
        );
        assert_eq!(
            classify(json!({"ip": "1.2.3.4", "timestamp": "2024-01-01"})),
            Some(ShapeKind::ScanEvent)
        );
        assert_eq!(
            classify(json!({"file_name": "a.csv", "content": "x"})),
            Some(ShapeKind::Report)
        );
        assert_eq!(
            classify(json!({"feed": "et", "value": "1.2.3.4"})),
            Some(ShapeKind::Blocklist)
        );
    }

    #[test]
    fn test_unsupported() {
        assert_eq!(classify(json!({"foo": 1})), None);
        assert_eq!(classify(json!({"ip": "1.2.3.4"})), None);
        assert_eq!(classify(json!({"value": null, "categories": {}})), None);
        assert!(matches!(
            RecordShape::parse(&json!([1, 2])),
            Err(NormalizeError::Unsupported)
        ));
    }

    #[test]
    fn test_wrong_field_type_is_validation_error() {
        let err = RecordShape::parse(&json!({"value": 5, "categories": {}})).unwrap_err();
        assert!(matches!(err, NormalizeError::Validation { .. }));
    }

    #[test]
    fn test_detect_observable() {
        assert_eq!(detect_observable("1.2.3.4"), Some(ObservableKind::Ipv4Addr));
        assert_eq!(detect_observable("::1"), Some(ObservableKind::Ipv6Addr));
        assert_eq!(detect_observable("evil.com"), Some(ObservableKind::DomainName));
        assert_eq!(detect_observable("http://evil.com/x"), Some(ObservableKind::Url));
        assert_eq!(detect_observable("a@evil.com"), Some(ObservableKind::EmailAddr));
        assert_eq!(detect_observable(&"f".repeat(64)), Some(ObservableKind::File));
        assert_eq!(detect_observable("not a value"), None);
    }

    #[test]
    fn test_present_and_tags() {
        assert_eq!(present(&Some(" NA ".to_string())), None);
        assert_eq!(present(&Some("".to_string())), None);
        assert_eq!(present(&Some(" x ".to_string())), Some("x"));
        assert_eq!(split_tags("Botnet; scanner ,,"), vec!["botnet", "scanner"]);
    }
}
