//! Score Rules
//!
//! All scores end up as integers in [0, 100]:
//! - max across categories
//! - negative / absent / unparseable → 0
//! - above 100 → capped to 100

use serde_json::{Map, Value};

pub const MAX_SCORE: u8 = 100;

/// Clamp any numeric score into [0, 100]
pub fn clamp(raw: f64) -> u8 {
    if raw.is_nan() || raw <= 0.0 {
        0
    } else if raw >= MAX_SCORE as f64 {
        MAX_SCORE
    } else {
        raw.round() as u8
    }
}

/// Numeric value of a JSON number or numeric string
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Max score across a category map (`{"spam": 30, "botnet": "90"}`)
pub fn from_categories(categories: &Map<String, Value>) -> u8 {
    categories
        .values()
        .filter_map(numeric)
        .map(clamp)
        .max()
        .unwrap_or(0)
}

/// Severity / confidence words used by scanning and indicator vendors
pub fn from_level(level: &str) -> Option<u8> {
    match level.trim().to_lowercase().as_str() {
        "critical" => Some(100),
        "high" => Some(80),
        "medium" | "moderate" => Some(50),
        "low" => Some(20),
        "info" | "informational" | "none" => Some(0),
        _ => None,
    }
}

/// Score from a field that may be a number, numeric string or level word
pub fn from_value(value: &Value) -> Option<u8> {
    if let Some(n) = numeric(value) {
        return Some(clamp(n));
    }
    value.as_str().and_then(from_level)
}
