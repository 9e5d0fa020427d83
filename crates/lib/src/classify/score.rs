//! Confidence-score normalization onto the canonical 1-4 scale.
//!
//! Accepted shapes: a number (rounded), an integer string, a tier name, or an object with a
//! `value` or `name` field holding one of those. Anything else normalizes to LOW.

use crate::message::ConfidenceTier;
use serde_json::Value;

/// Normalize a raw score value. Never fails: unparseable input yields [`ConfidenceTier::Low`].
pub fn normalize(raw: &Value) -> ConfidenceTier {
    parse(raw, true).unwrap_or(ConfidenceTier::Low)
}

/// Parse a raw score; `None` when the shape is not recognized. Objects are unwrapped only when
/// `unwrap_object` is set, so an object inside an object is rejected.
pub fn parse(raw: &Value, unwrap_object: bool) -> Option<ConfidenceTier> {
    match raw {
        Value::Number(n) => from_float(n.as_f64()?),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<i64>() {
                return Some(ConfidenceTier::from_score(n));
            }
            match s.parse::<f64>() {
                Ok(f) => from_float(f),
                Err(_) => ConfidenceTier::from_name(s),
            }
        }
        Value::Object(map) if unwrap_object => ["value", "name"]
            .iter()
            .filter_map(|k| map.get(*k))
            .find_map(|v| parse(v, false)),
        _ => None,
    }
}

/// Rounded and clamped; non-finite values are rejected.
fn from_float(f: f64) -> Option<ConfidenceTier> {
    f.is_finite()
        .then(|| ConfidenceTier::from_score(f.round() as i64))
}
