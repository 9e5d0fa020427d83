//! Message classifier: maps one raw inbound payload to exactly one [`NormalizedMessage`].
//!
//! Real payloads can satisfy several shapes at once, so the rules are tried in a fixed order
//! and the first match wins:
//!
//! 1. control tag in `type` (heartbeat / pong / ping)
//! 2. confidence-score report (`confidence_score` or `score_name`)
//! 3. recommendation list (`recommendations`)
//! 4. tabular text (or an explicit `type: "csv"`)
//! 5. plain text, stringifying anything that is not a string
//!
//! Classification never fails; the only impurity is the receipt time used when the payload
//! carries no timestamp.

pub mod csv;
pub mod score;

use crate::message::{
    ConfidenceReport, ConfidenceTier, MessageBody, NormalizedMessage, Role, DEFAULT_SENDER,
};
use chrono::{DateTime, Local};
use serde_json::{Map, Value};

pub use csv::parse_table;

/// Display format for timestamps stamped at receipt.
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S";

const CONTROL_TAGS: &[&str] = &["heartbeat", "pong", "ping"];

/// Classify a payload received now.
pub fn classify(raw: &Value) -> NormalizedMessage {
    classify_at(raw, Local::now())
}

/// Classify a payload received at `received`.
pub fn classify_at(raw: &Value, received: DateTime<Local>) -> NormalizedMessage {
    let fields = raw.as_object();
    let str_field = |key: &str| {
        fields
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let sender = str_field("name").unwrap_or(DEFAULT_SENDER).to_string();
    let role = str_field("role").map(Role::from_wire).unwrap_or(Role::Agent);
    let timestamp = match fields.and_then(|m| m.get("timestamp")) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => received.format(TIMESTAMP_FORMAT).to_string(),
    };

    let body = classify_body(raw);
    NormalizedMessage {
        sender,
        role,
        body,
        timestamp,
    }
}

/// Current time in the display format, for locally created messages.
pub fn now_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

fn classify_body(raw: &Value) -> MessageBody {
    let Some(fields) = raw.as_object() else {
        return text_body(raw, None);
    };

    if let Some(tag) = control_tag(fields) {
        return MessageBody::Control(tag);
    }

    let nested = nested_object(fields);
    let report_source = std::iter::once(fields)
        .chain(nested.as_ref())
        .find(|m| m.contains_key("confidence_score") || m.contains_key("score_name"));
    if let Some(m) = report_source {
        return MessageBody::ConfidenceScore(confidence_report(m));
    }

    let recommendations = std::iter::once(fields)
        .chain(nested.as_ref())
        .find_map(|m| m.get("recommendations"));
    if let Some(list) = recommendations {
        return MessageBody::Recommendations(recommendation_items(list));
    }

    let declared_csv = fields
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| t.trim().eq_ignore_ascii_case("csv"));
    let content = fields.get("content").or_else(|| fields.get("message"));
    text_body(content.unwrap_or(raw), Some(declared_csv))
}

/// Returns the control tag when `type` names a liveness frame.
fn control_tag(fields: &Map<String, Value>) -> Option<String> {
    let tag = fields.get("type")?.as_str()?.trim();
    CONTROL_TAGS
        .iter()
        .any(|t| tag.eq_ignore_ascii_case(t))
        .then(|| tag.to_string())
}

/// The `content` or `message` field as an object: either an object already or a string holding
/// a JSON object. Only one level is considered.
fn nested_object(fields: &Map<String, Value>) -> Option<Map<String, Value>> {
    ["content", "message"]
        .iter()
        .filter_map(|k| fields.get(*k))
        .find_map(|v| match v {
            Value::Object(m) => Some(m.clone()),
            Value::String(s) if s.trim_start().starts_with('{') => {
                match serde_json::from_str::<Value>(s) {
                    Ok(Value::Object(m)) => Some(m),
                    _ => None,
                }
            }
            _ => None,
        })
}

fn confidence_report(m: &Map<String, Value>) -> ConfidenceReport {
    let tier = match m.get("confidence_score") {
        Some(raw) => score::normalize(raw),
        None => m
            .get("score_name")
            .map(score::normalize)
            .unwrap_or(ConfidenceTier::Low),
    };
    let explanation = match m.get("explanation") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let decision = match m.get("board_decision") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Null) | None => None,
        Some(Value::String(_)) => None,
        Some(other) => Some(other.to_string()),
    };
    ConfidenceReport {
        tier,
        explanation,
        decision,
    }
}

fn recommendation_items(list: &Value) -> Vec<String> {
    match list {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Text or csv body for `content`. `declared_csv` is `None` when the payload itself is not an
/// object (no hints available).
fn text_body(content: &Value, declared_csv: Option<bool>) -> MessageBody {
    let text = match content {
        Value::String(s) => s.clone(),
        Value::Object(m) => match m.get("content") {
            Some(Value::String(inner)) => inner.clone(),
            _ => content.to_string(),
        },
        Value::Null => String::new(),
        other => other.to_string(),
    };
    if declared_csv.unwrap_or(false) || csv::looks_tabular(&text) {
        if let Some(table) = csv::parse_table(&text) {
            return MessageBody::Csv(table);
        }
    }
    MessageBody::Text(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2026, 10, 18, h, m, s)
            .single()
            .expect("unambiguous local time")
    }

    #[test]
    fn plain_text_message() {
        let raw = json!({"content":"Hello","role":"agent","name":"Planner","timestamp":"10:00:00"});
        let m = classify_at(&raw, at(12, 0, 0));
        assert_eq!(m.sender, "Planner");
        assert_eq!(m.role, Role::Agent);
        assert_eq!(m.kind(), MessageKind::Text);
        assert_eq!(m.body, MessageBody::Text("Hello".into()));
        assert_eq!(m.timestamp, "10:00:00");
    }

    #[test]
    fn confidence_report_with_named_score() {
        let raw = json!({"confidence_score":"EXCELLENT","explanation":"Good","board_decision":"PASS"});
        let m = classify_at(&raw, at(12, 0, 0));
        assert_eq!(
            m.body,
            MessageBody::ConfidenceScore(ConfidenceReport {
                tier: ConfidenceTier::Excellent,
                explanation: "Good".into(),
                decision: Some("PASS".into()),
            })
        );
        assert_eq!(m.sender, "Agent");
        assert_eq!(m.timestamp, "12:00:00");
    }

    #[test]
    fn confidence_score_shapes_agree() {
        for score in [
            json!(3),
            json!("3"),
            json!("HIGH"),
            json!({"value": 3}),
            json!({"value": "HIGH"}),
            json!({"name": "HIGH", "value": 3}),
        ] {
            let m = classify(&json!({"confidence_score": score}));
            let MessageBody::ConfidenceScore(r) = m.body else {
                panic!("expected confidence report for {}", score);
            };
            assert_eq!(r.score(), 3);
            assert_eq!(r.tier.name(), "HIGH");
        }
    }

    #[test]
    fn malformed_score_defaults_to_low() {
        let m = classify(&json!({"confidence_score": {"value": {"value": 4}}, "explanation": 12}));
        let MessageBody::ConfidenceScore(r) = m.body else {
            panic!("expected confidence report");
        };
        assert_eq!(r.score(), 1);
        assert_eq!(r.tier, ConfidenceTier::Low);
        assert_eq!(r.explanation, "12");
    }

    #[test]
    fn score_name_used_when_score_absent() {
        let m = classify(&json!({"score_name": "medium"}));
        assert_eq!(m.kind(), MessageKind::ConfidenceScore);
        let MessageBody::ConfidenceScore(r) = m.body else { unreachable!() };
        assert_eq!(r.tier, ConfidenceTier::Medium);
    }

    #[test]
    fn nested_report_in_content_object() {
        let raw = json!({
            "role": "agent",
            "content": {"confidence_score": 2, "explanation": "one subscription id", "board_decision": "PASS"}
        });
        let m = classify(&raw);
        let MessageBody::ConfidenceScore(r) = m.body else {
            panic!("expected confidence report");
        };
        assert_eq!(r.tier, ConfidenceTier::Medium);
        assert_eq!(r.decision.as_deref(), Some("PASS"));
    }

    #[test]
    fn nested_report_in_json_string() {
        let raw = json!({"content": "{\"confidence_score\": 4, \"explanation\": \"ok\"}"});
        assert_eq!(classify(&raw).kind(), MessageKind::ConfidenceScore);
    }

    #[test]
    fn control_wins_over_everything() {
        let raw = json!({"type": "Heartbeat", "confidence_score": 3, "content": "a,b,c,d\n1,2,3,4"});
        let m = classify(&raw);
        assert_eq!(m.body, MessageBody::Control("Heartbeat".into()));
    }

    #[test]
    fn confidence_wins_over_recommendations() {
        let raw = json!({"confidence_score": 2, "recommendations": ["a"]});
        assert_eq!(classify(&raw).kind(), MessageKind::ConfidenceScore);
    }

    #[test]
    fn recommendations_keep_order_and_stringify() {
        let raw = json!({"name": "Planner", "recommendations": ["Resize vm-1", {"vm": "vm-2"}, "Delete disk"]});
        let m = classify(&raw);
        assert_eq!(
            m.body,
            MessageBody::Recommendations(vec![
                "Resize vm-1".into(),
                r#"{"vm":"vm-2"}"#.into(),
                "Delete disk".into()
            ])
        );
    }

    #[test]
    fn recommendations_non_array_is_empty() {
        let m = classify(&json!({"recommendations": null}));
        assert_eq!(m.body, MessageBody::Recommendations(Vec::new()));
    }

    #[test]
    fn tabular_content_becomes_csv() {
        let raw = json!({"content": "a,b,c,d\n1,2,3,4\n5,6"});
        let m = classify(&raw);
        let MessageBody::Csv(t) = m.body else {
            panic!("expected csv");
        };
        assert_eq!(t.header.len(), 4);
        assert_eq!(t.rows, vec![vec!["1", "2", "3", "4"], vec!["5", "6", "", ""]]);
    }

    #[test]
    fn narrow_table_stays_text_unless_declared() {
        let text = "a,b\n1,2";
        assert_eq!(classify(&json!({"content": text})).kind(), MessageKind::Text);
        assert_eq!(
            classify(&json!({"content": text, "type": "csv"})).kind(),
            MessageKind::Csv
        );
    }

    #[test]
    fn message_field_is_content_fallback() {
        let m = classify(&json!({"message": "Processing message..."}));
        assert_eq!(m.text(), Some("Processing message..."));
    }

    #[test]
    fn non_string_content_is_stringified() {
        let m = classify(&json!({"content": {"status": "done"}}));
        assert_eq!(m.text(), Some(r#"{"status":"done"}"#));
        let m = classify(&json!({"content": {"content": "inner", "name": "Critic"}}));
        assert_eq!(m.text(), Some("inner"));
        let m = classify(&json!([1, 2]));
        assert_eq!(m.text(), Some("[1,2]"));
        let m = classify(&json!("bare"));
        assert_eq!(m.text(), Some("bare"));
    }

    #[test]
    fn object_without_content_is_stringified_whole() {
        let m = classify(&json!({"status": "chat_ongoing"}));
        assert_eq!(m.text(), Some(r#"{"status":"chat_ongoing"}"#));
    }

    #[test]
    fn role_and_sender_defaults() {
        let m = classify(&json!({"content": "x", "name": "  ", "role": "assistant"}));
        assert_eq!(m.sender, "Agent");
        assert_eq!(m.role, Role::Agent);
        let m = classify(&json!({"content": "x", "role": "system", "name": "Error"}));
        assert_eq!(m.role, Role::System);
        assert_eq!(m.sender, "Error");
    }

    #[test]
    fn classification_is_idempotent() {
        let raw = json!({"content": "Hi", "name": "Critic"});
        let a = classify_at(&raw, at(8, 0, 0));
        let b = classify_at(&raw, at(9, 30, 0));
        assert_eq!(a.sender, b.sender);
        assert_eq!(a.role, b.role);
        assert_eq!(a.body, b.body);
        assert_ne!(a.timestamp, b.timestamp);

        let stamped = json!({"content": "Hi", "timestamp": "07:00:00"});
        assert_eq!(classify_at(&stamped, at(8, 0, 0)), classify_at(&stamped, at(9, 0, 0)));
    }
}
