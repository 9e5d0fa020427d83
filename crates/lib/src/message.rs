//! Normalized conversation messages: the durable unit stored in the conversation log.
//!
//! A message is created by the classifier (inbound frames) or by the composer (the user's own
//! echo) and never mutated afterwards. Its kind is derived from the body variant, so it cannot
//! drift from the payload it describes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sender shown for inbound messages that carry no `name`.
pub const DEFAULT_SENDER: &str = "Agent";
/// Sender of locally echoed user messages.
pub const USER_SENDER: &str = "You";
/// Sender of locally generated notices (e.g. undelivered message).
pub const SYSTEM_SENDER: &str = "System";

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
    System,
}

impl Role {
    /// Parse a wire role. `assistant` is the backend's spelling for agent turns; anything
    /// unrecognized is treated as an agent.
    pub fn from_wire(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Role::User,
            "system" => Role::System,
            _ => Role::Agent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Agent => "agent",
            Role::System => "system",
        }
    }
}

/// Semantic kind of a message, fixed at classification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Csv,
    ConfidenceScore,
    Recommendations,
    Control,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Csv => "csv",
            MessageKind::ConfidenceScore => "confidence_score",
            MessageKind::Recommendations => "recommendations",
            MessageKind::Control => "control",
        }
    }
}

/// Confidence tier on the canonical 1-4 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceTier {
    Low = 1,
    Medium = 2,
    High = 3,
    Excellent = 4,
}

impl ConfidenceTier {
    /// Tier for a score; values outside [1,4] clamp to the nearest bound.
    pub fn from_score(score: i64) -> Self {
        match score.clamp(1, 4) {
            1 => ConfidenceTier::Low,
            2 => ConfidenceTier::Medium,
            3 => ConfidenceTier::High,
            _ => ConfidenceTier::Excellent,
        }
    }

    /// Parse a tier name (case-insensitive). `VERY_HIGH` is an alias of `EXCELLENT`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().replace([' ', '-'], "_").as_str() {
            "LOW" => Some(ConfidenceTier::Low),
            "MEDIUM" => Some(ConfidenceTier::Medium),
            "HIGH" => Some(ConfidenceTier::High),
            "EXCELLENT" | "VERY_HIGH" => Some(ConfidenceTier::Excellent),
            _ => None,
        }
    }

    pub fn score(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConfidenceTier::Low => "LOW",
            ConfidenceTier::Medium => "MEDIUM",
            ConfidenceTier::High => "HIGH",
            ConfidenceTier::Excellent => "EXCELLENT",
        }
    }

    /// Status glyph used by the backend's governing-board report.
    pub fn icon(&self) -> &'static str {
        match self {
            ConfidenceTier::High | ConfidenceTier::Excellent => "✅",
            ConfidenceTier::Medium => "⚠️",
            ConfidenceTier::Low => "❌",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A confidence-score assessment attached to a prompt or recommendation set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceReport {
    pub tier: ConfidenceTier,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
}

impl ConfidenceReport {
    /// Numeric score, always in [1,4].
    pub fn score(&self) -> u8 {
        self.tier.score()
    }
}

/// Delimited text parsed into a header and rows of the same width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvTable {
    pub raw: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Kind-dependent payload of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum MessageBody {
    Text(String),
    Csv(CsvTable),
    ConfidenceScore(ConfidenceReport),
    Recommendations(Vec<String>),
    Control(String),
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Text(_) => MessageKind::Text,
            MessageBody::Csv(_) => MessageKind::Csv,
            MessageBody::ConfidenceScore(_) => MessageKind::ConfidenceScore,
            MessageBody::Recommendations(_) => MessageKind::Recommendations,
            MessageBody::Control(_) => MessageKind::Control,
        }
    }
}

/// One entry of the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedMessage {
    pub sender: String,
    pub role: Role,
    #[serde(flatten)]
    pub body: MessageBody,
    pub timestamp: String,
}

impl NormalizedMessage {
    pub fn new(
        sender: impl Into<String>,
        role: Role,
        body: MessageBody,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            role,
            body,
            timestamp: timestamp.into(),
        }
    }

    /// The user's own message, echoed locally before the backend acknowledges it.
    pub fn user(text: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self::new(USER_SENDER, Role::User, MessageBody::Text(text.into()), timestamp)
    }

    /// A locally generated notice (connection problems, undelivered messages).
    pub fn system(text: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self::new(SYSTEM_SENDER, Role::System, MessageBody::Text(text.into()), timestamp)
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    pub fn is_control(&self) -> bool {
        self.kind() == MessageKind::Control
    }

    /// Text body, if this is a text message.
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for NormalizedMessage {
    /// Plain-text rendering for terminals and logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: ", self.timestamp, self.sender)?;
        match &self.body {
            MessageBody::Text(s) => write!(f, "{}", s),
            MessageBody::Control(tag) => write!(f, "({})", tag),
            MessageBody::Csv(table) => {
                write!(f, "table with {} column(s), {} row(s)", table.header.len(), table.rows.len())
            }
            MessageBody::ConfidenceScore(r) => {
                write!(f, "{} Confidence Score: {}/4 ({})", r.tier.icon(), r.score(), r.tier)?;
                if let Some(ref d) = r.decision {
                    write!(f, " - Board Decision: {}", d)?;
                }
                if !r.explanation.is_empty() {
                    write!(f, "\n  {}", r.explanation)?;
                }
                Ok(())
            }
            MessageBody::Recommendations(items) => {
                write!(f, "{} recommendation(s)", items.len())?;
                for (i, item) in items.iter().enumerate() {
                    write!(f, "\n  {}. {}", i + 1, item)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_from_score_clamps() {
        assert_eq!(ConfidenceTier::from_score(0), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::from_score(-2), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::from_score(3), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_score(7), ConfidenceTier::Excellent);
    }

    #[test]
    fn tier_names_are_case_insensitive() {
        assert_eq!(ConfidenceTier::from_name("high"), Some(ConfidenceTier::High));
        assert_eq!(ConfidenceTier::from_name("Very_High"), Some(ConfidenceTier::Excellent));
        assert_eq!(ConfidenceTier::from_name("unknown"), None);
    }

    #[test]
    fn role_from_wire_defaults_to_agent() {
        assert_eq!(Role::from_wire("user"), Role::User);
        assert_eq!(Role::from_wire("assistant"), Role::Agent);
        assert_eq!(Role::from_wire("System"), Role::System);
        assert_eq!(Role::from_wire(""), Role::Agent);
    }

    #[test]
    fn serialized_message_carries_kind_tag() {
        let m = NormalizedMessage::user("hi", "10:00:00");
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["kind"], "text");
        assert_eq!(v["body"], "hi");
        assert_eq!(v["role"], "user");
        assert_eq!(v["sender"], "You");
    }

    #[test]
    fn display_confidence_report() {
        let m = NormalizedMessage::new(
            "Critic",
            Role::Agent,
            MessageBody::ConfidenceScore(ConfidenceReport {
                tier: ConfidenceTier::Medium,
                explanation: String::new(),
                decision: Some("PASS".into()),
            }),
            "09:30:00",
        );
        assert_eq!(
            m.to_string(),
            "[09:30:00] Critic: ⚠️ Confidence Score: 2/4 (MEDIUM) - Board Decision: PASS"
        );
    }
}
