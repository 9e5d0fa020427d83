//! Outbound composer: user text to wire frame plus the optimistic local echo.

use crate::classify;
use crate::connection::OutboundFrame;
use crate::message::NormalizedMessage;

/// A composed user message: what goes on the wire and what goes into the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composed {
    pub frame: OutboundFrame,
    pub echo: NormalizedMessage,
}

/// Compose a message stamped now. `None` for empty or whitespace-only input.
pub fn compose(input: &str) -> Option<Composed> {
    compose_at(input, classify::now_timestamp())
}

pub fn compose_at(input: &str, timestamp: impl Into<String>) -> Option<Composed> {
    let text = input.trim();
    if text.is_empty() {
        return None;
    }
    Some(Composed {
        frame: OutboundFrame::new(text),
        echo: NormalizedMessage::user(text, timestamp),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageKind, Role};

    #[test]
    fn trims_and_echoes() {
        let c = compose_at("  find idle VMs \n", "10:00:00").unwrap();
        assert_eq!(c.frame, OutboundFrame::new("find idle VMs"));
        assert_eq!(c.echo.sender, "You");
        assert_eq!(c.echo.role, Role::User);
        assert_eq!(c.echo.kind(), MessageKind::Text);
        assert_eq!(c.echo.text(), Some("find idle VMs"));
        assert_eq!(c.echo.timestamp, "10:00:00");
    }

    #[test]
    fn blank_input_is_ignored() {
        assert!(compose("").is_none());
        assert!(compose("   ").is_none());
        assert!(compose("\t\n").is_none());
    }
}
