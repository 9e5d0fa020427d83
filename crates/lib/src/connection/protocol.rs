//! Conversation WebSocket protocol types (outbound frame, connection events).

use serde::{Deserialize, Serialize};

/// Close code that marks an intentional shutdown; it never triggers reconnection.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Wire frame sent for a user message: `{ "message": "<text>" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub message: String,
}

impl OutboundFrame {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }
}

/// Events emitted by a connection handle, in the order they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Handshake completed.
    Open,
    /// One inbound frame that parsed as JSON. Malformed frames are dropped before this point.
    Message(serde_json::Value),
    /// The socket closed; carries the close code when the peer sent one.
    Close(Option<u16>),
    /// Connect or transport failure.
    Error(String),
    /// A message accepted by `send` was dropped because the connection went away before it
    /// was written. Carries the message text.
    Undelivered(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("not connected to the backend")]
    NotConnected,
    #[error("connection task has shut down")]
    Closed,
    #[error("encoding outbound frame failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Destination for outbound frames. Implemented by [`super::ConnectionHandle`]; views depend on
/// this so they can be driven without a live socket.
pub trait FrameSink {
    fn state(&self) -> ConnectionState;
    /// Send one frame. Fails with [`ConnectionError::NotConnected`] when there is no open
    /// connection; implementations also start a reconnection attempt in that case.
    fn send_frame(&self, frame: &OutboundFrame) -> Result<(), ConnectionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_frame_wire_shape() {
        let s = serde_json::to_string(&OutboundFrame::new("hello")).unwrap();
        assert_eq!(s, r#"{"message":"hello"}"#);
    }
}
