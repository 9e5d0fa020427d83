//! Dashboard session: the pipeline a view drives.
//!
//! Connection events are classified and appended on the caller's thread; user input goes
//! through the composer and a [`FrameSink`]. Front ends own one `Dashboard` and render
//! [`ConversationLog::visible`].

use crate::classify;
use crate::compose;
use crate::config::Config;
use crate::connection::{ConnectionEvent, ConnectionState, FrameSink, NORMAL_CLOSURE};
use crate::conversation::{ClearScope, ConversationLog};
use crate::message::NormalizedMessage;
use serde_json::Value;

/// What happened to a submitted input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input; nothing sent or logged.
    Ignored,
    /// Frame sent and the echo appended.
    Sent,
    /// No open connection; a system notice was appended instead of the echo.
    NotDelivered,
}

pub struct Dashboard {
    log: ConversationLog,
    status: ConnectionState,
    notice: Option<String>,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl Dashboard {
    pub fn new(config: &Config) -> Self {
        Self {
            log: ConversationLog::with_sweep_threshold(config.conversation.control_sweep_threshold),
            status: ConnectionState::Disconnected,
            notice: None,
        }
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn status(&self) -> ConnectionState {
        self.status
    }

    /// Last connection problem, cleared when the connection opens again.
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    /// Apply one connection event. Returns the appended message when the event produced a
    /// visible one.
    pub fn handle_event(&mut self, event: ConnectionEvent) -> Option<&NormalizedMessage> {
        match event {
            ConnectionEvent::Open => {
                self.status = ConnectionState::Connected;
                self.notice = None;
                None
            }
            ConnectionEvent::Message(raw) => self.append(classify::classify(&raw)),
            ConnectionEvent::Close(code) => {
                self.status = ConnectionState::Disconnected;
                if code != Some(NORMAL_CLOSURE) {
                    self.notice = Some(match code {
                        Some(c) => format!("Connection closed ({}), reconnecting", c),
                        None => "Connection lost, reconnecting".to_string(),
                    });
                }
                None
            }
            ConnectionEvent::Error(e) => {
                self.status = ConnectionState::Error;
                self.notice = Some(e);
                None
            }
            ConnectionEvent::Undelivered(text) => self.append(NormalizedMessage::system(
                format!("Message not delivered: {:?}. Reconnecting.", text),
                classify::now_timestamp(),
            )),
        }
    }

    /// Compose `input` and send it through `sink`.
    pub fn submit(&mut self, input: &str, sink: &dyn FrameSink) -> SubmitOutcome {
        let Some(composed) = compose::compose(input) else {
            return SubmitOutcome::Ignored;
        };
        match sink.send_frame(&composed.frame) {
            Ok(()) => {
                self.log.append(composed.echo);
                SubmitOutcome::Sent
            }
            Err(e) => {
                log::warn!("message not delivered: {}", e);
                self.status = sink.state();
                self.log.append(NormalizedMessage::system(
                    format!("Message not delivered: {}. Reconnecting.", e),
                    composed.echo.timestamp,
                ));
                SubmitOutcome::NotDelivered
            }
        }
    }

    /// Classify and append conversation entries returned by the REST API. Returns how many
    /// visible messages were added.
    pub fn ingest_conversation(&mut self, entries: &[Value]) -> usize {
        entries
            .iter()
            .filter_map(|raw| self.append(classify::classify(raw)).map(|_| ()))
            .count()
    }

    pub fn clear(&mut self, scope: ClearScope) {
        self.log.clear(scope);
    }

    /// Track the handle's state between events (connecting, retries).
    pub fn set_status(&mut self, status: ConnectionState) {
        self.status = status;
    }

    fn append(&mut self, message: NormalizedMessage) -> Option<&NormalizedMessage> {
        let visible = !message.is_control();
        self.log.append(message);
        if visible {
            self.log.entries().last()
        } else {
            None
        }
    }
}
