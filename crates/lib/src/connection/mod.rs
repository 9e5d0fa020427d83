//! Backend connection: the `/ws/conversation` WebSocket.
//!
//! A single task owns the socket and the reconnect timer; [`Lifecycle`] decides when an
//! attempt may start and when the one-shot retry is armed. Consumers receive
//! [`ConnectionEvent`]s over a channel and drain them on their own thread.

mod handle;
mod lifecycle;
mod protocol;

pub use handle::{ConnectOptions, ConnectionHandle};
pub use lifecycle::{Lifecycle, Reconnect};
pub use protocol::{
    ConnectionError, ConnectionEvent, ConnectionState, FrameSink, OutboundFrame, NORMAL_CLOSURE,
};
