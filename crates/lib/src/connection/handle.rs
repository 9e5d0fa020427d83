//! Connection handle: one tokio task owns the WebSocket and the reconnect timer.
//!
//! The handle is the only way to reach the task. Dropping it (or calling
//! [`ConnectionHandle::close`]) sends an intentional close, so no timer outlives the view that
//! created it.

use super::lifecycle::{Lifecycle, Reconnect};
use super::protocol::{
    ConnectionError, ConnectionEvent, ConnectionState, FrameSink, OutboundFrame, NORMAL_CLOSURE,
};
use crate::config::Config;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Where to connect and how to retry.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub url: String,
    /// Fixed delay before the single automatic reconnect.
    pub retry_delay: Duration,
    pub connect_timeout: Duration,
}

impl ConnectOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retry_delay: Duration::from_millis(crate::config::DEFAULT_RECONNECT_DELAY_MS),
            connect_timeout: Duration::from_millis(crate::config::DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            url: crate::config::resolve_ws_url(config),
            retry_delay: Duration::from_millis(config.backend.reconnect_delay_ms),
            connect_timeout: Duration::from_millis(config.backend.connect_timeout_ms),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

enum Command {
    Send(String),
    RetryNow,
    Close,
}

/// Owned handle to the conversation socket.
pub struct ConnectionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionHandle {
    /// Start connecting in the background. Must be called from within a tokio runtime.
    /// Returns the handle and the receiver for connection events.
    pub fn spawn(options: ConnectOptions) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let driver = Driver {
            lifecycle: Lifecycle::new(options.retry_delay),
            options,
            commands: command_rx,
            events: event_tx,
            state: state_tx,
        };
        let task = tokio::spawn(driver.run());
        (
            Self {
                commands,
                state,
                task: Some(task),
            },
            event_rx,
        )
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Send a frame over the open connection. When not connected the frame is not sent and an
    /// immediate reconnection attempt is requested.
    pub fn send(&self, frame: &OutboundFrame) -> Result<(), ConnectionError> {
        if self.state() != ConnectionState::Connected {
            self.retry_now();
            return Err(ConnectionError::NotConnected);
        }
        let text = serde_json::to_string(frame)?;
        self.commands
            .send(Command::Send(text))
            .map_err(|_| ConnectionError::Closed)
    }

    /// Skip the reconnect delay and try now. Ignored while connected or while an attempt is in
    /// flight.
    pub fn retry_now(&self) {
        let _ = self.commands.send(Command::RetryNow);
    }

    /// Close intentionally (code 1000) and wait for the task to finish.
    pub async fn close(mut self) {
        let _ = self.commands.send(Command::Close);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl ConnectionHandle {
    /// [`close`](Self::close) bounded by `timeout`. Returns false when the task had not finished
    /// in time.
    pub async fn close_within(self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.close()).await.is_ok()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.commands.send(Command::Close);
        }
    }
}

impl FrameSink for ConnectionHandle {
    fn state(&self) -> ConnectionState {
        ConnectionHandle::state(self)
    }

    fn send_frame(&self, frame: &OutboundFrame) -> Result<(), ConnectionError> {
        self.send(frame)
    }
}

enum Attempt {
    Connected(Box<WsStream>),
    Failed(String),
    Shutdown,
}

enum Exit {
    Closed(Option<u16>),
    Failed(String),
    Shutdown,
}

struct Driver {
    options: ConnectOptions,
    lifecycle: Lifecycle,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    state: watch::Sender<ConnectionState>,
}

impl Driver {
    async fn run(mut self) {
        while self.lifecycle.begin_connect() {
            self.publish();
            let next = match self.connect().await {
                Attempt::Connected(ws) => {
                    self.lifecycle.opened();
                    self.publish();
                    self.emit(ConnectionEvent::Open);
                    match self.session(*ws).await {
                        Exit::Closed(code) => {
                            log::info!("conversation socket closed (code {:?})", code);
                            let next = self.lifecycle.closed(code);
                            self.publish();
                            self.emit(ConnectionEvent::Close(code));
                            next
                        }
                        Exit::Failed(e) => {
                            log::warn!("conversation socket failed: {}", e);
                            let next = self.lifecycle.failed();
                            self.publish();
                            self.emit(ConnectionEvent::Error(e));
                            next
                        }
                        Exit::Shutdown => break,
                    }
                }
                Attempt::Failed(e) => {
                    log::warn!("connecting to {} failed: {}", self.options.url, e);
                    let next = self.lifecycle.failed();
                    self.publish();
                    self.emit(ConnectionEvent::Error(e));
                    next
                }
                Attempt::Shutdown => break,
            };
            if !self.wait(next).await {
                break;
            }
        }
        self.lifecycle.shutdown();
        self.publish();
        log::debug!("connection task for {} stopped", self.options.url);
    }

    async fn connect(&mut self) -> Attempt {
        let timeout = self.options.connect_timeout;
        let connect = tokio::time::timeout(
            timeout,
            tokio_tungstenite::connect_async(self.options.url.clone()),
        );
        tokio::pin!(connect);
        loop {
            tokio::select! {
                res = &mut connect => {
                    return match res {
                        Ok(Ok((ws, _))) => Attempt::Connected(Box::new(ws)),
                        Ok(Err(e)) => Attempt::Failed(e.to_string()),
                        Err(_) => Attempt::Failed(format!("connect timed out after {:?}", timeout)),
                    };
                }
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Close) | None => return Attempt::Shutdown,
                    Some(Command::RetryNow) => log::debug!("connection attempt already in flight"),
                    Some(Command::Send(text)) => self.undelivered(&text, "connection not open yet"),
                },
            }
        }
    }

    async fn session(&mut self, ws: WsStream) -> Exit {
        let (mut sink, mut stream) = ws.split();
        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.inbound(&text),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => self.inbound(text),
                        Err(_) => log::warn!("dropping non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        return Exit::Closed(frame.map(|f| u16::from(f.code)));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Exit::Failed(e.to_string()),
                    None => return Exit::Closed(None),
                },
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Send(text)) => {
                        if let Err(e) = sink.send(Message::Text(text.clone())).await {
                            self.undelivered(&text, "socket write failed");
                            return Exit::Failed(e.to_string());
                        }
                    }
                    Some(Command::RetryNow) => {}
                    Some(Command::Close) | None => {
                        let frame = CloseFrame {
                            code: CloseCode::Normal,
                            reason: "client closed".into(),
                        };
                        if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                            log::debug!("sending close frame failed: {}", e);
                        }
                        self.emit(ConnectionEvent::Close(Some(NORMAL_CLOSURE)));
                        return Exit::Shutdown;
                    }
                },
            }
        }
    }

    /// Wait out the reconnect delay (or forever when nothing is scheduled) while still serving
    /// commands. A retry request or a dropped send reconnects at once. Returns false when the
    /// handle asked to close.
    async fn wait(&mut self, next: Reconnect) -> bool {
        let delay = match next {
            Reconnect::After(d) => {
                log::info!("reconnecting to {} in {:?}", self.options.url, d);
                Some(d)
            }
            Reconnect::Idle => None,
        };
        let timer = async move {
            match delay {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(timer);
        loop {
            tokio::select! {
                _ = &mut timer => return self.lifecycle.timer_fired(),
                cmd = self.commands.recv() => match cmd {
                    Some(Command::RetryNow) => {
                        log::info!("manual reconnect to {}", self.options.url);
                        return true;
                    }
                    Some(Command::Send(text)) => {
                        self.undelivered(&text, "not connected");
                        return true;
                    }
                    Some(Command::Close) | None => return false,
                },
            }
        }
    }

    fn inbound(&self, text: &str) {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => self.emit(ConnectionEvent::Message(value)),
            Err(e) => log::warn!("dropping malformed frame: {}", e),
        }
    }

    /// A send accepted by the handle that never reached the socket.
    fn undelivered(&self, frame: &str, reason: &str) {
        log::warn!("dropping outbound frame: {}", reason);
        let message = serde_json::from_str::<OutboundFrame>(frame)
            .map(|f| f.message)
            .unwrap_or_else(|_| frame.to_string());
        self.emit(ConnectionEvent::Undelivered(message));
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        let state = self.lifecycle.state();
        let previous = self.state.send_replace(state);
        if previous != state {
            log::debug!("connection {} -> {}", previous.label(), state.label());
        }
    }
}
