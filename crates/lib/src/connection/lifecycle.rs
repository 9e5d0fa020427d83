//! Connection lifecycle state machine.
//!
//! Pure bookkeeping, no I/O: the connection task asks it whether to start an attempt and
//! whether to arm the reconnect timer. At most one attempt is in flight and at most one timer
//! is pending at any time.

use super::protocol::{ConnectionState, NORMAL_CLOSURE};
use std::time::Duration;

/// What the driver should do after a close or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconnect {
    /// Nothing scheduled: intentional/normal closure, or a timer is already pending.
    Idle,
    /// Arm the single reconnect timer for this delay.
    After(Duration),
}

#[derive(Debug)]
pub struct Lifecycle {
    state: ConnectionState,
    retry_delay: Duration,
    attempt_in_flight: bool,
    retry_pending: bool,
    shut_down: bool,
}

impl Lifecycle {
    pub fn new(retry_delay: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retry_delay,
            attempt_in_flight: false,
            retry_pending: false,
            shut_down: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// disconnected|error -> connecting. Returns false (and changes nothing) when an attempt
    /// is already in flight, the connection is up, or the handle was closed. Starting an
    /// attempt consumes any pending timer.
    pub fn begin_connect(&mut self) -> bool {
        if self.shut_down || self.attempt_in_flight || self.state == ConnectionState::Connected {
            return false;
        }
        self.attempt_in_flight = true;
        self.retry_pending = false;
        self.state = ConnectionState::Connecting;
        true
    }

    /// connecting -> connected.
    pub fn opened(&mut self) {
        self.attempt_in_flight = false;
        self.retry_pending = false;
        self.state = ConnectionState::Connected;
    }

    /// connected -> disconnected. A normal-closure code suppresses reconnection.
    pub fn closed(&mut self, code: Option<u16>) -> Reconnect {
        self.attempt_in_flight = false;
        self.state = ConnectionState::Disconnected;
        if code == Some(NORMAL_CLOSURE) {
            return Reconnect::Idle;
        }
        self.schedule()
    }

    /// connected|connecting -> error; schedules the single retry.
    pub fn failed(&mut self) -> Reconnect {
        self.attempt_in_flight = false;
        self.state = ConnectionState::Error;
        self.schedule()
    }

    /// The reconnect timer elapsed. Returns true when an attempt should start now; a timer that
    /// outlived its purpose (connection already restored, or shut down) is ignored.
    pub fn timer_fired(&mut self) -> bool {
        let due = self.retry_pending && !self.shut_down && self.state != ConnectionState::Connected;
        self.retry_pending = false;
        due
    }

    /// Intentional close: no further attempts or timers, ever.
    pub fn shutdown(&mut self) {
        self.shut_down = true;
        self.retry_pending = false;
        self.attempt_in_flight = false;
        self.state = ConnectionState::Disconnected;
    }

    fn schedule(&mut self) -> Reconnect {
        if self.shut_down || self.retry_pending {
            return Reconnect::Idle;
        }
        self.retry_pending = true;
        Reconnect::After(self.retry_delay)
    }
}
