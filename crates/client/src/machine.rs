// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client connection state machine.
//!
//! Pure and synchronous: [`ConnectionMachine::step`] takes one [`Input`] and
//! returns the [`Action`]s the driver must perform. All timing and I/O live
//! in the channel driver, which feeds the results back as further inputs.
//!
//! ```text
//!              connect() / timer
//!  Disconnected ────────────────► Connecting
//!       ▲                            │  opened
//!       │ closed / error             ▼
//!       └──────────────────────── Connected
//! ```
//!
//! Reconnect timers carry a [`TimerId`]. Every transition out of
//! Disconnected invalidates the pending id, so a timer that fires late is
//! ignored instead of starting a second attempt.

use std::fmt;
use std::time::Duration;

use tether_core::Backoff;

/// Lifecycle state of the local connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected. Initial state, and where the machine parks when it
    /// gives up.
    Disconnected,
    /// Transport open in progress.
    Connecting,
    /// Transport open.
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one scheduled reconnect timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub(crate) u64);

/// Why a transport went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Socket drop, network failure or failed connect.
    Transport,
    /// No inbound traffic within the heartbeat dead threshold.
    HeartbeatTimeout,
    /// Nothing listening at the endpoint.
    ServerUnavailable,
}

/// Events fed into the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Explicit `connect()` from the caller.
    Connect,
    /// Explicit `disconnect()` from the caller.
    Disconnect,
    /// The transport finished opening.
    Opened,
    /// The transport closed or failed to open.
    Closed(CloseReason),
    /// A reconnect timer elapsed.
    TimerFired(TimerId),
}

/// Side effects requested by the machine, in the order they must run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    OpenTransport,
    CloseTransport,
    StartHeartbeat,
    StopHeartbeat,
    FlushQueue,
    ScheduleReconnect {
        timer: TimerId,
        attempt: u32,
        delay: Duration,
    },
    CancelReconnect,
    NotifyConnect,
    NotifyDisconnect,
    /// Auto-reconnect suspended: no hub is listening.
    NotifySuspended,
    /// Auto-reconnect exhausted its attempts.
    NotifyGaveUp {
        attempts: u32,
    },
}

/// The client connection lifecycle.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    backoff: Backoff,
    /// Reconnect attempts since the last successful open.
    attempt: u32,
    /// Set by a server-unavailable close; cleared by `connect()`.
    suspended: bool,
    /// Whether an open has succeeded since the last `connect()`.
    established: bool,
    timer: Option<TimerId>,
    next_timer: u64,
}

impl ConnectionMachine {
    pub fn new(backoff: Backoff) -> Self {
        ConnectionMachine {
            state: ConnectionState::Disconnected,
            backoff,
            attempt: 0,
            suspended: false,
            established: false,
            timer: None,
            next_timer: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnect attempts made since the last successful open.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// True while auto-reconnect is suspended by a server-unavailable close.
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// The reconnect timer currently considered live, if any.
    pub fn pending_timer(&self) -> Option<TimerId> {
        self.timer
    }

    /// Applies one input and returns the actions to perform.
    pub fn step(&mut self, input: Input) -> Vec<Action> {
        match (self.state, input) {
            (ConnectionState::Disconnected, Input::Connect) => {
                let mut actions = self.cancel_timer();
                self.attempt = 0;
                self.suspended = false;
                self.established = false;
                self.state = ConnectionState::Connecting;
                actions.push(Action::OpenTransport);
                actions
            }
            (ConnectionState::Connecting | ConnectionState::Connected, Input::Connect) => Vec::new(),

            (ConnectionState::Disconnected, Input::Disconnect) => self.cancel_timer(),
            (ConnectionState::Connecting, Input::Disconnect) => {
                self.state = ConnectionState::Disconnected;
                vec![Action::CloseTransport]
            }
            (ConnectionState::Connected, Input::Disconnect) => {
                self.state = ConnectionState::Disconnected;
                vec![
                    Action::StopHeartbeat,
                    Action::CloseTransport,
                    Action::NotifyDisconnect,
                ]
            }

            (ConnectionState::Connecting, Input::Opened) => {
                self.state = ConnectionState::Connected;
                self.attempt = 0;
                self.established = true;
                vec![
                    Action::NotifyConnect,
                    Action::StartHeartbeat,
                    Action::FlushQueue,
                ]
            }
            // A late open after disconnect() won the race: drop it
            (ConnectionState::Disconnected, Input::Opened) => vec![Action::CloseTransport],
            (ConnectionState::Connected, Input::Opened) => Vec::new(),

            (ConnectionState::Connecting, Input::Closed(reason)) => {
                self.state = ConnectionState::Disconnected;
                self.after_close(reason, Vec::new())
            }
            (ConnectionState::Connected, Input::Closed(reason)) => {
                self.state = ConnectionState::Disconnected;
                self.after_close(
                    reason,
                    vec![Action::StopHeartbeat, Action::NotifyDisconnect],
                )
            }
            (ConnectionState::Disconnected, Input::Closed(_)) => Vec::new(),

            (ConnectionState::Disconnected, Input::TimerFired(id)) if self.timer == Some(id) => {
                self.timer = None;
                self.state = ConnectionState::Connecting;
                vec![Action::OpenTransport]
            }
            (_, Input::TimerFired(_)) => Vec::new(),
        }
    }

    /// Decides what follows a close: suspend, reconnect, or park.
    fn after_close(&mut self, reason: CloseReason, mut actions: Vec<Action>) -> Vec<Action> {
        if reason == CloseReason::ServerUnavailable && !self.established {
            self.suspended = true;
            actions.push(Action::NotifySuspended);
            return actions;
        }

        let next = self.attempt.saturating_add(1);
        match self.backoff.delay(next) {
            Some(delay) => {
                self.attempt = next;
                let timer = TimerId(self.next_timer);
                self.next_timer += 1;
                self.timer = Some(timer);
                actions.push(Action::ScheduleReconnect {
                    timer,
                    attempt: next,
                    delay,
                });
            }
            None => {
                actions.push(Action::NotifyGaveUp {
                    attempts: self.attempt,
                });
            }
        }
        actions
    }

    fn cancel_timer(&mut self) -> Vec<Action> {
        match self.timer.take() {
            Some(_) => vec![Action::CancelReconnect],
            None => Vec::new(),
        }
    }
}
