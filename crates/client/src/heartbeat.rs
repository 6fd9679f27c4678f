// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat scheduling and dead-connection detection.
//!
//! While connected the channel sends a probe every `interval`. Any inbound
//! frame counts as proof of life. If nothing arrives for `2 * interval` the
//! connection is declared dead.
//!
//! The monitor owns no timers: the driver sleeps until
//! [`HeartbeatMonitor::next_deadline`] and then calls
//! [`HeartbeatMonitor::poll`].

use std::time::Duration;

use tokio::time::Instant;

use tether_core::constants::HEARTBEAT_DEAD_FACTOR;

/// What the driver should do after polling the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Nothing due yet.
    Idle,
    /// Send a heartbeat probe.
    Beat,
    /// Silence exceeded the dead threshold; close the transport.
    Dead,
}

/// Tracks heartbeat timing for one connection.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    interval: Duration,
    dead_after: Duration,
    last_inbound: Instant,
    last_beat: Instant,
    running: bool,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration) -> Self {
        let now = Instant::now();
        HeartbeatMonitor {
            interval,
            dead_after: interval.saturating_mul(HEARTBEAT_DEAD_FACTOR),
            last_inbound: now,
            last_beat: now,
            running: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Starts monitoring a freshly opened connection.
    pub fn start(&mut self, now: Instant) {
        self.last_inbound = now;
        self.last_beat = now;
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Records any inbound frame.
    pub fn record_inbound(&mut self, now: Instant) {
        self.last_inbound = now;
    }

    /// The next instant at which [`poll`](Self::poll) may return something
    /// other than `Idle`.
    pub fn next_deadline(&self) -> Option<Instant> {
        if !self.running {
            return None;
        }
        let beat = self.last_beat + self.interval;
        let dead = self.last_inbound + self.dead_after;
        Some(beat.min(dead))
    }

    /// Checks the deadlines at `now`. A `Beat` result marks the probe as sent.
    pub fn poll(&mut self, now: Instant) -> HeartbeatAction {
        if !self.running {
            return HeartbeatAction::Idle;
        }
        if now.saturating_duration_since(self.last_inbound) >= self.dead_after {
            return HeartbeatAction::Dead;
        }
        if now.saturating_duration_since(self.last_beat) >= self.interval {
            self.last_beat = now;
            return HeartbeatAction::Beat;
        }
        HeartbeatAction::Idle
    }
}
