// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol constants shared by client and hub defaults.

/// Interval between client heartbeats.
pub const HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// A connection with no inbound traffic for this many intervals is dead.
pub const HEARTBEAT_DEAD_FACTOR: u32 = 2;

/// First reconnect delay.
pub const RECONNECT_BASE_MS: u64 = 1_000;

/// Multiplier applied per reconnect attempt.
pub const RECONNECT_FACTOR: u32 = 2;

/// Upper bound on any single reconnect delay.
pub const RECONNECT_CAP_MS: u64 = 30_000;

/// Reconnect attempts before the client parks in Disconnected.
pub const RECONNECT_MAX_ATTEMPTS: u32 = 5;

/// Offline queue capacity, per peer.
pub const QUEUE_CAPACITY: usize = 100;

/// Hub evicts connections silent for longer than this.
pub const STALE_TIMEOUT_MS: u64 = 60_000;

/// Retained-events ring capacity on the hub.
pub const HISTORY_CAPACITY: usize = 100;

/// Sender id stamped on hub-originated envelopes.
pub const HUB_SENDER: &str = "hub";

/// Default endpoint, shared by the hub bind address and the client URL.
pub const DEFAULT_PORT: u16 = 8787;
