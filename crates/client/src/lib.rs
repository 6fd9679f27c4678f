// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tether-client: the peer side of the tether sync channel.
//!
//! Keeps one peer (the tracking agent or the dashboard) connected to the
//! hub across drops and restarts.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐  commands  ┌──────────────────────────┐     ┌───────────┐
//! │ ChannelHandle │───────────►│       SyncChannel        │────►│ Transport │──► hub
//! │  (producers)  │            │  ┌──────────────────┐    │◄────│  (trait)  │◄──
//! └───────────────┘            │  │ConnectionMachine │    │     └───────────┘
//!                              │  └──────────────────┘    │
//! ┌───────────────┐ callbacks  │  HeartbeatMonitor        │
//! │ChannelHandler │◄───────────│  OfflineQueue            │
//! │  (consumers)  │            │  ReplayFilter            │
//! └───────────────┘            └──────────────────────────┘
//! ```
//!
//! # Features
//!
//! - WebSocket connection to the hub with an injectable transport trait
//! - Explicit state machine: Disconnected, Connecting, Connected
//! - Exponential backoff reconnect, suspended when no hub is listening
//! - Heartbeat probes with dead-connection detection
//! - Bounded offline queue replayed in order on reconnect
//! - Cursor-based catch-up with duplicate suppression

mod channel;
mod config;
mod heartbeat;
mod machine;
mod queue;
mod replay;
mod transport;

pub use channel::{ChannelError, ChannelHandle, ChannelHandler, ChannelStatus, SyncChannel};
pub use config::ChannelConfig;
pub use heartbeat::{HeartbeatAction, HeartbeatMonitor};
pub use machine::{Action, CloseReason, ConnectionMachine, ConnectionState, Input, TimerId};
pub use queue::OfflineQueue;
pub use replay::ReplayFilter;
pub use transport::{Transport, TransportError, TransportResult, WebSocketTransport};

#[cfg(test)]
mod test_helpers;




#[cfg(test)]
mod machine_tests;



#[cfg(test)]
mod transport_tests;
