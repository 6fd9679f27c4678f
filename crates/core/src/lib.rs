// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tether-core: Shared primitives for the tether sync channel
//!
//! This crate provides the wire envelope, the closed message taxonomy, and
//! the small building blocks (backoff policy, bounded queue, clock source)
//! used by both the `tether-client` channel and the `tether-hub` server.

pub mod backoff;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod role;

pub use backoff::Backoff;
pub use clock::{ClockSource, ManualClock, SystemClock};
pub use error::{Error, ProtocolError, Result};
pub use protocol::{Envelope, Heartbeat, Message, MessageType, SyncRequest, SyncResponse};
pub use queue::BoundedQueue;
pub use role::Role;
