// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tether-hub: Relay hub for the tether sync channel.
//!
//! The hub accepts WebSocket peers, assigns each a `c{n}` client id, and
//! relays every `event` and `preference` to all other peers. It keeps a
//! bounded history for cursor-based catch-up, holds a bounded queue for
//! recently disconnected peers, and evicts connections that go silent.

mod classify;
mod config;
mod error;
mod history;
mod hub;
mod registry;
mod server;
mod state;

pub use classify::{classify_role, query_param, HandshakeMeta};
pub use config::HubConfig;
pub use error::{HubError, Result};
pub use history::{CatchUp, History};
pub use hub::Hub;
pub use registry::{Delivery, Registration, Registry, RoleCounts, Sweep};
pub use state::HubStats;
