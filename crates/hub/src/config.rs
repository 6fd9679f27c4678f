// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Hub configuration.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tether_core::constants::{DEFAULT_PORT, HISTORY_CAPACITY, QUEUE_CAPACITY, STALE_TIMEOUT_MS};

use crate::error::{HubError, Result};

/// Configuration for a [`Hub`](crate::Hub).
///
/// Loaded from TOML; missing keys take the protocol defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Address to listen on (default: 127.0.0.1:8787).
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Evict a connection silent for longer than this (default: 60000).
    #[serde(default = "default_stale_timeout_ms")]
    pub stale_timeout_ms: u64,
    /// How often the sweeper runs (default: 5000).
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Broadcasts retained for catch-up (default: 100).
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Broadcasts held for each disconnected peer (default: 100).
    #[serde(default = "default_peer_queue_capacity")]
    pub peer_queue_capacity: usize,
    /// How long a disconnected peer's id and queue are kept (default: 600000).
    #[serde(default = "default_dormant_ttl_ms")]
    pub dormant_ttl_ms: u64,
    /// Per-connection outbound buffer; a peer that falls this far behind is
    /// evicted (default: 256).
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Time a new socket gets to finish its upgrade or health request
    /// (default: 10000).
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT))
}

fn default_stale_timeout_ms() -> u64 {
    STALE_TIMEOUT_MS
}

fn default_sweep_interval_ms() -> u64 {
    5_000
}

fn default_history_capacity() -> usize {
    HISTORY_CAPACITY
}

fn default_peer_queue_capacity() -> usize {
    QUEUE_CAPACITY
}

fn default_dormant_ttl_ms() -> u64 {
    600_000
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            bind: default_bind(),
            stale_timeout_ms: default_stale_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            history_capacity: default_history_capacity(),
            peer_queue_capacity: default_peer_queue_capacity(),
            dormant_ttl_ms: default_dormant_ttl_ms(),
            outbound_buffer: default_outbound_buffer(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
        }
    }
}

impl HubConfig {
    /// Loads and validates a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let config: HubConfig = tether_core::config::load_toml(path)
            .map_err(|e| HubError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values a hub cannot run with.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("stale_timeout_ms", self.stale_timeout_ms),
            ("sweep_interval_ms", self.sweep_interval_ms),
            ("outbound_buffer", self.outbound_buffer as u64),
            ("handshake_timeout_ms", self.handshake_timeout_ms),
        ];
        for (name, value) in checks {
            tether_core::config::require_nonzero(name, value)?;
        }
        Ok(())
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_millis(self.stale_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn dormant_ttl(&self) -> Duration {
        Duration::from_millis(self.dormant_ttl_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
