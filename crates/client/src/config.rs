// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Channel configuration.
//!
//! Every field has a serde default equal to the protocol constant, so an
//! empty or partial `channel.toml` is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tether_core::constants::{
    DEFAULT_PORT, HEARTBEAT_INTERVAL_MS, QUEUE_CAPACITY, RECONNECT_BASE_MS, RECONNECT_CAP_MS,
    RECONNECT_FACTOR, RECONNECT_MAX_ATTEMPTS,
};
use tether_core::{Backoff, Role};

use crate::channel::ChannelError;

/// Configuration for one [`SyncChannel`](crate::SyncChannel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Hub WebSocket URL.
    #[serde(default = "default_url")]
    pub url: String,
    /// Role hint sent to the hub as the `role` query parameter.
    #[serde(default)]
    pub role: Role,
    /// Heartbeat probe interval in milliseconds (default: 30000).
    /// The connection is declared dead after twice this long without traffic.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Delay before the first reconnect attempt (default: 1000).
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    /// Growth factor between attempts (default: 2).
    #[serde(default = "default_reconnect_factor")]
    pub reconnect_factor: u32,
    /// Upper bound on any single delay (default: 30000).
    #[serde(default = "default_reconnect_cap_ms")]
    pub reconnect_cap_ms: u64,
    /// Automatic attempts before parking (default: 5).
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
    /// Offline queue capacity (default: 100).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Max time to wait for a transport to open (default: 10000).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Send a `sync_request` after each reconnect (default: true).
    #[serde(default = "default_true")]
    pub sync_on_reconnect: bool,
    /// Number of recent broadcasts remembered for de-duplication (default: 256).
    #[serde(default = "default_dedupe_window")]
    pub dedupe_window: usize,
}

fn default_url() -> String {
    format!("ws://127.0.0.1:{DEFAULT_PORT}")
}

fn default_heartbeat_interval_ms() -> u64 {
    HEARTBEAT_INTERVAL_MS
}

fn default_reconnect_base_ms() -> u64 {
    RECONNECT_BASE_MS
}

fn default_reconnect_factor() -> u32 {
    RECONNECT_FACTOR
}

fn default_reconnect_cap_ms() -> u64 {
    RECONNECT_CAP_MS
}

fn default_reconnect_max_attempts() -> u32 {
    RECONNECT_MAX_ATTEMPTS
}

fn default_queue_capacity() -> usize {
    QUEUE_CAPACITY
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_dedupe_window() -> usize {
    256
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            url: default_url(),
            role: Role::Unknown,
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_factor: default_reconnect_factor(),
            reconnect_cap_ms: default_reconnect_cap_ms(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            queue_capacity: default_queue_capacity(),
            connect_timeout_ms: default_connect_timeout_ms(),
            sync_on_reconnect: default_true(),
            dedupe_window: default_dedupe_window(),
        }
    }
}

impl ChannelConfig {
    /// Config for `url` with every other field defaulted.
    pub fn new(url: impl Into<String>) -> Self {
        ChannelConfig {
            url: url.into(),
            ..ChannelConfig::default()
        }
    }

    /// Sets the role hint.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Loads and validates a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ChannelError> {
        let config: ChannelConfig = tether_core::config::load_toml(path)
            .map_err(|e| ChannelError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values a channel cannot run with.
    pub fn validate(&self) -> Result<(), ChannelError> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ChannelError::Config(format!(
                "url must start with ws:// or wss://, got '{}'",
                self.url
            )));
        }
        let checks = [
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("reconnect_base_ms", self.reconnect_base_ms),
            ("reconnect_factor", u64::from(self.reconnect_factor)),
            ("connect_timeout_ms", self.connect_timeout_ms),
        ];
        for (name, value) in checks {
            tether_core::config::require_nonzero(name, value)
                .map_err(|e| ChannelError::Config(e.to_string()))?;
        }
        if self.reconnect_cap_ms < self.reconnect_base_ms {
            return Err(ChannelError::Config(
                "reconnect_cap_ms must not be less than reconnect_base_ms".to_string(),
            ));
        }
        Ok(())
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            self.reconnect_base_ms,
            self.reconnect_factor,
            self.reconnect_cap_ms,
            self.reconnect_max_attempts,
        )
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// The URL actually dialed: the configured URL plus the `role` hint and,
    /// when reconnecting, the previous id as `resume`.
    pub fn endpoint(&self, resume: Option<&str>) -> String {
        let sep = if self.url.contains('?') { '&' } else { '?' };
        let mut url = format!("{}{}role={}", self.url, sep, self.role);
        if let Some(id) = resume {
            url.push_str("&resume=");
            url.push_str(id);
        }
        url
    }
}
