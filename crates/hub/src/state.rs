// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Hub state shared by every connection task.

use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use tracing::warn;

use tether_core::{ClockSource, Envelope};

use crate::config::HubConfig;
use crate::history::{CatchUp, History};
use crate::registry::{Delivery, Registry, Sweep};

/// Point-in-time hub counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Live connections.
    pub connections: usize,
    pub extensions: usize,
    pub dashboards: usize,
    pub unknown: usize,
    /// Disconnected peers whose id and queue are still held.
    pub dormant: usize,
    /// Broadcasts retained for catch-up.
    pub retained: usize,
}

/// Shared hub state: registry, retained history and clock.
#[derive(Clone)]
pub(crate) struct HubState {
    inner: Arc<HubStateInner>,
}

struct HubStateInner {
    config: HubConfig,
    registry: Registry,
    history: History,
    clock: Arc<dyn ClockSource>,
}

impl HubState {
    pub fn new(config: HubConfig, clock: Arc<dyn ClockSource>) -> Self {
        let registry = Registry::new(config.peer_queue_capacity, config.outbound_buffer);
        let history = History::new(config.history_capacity);
        HubState {
            inner: Arc::new(HubStateInner {
                config,
                registry,
                history,
                clock,
            }),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn now_ms(&self) -> u64 {
        self.inner.clock.now_ms()
    }

    /// Retains a broadcast and fans it out to every peer except `sender`.
    pub fn broadcast(&self, sender: &str, envelope: Envelope) -> Delivery {
        let frame = match envelope.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, from = sender, "failed to encode broadcast");
                return Delivery::default();
            }
        };
        let delivery = self
            .inner
            .registry
            .broadcast(sender, &envelope, &frame, Instant::now());
        self.inner.history.append(envelope);
        delivery
    }

    /// Resolves a sync cursor, leaving out events sent under any of the
    /// requester's ids.
    pub fn catch_up(&self, since: u64, own_ids: &[&str]) -> CatchUp {
        self.inner.history.since(since, own_ids)
    }

    pub fn sweep(&self, now: Instant) -> Sweep {
        let config = &self.inner.config;
        self.inner
            .registry
            .sweep(now, config.stale_timeout(), config.dormant_ttl())
    }

    pub fn stats(&self) -> HubStats {
        let roles = self.inner.registry.live_roles();
        HubStats {
            connections: roles.total(),
            extensions: roles.extension,
            dashboards: roles.dashboard,
            unknown: roles.unknown,
            dormant: self.inner.registry.dormant_count(),
            retained: self.inner.history.len(),
        }
    }
}
