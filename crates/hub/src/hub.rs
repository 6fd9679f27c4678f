// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Hub lifecycle: listener, sweeper and shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use tether_core::{ClockSource, SystemClock};

use crate::config::HubConfig;
use crate::error::{HubError, Result};
use crate::server;
use crate::state::{HubState, HubStats};

struct Running {
    addr: SocketAddr,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// A relay hub.
///
/// One hub can be started and stopped; stopping closes every connection.
pub struct Hub {
    state: HubState,
    running: Mutex<Option<Running>>,
}

impl Hub {
    /// Creates a hub that stamps its own messages with the system clock.
    pub fn new(config: HubConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a hub with an injected clock.
    pub fn with_clock(config: HubConfig, clock: Arc<dyn ClockSource>) -> Result<Self> {
        config.validate()?;
        Ok(Hub {
            state: HubState::new(config, clock),
            running: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &HubConfig {
        self.state.config()
    }

    /// Binds the configured address and starts serving.
    pub async fn start(&self) -> Result<SocketAddr> {
        if self.is_running() {
            return Err(HubError::AlreadyStarted);
        }
        let listener = TcpListener::bind(self.config().bind).await?;
        self.start_with_listener(listener)
    }

    /// Starts serving on an already bound listener.
    pub fn start_with_listener(&self, listener: TcpListener) -> Result<SocketAddr> {
        let addr = listener.local_addr()?;
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(HubError::AlreadyStarted);
        }

        let cancel = CancellationToken::new();
        let accept = tokio::spawn(server::accept_loop(
            listener,
            self.state.clone(),
            cancel.clone(),
        ));
        let sweeper = tokio::spawn(sweep_loop(self.state.clone(), cancel.clone()));

        info!(%addr, "hub listening");
        *running = Some(Running {
            addr,
            cancel,
            tasks: vec![accept, sweeper],
        });
        Ok(addr)
    }

    /// Stops accepting, closes every connection and waits for the
    /// background tasks to finish.
    pub async fn stop(&self) -> Result<()> {
        let Some(running) = self.running.lock().take() else {
            return Err(HubError::NotStarted);
        };
        running.cancel.cancel();
        for task in running.tasks {
            let _ = task.await;
        }
        info!(addr = %running.addr, "hub stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Address the hub is listening on, if started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|r| r.addr)
    }

    pub fn stats(&self) -> HubStats {
        self.state.stats()
    }
}

impl Drop for Hub {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}

async fn sweep_loop(state: HubState, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(state.config().sweep_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let sweep = state.sweep(Instant::now());
                for id in &sweep.evicted {
                    info!(client_id = %id, "evicted stale connection");
                }
                for id in &sweep.expired {
                    debug!(client_id = %id, "forgot dormant peer");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
