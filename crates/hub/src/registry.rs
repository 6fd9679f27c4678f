// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection registry.
//!
//! Tracks live peers and dormant ones. A live peer has an open connection
//! and an outbound channel drained by its connection task. A dormant peer
//! is a recently closed or evicted id: it keeps a bounded queue of the
//! broadcasts it missed, delivered if the peer resumes that id.
//!
//! Both sets are concurrent maps. No map guard is held while sending, and
//! a failed send only evicts the peer it was addressed to.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use tether_core::{BoundedQueue, Envelope, Role};

struct Peer {
    role: Role,
    /// Distinguishes connections that reuse an id through resume.
    session: u64,
    last_seen: Instant,
    outbound: mpsc::Sender<String>,
    cancel: CancellationToken,
}

struct Dormant {
    role: Role,
    since: Instant,
    queue: BoundedQueue<Envelope>,
}

/// A newly registered connection.
pub struct Registration {
    pub id: String,
    pub session: u64,
    pub role: Role,
    /// True if a dormant id was resumed.
    pub resumed: bool,
    /// Broadcasts queued for this id while it was dormant.
    pub backlog: Vec<Envelope>,
    /// Live broadcasts addressed to this connection.
    pub outbound: mpsc::Receiver<String>,
    /// Cancelled when the hub evicts this connection or stops.
    pub cancel: CancellationToken,
}

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Live peers the message was handed to.
    pub delivered: usize,
    /// Dormant peers the message was queued for.
    pub queued: usize,
    /// Live peers evicted because the hand-off failed.
    pub evicted: Vec<String>,
}

/// Ids removed by one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Sweep {
    /// Live peers silent past the stale timeout, now dormant.
    pub evicted: Vec<String>,
    /// Dormant peers past their TTL, now forgotten.
    pub expired: Vec<String>,
}

/// Live connection counts by role.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RoleCounts {
    pub extension: usize,
    pub dashboard: usize,
    pub unknown: usize,
}

impl RoleCounts {
    pub fn total(&self) -> usize {
        self.extension + self.dashboard + self.unknown
    }
}

/// The hub's peer registry.
pub struct Registry {
    live: DashMap<String, Peer>,
    dormant: DashMap<String, Dormant>,
    next_id: AtomicU64,
    next_session: AtomicU64,
    peer_queue_capacity: usize,
    outbound_buffer: usize,
}

impl Registry {
    pub fn new(peer_queue_capacity: usize, outbound_buffer: usize) -> Self {
        Registry {
            live: DashMap::new(),
            dormant: DashMap::new(),
            next_id: AtomicU64::new(0),
            next_session: AtomicU64::new(0),
            peer_queue_capacity,
            outbound_buffer: outbound_buffer.max(1),
        }
    }

    /// Registers a new connection, resuming `resume` if it names a dormant
    /// peer. Otherwise a fresh `c{n}` id is assigned.
    pub fn register(
        &self,
        role: Role,
        resume: Option<&str>,
        parent: &CancellationToken,
        now: Instant,
    ) -> Registration {
        let session = self.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = mpsc::channel(self.outbound_buffer);
        let cancel = parent.child_token();
        let peer = || Peer {
            role,
            session,
            last_seen: now,
            outbound: tx.clone(),
            cancel: cancel.clone(),
        };

        if let Some(id) = resume.filter(|id| self.dormant.contains_key(*id)) {
            if let Entry::Vacant(slot) = self.live.entry(id.to_string()) {
                // Go live before draining so nothing broadcast in between is lost
                slot.insert(peer());
                if let Some((_, dormant)) = self.dormant.remove(id) {
                    let mut queue = dormant.queue;
                    return Registration {
                        id: id.to_string(),
                        session,
                        role,
                        resumed: true,
                        backlog: queue.drain(),
                        outbound: rx,
                        cancel,
                    };
                }
                // Expired between the check and the insert: keep the id anyway
                return Registration {
                    id: id.to_string(),
                    session,
                    role,
                    resumed: false,
                    backlog: Vec::new(),
                    outbound: rx,
                    cancel,
                };
            }
        }

        let id = self.fresh_id();
        self.live.insert(id.clone(), peer());
        Registration {
            id,
            session,
            role,
            resumed: false,
            backlog: Vec::new(),
            outbound: rx,
            cancel,
        }
    }

    fn fresh_id(&self) -> String {
        loop {
            let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            let id = format!("c{n}");
            // A resumed id from a previous hub run could collide
            if !self.live.contains_key(&id) && !self.dormant.contains_key(&id) {
                return id;
            }
        }
    }

    /// Records inbound traffic from a connection.
    pub fn touch(&self, id: &str, session: u64, now: Instant) {
        if let Some(mut peer) = self.live.get_mut(id) {
            if peer.session == session {
                peer.last_seen = now;
            }
        }
    }

    /// Moves a live connection to the dormant set and cancels its task.
    ///
    /// Returns false if the connection was already gone, for example
    /// because the sweeper evicted it first.
    pub fn retire(&self, id: &str, session: u64, now: Instant) -> bool {
        let Some((_, peer)) = self.live.remove_if(id, |_, p| p.session == session) else {
            return false;
        };
        peer.cancel.cancel();
        self.dormant.insert(
            id.to_string(),
            Dormant {
                role: peer.role,
                since: now,
                queue: BoundedQueue::new(self.peer_queue_capacity),
            },
        );
        true
    }

    /// Fans a serialized broadcast out to every peer except `sender`.
    pub fn broadcast(
        &self,
        sender: &str,
        envelope: &Envelope,
        frame: &str,
        now: Instant,
    ) -> Delivery {
        let mut delivery = Delivery::default();

        for mut dormant in self.dormant.iter_mut() {
            if dormant.key() != sender {
                dormant.queue.push(envelope.clone());
                delivery.queued += 1;
            }
        }

        let targets: Vec<(String, u64, mpsc::Sender<String>)> = self
            .live
            .iter()
            .filter(|entry| entry.key() != sender)
            .map(|entry| (entry.key().clone(), entry.session, entry.outbound.clone()))
            .collect();

        for (id, session, outbound) in targets {
            match outbound.try_send(frame.to_string()) {
                Ok(()) => delivery.delivered += 1,
                Err(e) => {
                    tracing::warn!(client_id = %id, error = %e, "broadcast hand-off failed, evicting peer");
                    if self.retire(&id, session, now) {
                        delivery.evicted.push(id);
                    }
                }
            }
        }

        delivery
    }

    /// Evicts silent live peers and forgets expired dormant ones.
    pub fn sweep(&self, now: Instant, stale_after: Duration, dormant_ttl: Duration) -> Sweep {
        let mut sweep = Sweep::default();

        let stale: Vec<(String, u64)> = self
            .live
            .iter()
            .filter(|entry| now.saturating_duration_since(entry.last_seen) > stale_after)
            .map(|entry| (entry.key().clone(), entry.session))
            .collect();
        for (id, session) in stale {
            if self.retire(&id, session, now) {
                sweep.evicted.push(id);
            }
        }

        let expired: Vec<String> = self
            .dormant
            .iter()
            .filter(|entry| now.saturating_duration_since(entry.since) > dormant_ttl)
            .map(|entry| entry.key().clone())
            .collect();
        for id in expired {
            if self
                .dormant
                .remove_if(&id, |_, d| now.saturating_duration_since(d.since) > dormant_ttl)
                .is_some()
            {
                sweep.expired.push(id);
            }
        }

        sweep
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.live.contains_key(id)
    }

    pub fn is_dormant(&self, id: &str) -> bool {
        self.dormant.contains_key(id)
    }

    /// Number of broadcasts queued for a dormant id.
    pub fn queued_for(&self, id: &str) -> Option<usize> {
        self.dormant.get(id).map(|d| d.queue.len())
    }

    /// Role of a live or dormant id.
    pub fn role_of(&self, id: &str) -> Option<Role> {
        self.live
            .get(id)
            .map(|p| p.role)
            .or_else(|| self.dormant.get(id).map(|d| d.role))
    }

    pub fn live_roles(&self) -> RoleCounts {
        let mut counts = RoleCounts::default();
        for peer in self.live.iter() {
            match peer.role {
                Role::Extension => counts.extension += 1,
                Role::Dashboard => counts.dashboard += 1,
                Role::Unknown => counts.unknown += 1,
            }
        }
        counts
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn dormant_count(&self) -> usize {
        self.dormant.len()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
