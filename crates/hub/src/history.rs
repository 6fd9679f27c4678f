// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Retained broadcasts and sync cursor resolution.
//!
//! A bounded in-memory ring of recent `event` and `preference` envelopes.
//! Catch-up is best-effort: once an event newer than a cursor has been
//! evicted, answers for that cursor are flagged incomplete.

use parking_lot::Mutex;

use tether_core::{BoundedQueue, Envelope};

/// Result of resolving a sync cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct CatchUp {
    /// Retained events newer than the cursor, ascending by timestamp.
    pub events: Vec<Envelope>,
    /// False if retention already dropped an event newer than the cursor.
    pub complete: bool,
}

#[derive(Debug)]
struct Ring {
    events: BoundedQueue<Envelope>,
    /// Newest timestamp among evicted events.
    evicted_max: Option<u64>,
}

/// The hub's retained-event ring.
#[derive(Debug)]
pub struct History {
    ring: Mutex<Ring>,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        History {
            ring: Mutex::new(Ring {
                events: BoundedQueue::new(capacity),
                evicted_max: None,
            }),
        }
    }

    /// Retains a broadcast, evicting the oldest if full.
    pub fn append(&self, envelope: Envelope) {
        let mut ring = self.ring.lock();
        if let Some(evicted) = ring.events.push(envelope) {
            let ts = evicted.timestamp();
            ring.evicted_max = Some(ring.evicted_max.map_or(ts, |max| max.max(ts)));
        }
    }

    /// Events with `timestamp > since`, oldest first, skipping those sent by
    /// any id in `exclude`.
    pub fn since(&self, since: u64, exclude: &[&str]) -> CatchUp {
        let (mut events, evicted_max) = {
            let ring = self.ring.lock();
            let events: Vec<Envelope> = ring
                .events
                .iter()
                .filter(|e| e.timestamp() > since)
                .filter(|e| !exclude.iter().any(|id| *id == e.client_id()))
                .cloned()
                .collect();
            (events, ring.evicted_max)
        };
        // Producer clocks differ, so arrival order is not timestamp order
        events.sort_by_key(Envelope::timestamp);
        CatchUp {
            events,
            complete: evicted_max.map_or(true, |max| max <= since),
        }
    }

    pub fn len(&self) -> usize {
        self.ring.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
