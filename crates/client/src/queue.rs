// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline queue for outbound envelopes produced while disconnected.
//!
//! Bounded and in-memory. When full, the oldest envelope is evicted to make
//! room. On reconnect the queue is flushed to the hub in arrival order.

use tether_core::{BoundedQueue, Envelope};

/// Outbound envelopes waiting for a connection.
#[derive(Debug)]
pub struct OfflineQueue {
    inner: BoundedQueue<Envelope>,
}

impl OfflineQueue {
    pub fn new(capacity: usize) -> Self {
        OfflineQueue {
            inner: BoundedQueue::new(capacity),
        }
    }

    /// Enqueue an envelope for later sending.
    ///
    /// Returns true if an older envelope was evicted to make room.
    pub fn enqueue(&mut self, envelope: Envelope) -> bool {
        match self.inner.push(envelope) {
            Some(evicted) => {
                tracing::debug!(
                    kind = %evicted.kind(),
                    timestamp = evicted.timestamp(),
                    "offline queue full, dropped oldest envelope"
                );
                true
            }
            None => false,
        }
    }

    /// Remove and return the oldest envelope.
    pub fn pop(&mut self) -> Option<Envelope> {
        self.inner.pop_front()
    }

    /// Return an envelope whose send failed to the head of the queue.
    pub fn requeue(&mut self, envelope: Envelope) {
        self.inner.push_front(envelope);
    }

    /// Remove all queued envelopes, oldest first.
    pub fn drain(&mut self) -> Vec<Envelope> {
        self.inner.drain()
    }

    /// Read the queued envelopes without removing them.
    pub fn peek_all(&self) -> impl Iterator<Item = &Envelope> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Number of envelopes evicted since creation.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped()
    }
}
