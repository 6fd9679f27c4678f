// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Duplicate suppression for inbound broadcasts.
//!
//! A reconnecting client can see the same broadcast twice: once from its
//! dormant queue and again inside a catch-up `sync_response`. The filter
//! remembers a bounded window of recent keys and rejects repeats.

use std::collections::{HashSet, VecDeque};

use tether_core::{Envelope, MessageType};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ReplayKey {
    Sequenced {
        sender: String,
        sequence: u64,
        timestamp: u64,
    },
    Content {
        kind: MessageType,
        timestamp: u64,
        payload: String,
    },
}

impl ReplayKey {
    fn of(envelope: &Envelope) -> Self {
        match envelope.sequence_id() {
            Some(sequence) => ReplayKey::Sequenced {
                sender: envelope.client_id().to_string(),
                sequence,
                // ids and sequences both restart when the hub or a peer does
                timestamp: envelope.timestamp(),
            },
            // serde_json maps keep keys sorted, so this is canonical
            None => ReplayKey::Content {
                kind: envelope.kind(),
                timestamp: envelope.timestamp(),
                payload: envelope.data().to_string(),
            },
        }
    }
}

/// Remembers the last `window` broadcasts seen.
#[derive(Debug)]
pub struct ReplayFilter {
    window: usize,
    seen: HashSet<ReplayKey>,
    order: VecDeque<ReplayKey>,
}

impl ReplayFilter {
    pub fn new(window: usize) -> Self {
        ReplayFilter {
            window,
            seen: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    /// Returns true the first time an envelope is seen within the window.
    ///
    /// A window of zero admits everything.
    pub fn admit(&mut self, envelope: &Envelope) -> bool {
        if self.window == 0 {
            return true;
        }
        let key = ReplayKey::of(envelope);
        if self.seen.contains(&key) {
            return false;
        }
        if self.order.len() >= self.window {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(key.clone());
        self.order.push_back(key);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
