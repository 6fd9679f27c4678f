// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for client tests.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use serde_json::json;
use tether_core::{Envelope, Message, SyncResponse};

use crate::channel::{ChannelError, ChannelHandler};

/// Create an event envelope with the given timestamp.
pub fn make_event(timestamp: u64) -> Envelope {
    make_event_from(timestamp, "peer")
}

/// Create an event envelope with the given timestamp and sender.
pub fn make_event_from(timestamp: u64, sender: &str) -> Envelope {
    Envelope::event(timestamp, sender, json!({ "n": timestamp }))
}

/// Raw JSON of the hub handshake assigning `client_id`.
pub fn handshake_frame(client_id: &str) -> String {
    let message = Message::SyncResponse(SyncResponse::handshake(client_id, false));
    Envelope::encode(&message, 0, "hub").unwrap().to_json().unwrap()
}

/// Raw JSON of a catch-up response carrying `events`.
pub fn catch_up_frame(events: Vec<Envelope>, complete: bool) -> String {
    let message = Message::SyncResponse(SyncResponse::catch_up(events, complete));
    Envelope::encode(&message, 0, "hub").unwrap().to_json().unwrap()
}

/// One callback observed by [`RecordingHandler`].
#[derive(Debug, Clone, PartialEq)]
pub enum Observed {
    Message(Envelope),
    Connect,
    Disconnect,
    Error(String),
}

/// Handler that records every callback in order.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    log: Arc<Mutex<Vec<Observed>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        RecordingHandler::default()
    }

    pub fn observed(&self) -> Vec<Observed> {
        self.log.lock().unwrap().clone()
    }

    /// Timestamps of the messages delivered so far.
    pub fn message_timestamps(&self) -> Vec<u64> {
        self.observed()
            .into_iter()
            .filter_map(|o| match o {
                Observed::Message(env) => Some(env.timestamp()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Observed) -> usize {
        self.observed().iter().filter(|o| *o == wanted).count()
    }

    pub fn errors(&self) -> Vec<String> {
        self.observed()
            .into_iter()
            .filter_map(|o| match o {
                Observed::Error(e) => Some(e),
                _ => None,
            })
            .collect()
    }
}

impl ChannelHandler for RecordingHandler {
    fn on_message(&mut self, envelope: &Envelope) {
        self.log
            .lock()
            .unwrap()
            .push(Observed::Message(envelope.clone()));
    }

    fn on_connect(&mut self) {
        self.log.lock().unwrap().push(Observed::Connect);
    }

    fn on_disconnect(&mut self) {
        self.log.lock().unwrap().push(Observed::Disconnect);
    }

    fn on_error(&mut self, error: &ChannelError) {
        self.log
            .lock()
            .unwrap()
            .push(Observed::Error(error.to_string()));
    }
}
