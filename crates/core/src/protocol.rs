// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket protocol messages shared by the client channel and the hub.
//!
//! Every frame is one JSON [`Envelope`]:
//!
//! ```json
//! {"type":"event","timestamp":1000,"clientId":"c1","data":{},"sequenceId":7}
//! ```
//!
//! The `type` field is a closed set ([`MessageType`]). Anything outside it,
//! or a known type whose `data` has the wrong shape, is a [`ProtocolError`]
//! for that single frame. Callers dispatch on the typed [`Message`] returned
//! by [`Envelope::message`], which is matched exhaustively.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// The closed set of message types carried on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Caller-defined activity record, broadcast to other peers.
    Event,
    /// Caller-defined settings change, broadcast to other peers.
    Preference,
    /// Liveness probe (client) or acknowledgment (hub).
    Heartbeat,
    /// Catch-up request carrying a cursor.
    SyncRequest,
    /// Handshake or catch-up result.
    SyncResponse,
}

impl MessageType {
    /// All message types, in wire order.
    pub const ALL: [MessageType; 5] = [
        MessageType::Event,
        MessageType::Preference,
        MessageType::Heartbeat,
        MessageType::SyncRequest,
        MessageType::SyncResponse,
    ];

    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Event => "event",
            MessageType::Preference => "preference",
            MessageType::Heartbeat => "heartbeat",
            MessageType::SyncRequest => "sync_request",
            MessageType::SyncResponse => "sync_response",
        }
    }

    /// Returns true for types that are fanned out to other peers and
    /// retained for catch-up.
    pub fn is_broadcast(&self) -> bool {
        match self {
            MessageType::Event | MessageType::Preference => true,
            MessageType::Heartbeat | MessageType::SyncRequest | MessageType::SyncResponse => false,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown message type '{s}'"))
    }
}

/// Body of a heartbeat.
///
/// Clients send it empty; the hub acknowledges with its own clock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Heartbeat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_time: Option<u64>,
}

impl Heartbeat {
    /// A client-side probe.
    pub fn probe() -> Self {
        Heartbeat { server_time: None }
    }

    /// A hub acknowledgment stamped with the hub's time.
    pub fn ack(server_time: u64) -> Self {
        Heartbeat {
            server_time: Some(server_time),
        }
    }
}

/// Body of a sync request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Return retained events with `timestamp > since`.
    pub since: u64,
}

/// Body of a sync response.
///
/// The handshake response carries the assigned `client_id`; a catch-up
/// response carries `events`. `complete` is false when retention already
/// dropped events newer than the requested cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub resumed: bool,
    #[serde(default)]
    pub events: Vec<Envelope>,
    #[serde(default = "default_true")]
    pub complete: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn default_true() -> bool {
    true
}

impl SyncResponse {
    /// Handshake sent right after a connection is registered.
    pub fn handshake(client_id: impl Into<String>, resumed: bool) -> Self {
        SyncResponse {
            client_id: Some(client_id.into()),
            resumed,
            events: Vec::new(),
            complete: true,
        }
    }

    /// Catch-up result for a cursor.
    pub fn catch_up(events: Vec<Envelope>, complete: bool) -> Self {
        SyncResponse {
            client_id: None,
            resumed: false,
            events,
            complete,
        }
    }
}

/// A decoded message body, one variant per [`MessageType`].
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Event(Value),
    Preference(Value),
    Heartbeat(Heartbeat),
    SyncRequest(SyncRequest),
    SyncResponse(SyncResponse),
}

impl Message {
    /// Returns the wire type of this body.
    pub fn kind(&self) -> MessageType {
        match self {
            Message::Event(_) => MessageType::Event,
            Message::Preference(_) => MessageType::Preference,
            Message::Heartbeat(_) => MessageType::Heartbeat,
            Message::SyncRequest(_) => MessageType::SyncRequest,
            Message::SyncResponse(_) => MessageType::SyncResponse,
        }
    }

    fn to_data(&self) -> Result<Value, ProtocolError> {
        let encoded = match self {
            Message::Event(payload) | Message::Preference(payload) => Ok(payload.clone()),
            Message::Heartbeat(body) => serde_json::to_value(body),
            Message::SyncRequest(body) => serde_json::to_value(body),
            Message::SyncResponse(body) => serde_json::to_value(body),
        };
        encoded.map_err(|source| ProtocolError::Encode {
            kind: self.kind(),
            source,
        })
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// One frame on the wire.
///
/// Envelopes are immutable once built: fields are read through accessors,
/// and re-sending under a different sender builds a new envelope with
/// [`Envelope::resend_as`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    kind: MessageType,
    timestamp: u64,
    #[serde(rename = "clientId")]
    client_id: String,
    #[serde(default = "empty_object")]
    data: Value,
    #[serde(rename = "sequenceId", default, skip_serializing_if = "Option::is_none")]
    sequence_id: Option<u64>,
}

impl Envelope {
    /// Builds an envelope from its raw parts.
    pub fn new(kind: MessageType, timestamp: u64, client_id: impl Into<String>, data: Value) -> Self {
        Envelope {
            kind,
            timestamp,
            client_id: client_id.into(),
            data,
            sequence_id: None,
        }
    }

    /// Encodes a typed message body into an envelope.
    pub fn encode(
        message: &Message,
        timestamp: u64,
        client_id: impl Into<String>,
    ) -> Result<Self, ProtocolError> {
        Ok(Envelope::new(
            message.kind(),
            timestamp,
            client_id,
            message.to_data()?,
        ))
    }

    /// Creates an event envelope.
    pub fn event(timestamp: u64, client_id: impl Into<String>, payload: Value) -> Self {
        Envelope::new(MessageType::Event, timestamp, client_id, payload)
    }

    /// Creates a preference envelope.
    pub fn preference(timestamp: u64, client_id: impl Into<String>, payload: Value) -> Self {
        Envelope::new(MessageType::Preference, timestamp, client_id, payload)
    }

    /// Returns a copy carrying the given advisory sequence id.
    pub fn with_sequence(mut self, sequence_id: u64) -> Self {
        self.sequence_id = Some(sequence_id);
        self
    }

    /// Builds a new envelope for `client_id` reusing this payload, timestamp
    /// and sequence id.
    pub fn resend_as(&self, client_id: impl Into<String>) -> Self {
        Envelope {
            kind: self.kind,
            timestamp: self.timestamp,
            client_id: client_id.into(),
            data: self.data.clone(),
            sequence_id: self.sequence_id,
        }
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn sequence_id(&self) -> Option<u64> {
        self.sequence_id
    }

    /// Decodes `data` according to `type`.
    pub fn message(&self) -> Result<Message, ProtocolError> {
        let invalid = |e: serde_json::Error| ProtocolError::InvalidBody {
            kind: self.kind,
            reason: e.to_string(),
        };
        match self.kind {
            MessageType::Event => Ok(Message::Event(self.data.clone())),
            MessageType::Preference => Ok(Message::Preference(self.data.clone())),
            MessageType::Heartbeat => serde_json::from_value(self.data.clone())
                .map(Message::Heartbeat)
                .map_err(invalid),
            MessageType::SyncRequest => serde_json::from_value(self.data.clone())
                .map(Message::SyncRequest)
                .map_err(invalid),
            MessageType::SyncResponse => serde_json::from_value(self.data.clone())
                .map(Message::SyncResponse)
                .map_err(invalid),
        }
    }

    /// Serializes the envelope to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses one frame. Unknown types and non-object frames are rejected.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(s).map_err(ProtocolError::Malformed)
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
