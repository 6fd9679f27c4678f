// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the transport module.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use super::test_helpers::make_event;
use super::transport::{Transport, TransportError, TransportFuture};
use tether_core::Envelope;

/// How a scripted connect attempt resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockConnect {
    Ok,
    /// Nothing listening.
    Refused,
    /// Any other failure.
    Fail,
    /// Never resolves.
    Hang,
}

enum Frame {
    Text(String),
    Close,
}

#[derive(Default)]
struct MockState {
    connected: bool,
    /// Frames that will be returned by recv().
    incoming: VecDeque<Frame>,
    /// Envelopes that were sent via send().
    outgoing: Vec<Envelope>,
    /// Outcomes for upcoming connects; `Ok` once exhausted.
    connect_script: VecDeque<MockConnect>,
    /// Fixed outcome overriding the script.
    connect_override: Option<MockConnect>,
    /// (time, url) of each connect attempt.
    attempts: Vec<(Instant, String)>,
    send_should_fail: bool,
    disconnect_should_fail: bool,
}

/// Mock transport for testing without real sockets.
///
/// Clones share state, so a test keeps one clone to script and inspect the
/// transport after handing the other to a channel.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    inbox: Arc<Notify>,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport::default()
    }

    /// Add a text frame that will be returned by recv().
    pub fn queue_raw(&self, text: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .incoming
            .push_back(Frame::Text(text.into()));
        self.inbox.notify_one();
    }

    /// Add an envelope that will be returned by recv().
    pub fn queue_incoming(&self, envelope: &Envelope) {
        self.queue_raw(envelope.to_json().unwrap());
    }

    /// Simulate the hub closing the socket.
    pub fn close_remote(&self) {
        self.state.lock().unwrap().incoming.push_back(Frame::Close);
        self.inbox.notify_one();
    }

    /// Get all envelopes that were sent.
    pub fn get_outgoing(&self) -> Vec<Envelope> {
        self.state.lock().unwrap().outgoing.clone()
    }

    /// Timestamps of the sent envelopes of one type.
    pub fn sent_timestamps(&self, kind: tether_core::MessageType) -> Vec<u64> {
        self.get_outgoing()
            .iter()
            .filter(|e| e.kind() == kind)
            .map(|e| e.timestamp())
            .collect()
    }

    /// Set whether every connect should fail with `outcome`.
    pub fn set_connect_fail(&self, outcome: Option<MockConnect>) {
        self.state.lock().unwrap().connect_override = outcome;
    }

    /// Script the outcomes of the next connects.
    pub fn script_connects(&self, outcomes: &[MockConnect]) {
        self.state
            .lock()
            .unwrap()
            .connect_script
            .extend(outcomes.iter().copied());
    }

    pub fn set_send_fail(&self, fail: bool) {
        self.state.lock().unwrap().send_should_fail = fail;
    }

    /// Make teardown report an error; the socket still counts as closed.
    pub fn set_disconnect_fail(&self, fail: bool) {
        self.state.lock().unwrap().disconnect_should_fail = fail;
    }

    /// (time, url) of every connect attempt so far.
    pub fn connect_attempts(&self) -> Vec<(Instant, String)> {
        self.state.lock().unwrap().attempts.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().attempts.len()
    }

    pub fn connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, url: &str) -> TransportFuture<'_, ()> {
        let outcome = {
            let mut state = self.state.lock().unwrap();
            state.attempts.push((Instant::now(), url.to_string()));
            match state.connect_override {
                Some(outcome) => outcome,
                None => state.connect_script.pop_front().unwrap_or(MockConnect::Ok),
            }
        };
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            match outcome {
                MockConnect::Ok => {
                    state.lock().unwrap().connected = true;
                    Ok(())
                }
                MockConnect::Refused => {
                    Err(TransportError::ServerUnavailable("connection refused".into()))
                }
                MockConnect::Fail => Err(TransportError::ConnectionFailed("mock failure".into())),
                MockConnect::Hang => std::future::pending().await,
            }
        })
    }

    fn disconnect(&mut self) -> TransportFuture<'_, ()> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let mut state = state.lock().unwrap();
            state.connected = false;
            if state.disconnect_should_fail {
                return Err(TransportError::ConnectionFailed("mock teardown failure".into()));
            }
            Ok(())
        })
    }

    fn send(&mut self, msg: Envelope) -> TransportFuture<'_, ()> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let mut state = state.lock().unwrap();
            if !state.connected {
                return Err(TransportError::ConnectionClosed);
            }
            if state.send_should_fail {
                state.connected = false;
                return Err(TransportError::SendFailed("mock failure".into()));
            }
            state.outgoing.push(msg);
            Ok(())
        })
    }

    fn recv(&mut self) -> TransportFuture<'_, Option<String>> {
        let state = Arc::clone(&self.state);
        let inbox = Arc::clone(&self.inbox);
        Box::pin(async move {
            loop {
                {
                    let mut state = state.lock().unwrap();
                    if !state.connected {
                        return Err(TransportError::ConnectionClosed);
                    }
                    match state.incoming.pop_front() {
                        Some(Frame::Text(text)) => return Ok(Some(text)),
                        Some(Frame::Close) => {
                            state.connected = false;
                            return Ok(None);
                        }
                        None => {}
                    }
                }
                inbox.notified().await;
            }
        })
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }
}

#[tokio::test]
async fn test_mock_transport_connect() {
    let mut transport = MockTransport::new();
    assert!(!transport.is_connected());

    transport.connect("ws://localhost:1234").await.unwrap();
    assert!(transport.is_connected());
    assert_eq!(transport.connect_attempts()[0].1, "ws://localhost:1234");

    transport.disconnect().await.unwrap();
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_mock_transport_send_recv() {
    let mut transport = MockTransport::new();
    transport.connect("ws://localhost:1234").await.unwrap();

    transport.send(make_event(42)).await.unwrap();
    let outgoing = transport.get_outgoing();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].timestamp(), 42);

    transport.queue_incoming(&make_event(7));
    let received = transport.recv().await.unwrap().unwrap();
    assert_eq!(Envelope::from_json(&received).unwrap().timestamp(), 7);

    // Nothing queued: recv waits
    let pending = tokio::time::timeout(Duration::from_millis(10), transport.recv()).await;
    assert!(pending.is_err());

    transport.close_remote();
    assert!(transport.recv().await.unwrap().is_none());
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_mock_transport_scripted_connects() {
    let mut transport = MockTransport::new();
    transport.script_connects(&[MockConnect::Refused, MockConnect::Fail]);

    let err = transport.connect("ws://x").await.unwrap_err();
    assert!(matches!(err, TransportError::ServerUnavailable(_)));
    let err = transport.connect("ws://x").await.unwrap_err();
    assert!(matches!(err, TransportError::ConnectionFailed(_)));
    transport.connect("ws://x").await.unwrap();
    assert_eq!(transport.connect_count(), 3);
}

#[tokio::test]
async fn test_mock_transport_send_when_closed() {
    let mut transport = MockTransport::new();
    let err = transport.send(make_event(1)).await.unwrap_err();
    assert!(matches!(err, TransportError::ConnectionClosed));
}

#[tokio::test]
async fn test_websocket_transport_refused_is_server_unavailable() {
    use super::transport::WebSocketTransport;

    // Bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut transport = WebSocketTransport::new();
    let err = transport
        .connect(&format!("ws://{addr}"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, TransportError::ServerUnavailable(_)),
        "got {err:?}"
    );
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_websocket_transport_send_without_connect() {
    use super::transport::WebSocketTransport;

    let mut transport = WebSocketTransport::new();
    let err = transport.send(make_event(1)).await.unwrap_err();
    assert!(matches!(err, TransportError::ConnectionClosed));
}
