// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket server implementation.
//!
//! Accepts connections, registers peers, routes their messages and drains
//! their outbound broadcasts. A plain `GET /health` on the same port is
//! answered with a JSON status document instead of an upgrade.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tether_core::constants::HUB_SENDER;
use tether_core::{Envelope, Heartbeat, Message, Role, SyncResponse};

use crate::classify::HandshakeMeta;
use crate::error::Result;
use crate::state::HubState;

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;
type WsStream = SplitStream<WebSocketStream<TcpStream>>;
type Upgraded = (WebSocketStream<TcpStream>, HandshakeMeta);

const HEALTH_REQUEST: &[u8] = b"GET /health";

/// Upper bound on a health probe's request head.
const MAX_PROBE_HEAD: usize = 8 * 1024;

/// A registered connection, as seen by message handling.
#[derive(Debug, Clone)]
pub(crate) struct Connection {
    pub id: String,
    pub session: u64,
    pub role: Role,
    /// Id the peer asked to resume when the hub assigned a new one instead.
    pub previous: Option<String>,
}

impl Connection {
    /// Ids whose broadcasts this peer sent itself.
    fn own_ids(&self) -> Vec<&str> {
        std::iter::once(self.id.as_str())
            .chain(self.previous.as_deref())
            .collect()
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    connections: usize,
    dormant: usize,
    retained: usize,
}

/// Accepts connections until `cancel` fires.
pub(crate) async fn accept_loop(listener: TcpListener, state: HubState, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer_addr)) => {
                        let state = state.clone();
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer_addr, state, cancel).await {
                                error!("Connection error from {}: {}", peer_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        // Usually fd exhaustion; back off instead of spinning
                        warn!(error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }
    debug!("accept loop stopped");
}

/// Handle a single connection: health probe or WebSocket peer.
///
/// The opening phase is bounded by the handshake timeout and ends when the
/// hub stops.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: HubState,
    hub_cancel: CancellationToken,
) -> Result<()> {
    let handshake_timeout = state.config().handshake_timeout();
    let opened = tokio::select! {
        _ = hub_cancel.cancelled() => {
            debug!(%peer_addr, "hub stopped before handshake completed");
            return Ok(());
        }
        opened = tokio::time::timeout(handshake_timeout, open(stream, &state)) => opened,
    };
    let (ws_stream, meta) = match opened {
        Ok(Ok(Some(upgraded))) => upgraded,
        Ok(Ok(None)) => return Ok(()),
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            warn!(
                %peer_addr,
                timeout_ms = handshake_timeout.as_millis() as u64,
                "handshake timed out"
            );
            return Ok(());
        }
    };

    let role = meta.role();
    let registration =
        state
            .registry()
            .register(role, meta.resume.as_deref(), &hub_cancel, Instant::now());
    info!(
        client_id = %registration.id,
        %role,
        %peer_addr,
        resumed = registration.resumed,
        backlog = registration.backlog.len(),
        "peer connected"
    );

    let previous = meta
        .resume
        .filter(|resume| !registration.resumed && *resume != registration.id);
    let conn = Connection {
        id: registration.id,
        session: registration.session,
        role,
        previous,
    };
    let mut outbound = registration.outbound;
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    let result = run_session(
        &conn,
        &state,
        &mut ws_sink,
        &mut ws_stream,
        registration.resumed,
        registration.backlog,
        &mut outbound,
        &registration.cancel,
    )
    .await;

    if state.registry().retire(&conn.id, conn.session, Instant::now()) {
        info!(client_id = %conn.id, role = %conn.role, %peer_addr, "peer disconnected");
    } else {
        debug!(client_id = %conn.id, "connection already retired");
    }
    result
}

/// Answers a health probe, or upgrades the socket and returns the
/// handshake metadata. `None` means the socket was a health probe.
async fn open(stream: TcpStream, state: &HubState) -> Result<Option<Upgraded>> {
    if is_health_probe(&stream).await? {
        serve_health(stream, state).await?;
        return Ok(None);
    }

    let mut meta = HandshakeMeta::default();
    let callback = |request: &Request, response: Response| -> std::result::Result<Response, ErrorResponse> {
        meta = HandshakeMeta::from_request(request);
        Ok(response)
    };
    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    Ok(Some((ws_stream, meta)))
}

#[allow(clippy::too_many_arguments)]
async fn run_session(
    conn: &Connection,
    state: &HubState,
    ws_sink: &mut WsSink,
    ws_stream: &mut WsStream,
    resumed: bool,
    backlog: Vec<Envelope>,
    outbound: &mut mpsc::Receiver<String>,
    cancel: &CancellationToken,
) -> Result<()> {
    let handshake = Message::SyncResponse(SyncResponse::handshake(conn.id.as_str(), resumed));
    if let Some(frame) = hub_frame(state, &handshake) {
        ws_sink.send(WsMessage::Text(frame.into())).await?;
    }
    for envelope in backlog {
        match envelope.to_json() {
            Ok(frame) => ws_sink.send(WsMessage::Text(frame.into())).await?,
            Err(e) => warn!(client_id = %conn.id, error = %e, "dropping unencodable backlog entry"),
        }
    }

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!(client_id = %conn.id, "closing connection");
                let _ = ws_sink.close().await;
                break;
            }

            frame = outbound.recv() => {
                match frame {
                    Some(frame) => ws_sink.send(WsMessage::Text(frame.into())).await?,
                    None => break,
                }
            }

            msg = ws_stream.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        state.registry().touch(&conn.id, conn.session, Instant::now());
                        if let Some(reply) = handle_client_message(text.as_str(), conn, state) {
                            match reply.to_json() {
                                Ok(json) => ws_sink.send(WsMessage::Text(json.into())).await?,
                                Err(e) => warn!(client_id = %conn.id, error = %e, "failed to encode reply"),
                            }
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        state.registry().touch(&conn.id, conn.session, Instant::now());
                        ws_sink.send(WsMessage::Pong(data)).await?;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        debug!(client_id = %conn.id, "peer closed connection");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary, Pong and raw frames still count as liveness
                        state.registry().touch(&conn.id, conn.session, Instant::now());
                    }
                    Some(Err(e)) => {
                        warn!(client_id = %conn.id, error = %e, "websocket error");
                        break;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Process one inbound frame and return an optional direct reply.
///
/// Broadcasts are stamped with the connection's id, retained, and fanned out.
/// Malformed or invalid frames are logged and dropped.
pub(crate) fn handle_client_message(
    text: &str,
    conn: &Connection,
    state: &HubState,
) -> Option<Envelope> {
    let envelope = match Envelope::from_json(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(client_id = %conn.id, error = %e, "dropping malformed message");
            return None;
        }
    };
    let message = match envelope.message() {
        Ok(message) => message,
        Err(e) => {
            warn!(client_id = %conn.id, error = %e, "dropping invalid message");
            return None;
        }
    };

    match message {
        Message::Event(_) | Message::Preference(_) => {
            let envelope = if envelope.client_id() == conn.id {
                envelope
            } else {
                envelope.resend_as(conn.id.as_str())
            };
            let kind = envelope.kind();
            let delivery = state.broadcast(&conn.id, envelope);
            debug!(
                client_id = %conn.id,
                %kind,
                delivered = delivery.delivered,
                queued = delivery.queued,
                evicted = delivery.evicted.len(),
                "broadcast"
            );
            None
        }
        Message::Heartbeat(_) => {
            hub_envelope(state, &Message::Heartbeat(Heartbeat::ack(state.now_ms())))
        }
        Message::SyncRequest(request) => {
            let catch_up = state.catch_up(request.since, &conn.own_ids());
            debug!(
                client_id = %conn.id,
                since = request.since,
                events = catch_up.events.len(),
                complete = catch_up.complete,
                "sync request"
            );
            let response = SyncResponse::catch_up(catch_up.events, catch_up.complete);
            hub_envelope(state, &Message::SyncResponse(response))
        }
        Message::SyncResponse(_) => {
            warn!(client_id = %conn.id, "ignoring sync_response sent by a peer");
            None
        }
    }
}

fn hub_envelope(state: &HubState, message: &Message) -> Option<Envelope> {
    match Envelope::encode(message, state.now_ms(), HUB_SENDER) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            warn!(error = %e, "failed to encode hub message");
            None
        }
    }
}

fn hub_frame(state: &HubState, message: &Message) -> Option<String> {
    let envelope = hub_envelope(state, message)?;
    match envelope.to_json() {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(error = %e, "failed to serialize hub message");
            None
        }
    }
}

/// Peeks at the request line without consuming it.
///
/// Anything that is not `GET /health` followed by a space or a query is
/// left for the WebSocket handshake.
async fn is_health_probe(stream: &TcpStream) -> std::io::Result<bool> {
    let mut buf = [0u8; HEALTH_REQUEST.len() + 1];
    for _ in 0..50 {
        let n = stream.peek(&mut buf).await?;
        if n == 0 {
            return Ok(false);
        }
        let seen = n.min(HEALTH_REQUEST.len());
        if buf[..seen] != HEALTH_REQUEST[..seen] {
            return Ok(false);
        }
        if n > HEALTH_REQUEST.len() {
            return Ok(matches!(buf[HEALTH_REQUEST.len()], b' ' | b'?'));
        }
        // Request line split across segments
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(false)
}

async fn serve_health(mut stream: TcpStream, state: &HubState) -> Result<()> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") && head.len() < MAX_PROBE_HEAD {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
    }

    let stats = state.stats();
    let body = serde_json::to_string(&Health {
        status: "ok",
        connections: stats.connections,
        dormant: stats.dormant,
        retained: stats.retained,
    })
    .map_err(std::io::Error::other)?;
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    debug!(connections = stats.connections, "served health probe");
    Ok(())
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
