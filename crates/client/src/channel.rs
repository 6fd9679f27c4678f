// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The sync channel driver.
//!
//! [`SyncChannel`] owns the transport and runs as a single task. Producers
//! talk to it through a cloneable [`ChannelHandle`]; every call is
//! non-blocking and queues a command. Consumers receive callbacks on a
//! [`ChannelHandler`], always from the channel task and in the order events
//! were processed.
//!
//! The driver feeds inputs to the [`ConnectionMachine`] and performs the
//! actions it returns. Actions that complete I/O (opening the transport,
//! flushing the queue) produce follow-up inputs, which are processed from a
//! work list rather than recursively.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tether_core::{
    ClockSource, Envelope, Heartbeat, Message, ProtocolError, SyncRequest, SyncResponse,
    SystemClock,
};

use crate::config::ChannelConfig;
use crate::heartbeat::{HeartbeatAction, HeartbeatMonitor};
use crate::machine::{Action, CloseReason, ConnectionMachine, ConnectionState, Input, TimerId};
use crate::queue::OfflineQueue;
use crate::replay::ReplayFilter;
use crate::transport::{Transport, TransportError, TransportResult, WebSocketTransport};

/// Errors surfaced by the channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The channel task has stopped.
    #[error("channel closed")]
    Closed,

    /// Invalid or unreadable configuration.
    #[error("invalid config: {0}")]
    Config(String),

    /// No hub is listening; auto-reconnect is suspended until `connect()`.
    #[error("hub unavailable, auto-reconnect suspended")]
    ServerUnavailable,

    /// Auto-reconnect used up its attempts.
    #[error("gave up reconnecting after {attempts} attempts")]
    GaveUp { attempts: u32 },

    /// A message could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Callbacks delivered by the channel.
///
/// All methods default to no-ops. They run on the channel task, so a slow
/// handler delays the channel.
pub trait ChannelHandler: Send {
    /// A broadcast `event` or `preference` from another peer.
    fn on_message(&mut self, _envelope: &Envelope) {}

    /// The transport opened.
    fn on_connect(&mut self) {}

    /// The transport closed.
    fn on_disconnect(&mut self) {}

    /// Reconnection stopped: either no hub is listening or attempts ran out.
    fn on_error(&mut self, _error: &ChannelError) {}
}

impl ChannelHandler for () {}

/// Snapshot of the channel published on every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStatus {
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful open.
    pub attempt: u32,
    /// Auto-reconnect suspended because no hub was listening.
    pub suspended: bool,
    /// Id assigned by the hub, once a handshake has been seen.
    pub client_id: Option<String>,
    /// Envelopes waiting in the offline queue.
    pub queued: usize,
    /// Envelopes evicted from the offline queue so far.
    pub dropped: u64,
}

#[derive(Debug)]
enum Command {
    Publish(Envelope),
    Connect,
    Disconnect,
}

/// Non-blocking producer side of a channel.
#[derive(Clone)]
pub struct ChannelHandle {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ChannelStatus>,
    cancel: CancellationToken,
    clock: Arc<dyn ClockSource>,
    sequence: Arc<AtomicU64>,
}

impl ChannelHandle {
    /// Broadcast an event. Queued while disconnected.
    pub fn send_event(&self, payload: Value) -> Result<(), ChannelError> {
        let envelope = Envelope::event(self.clock.now_ms(), "", payload);
        self.publish(envelope.with_sequence(self.next_sequence()))
    }

    /// Broadcast a preference change. Queued while disconnected.
    pub fn send_preference(&self, payload: Value) -> Result<(), ChannelError> {
        let envelope = Envelope::preference(self.clock.now_ms(), "", payload);
        self.publish(envelope.with_sequence(self.next_sequence()))
    }

    /// Ask the hub for retained broadcasts newer than `since`.
    pub fn request_sync(&self, since: u64) -> Result<(), ChannelError> {
        let message = Message::SyncRequest(SyncRequest { since });
        let envelope = Envelope::encode(&message, self.clock.now_ms(), "")?;
        self.publish(envelope)
    }

    /// Start connecting. Also resumes after suspension or giving up.
    pub fn connect(&self) -> Result<(), ChannelError> {
        self.command(Command::Connect)
    }

    /// Drop the connection and stay disconnected until `connect()`.
    pub fn disconnect(&self) -> Result<(), ChannelError> {
        self.command(Command::Disconnect)
    }

    /// Stop the channel. Pending timers are cancelled and the transport is
    /// closed.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.commands.is_closed()
    }

    /// The latest published status.
    pub fn status(&self) -> ChannelStatus {
        self.status.borrow().clone()
    }

    /// A receiver notified on every status change.
    pub fn subscribe_status(&self) -> watch::Receiver<ChannelStatus> {
        self.status.clone()
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn publish(&self, envelope: Envelope) -> Result<(), ChannelError> {
        self.command(Command::Publish(envelope))
    }

    fn command(&self, command: Command) -> Result<(), ChannelError> {
        if self.cancel.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        self.commands
            .send(command)
            .map_err(|_| ChannelError::Closed)
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// One peer's connection to the hub.
pub struct SyncChannel<T: Transport, H: ChannelHandler> {
    config: ChannelConfig,
    transport: T,
    handler: H,
    machine: ConnectionMachine,
    heartbeat: HeartbeatMonitor,
    queue: OfflineQueue,
    replay: ReplayFilter,
    clock: Arc<dyn ClockSource>,
    /// Id assigned by the hub's handshake.
    client_id: Option<String>,
    /// Newest broadcast timestamp observed, used for catch-up.
    cursor: Option<u64>,
    reconnect_at: Option<(TimerId, Instant)>,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<ChannelStatus>,
    cancel: CancellationToken,
}

impl<H: ChannelHandler> SyncChannel<WebSocketTransport, H> {
    /// Create a channel that dials the hub over WebSocket.
    pub fn new(config: ChannelConfig, handler: H) -> Result<(Self, ChannelHandle), ChannelError> {
        Self::with_transport(
            config,
            WebSocketTransport::new(),
            handler,
            Arc::new(SystemClock),
        )
    }
}

impl<T: Transport, H: ChannelHandler> SyncChannel<T, H> {
    /// Create a channel with a custom transport and clock.
    pub fn with_transport(
        config: ChannelConfig,
        transport: T,
        handler: H,
        clock: Arc<dyn ClockSource>,
    ) -> Result<(Self, ChannelHandle), ChannelError> {
        config.validate()?;

        let machine = ConnectionMachine::new(config.backoff());
        let heartbeat = HeartbeatMonitor::new(config.heartbeat_interval());
        let queue = OfflineQueue::new(config.queue_capacity);
        let replay = ReplayFilter::new(config.dedupe_window);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ChannelStatus {
            state: machine.state(),
            attempt: 0,
            suspended: false,
            client_id: None,
            queued: 0,
            dropped: 0,
        });
        let cancel = CancellationToken::new();

        let handle = ChannelHandle {
            commands: command_tx,
            status: status_rx,
            cancel: cancel.clone(),
            clock: Arc::clone(&clock),
            sequence: Arc::new(AtomicU64::new(0)),
        };

        let channel = SyncChannel {
            config,
            transport,
            handler,
            machine,
            heartbeat,
            queue,
            replay,
            clock,
            client_id: None,
            cursor: None,
            reconnect_at: None,
            commands: command_rx,
            status: status_tx,
            cancel,
        };

        Ok((channel, handle))
    }

    /// Run the channel on its own task.
    pub fn spawn(self) -> tokio::task::JoinHandle<H>
    where
        T: 'static,
        H: 'static,
    {
        tokio::spawn(self.run())
    }

    /// Drive the channel until `close()` is called or every handle is
    /// dropped. Returns the handler.
    pub async fn run(mut self) -> H {
        info!(url = %self.config.url, role = %self.config.role, "sync channel started");

        loop {
            let connected = self.machine.state() == ConnectionState::Connected;
            let heartbeat_at = self.heartbeat.next_deadline();
            let reconnect_at = self.reconnect_at;

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("all channel handles dropped");
                        break;
                    }
                },

                frame = self.transport.recv(), if connected => {
                    self.handle_frame(frame).await;
                }

                _ = sleep_until_opt(heartbeat_at), if heartbeat_at.is_some() => {
                    self.on_heartbeat_tick().await;
                }

                _ = sleep_until_opt(reconnect_at.map(|(_, at)| at)), if reconnect_at.is_some() => {
                    if let Some((timer, _)) = self.reconnect_at.take() {
                        self.apply(Input::TimerFired(timer)).await;
                    }
                }
            }
        }

        self.reconnect_at = None;
        self.apply(Input::Disconnect).await;
        info!("sync channel closed");
        self.handler
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Publish(envelope) => self.publish(envelope).await,
            Command::Connect => self.apply(Input::Connect).await,
            Command::Disconnect => self.apply(Input::Disconnect).await,
        }
    }

    /// Sends now if connected, otherwise queues.
    async fn publish(&mut self, envelope: Envelope) {
        if self.machine.state() != ConnectionState::Connected {
            self.queue.enqueue(envelope);
            self.publish_status();
            return;
        }

        let envelope = self.stamp(&envelope);
        if let Err(e) = self.transport.send(envelope.clone()).await {
            warn!(error = %e, kind = %envelope.kind(), "send failed, queueing for reconnect");
            self.queue.enqueue(envelope);
            self.transport_lost(CloseReason::Transport).await;
        }
    }

    /// Labels an outbound envelope with the current client id, if known.
    fn stamp(&self, envelope: &Envelope) -> Envelope {
        match &self.client_id {
            Some(id) => envelope.resend_as(id.as_str()),
            None => envelope.clone(),
        }
    }

    fn sender_id(&self) -> &str {
        self.client_id.as_deref().unwrap_or("")
    }

    async fn handle_frame(&mut self, frame: TransportResult<Option<String>>) {
        match frame {
            Ok(Some(text)) => {
                self.heartbeat.record_inbound(Instant::now());
                self.handle_text(&text);
                self.publish_status();
            }
            Ok(None) => {
                info!("hub closed the connection");
                self.transport_lost(CloseReason::Transport).await;
            }
            Err(e) => {
                warn!(error = %e, "receive failed");
                self.transport_lost(CloseReason::Transport).await;
            }
        }
    }

    fn handle_text(&mut self, text: &str) {
        let envelope = match Envelope::from_json(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };
        let message = match envelope.message() {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping frame with invalid body");
                return;
            }
        };

        match message {
            Message::Event(_) | Message::Preference(_) => self.deliver(&envelope),
            Message::Heartbeat(ack) => {
                debug!(server_time = ?ack.server_time, "heartbeat ack");
            }
            Message::SyncRequest(_) => {
                warn!(from = envelope.client_id(), "ignoring sync_request sent to a client");
            }
            Message::SyncResponse(response) => self.handle_sync_response(response),
        }
    }

    fn handle_sync_response(&mut self, response: SyncResponse) {
        if let Some(id) = response.client_id {
            info!(client_id = %id, resumed = response.resumed, "hub assigned client id");
            self.client_id = Some(id);
        }
        if !response.complete {
            warn!(
                returned = response.events.len(),
                "catch-up is partial, hub history no longer covers the cursor"
            );
        }
        for envelope in &response.events {
            if envelope.kind().is_broadcast() {
                self.deliver(envelope);
            } else {
                warn!(kind = %envelope.kind(), "ignoring non-broadcast in sync_response");
            }
        }
    }

    /// Hands a broadcast to the handler unless it is a replay.
    fn deliver(&mut self, envelope: &Envelope) {
        let ts = envelope.timestamp();
        self.cursor = Some(self.cursor.map_or(ts, |cursor| cursor.max(ts)));

        if !self.replay.admit(envelope) {
            debug!(
                from = envelope.client_id(),
                timestamp = ts,
                "dropping duplicate broadcast"
            );
            return;
        }
        self.handler.on_message(envelope);
    }

    async fn on_heartbeat_tick(&mut self) {
        match self.heartbeat.poll(Instant::now()) {
            HeartbeatAction::Idle => {}
            HeartbeatAction::Beat => {
                let message = Message::Heartbeat(Heartbeat::probe());
                let probe = match Envelope::encode(&message, self.clock.now_ms(), self.sender_id()) {
                    Ok(probe) => probe,
                    Err(e) => {
                        warn!(error = %e, "failed to encode heartbeat");
                        return;
                    }
                };
                if let Err(e) = self.transport.send(probe).await {
                    warn!(error = %e, "heartbeat send failed");
                    self.transport_lost(CloseReason::Transport).await;
                }
            }
            HeartbeatAction::Dead => {
                warn!(
                    interval_ms = self.config.heartbeat_interval_ms,
                    "no traffic from hub, closing dead connection"
                );
                self.transport_lost(CloseReason::HeartbeatTimeout).await;
            }
        }
    }

    /// Closes the transport. Teardown errors are logged and otherwise ignored.
    async fn close_transport(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            debug!(error = %e, "transport teardown failed");
        }
    }

    /// Tears down the transport and reports the loss to the machine.
    async fn transport_lost(&mut self, reason: CloseReason) {
        self.close_transport().await;
        self.apply(Input::Closed(reason)).await;
    }

    /// Steps the machine and performs the resulting actions, including any
    /// inputs those actions produce.
    async fn apply(&mut self, input: Input) {
        let mut pending = VecDeque::from([input]);

        while let Some(input) = pending.pop_front() {
            let before = self.machine.state();
            let actions = self.machine.step(input);
            let after = self.machine.state();
            if before != after {
                info!(from = %before, to = %after, "connection state changed");
            }

            for action in actions {
                if let Some(next) = self.perform(action).await {
                    pending.push_back(next);
                }
            }
            self.publish_status();
        }
    }

    async fn perform(&mut self, action: Action) -> Option<Input> {
        match action {
            Action::OpenTransport => self.open_transport().await,
            Action::CloseTransport => {
                self.close_transport().await;
                None
            }
            Action::StartHeartbeat => {
                self.heartbeat.start(Instant::now());
                None
            }
            Action::StopHeartbeat => {
                self.heartbeat.stop();
                None
            }
            Action::FlushQueue => self.flush_queue().await,
            Action::ScheduleReconnect {
                timer,
                attempt,
                delay,
            } => {
                info!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "reconnect scheduled"
                );
                self.reconnect_at = Some((timer, Instant::now() + delay));
                None
            }
            Action::CancelReconnect => {
                debug!("pending reconnect cancelled");
                self.reconnect_at = None;
                None
            }
            Action::NotifyConnect => {
                self.handler.on_connect();
                None
            }
            Action::NotifyDisconnect => {
                self.handler.on_disconnect();
                None
            }
            Action::NotifySuspended => {
                warn!(url = %self.config.url, "hub unavailable, auto-reconnect suspended until connect()");
                self.handler.on_error(&ChannelError::ServerUnavailable);
                None
            }
            Action::NotifyGaveUp { attempts } => {
                warn!(attempts, "giving up on reconnect until connect()");
                self.handler.on_error(&ChannelError::GaveUp { attempts });
                None
            }
        }
    }

    async fn open_transport(&mut self) -> Option<Input> {
        let url = self.config.endpoint(self.client_id.as_deref());
        let timeout = self.config.connect_timeout();
        info!(%url, attempt = self.machine.attempt(), "connecting");

        let result = tokio::select! {
            biased;
            // Leave the machine in Connecting; run() shuts down next
            _ = self.cancel.cancelled() => return None,
            result = tokio::time::timeout(timeout, self.transport.connect(&url)) => result,
        };

        match result {
            Ok(Ok(())) => Some(Input::Opened),
            Ok(Err(TransportError::ServerUnavailable(reason))) => {
                warn!(%reason, "hub not listening");
                Some(Input::Closed(CloseReason::ServerUnavailable))
            }
            Ok(Err(e)) => {
                warn!(error = %e, "connect failed");
                Some(Input::Closed(CloseReason::Transport))
            }
            Err(_) => {
                let e = TransportError::Timeout(self.config.connect_timeout_ms);
                warn!(error = %e, "connect failed");
                self.close_transport().await;
                Some(Input::Closed(CloseReason::Transport))
            }
        }
    }

    /// Sends queued envelopes in arrival order, then the catch-up request.
    async fn flush_queue(&mut self) -> Option<Input> {
        let mut flushed = 0usize;
        while let Some(queued) = self.queue.pop() {
            let envelope = self.stamp(&queued);
            if let Err(e) = self.transport.send(envelope).await {
                warn!(error = %e, flushed, "flush interrupted");
                self.queue.requeue(queued);
                self.close_transport().await;
                return Some(Input::Closed(CloseReason::Transport));
            }
            flushed += 1;
        }
        if flushed > 0 {
            info!(flushed, "flushed offline queue");
        }

        if !self.config.sync_on_reconnect {
            return None;
        }
        let since = self.cursor?;
        let message = Message::SyncRequest(SyncRequest { since });
        let request = match Envelope::encode(&message, self.clock.now_ms(), self.sender_id()) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "failed to encode sync request");
                return None;
            }
        };
        debug!(since, "requesting catch-up");
        if let Err(e) = self.transport.send(request).await {
            warn!(error = %e, "sync request failed");
            self.close_transport().await;
            return Some(Input::Closed(CloseReason::Transport));
        }
        None
    }

    fn publish_status(&self) {
        let status = ChannelStatus {
            state: self.machine.state(),
            attempt: self.machine.attempt(),
            suspended: self.machine.is_suspended(),
            client_id: self.client_id.clone(),
            queued: self.queue.len(),
            dropped: self.queue.dropped(),
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }
}
