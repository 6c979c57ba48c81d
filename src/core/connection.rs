//! Connection handle
//!
//! The handle is a cheap clone; all mutable state lives in the connection's
//! event-loop task ([`actor`](crate::core::actor)). Commands travel over an
//! unbounded channel, queries carry a oneshot reply sender, and the current
//! state is mirrored in a shared atomic so `state()`/`is_connected()` need no
//! round trip.

use crate::core::actor::ConnectionActor;
use crate::core::config::ConnectOptions;
use crate::core::observers::{
    CloseObserver, ErrorObserver, MessageObserver, ObserverKind, OpenObserver, ReconnectObserver,
};
use crate::core::state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use crate::envelope::Envelope;
use crate::router::MessageRouter;
use crate::traits::{DuraSockError, Result, Transport};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Outcome of a [`Connection::send`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Forwarded to the transport immediately
    Sent,
    /// Buffered in the pending queue until the connection is sendable
    Queued,
}

/// Point-in-time snapshot of one connection
#[derive(Debug, Clone)]
pub struct ConnectionMetrics {
    pub identity: String,
    pub state: ConnectionState,
    pub attempt_count: u32,
    pub pending_size: usize,
    pub authenticated: bool,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub reconnects: u64,
}

/// Control messages for the connection event loop
pub(crate) enum Command {
    Connect,
    Reconnect,
    Close,
    Send(Envelope, oneshot::Sender<Result<SendOutcome>>),
    SendIfSendable(Envelope, oneshot::Sender<bool>),
    Authenticate(String),
    Observe(ObserverKind, oneshot::Sender<u64>),
    Unobserve(u64),
    Metrics(oneshot::Sender<ConnectionMetrics>),
}

/// Unregister handle returned by observer registration
///
/// Dropping the handle does NOT unregister; call [`ObserverHandle::unregister`].
pub struct ObserverHandle {
    id: u64,
    command_tx: mpsc::UnboundedSender<Command>,
}

impl ObserverHandle {
    /// Remove exactly this registration; no-op if the connection is gone
    pub fn unregister(self) {
        let _ = self.command_tx.send(Command::Unobserve(self.id));
    }
}

/// A resilient duplex message connection to one logical endpoint
///
/// Owns (through its event-loop task) one transport instance at a time, the
/// lifecycle state machine, the authentication handshake, the heartbeat
/// timer and reconnection scheduling. Created via [`Connection::spawn`] or
/// [`ConnectionManager::create_connection`](crate::ConnectionManager::create_connection);
/// it does not connect until [`Connection::connect`] is called.
#[derive(Clone)]
pub struct Connection {
    identity: Arc<str>,
    target: Arc<str>,
    command_tx: mpsc::UnboundedSender<Command>,
    state: Arc<AtomicConnectionState>,
}

impl Connection {
    /// Spawn a standalone connection (no router wiring)
    pub fn spawn(
        identity: impl Into<String>,
        target: impl Into<String>,
        options: ConnectOptions,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self::spawn_routed(identity, target, options, transport, None)
    }

    /// Spawn a connection whose inbound messages also feed a shared router
    pub(crate) fn spawn_routed(
        identity: impl Into<String>,
        target: impl Into<String>,
        options: ConnectOptions,
        transport: Arc<dyn Transport>,
        router: Option<Arc<MessageRouter>>,
    ) -> Self {
        let identity: Arc<str> = identity.into().into();
        let target: Arc<str> = target.into().into();
        let state = Arc::new(AtomicConnectionState::new(ConnectionState::Disconnected));
        let metrics = Arc::new(AtomicMetrics::new());
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let actor = ConnectionActor::new(
            identity.to_string(),
            target.to_string(),
            options,
            transport,
            router,
            Arc::clone(&state),
            Arc::clone(&metrics),
            command_rx,
        );
        tokio::spawn(actor.run());

        Self {
            identity,
            target,
            command_tx,
            state,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Current lifecycle state (lock-free read)
    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// True once the transport is established (auth may still be pending)
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Initiate a connection attempt
    ///
    /// No-op while an attempt or session is already in flight, after an
    /// explicit close, and in FAILED (use [`Connection::reconnect`]).
    pub fn connect(&self) -> Result<()> {
        self.command(Command::Connect)
    }

    /// Reset the attempt counter, clear FAILED and start a fresh attempt
    pub fn reconnect(&self) -> Result<()> {
        self.command(Command::Reconnect)
    }

    /// Close the connection permanently
    ///
    /// Idempotent; cancels any reconnect and heartbeat timer, closes the
    /// transport and leaves the connection in CLOSED with no further
    /// automatic reconnection.
    pub fn close(&self) -> Result<()> {
        self.command(Command::Close)
    }

    /// Set or replace the credential; re-sent on the next successful OPEN
    pub fn authenticate(&self, token: impl Into<String>) -> Result<()> {
        self.command(Command::Authenticate(token.into()))
    }

    /// Send an envelope
    ///
    /// Forwarded immediately when the connection is sendable (AUTHENTICATED,
    /// or OPEN with no credential configured), otherwise FIFO-queued —
    /// queueing is not an error. Fails only after an explicit close.
    pub async fn send(&self, envelope: Envelope) -> Result<SendOutcome> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Send(envelope, tx))?;
        rx.await
            .map_err(|_| DuraSockError::ChannelClosed("connection task"))?
    }

    /// Best-effort send used by broadcast: never queues, reports delivery
    pub(crate) async fn send_if_sendable(&self, envelope: Envelope) -> bool {
        let (tx, rx) = oneshot::channel();
        if self
            .command(Command::SendIfSendable(envelope, tx))
            .is_err()
        {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Snapshot of state, attempt count, pending size and counters
    pub async fn metrics(&self) -> Result<ConnectionMetrics> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Metrics(tx))?;
        rx.await
            .map_err(|_| DuraSockError::ChannelClosed("connection task"))
    }

    /// Observe successful transport opens
    pub async fn on_open(
        &self,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Result<ObserverHandle> {
        self.observe(ObserverKind::Open(Arc::new(callback) as OpenObserver))
            .await
    }

    /// Observe inbound envelopes (heartbeat acks included)
    pub async fn on_message(
        &self,
        callback: impl Fn(&Envelope) + Send + Sync + 'static,
    ) -> Result<ObserverHandle> {
        self.observe(ObserverKind::Message(
            Arc::new(callback) as MessageObserver
        ))
        .await
    }

    /// Observe transport closes (code, reason)
    pub async fn on_close(
        &self,
        callback: impl Fn(Option<u16>, &str) + Send + Sync + 'static,
    ) -> Result<ObserverHandle> {
        self.observe(ObserverKind::Close(Arc::new(callback) as CloseObserver))
            .await
    }

    /// Observe errors: transport, auth rejection, attempts exhausted
    pub async fn on_error(
        &self,
        callback: impl Fn(&DuraSockError) + Send + Sync + 'static,
    ) -> Result<ObserverHandle> {
        self.observe(ObserverKind::Error(Arc::new(callback) as ErrorObserver))
            .await
    }

    /// Observe reconnect scheduling (attempt number, delay)
    pub async fn on_reconnect_scheduled(
        &self,
        callback: impl Fn(u32, std::time::Duration) + Send + Sync + 'static,
    ) -> Result<ObserverHandle> {
        self.observe(ObserverKind::ReconnectScheduled(
            Arc::new(callback) as ReconnectObserver
        ))
        .await
    }

    async fn observe(&self, kind: ObserverKind) -> Result<ObserverHandle> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Observe(kind, tx))?;
        let id = rx
            .await
            .map_err(|_| DuraSockError::ChannelClosed("connection task"))?;
        Ok(ObserverHandle {
            id,
            command_tx: self.command_tx.clone(),
        })
    }

    fn command(&self, command: Command) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| DuraSockError::ChannelClosed("connection task"))
    }
}
