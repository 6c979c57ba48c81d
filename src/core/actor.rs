//! Connection event loop
//!
//! One task owns all mutable state of a connection: the lifecycle state
//! machine, the pending queue, the credential, both timers and the live
//! transport link. Handles talk to it through the command channel, so every
//! state transition is processed strictly sequentially.

use crate::core::config::ConnectOptions;
use crate::core::connection::{Command, ConnectionMetrics, SendOutcome};
use crate::core::observers::ObserverSet;
use crate::core::queue::PendingQueue;
use crate::core::state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use crate::envelope::Envelope;
use crate::router::{MessageRouter, RoutedMessage};
use crate::traits::{
    BackoffPolicy, DuraSockError, ExponentialBackoff, LinkCommand, Result, Transport,
    TransportEvent, TransportLink,
};
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, warn};

/// What woke the event loop
enum Tick {
    Command(Option<Command>),
    Link(Option<TransportEvent>),
    ReconnectFired,
    DeadlineFired,
    HeartbeatTick,
}

pub(crate) struct ConnectionActor {
    identity: String,
    target: String,
    opts: ConnectOptions,
    backoff: Box<dyn BackoffPolicy>,
    transport: Arc<dyn Transport>,
    router: Option<Arc<MessageRouter>>,
    state: Arc<AtomicConnectionState>,
    metrics: Arc<AtomicMetrics>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    observers: ObserverSet,
    queue: PendingQueue,
    credential: Option<String>,
    /// Consecutive failed attempts since the last sendable state
    attempt: u32,
    /// Set by the first explicit close; gates all automatic reconnection
    is_closed: bool,
    closed_notified: bool,
    link: Option<TransportLink>,
    reconnect_at: Option<Pin<Box<Sleep>>>,
    auth_deadline: Option<Pin<Box<Sleep>>>,
    heartbeat: Option<Interval>,
    heartbeat_sent_at: Option<Instant>,
    heartbeat_acked_at: Option<Instant>,
}

impl ConnectionActor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        identity: String,
        target: String,
        opts: ConnectOptions,
        transport: Arc<dyn Transport>,
        router: Option<Arc<MessageRouter>>,
        state: Arc<AtomicConnectionState>,
        metrics: Arc<AtomicMetrics>,
        command_rx: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let backoff = Box::new(ExponentialBackoff::new(
            opts.reconnect_base_delay,
            opts.reconnect_max_delay,
        ));
        Self {
            identity,
            target,
            opts,
            backoff,
            transport,
            router,
            state,
            metrics,
            command_rx,
            observers: ObserverSet::new(),
            queue: PendingQueue::new(),
            credential: None,
            attempt: 0,
            is_closed: false,
            closed_notified: false,
            link: None,
            reconnect_at: None,
            auth_deadline: None,
            heartbeat: None,
            heartbeat_sent_at: None,
            heartbeat_acked_at: None,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(identity = %self.identity, "connection task started");

        loop {
            match self.next_tick().await {
                Tick::Command(Some(command)) => self.handle_command(command).await,
                Tick::Command(None) => {
                    // All handles dropped: tear down exactly once and exit
                    debug!(identity = %self.identity, "command channel closed");
                    if !self.is_closed {
                        self.handle_close();
                    }
                    self.finalize_closed(None, "handle dropped");
                    break;
                }
                Tick::Link(event) => self.handle_link_event(event),
                Tick::ReconnectFired => self.on_reconnect_fired().await,
                Tick::DeadlineFired => self.on_auth_deadline(),
                Tick::HeartbeatTick => self.on_heartbeat_tick(),
            }
        }

        debug!(identity = %self.identity, "connection task exiting");
    }

    async fn next_tick(&mut self) -> Tick {
        let Self {
            command_rx,
            link,
            reconnect_at,
            auth_deadline,
            heartbeat,
            ..
        } = self;

        tokio::select! {
            command = command_rx.recv() => Tick::Command(command),
            event = async {
                match link {
                    Some(link) => link.events.recv().await,
                    None => std::future::pending().await,
                }
            } => Tick::Link(event),
            _ = async {
                match reconnect_at {
                    Some(timer) => timer.as_mut().await,
                    None => std::future::pending().await,
                }
            } => Tick::ReconnectFired,
            _ = async {
                match auth_deadline {
                    Some(timer) => timer.as_mut().await,
                    None => std::future::pending().await,
                }
            } => Tick::DeadlineFired,
            _ = async {
                match heartbeat {
                    Some(ticker) => { ticker.tick().await; }
                    None => std::future::pending().await,
                }
            } => Tick::HeartbeatTick,
        }
    }

    // ---- command handling ----------------------------------------------

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect => self.handle_connect().await,
            Command::Reconnect => self.handle_reconnect().await,
            Command::Close => self.handle_close(),
            Command::Send(envelope, reply) => {
                let outcome = self.handle_send(envelope);
                let _ = reply.send(outcome);
            }
            Command::SendIfSendable(envelope, reply) => {
                let delivered = self.sendable() && self.send_frame(&envelope).is_ok();
                let _ = reply.send(delivered);
            }
            Command::Authenticate(token) => {
                debug!(identity = %self.identity, "credential replaced");
                self.credential = Some(token);
            }
            Command::Observe(kind, reply) => {
                let _ = reply.send(self.observers.insert(kind));
            }
            Command::Unobserve(id) => self.observers.remove(id),
            Command::Metrics(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn handle_connect(&mut self) {
        if self.is_closed {
            debug!(identity = %self.identity, "connect after close ignored");
            return;
        }
        match self.state.get() {
            ConnectionState::Disconnected => self.start_connect().await,
            ConnectionState::ReconnectScheduled => {
                // Manual connect overrides the armed timer
                self.reconnect_at = None;
                self.start_connect().await;
            }
            ConnectionState::Failed => {
                debug!(identity = %self.identity, "connect in FAILED ignored; reconnect() required");
            }
            other => {
                debug!(identity = %self.identity, state = ?other, "connect is a no-op");
            }
        }
    }

    async fn handle_reconnect(&mut self) {
        if self.is_closed {
            return;
        }
        self.attempt = 0;
        match self.state.get() {
            ConnectionState::Disconnected | ConnectionState::Failed => {
                info!(identity = %self.identity, "manual reconnect");
                self.start_connect().await;
            }
            ConnectionState::ReconnectScheduled => {
                self.reconnect_at = None;
                info!(identity = %self.identity, "manual reconnect");
                self.start_connect().await;
            }
            _ => {
                // Already connecting or connected: only the counter resets
            }
        }
    }

    fn handle_close(&mut self) {
        if self.is_closed {
            debug!(identity = %self.identity, "close already in progress");
            return;
        }
        info!(identity = %self.identity, "closing connection");
        self.is_closed = true;
        self.reconnect_at = None;
        self.auth_deadline = None;
        self.heartbeat = None;

        match &self.link {
            Some(link) => {
                self.state.set(ConnectionState::Closing);
                let _ = link.commands.send(LinkCommand::Close {
                    code: Some(1000),
                    reason: "closed by client".into(),
                });
                // The Closed event (or channel end) finalizes
            }
            None => self.finalize_closed(None, "closed"),
        }
    }

    fn handle_send(&mut self, envelope: Envelope) -> Result<SendOutcome> {
        if self.is_closed {
            return Err(DuraSockError::ConnectionClosed);
        }
        if self.sendable() {
            match self.send_frame(&envelope) {
                Ok(()) => Ok(SendOutcome::Sent),
                Err(e) => {
                    // Keep the message and recover through the failure path
                    self.queue.enqueue(envelope);
                    self.observers.notify_error(&e);
                    self.drop_link("send failed");
                    self.fail_attempt();
                    Ok(SendOutcome::Queued)
                }
            }
        } else {
            self.queue.enqueue(envelope);
            Ok(SendOutcome::Queued)
        }
    }

    // ---- connection attempts -------------------------------------------

    async fn start_connect(&mut self) {
        if self.link.is_some() {
            warn!(identity = %self.identity, "attempt refused: transport already live");
            return;
        }
        self.state.set(ConnectionState::Connecting);
        info!(identity = %self.identity, target = %self.target, "connecting");

        let opened = tokio::time::timeout(
            self.opts.connect_timeout,
            self.transport.open(&self.target),
        )
        .await;

        match opened {
            Ok(Ok(link)) => {
                self.link = Some(link);
                self.handle_open();
            }
            Ok(Err(e)) => {
                warn!(identity = %self.identity, error = %e, "connect failed");
                self.observers.notify_error(&e);
                self.fail_attempt();
            }
            Err(_) => {
                let e = DuraSockError::Timeout(self.opts.connect_timeout);
                warn!(identity = %self.identity, error = %e, "connect timed out");
                self.observers.notify_error(&e);
                self.fail_attempt();
            }
        }
    }

    fn handle_open(&mut self) {
        self.state.set(ConnectionState::Open);
        info!(identity = %self.identity, "transport open");
        self.observers.notify_open();

        match &self.credential {
            Some(token) => {
                let auth = Envelope::auth(token);
                match self.send_frame(&auth) {
                    Ok(()) => {
                        self.state.set(ConnectionState::Authenticating);
                        self.auth_deadline =
                            Some(Box::pin(sleep(self.opts.connect_timeout)));
                        debug!(identity = %self.identity, "credential sent");
                    }
                    Err(e) => {
                        self.observers.notify_error(&e);
                        self.drop_link("auth send failed");
                        self.fail_attempt();
                    }
                }
            }
            // No credential: OPEN is terminal-success
            None => self.become_sendable(),
        }
    }

    /// Entered on AUTHENTICATED, or on OPEN when no credential is configured.
    /// Drains the pending queue in enqueue order before anything else, then
    /// arms the heartbeat.
    fn become_sendable(&mut self) {
        self.attempt = 0;
        self.auth_deadline = None;

        if !self.queue.is_empty() {
            let sender = match &self.link {
                Some(link) => link.commands.clone(),
                None => return,
            };
            let metrics = Arc::clone(&self.metrics);
            let result = self.queue.drain_into(|envelope| {
                let frame = envelope.to_frame()?;
                sender
                    .send(LinkCommand::Send(frame))
                    .map_err(|_| DuraSockError::Transport("link closed during flush".into()))?;
                metrics.increment_sent();
                Ok(())
            });
            match result {
                Ok(flushed) => {
                    debug!(identity = %self.identity, flushed, "pending queue drained")
                }
                Err(e) => {
                    self.observers.notify_error(&e);
                    self.drop_link("flush failed");
                    self.fail_attempt();
                    return;
                }
            }
        }

        if let Some(period) = self.opts.heartbeat_interval {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            self.heartbeat = Some(ticker);
            self.heartbeat_sent_at = None;
            self.heartbeat_acked_at = None;
        }
    }

    /// Common failure path for connect errors, attempt timeouts, auth
    /// rejections and unexpected closes.
    fn fail_attempt(&mut self) {
        if self.is_closed {
            self.finalize_closed(None, "closed");
            return;
        }
        self.heartbeat = None;
        self.auth_deadline = None;
        self.attempt += 1;

        if self.attempt > self.opts.max_reconnect_attempts {
            self.give_up();
            return;
        }

        let delay = self.backoff.delay(self.attempt - 1);
        self.state.set(ConnectionState::ReconnectScheduled);
        self.reconnect_at = Some(Box::pin(sleep(delay)));
        info!(
            identity = %self.identity,
            attempt = self.attempt,
            ?delay,
            "reconnect scheduled"
        );
        self.observers.notify_reconnect_scheduled(self.attempt, delay);
    }

    async fn on_reconnect_fired(&mut self) {
        self.reconnect_at = None;
        if self.is_closed {
            return;
        }
        // Retrying once more would exceed the ceiling
        if self.attempt >= self.opts.max_reconnect_attempts {
            self.give_up();
            return;
        }
        self.metrics.increment_reconnects();
        self.start_connect().await;
    }

    fn give_up(&mut self) {
        self.state.set(ConnectionState::Failed);
        self.reconnect_at = None;
        let e = DuraSockError::AttemptsExhausted {
            attempts: self.attempt,
        };
        warn!(identity = %self.identity, error = %e, "giving up");
        self.observers.notify_error(&e);
    }

    fn on_auth_deadline(&mut self) {
        self.auth_deadline = None;
        if self.state.get() != ConnectionState::Authenticating {
            return;
        }
        let e = DuraSockError::Timeout(self.opts.connect_timeout);
        warn!(identity = %self.identity, "authentication timed out");
        self.observers.notify_error(&e);
        self.drop_link("auth timeout");
        self.fail_attempt();
    }

    // ---- heartbeat ------------------------------------------------------

    fn on_heartbeat_tick(&mut self) {
        if !self.sendable() {
            self.heartbeat = None;
            return;
        }

        if let (Some(timeout), Some(sent_at)) =
            (self.opts.heartbeat_timeout, self.heartbeat_sent_at)
        {
            let acked = self
                .heartbeat_acked_at
                .map_or(false, |acked_at| acked_at >= sent_at);
            if !acked && sent_at.elapsed() >= timeout {
                let e = DuraSockError::Transport(format!(
                    "heartbeat not acknowledged within {timeout:?}"
                ));
                warn!(identity = %self.identity, error = %e, "dead link");
                self.observers.notify_error(&e);
                self.drop_link("heartbeat timeout");
                self.fail_attempt();
                return;
            }
        }

        let beat = Envelope::heartbeat();
        match self.send_frame(&beat) {
            Ok(()) => self.heartbeat_sent_at = Some(Instant::now()),
            Err(e) => {
                self.observers.notify_error(&e);
                self.drop_link("heartbeat send failed");
                self.fail_attempt();
            }
        }
    }

    // ---- inbound --------------------------------------------------------

    fn handle_link_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Frame(frame)) => self.handle_frame(&frame),
            Some(TransportEvent::Error(message)) => {
                // Surfaced exactly once; state changes only on close/open
                warn!(identity = %self.identity, %message, "transport error");
                self.observers
                    .notify_error(&DuraSockError::Transport(message));
            }
            Some(TransportEvent::Closed { code, reason }) => {
                self.handle_link_closed(code, &reason);
            }
            None => self.handle_link_closed(None, "transport channel closed"),
        }
    }

    fn handle_link_closed(&mut self, code: Option<u16>, reason: &str) {
        self.link = None;
        self.heartbeat = None;
        self.auth_deadline = None;

        if self.is_closed {
            self.finalize_closed(code, reason);
        } else {
            info!(identity = %self.identity, ?code, reason, "link closed unexpectedly");
            self.observers.notify_close(code, reason);
            self.fail_attempt();
        }
    }

    fn handle_frame(&mut self, frame: &crate::traits::Frame) {
        self.metrics.increment_received();

        let envelope = match Envelope::from_frame(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(identity = %self.identity, error = %e, "undecodable frame");
                self.observers.notify_error(&e);
                return;
            }
        };

        if envelope.is_auth_response() {
            self.handle_auth_response(&envelope);
            return;
        }

        if envelope.is_heartbeat() {
            self.heartbeat_acked_at = Some(Instant::now());
            self.observers.notify_message(&envelope);
            return;
        }

        self.observers.notify_message(&envelope);
        if let Some(router) = &self.router {
            let message = RoutedMessage {
                origin: Some(self.identity.clone()),
                received_at: SystemTime::now(),
                envelope,
            };
            router.dispatch(&message);
        }
    }

    fn handle_auth_response(&mut self, envelope: &Envelope) {
        if self.state.get() != ConnectionState::Authenticating {
            debug!(identity = %self.identity, "unsolicited auth_response ignored");
            return;
        }
        let outcome = envelope.auth_outcome();
        if outcome.success {
            self.auth_deadline = None;
            self.state.set(ConnectionState::Authenticated);
            info!(identity = %self.identity, "authenticated");
            self.become_sendable();
        } else {
            // Recoverable: credentials may be refreshed between attempts
            let e = DuraSockError::AuthenticationFailed(
                outcome.error.unwrap_or_else(|| "credential rejected".into()),
            );
            warn!(identity = %self.identity, error = %e, "authentication rejected");
            self.observers.notify_error(&e);
            self.auth_deadline = None;
            self.drop_link("auth rejected");
            self.fail_attempt();
        }
    }

    // ---- helpers --------------------------------------------------------

    fn sendable(&self) -> bool {
        match self.state.get() {
            ConnectionState::Authenticated => true,
            ConnectionState::Open => self.credential.is_none(),
            _ => false,
        }
    }

    fn send_frame(&self, envelope: &Envelope) -> Result<()> {
        let link = self
            .link
            .as_ref()
            .ok_or_else(|| DuraSockError::Transport("no live link".into()))?;
        let frame = envelope.to_frame()?;
        link.commands
            .send(LinkCommand::Send(frame))
            .map_err(|_| DuraSockError::Transport("link command channel closed".into()))?;
        self.metrics.increment_sent();
        Ok(())
    }

    fn drop_link(&mut self, reason: &str) {
        if let Some(link) = self.link.take() {
            let _ = link.commands.send(LinkCommand::Close {
                code: None,
                reason: reason.into(),
            });
        }
    }

    fn finalize_closed(&mut self, code: Option<u16>, reason: &str) {
        self.link = None;
        self.reconnect_at = None;
        self.auth_deadline = None;
        self.heartbeat = None;
        self.state.set(ConnectionState::Closed);
        if !self.closed_notified {
            self.closed_notified = true;
            self.observers.notify_close(code, reason);
            info!(identity = %self.identity, "closed");
        }
    }

    fn snapshot(&self) -> ConnectionMetrics {
        ConnectionMetrics {
            identity: self.identity.clone(),
            state: self.state.get(),
            attempt_count: self.attempt,
            pending_size: self.queue.len(),
            authenticated: self.sendable(),
            messages_sent: self.metrics.messages_sent(),
            messages_received: self.metrics.messages_received(),
            reconnects: self.metrics.reconnect_count(),
        }
    }
}
