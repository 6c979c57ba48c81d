//! Common test utilities for durasock integration tests
//!
//! Provides a scripted implementation of the `Transport` seam so tests can
//! fail handshakes on demand, inspect every frame the connection layer
//! sends, and inject inbound events, all under a paused Tokio clock.

#![allow(dead_code)]

use async_trait::async_trait;
use durasock::{
    Connection, ConnectionState, DuraSockError, Envelope, LinkCommand, Result, Transport,
    TransportEvent, TransportLink,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// What the next `open()` call should do
pub enum OpenPlan {
    Accept,
    Reject(String),
    /// Never resolve; lets tests exercise the connect-attempt timeout
    Hang,
}

/// Test-side end of an accepted link
///
/// The connection under test holds the other ends: it sends `LinkCommand`s
/// that arrive here, and events emitted here arrive at its event loop.
pub struct LinkProbe {
    events: mpsc::UnboundedSender<TransportEvent>,
    commands: tokio::sync::Mutex<mpsc::UnboundedReceiver<LinkCommand>>,
}

impl LinkProbe {
    /// Inject an inbound transport event
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    /// Inject an inbound envelope as a text frame
    pub fn emit_envelope(&self, envelope: &Envelope) {
        self.emit(TransportEvent::Frame(envelope.to_frame().unwrap()));
    }

    /// Report the link closed
    pub fn emit_closed(&self, code: Option<u16>, reason: &str) {
        self.emit(TransportEvent::Closed {
            code,
            reason: reason.to_string(),
        });
    }

    /// Next outbound command, if any arrived yet
    pub async fn try_next_command(&self) -> Option<LinkCommand> {
        self.commands.lock().await.try_recv().ok()
    }

    /// Wait for the next outbound command
    pub async fn next_command(&self) -> Option<LinkCommand> {
        self.commands.lock().await.recv().await
    }

    /// Wait for the next outbound frame, decoded as an envelope
    pub async fn expect_envelope(&self) -> Envelope {
        match self.next_command().await {
            Some(LinkCommand::Send(frame)) => Envelope::from_frame(&frame).unwrap(),
            other => panic!("expected a Send command, got {other:?}"),
        }
    }

    /// Wait for an outbound Close command
    pub async fn expect_close(&self) -> (Option<u16>, String) {
        match self.next_command().await {
            Some(LinkCommand::Close { code, reason }) => (code, reason),
            other => panic!("expected a Close command, got {other:?}"),
        }
    }

    /// Collect every outbound envelope currently buffered
    pub async fn drain_envelopes(&self) -> Vec<Envelope> {
        let mut commands = self.commands.lock().await;
        let mut envelopes = Vec::new();
        while let Ok(command) = commands.try_recv() {
            if let LinkCommand::Send(frame) = command {
                envelopes.push(Envelope::from_frame(&frame).unwrap());
            }
        }
        envelopes
    }
}

/// Scripted [`Transport`]: each `open()` consumes the next plan
/// (accepting by default) and records a [`LinkProbe`] for inspection
#[derive(Default)]
pub struct ScriptedTransport {
    plans: Mutex<VecDeque<OpenPlan>>,
    opens: AtomicUsize,
    links: Mutex<Vec<Arc<LinkProbe>>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a plan for an upcoming `open()` call
    pub fn plan(&self, plan: OpenPlan) {
        self.plans.lock().push_back(plan);
    }

    /// Queue `count` handshake rejections
    pub fn reject_next(&self, count: usize, reason: &str) {
        let mut plans = self.plans.lock();
        for _ in 0..count {
            plans.push_back(OpenPlan::Reject(reason.to_string()));
        }
    }

    /// Total `open()` calls observed
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Probe for the most recently accepted link
    pub fn last_link(&self) -> Arc<LinkProbe> {
        self.links.lock().last().cloned().expect("no link accepted yet")
    }

    /// Probe for the nth accepted link
    pub fn link(&self, index: usize) -> Arc<LinkProbe> {
        self.links.lock()[index].clone()
    }

    pub fn accepted_count(&self) -> usize {
        self.links.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, _target: &str) -> Result<TransportLink> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let plan = self.plans.lock().pop_front().unwrap_or(OpenPlan::Accept);
        match plan {
            OpenPlan::Reject(reason) => Err(DuraSockError::Transport(reason)),
            OpenPlan::Hang => std::future::pending::<Result<TransportLink>>().await,
            OpenPlan::Accept => {
                let (command_tx, command_rx) = mpsc::unbounded_channel();
                let (event_tx, event_rx) = mpsc::unbounded_channel();
                self.links.lock().push(Arc::new(LinkProbe {
                    events: event_tx,
                    commands: tokio::sync::Mutex::new(command_rx),
                }));
                Ok(TransportLink {
                    commands: command_tx,
                    events: event_rx,
                })
            }
        }
    }
}

/// Install a tracing subscriber for the test run (first caller wins)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Let the connection task process everything queued so far
///
/// Under a paused clock this advances virtual time by one millisecond.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Wait until the connection reaches `state`, panicking after a bound
pub async fn wait_for_state(connection: &Connection, state: ConnectionState) {
    for _ in 0..10_000 {
        if connection.state() == state {
            return;
        }
        settle().await;
    }
    panic!(
        "connection '{}' never reached {state:?}, stuck in {:?}",
        connection.identity(),
        connection.state()
    );
}
