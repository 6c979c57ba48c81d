//! # DuraSock
//!
//! A resilient bidirectional connection layer: long-lived duplex message
//! connections that survive transport failures transparently, authenticate
//! each session, and dispatch inbound structured messages to interested
//! consumers while guaranteeing outbound delivery ordering once connected.
//!
//! ## Features
//!
//! - **Nine-state lifecycle machine** per connection, driven by a single
//!   event-loop task so every transition is strictly sequential
//! - **Exponential-backoff reconnection** with an attempt ceiling and manual
//!   recovery from FAILED
//! - **FIFO pending queue**: sends issued while disconnected flush in order
//!   the moment the connection becomes sendable
//! - **Credential handshake** over reserved `auth`/`auth_response` envelopes;
//!   rejection is recoverable, retried like any transport failure
//! - **Heartbeats** with optional liveness enforcement
//! - **Fan-out routing** with predicates, global filters and per-route
//!   counters, shared across connections by the [`ConnectionManager`]
//! - **Pluggable transport**: WebSocket in production, scripted in tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use durasock::{ConnectOptions, ConnectionManager, Envelope, WebSocketTransport};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> durasock::Result<()> {
//!     let manager = ConnectionManager::new(Arc::new(WebSocketTransport::new()));
//!
//!     manager.router().add_route("quote", |msg| {
//!         println!("{:?} from {:?}", msg.envelope, msg.origin);
//!         Ok(())
//!     });
//!
//!     let conn = manager.create_connection(
//!         "primary",
//!         "wss://api.example.com/stream",
//!         ConnectOptions::new()
//!             .with_reconnect_base_delay(Duration::from_secs(1))
//!             .with_heartbeat_interval(Duration::from_secs(30)),
//!     )?;
//!     conn.authenticate("my-token")?;
//!     conn.connect()?;
//!
//!     conn.send(Envelope::new("subscribe").with_field("channel", "quotes"))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod envelope;
pub mod manager;
pub mod router;
pub mod traits;
pub mod ws;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use core::{
    AtomicConnectionState, AtomicMetrics, ConnectOptions, Connection, ConnectionMetrics,
    ConnectionState, ObserverHandle, PendingQueue, SendOutcome,
};

// Re-export the wire envelope
pub use envelope::{AuthOutcome, Envelope};

// Re-export routing
pub use router::{
    FilterHandle, MessageRouter, RouteHandle, RouteMetrics, RoutedMessage, RouterMetrics,
};

// Re-export the manager
pub use manager::{ConnectionManager, ManagerMetrics};

// Re-export the production transport
pub use ws::WebSocketTransport;
