//! Connection machinery: the state machine, its configuration, the pending
//! queue and the observer registry.

pub(crate) mod actor;
pub mod config;
pub mod connection;
pub mod observers;
pub mod queue;
pub mod state;

pub use config::ConnectOptions;
pub use connection::{Connection, ConnectionMetrics, ObserverHandle, SendOutcome};
pub use queue::PendingQueue;
pub use state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
