//! Core traits and types for the durasock connection layer.
//!
//! - **Transport**: the abstract duplex frame channel beneath a connection
//! - **BackoffPolicy**: reconnection delay strategies
//! - **DuraSockError**: the crate-wide error taxonomy

pub mod backoff;
pub mod error;
pub mod transport;

// Re-export commonly used types
pub use backoff::{BackoffPolicy, ExponentialBackoff, FixedDelay};
pub use error::{DuraSockError, Result};
pub use transport::{Frame, LinkCommand, Transport, TransportEvent, TransportLink};
