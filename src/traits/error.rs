use std::time::Duration;
use thiserror::Error;

/// Main error type for durasock
#[derive(Error, Debug)]
pub enum DuraSockError {
    /// Underlying transport open/send/receive failure
    #[error("transport error: {0}")]
    Transport(String),

    /// A connection or authentication attempt exceeded its deadline
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Server rejected the credential
    #[error("authentication rejected: {0}")]
    AuthenticationFailed(String),

    /// Reconnection ceiling reached; requires an explicit reconnect()
    #[error("reconnect attempts exhausted after {attempts} attempts")]
    AttemptsExhausted { attempts: u32 },

    /// A connection with this identity already exists in the manager
    #[error("connection '{0}' already exists")]
    DuplicateIdentity(String),

    /// No connection with this identity exists in the manager
    #[error("no connection named '{0}'")]
    UnknownIdentity(String),

    /// A registered route handler failed
    #[error("route handler failed for '{message_type}': {reason}")]
    Handler {
        message_type: String,
        reason: String,
    },

    /// The connection was explicitly closed and accepts no further work
    #[error("connection is closed")]
    ConnectionClosed,

    /// An inbound frame could not be decoded as a wire envelope
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// An internal channel was closed unexpectedly
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),
}

/// Result type for durasock operations
pub type Result<T> = std::result::Result<T, DuraSockError>;
