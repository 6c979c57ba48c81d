//! Lock-free connection state and throughput counters
//!
//! State lives in an atomic so the handle can read it without a round trip
//! to the connection's event loop.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Lifecycle state of a [`Connection`](crate::Connection)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Not connected and no attempt in flight
    Disconnected = 0,
    /// Transport open in progress
    Connecting = 1,
    /// Transport established; sendable when no credential is configured
    Open = 2,
    /// Credential sent, awaiting the server's auth response
    Authenticating = 3,
    /// Credential accepted; sendable
    Authenticated = 4,
    /// Explicit close initiated, waiting for the transport to confirm
    Closing = 5,
    /// Terminal after an explicit close
    Closed = 6,
    /// A retry timer is armed
    ReconnectScheduled = 7,
    /// Attempt ceiling reached; terminal until a manual reconnect
    Failed = 8,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Disconnected,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Open,
            3 => ConnectionState::Authenticating,
            4 => ConnectionState::Authenticated,
            5 => ConnectionState::Closing,
            6 => ConnectionState::Closed,
            7 => ConnectionState::ReconnectScheduled,
            _ => ConnectionState::Failed,
        }
    }

    /// True while a transport instance is live or being established
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::Open
                | ConnectionState::Authenticating
                | ConnectionState::Authenticated
        )
    }

    /// True once the transport is established (auth may still be pending)
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            ConnectionState::Open
                | ConnectionState::Authenticating
                | ConnectionState::Authenticated
        )
    }
}

/// Atomic wrapper around [`ConnectionState`]
pub struct AtomicConnectionState {
    state: AtomicU8,
}

impl AtomicConnectionState {
    pub fn new(initial: ConnectionState) -> Self {
        Self {
            state: AtomicU8::new(initial as u8),
        }
    }

    #[inline]
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.get().is_connected()
    }
}

/// Lock-free throughput counters shared between handle and event loop
#[derive(Default)]
pub struct AtomicMetrics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    reconnect_count: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_reconnects(&self) {
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::Relaxed)
    }
}
