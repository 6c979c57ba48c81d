use std::time::Duration;

/// Configuration for a [`Connection`](crate::Connection)
///
/// All timing knobs are [`Duration`]s. `heartbeat_interval` of `None`
/// disables heartbeats entirely; `heartbeat_timeout` of `None` keeps the
/// heartbeat send-only (no liveness enforcement).
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Delay before the first retry; doubles on each subsequent failure
    pub reconnect_base_delay: Duration,
    /// Upper bound on the retry delay
    pub reconnect_max_delay: Duration,
    /// Consecutive failures tolerated before the connection goes FAILED
    pub max_reconnect_attempts: u32,
    /// Interval between outbound heartbeat frames once sendable
    pub heartbeat_interval: Option<Duration>,
    /// Treat an unacknowledged heartbeat older than this as a dead link
    pub heartbeat_timeout: Option<Duration>,
    /// Bound on how long CONNECTING/AUTHENTICATING may remain pending
    pub connect_timeout: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            max_reconnect_attempts: 10,
            heartbeat_interval: None,
            heartbeat_timeout: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = delay;
        self
    }

    pub fn with_reconnect_max_delay(mut self, delay: Duration) -> Self {
        self.reconnect_max_delay = delay;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = Some(timeout);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
