use std::time::Duration;

/// Exponent clamp so `base * 2^attempt` cannot overflow a u64 of millis.
const MAX_SHIFT: u32 = 20;

/// Trait for computing the delay before a reconnection attempt
///
/// Implementations must be pure: the same attempt number always yields the
/// same delay, and delays are monotonically non-decreasing in `attempt` up to
/// the policy's cap.
pub trait BackoffPolicy: Send + Sync {
    /// Get the delay before reconnection attempt `attempt` (0-indexed)
    fn delay(&self, attempt: u32) -> Duration;
}

/// Exponential backoff policy
///
/// Delays grow as `base * 2^attempt`, capped at `cap`. The exponent is
/// clamped internally so large attempt numbers cannot overflow.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    cap: Duration,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff policy
    ///
    /// # Arguments
    /// * `base` - The delay before the first retry
    /// * `cap` - The maximum delay between retries
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.min(MAX_SHIFT);
        let millis = (self.base.as_millis() as u64)
            .saturating_mul(1u64 << shift)
            .min(self.cap.as_millis() as u64);
        Duration::from_millis(millis)
    }
}

/// Fixed delay policy
///
/// Always waits the same amount of time between reconnection attempts
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    /// Create a new fixed delay policy
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffPolicy for FixedDelay {
    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}
