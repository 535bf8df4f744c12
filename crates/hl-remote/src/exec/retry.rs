//! Linear backoff between command attempts

use std::time::Duration;

use hl_core::config::ExecutorConfig;

/// Attempt budget and backoff for one `execute` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first
    max_attempts: u32,
    /// Base delay, multiplied by the attempt number
    base_delay: Duration,
}

impl RetryPolicy {
    /// Create a new policy from configuration
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(config.max_attempts, config.retry_delay)
    }

    /// Create a new policy with custom parameters.
    ///
    /// At least one attempt is always made.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Total attempts allowed
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based)
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ExecutorConfig::default())
    }
}
