//! Command executor configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::{duration_millis, duration_secs};

/// Retry and timeout behaviour of the command executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Attempts per command, including the first
    pub max_attempts: u32,

    /// Base backoff delay; attempt `n` waits `n * retry_delay`
    #[serde(rename = "retry_delay_ms", with = "duration_millis")]
    pub retry_delay: Duration,

    /// Bound on connect + authenticate for one attempt
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(1000),
            connect_timeout: Duration::from_secs(10),
        }
    }
}
