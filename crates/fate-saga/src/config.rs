use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `[executor]` section of the master configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExecutorConfig {
    /// Number of worker threads running step quanta.
    pub worker_threads: usize,
    /// Lower bound for a requeue delay.
    pub min_retry_ms: u64,
    /// Upper bound for a requeue delay.
    pub max_retry_ms: u64,
    /// How often an operational error is retried before the transaction fails.
    pub operational_retry_limit: u32,
    /// Base delay for operational retries; doubles with each attempt.
    pub operational_backoff_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            min_retry_ms: 10,
            max_retry_ms: 60_000,
            operational_retry_limit: 3,
            operational_backoff_ms: 100,
        }
    }
}

impl ExecutorConfig {
    #[must_use]
    pub fn min_retry(&self) -> Duration {
        Duration::from_millis(self.min_retry_ms)
    }

    /// Clamps a step-reported delay into `[min_retry, max_retry]`.
    #[must_use]
    pub fn clamp_retry(&self, delay: Duration) -> Duration {
        let max = Duration::from_millis(self.max_retry_ms.max(self.min_retry_ms));
        delay.clamp(self.min_retry(), max)
    }

    /// Delay before operational retry number `attempt` (starting at 0).
    #[must_use]
    pub fn operational_backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
        self.clamp_retry(Duration::from_millis(
            self.operational_backoff_ms.saturating_mul(factor),
        ))
    }
}
