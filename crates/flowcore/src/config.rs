use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Execution semantics of one processor's dispatch stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Jobs allowed past the parallelize gate at once
    pub max_jobs: usize,

    /// Convert failures into error documents instead of propagating them
    pub error_bounce: bool,

    /// Try the next activity when the current one fails
    pub failover: bool,

    pub retry: RetryConfig,

    /// Upper bound on a single activity invocation
    pub invoke_timeout_ms: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_jobs: 1,
            error_bounce: true,
            failover: true,
            retry: RetryConfig::default(),
            invoke_timeout_ms: None,
        }
    }
}

impl DispatchConfig {
    pub fn with_max_jobs(mut self, max_jobs: usize) -> Self {
        self.max_jobs = max_jobs.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn without_error_bounce(mut self) -> Self {
        self.error_bounce = false;
        self
    }

    pub fn invoke_timeout(&self) -> Option<Duration> {
        self.invoke_timeout_ms.map(Duration::from_millis)
    }
}

/// Retry policy for failed invocations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            backoff_factor: 1.0,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, initial_delay_ms: u64, max_delay_ms: u64, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            initial_delay_ms,
            max_delay_ms,
            backoff_factor,
        }
    }

    /// Delay before re-submitting after the failure of attempt `attempt`
    /// (zero based): `min(max_delay, initial_delay * factor^attempt)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.max(0.0).powi(attempt.min(i32::MAX as u32) as i32);
        let millis = (self.initial_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(millis.max(0.0) as u64)
    }
}
