//! Retry policy: exponential backoff with a hard delay cap.

use std::time::Duration;

use super::{ClassifiedError, RecoveryStrategy};

/// Policy for retrying an operation with exponential backoff.
///
/// Delay at attempt `k` (0-indexed) is `min(initial * base^k, max_delay)`,
/// so the sequence is monotonically non-decreasing and bounded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
}

impl RetryPolicy {
    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        exponential_base: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            exponential_base,
        }
    }

    /// Backoff delay for a given attempt number (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.exponential_base.powi(attempt as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// Whether to retry: true iff attempts remain and the error is not
    /// abort-class.
    pub fn should_retry(&self, attempt: u32, error: &ClassifiedError) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        error.recovery_strategy != RecoveryStrategy::Abort
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        general_retry_policy()
    }
}

/// Default policy for LLM calls and general operations: 3 retries, 1 s → 30 s.
pub fn general_retry_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30), 2.0)
}

/// Fewer retries for JSON parse round trips: 2 retries.
pub fn json_parse_retry_policy() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_secs(1), Duration::from_secs(30), 2.0)
}

/// More patience for connection loss: 5 retries starting at 2 s.
pub fn connection_retry_policy() -> RetryPolicy {
    RetryPolicy::new(5, Duration::from_secs(2), Duration::from_secs(30), 2.0)
}
