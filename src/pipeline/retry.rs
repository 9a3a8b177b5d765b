//! Bounded retry with exponential backoff.
//!
//! Wraps a single blocking call; which errors are transient is decided by
//! the caller's predicate. Independent of how callers schedule their
//! fan-out. Nothing is ever retried more than `max_attempts` times total.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first try included. Must be at least 1.
    pub max_attempts: u32,
    /// Delay before attempt 2; doubles each further attempt.
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_backoff,
        }
    }

    /// Backoff before the given retry (1-based retry count).
    fn backoff_for(&self, retry: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(retry - 1)
    }
}

/// Run `op`, retrying while `is_transient` holds and attempts remain.
/// The final error is returned unchanged once attempts are exhausted or a
/// non-transient error appears.
pub fn with_retry<T, E, Op, Pred>(
    policy: &RetryPolicy,
    label: &str,
    mut op: Op,
    is_transient: Pred,
) -> Result<T, E>
where
    Op: FnMut() -> Result<T, E>,
    Pred: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) && attempt < policy.max_attempts => {
                let delay = policy.backoff_for(attempt);
                tracing::warn!(
                    label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, backing off"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
