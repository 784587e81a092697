//! Retry logic.
//!
//! # Responsibilities
//! - Re-run a fallible async operation a bounded number of times
//! - Wait a fixed delay between attempts
//! - Report the attempt number to the operation so callers can track state

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Bounded retry with a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Run `op` until it succeeds or attempts are exhausted.
    ///
    /// `op` receives the zero-based attempt number. The last error is returned.
    pub async fn run<F, Fut, T, E>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        operation,
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => {
                    tracing::error!(operation, attempts = attempt + 1, error = %e, "Operation failed, retries exhausted");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let result: Result<u32, String> = policy
            .run("flaky", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { if attempt < 2 { Err("not yet".to_string()) } else { Ok(attempt) } }
            })
            .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let result: Result<(), String> = policy
            .run("broken", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom".to_string()) }
            })
            .await;
        assert_eq!(result, Err("boom".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), policy.max_attempts());
    }
}
