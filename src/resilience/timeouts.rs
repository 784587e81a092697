//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound how long a caller waits for a unit of work
//! - Leave the work running when the deadline passes
//! - Surface panics in the work as errors

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DetachedError {
    #[error("Timed out after {}ms", .0.as_millis())]
    Elapsed(Duration),

    #[error("Task panicked: {0}")]
    Panicked(String),
}

/// Spawn `work` and wait at most `limit` for it.
///
/// On timeout the spawned task keeps running and its output is dropped.
pub async fn race_detached<F, T>(limit: Duration, work: F) -> Result<T, DetachedError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(work);
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join_error)) => Err(DetachedError::Panicked(join_error.to_string())),
        Err(_) => Err(DetachedError::Elapsed(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_completes_within_limit() {
        let result = race_detached(Duration::from_secs(1), async { 7 }).await;
        assert_eq!(result, Ok(7));
    }

    #[tokio::test]
    async fn test_elapsed_leaves_work_running() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let result = race_detached(Duration::from_millis(10), async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        })
        .await;
        assert_eq!(result, Err(DetachedError::Elapsed(Duration::from_millis(10))));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panic_is_reported() {
        let result: Result<(), _> = race_detached(Duration::from_secs(1), async { panic!("bad row") }).await;
        assert!(matches!(result, Err(DetachedError::Panicked(_))));
    }
}
