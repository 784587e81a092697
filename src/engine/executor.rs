//! Bounded-concurrency execution of field and row work.
//!
//! # Responsibilities
//! - Limit concurrent work units with a semaphore
//! - Run synchronous strategy code on the blocking pool
//! - Return results in submission order
//! - Turn a panicking unit into an error without failing the batch
//!
//! # Design Decisions
//! - Every unit is spawned up front and waits for a permit, so ordering
//!   comes from awaiting the handles in order
//! - Callers never acquire a permit from inside a unit

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Executor tuning.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Concurrent work units.
    pub max_concurrency: usize,
    /// Rows per batch chunk.
    pub chunk_size: usize,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            chunk_size: 100,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Task panicked: {0}")]
    Panicked(String),

    #[error("Task was cancelled")]
    Cancelled,

    #[error("Executor is closed")]
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub in_flight: usize,
    pub peak_in_flight: usize,
}

/// Decide whether fanning out is worth the scheduling cost.
pub fn should_use_parallel(field_count: usize, row_count: usize) -> bool {
    field_count >= 5 || (row_count > 1 && field_count >= 3) || field_count * row_count >= 20
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Holds one in-flight slot; released on drop, including unwinds.
struct InFlight<'a>(&'a Counters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a Counters) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        counters.peak_in_flight.fetch_max(now, Ordering::AcqRel);
        Self(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A fixed-size pool gated by a semaphore.
pub struct ParallelExecutor {
    permits: Arc<Semaphore>,
    options: ExecutorOptions,
    counters: Arc<Counters>,
}

impl ParallelExecutor {
    pub fn new(options: ExecutorOptions) -> Self {
        let size = options.max_concurrency.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            options: ExecutorOptions {
                max_concurrency: size,
                chunk_size: options.chunk_size.max(1),
            },
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    pub fn chunk_size(&self) -> usize {
        self.options.chunk_size
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run async units concurrently; results keep submission order.
    pub async fn run<T, Fut>(&self, units: Vec<Fut>) -> Vec<Result<T, ExecutorError>>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.execute(units.into_iter().map(|unit| async move { Ok::<T, ExecutorError>(unit.await) }).collect())
            .await
    }

    /// Run blocking closures on the blocking pool; results keep submission order.
    pub async fn run_blocking<T, F>(&self, units: Vec<F>) -> Vec<Result<T, ExecutorError>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.execute(
            units
                .into_iter()
                .map(|unit| async move { tokio::task::spawn_blocking(unit).await.map_err(join_error_to_executor) })
                .collect(),
        )
        .await
    }

    async fn execute<T, Fut>(&self, units: Vec<Fut>) -> Vec<Result<T, ExecutorError>>
    where
        Fut: Future<Output = Result<T, ExecutorError>> + Send + 'static,
        T: Send + 'static,
    {
        let handles: Vec<_> = units
            .into_iter()
            .map(|unit| {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                let permits = self.permits.clone();
                let counters = self.counters.clone();
                tokio::spawn(async move {
                    let _permit = permits.acquire_owned().await.map_err(|_| ExecutorError::Closed)?;
                    let _slot = InFlight::enter(&counters);
                    unit.await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let result = handle.await.unwrap_or_else(|join_error| Err(join_error_to_executor(join_error)));
            match &result {
                Ok(_) => {
                    self.counters.completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Work unit failed");
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
            results.push(result);
        }
        results
    }

    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
            peak_in_flight: self.counters.peak_in_flight.load(Ordering::Relaxed),
        }
    }
}

impl Default for ParallelExecutor {
    fn default() -> Self {
        Self::new(ExecutorOptions::default())
    }
}

fn join_error_to_executor(join_error: tokio::task::JoinError) -> ExecutorError {
    if join_error.is_cancelled() {
        return ExecutorError::Cancelled;
    }
    let panic = join_error.into_panic();
    let reason = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    ExecutorError::Panicked(reason)
}
