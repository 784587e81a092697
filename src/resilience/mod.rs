//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! File watcher processing:
//!     → retries.rs (bounded attempts, fixed delay)
//!
//! Row cleaning with a deadline:
//!     → timeouts.rs (race a detached task against a timer)
//! ```
//!
//! # Design Decisions
//! - Timed-out work is not cancelled; its result is discarded
//! - Retries are bounded and never block other paths

pub mod retries;
pub mod timeouts;

pub use retries::RetryPolicy;
pub use timeouts::{race_detached, DetachedError};
