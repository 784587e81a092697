//! Rule evaluation subsystem.
//!
//! # Data Flow
//! ```text
//! RuleEngine::clean_row / clean_batch
//!     → ConfigurationManager::current() (one snapshot per call)
//!     → executor.rs (bounded fan-out, ordered results)
//!     → processor.rs (resolve, filter by condition.rs, combine)
//!     → StrategyCache → BoundStrategy::validate
//! ```
//!
//! # Design Decisions
//! - Strategy failures never escape a field; they become structured errors
//! - A row is a JSON object; field order in results follows the row
//! - Configuration changes mid-batch do not affect the running batch

use serde_json::{Map, Value};

pub mod condition;
pub mod executor;
pub mod processor;
pub mod rule_engine;

/// A record: field name → value.
pub type Row = Map<String, Value>;

pub use executor::{should_use_parallel, ExecutorError, ExecutorOptions, ExecutorStats, ParallelExecutor};
pub use processor::{FieldProcessor, FieldResult, RuleError};
pub use rule_engine::{BatchResult, ColumnTypes, EngineOptions, RowError, RowResult, RuleEngine};
