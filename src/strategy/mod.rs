//! Validation strategy subsystem.
//!
//! # Data Flow
//! ```text
//! FieldRule { strategy, params }
//!     → cache.rs (lookup by name + params hash)
//!         → miss: registry.rs (name → Arc<dyn ValidationStrategy>)
//!                 → validate_params → BoundStrategy inserted
//!     → BoundStrategy::validate(value)
//!     → ValidationResult
//! ```
//!
//! # Design Decisions
//! - Strategies are stateless trait objects shared via Arc
//! - "Not found" is a typed error, never a panic
//! - An instance is a strategy bound to parameters that already passed
//!   `validate_params`, so cache hits skip parameter checks

use std::sync::Arc;
use serde_json::Value;

pub mod builtin;
pub mod cache;
pub mod registry;
pub mod types;

pub use cache::{CacheOptions, CacheStats, StrategyCache};
pub use registry::StrategyRegistry;
pub use types::{ErrorCode, StrategyError, StrategyResult, ValidationResult};

/// A named, pluggable validator/transformer for a single field value.
///
/// Implementations must be cheap to call concurrently; `validate` is invoked
/// from blocking worker threads.
pub trait ValidationStrategy: Send + Sync {
    /// Registry key, e.g. `"range"`.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Check a parameter object. Returns every problem found.
    fn validate_params(&self, params: &Value) -> Result<(), Vec<String>>;

    /// Validate (and possibly transform) a value.
    fn validate(&self, value: &Value, params: &Value) -> ValidationResult;
}

impl std::fmt::Debug for dyn ValidationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationStrategy")
            .field("name", &self.name())
            .finish()
    }
}

/// A strategy bound to a validated parameter set.
#[derive(Debug, Clone)]
pub struct BoundStrategy {
    strategy: Arc<dyn ValidationStrategy>,
    params: Value,
    params_hash: String,
}

impl BoundStrategy {
    pub(crate) fn new(strategy: Arc<dyn ValidationStrategy>, params: Value, params_hash: String) -> Self {
        Self {
            strategy,
            params,
            params_hash,
        }
    }

    pub fn name(&self) -> &str {
        self.strategy.name()
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    pub fn params_hash(&self) -> &str {
        &self.params_hash
    }

    /// Run the strategy against a value.
    pub fn validate(&self, value: &Value) -> ValidationResult {
        self.strategy.validate(value, &self.params)
    }
}
