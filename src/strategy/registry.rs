//! Strategy registry.
//!
//! # Responsibilities
//! - Map strategy names to implementations
//! - Reject malformed registrations
//! - Overwrite (with a warning) on re-registration

use std::sync::Arc;
use dashmap::DashMap;

use crate::strategy::builtin;
use crate::strategy::types::{StrategyError, StrategyResult};
use crate::strategy::ValidationStrategy;

/// Thread-safe name → strategy lookup.
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    strategies: DashMap<String, Arc<dyn ValidationStrategy>>,
}

impl StrategyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-populated with the built-in strategies.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for strategy in builtin::all() {
            // Built-ins always carry a name and description.
            if let Err(e) = registry.register(strategy) {
                tracing::error!(error = %e, "Failed to register built-in strategy");
            }
        }
        registry
    }

    /// Register a strategy under its own name.
    pub fn register(&self, strategy: Arc<dyn ValidationStrategy>) -> StrategyResult<()> {
        let name = strategy.name().trim().to_string();
        if name.is_empty() {
            return Err(StrategyError::InvalidStrategy("strategy name is empty".into()));
        }
        if strategy.description().trim().is_empty() {
            return Err(StrategyError::InvalidStrategy(format!(
                "strategy '{}' has no description",
                name
            )));
        }

        if self.strategies.insert(name.clone(), strategy).is_some() {
            tracing::warn!(strategy = %name, "Strategy re-registered, previous implementation replaced");
        } else {
            tracing::debug!(strategy = %name, "Strategy registered");
        }
        Ok(())
    }

    /// Remove a strategy. Returns true if it was present.
    pub fn unregister(&self, name: &str) -> bool {
        self.strategies.remove(name).is_some()
    }

    /// Look up a strategy by name.
    pub fn get(&self, name: &str) -> StrategyResult<Arc<dyn ValidationStrategy>> {
        self.strategies
            .get(name)
            .map(|r| r.value().clone())
            .ok_or_else(|| StrategyError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::types::{ErrorCode, ValidationResult};
    use serde_json::{json, Value};

    struct Upper {
        description: &'static str,
    }

    impl ValidationStrategy for Upper {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            self.description
        }
        fn validate_params(&self, _params: &Value) -> Result<(), Vec<String>> {
            Ok(())
        }
        fn validate(&self, value: &Value, _params: &Value) -> ValidationResult {
            match value.as_str() {
                Some(s) => ValidationResult::ok(json!(s.to_uppercase())),
                None => ValidationResult::fail(ErrorCode::InvalidFormat, "not a string"),
            }
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = StrategyRegistry::new();
        registry.register(Arc::new(Upper { description: "uppercases" })).unwrap();

        let strategy = registry.get("upper").unwrap();
        let result = strategy.validate(&json!("abc"), &json!({}));
        assert_eq!(result.value, Some(json!("ABC")));
        assert!(registry.contains("upper"));
    }

    #[test]
    fn test_missing_strategy_is_typed() {
        let registry = StrategyRegistry::new();
        let err = registry.get("phone").unwrap_err();
        assert_eq!(err, StrategyError::NotFound("phone".into()));
        assert_eq!(err.code(), ErrorCode::StrategyNotFound);
    }

    #[test]
    fn test_rejects_missing_description() {
        let registry = StrategyRegistry::new();
        let err = registry.register(Arc::new(Upper { description: " " })).unwrap_err();
        assert!(matches!(err, StrategyError::InvalidStrategy(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reregistration_overwrites() {
        let registry = StrategyRegistry::new();
        registry.register(Arc::new(Upper { description: "first" })).unwrap();
        registry.register(Arc::new(Upper { description: "second" })).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("upper").unwrap().description(), "second");
    }

    #[test]
    fn test_builtins_present() {
        let registry = StrategyRegistry::with_builtins();
        for name in ["required", "trim", "case", "range", "length", "regex", "enum"] {
            assert!(registry.contains(name), "missing builtin {}", name);
        }
    }
}
