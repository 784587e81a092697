//! Per-field rule resolution and combination.
//!
//! # Resolution
//! ```text
//! fieldRules[field] ∪ fieldRules[columnType] ∪ fieldRules["*"]
//!     → dedup by rule name (first wins)
//!     → priority descending (stable)
//!     → cap at maxRulesPerField
//!     → condition filter against the row
//! ```
//!
//! # Combination
//! - Any required rule ⇒ AND: rules chain their outputs; a required failure
//!   stops and reverts the value to what entered the combination
//! - Otherwise OR: the first success wins; if all fail the original value
//!   is kept and every error is reported
//! - Optional failures never block; they become warnings

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use serde::Serialize;
use serde_json::Value;

use crate::config::schema::{FieldRule, RuleConfiguration, WILDCARD_FIELD};
use crate::engine::condition;
use crate::engine::Row;
use crate::observability::metrics;
use crate::strategy::{ErrorCode, StrategyCache, ValidationResult};

/// A rule failure attached to a field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleError {
    pub rule: String,
    pub code: ErrorCode,
    pub message: String,
}

/// Outcome of processing one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldResult {
    pub field_name: String,
    pub original_value: Value,
    pub processed_value: Value,
    pub success: bool,
    pub errors: Vec<RuleError>,
    pub warnings: Vec<RuleError>,
    /// Rules whose outputs compose `processed_value`.
    pub applied_rules: Vec<String>,
}

impl FieldResult {
    fn unchanged(field: &str, value: &Value) -> Self {
        Self {
            field_name: field.to_string(),
            original_value: value.clone(),
            processed_value: value.clone(),
            success: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            applied_rules: Vec::new(),
        }
    }
}

/// Applies a configuration's rules to individual field values.
pub struct FieldProcessor {
    cache: Arc<StrategyCache>,
}

impl FieldProcessor {
    pub fn new(cache: Arc<StrategyCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<StrategyCache> {
        &self.cache
    }

    /// Candidate rules for a field in evaluation order, before conditions.
    pub fn resolve_rules<'a>(
        &self,
        config: &'a RuleConfiguration,
        field: &str,
        column_type: Option<&str>,
    ) -> Vec<&'a FieldRule> {
        let mut keys = vec![field];
        if let Some(column_type) = column_type.filter(|t| *t != field) {
            keys.push(column_type);
        }
        if field != WILDCARD_FIELD {
            keys.push(WILDCARD_FIELD);
        }

        let mut seen = HashSet::new();
        let mut rules: Vec<&'a FieldRule> = Vec::new();
        for list in keys.into_iter().filter_map(|key| config.field_rules.get(key)) {
            for rule in list {
                if seen.insert(rule.name.as_str()) {
                    rules.push(rule);
                }
            }
        }
        rules.sort_by_key(|rule| std::cmp::Reverse(rule.priority));

        let cap = config.global_settings.max_rules_per_field;
        if rules.len() > cap {
            tracing::warn!(field, rules = rules.len(), cap, "Rule count exceeds cap, truncating");
            rules.truncate(cap);
        }
        rules
    }

    /// Process one field value.
    pub fn process_field(
        &self,
        config: &RuleConfiguration,
        field: &str,
        value: &Value,
        column_type: Option<&str>,
        row: Option<&Row>,
    ) -> FieldResult {
        let start = Instant::now();
        let rules: Vec<&FieldRule> = self
            .resolve_rules(config, field, column_type)
            .into_iter()
            .filter(|rule| rule.condition.as_ref().map_or(true, |c| condition::applies(c, row)))
            .collect();

        let result = match rules.as_slice() {
            [] => FieldResult::unchanged(field, value),
            [rule] => self.single(field, value, rule),
            _ if rules.iter().any(|r| r.required) => self.all_of(field, value, &rules),
            _ => self.any_of(field, value, &rules),
        };

        metrics::record_field_processed(result.success, start);
        tracing::trace!(
            field,
            success = result.success,
            applied = result.applied_rules.len(),
            "Field processed"
        );
        result
    }

    fn single(&self, field: &str, value: &Value, rule: &FieldRule) -> FieldResult {
        let mut result = FieldResult::unchanged(field, value);
        match self.run_rule(rule, value) {
            Ok(output) => {
                result.processed_value = output;
                result.applied_rules.push(rule.name.clone());
            }
            Err(error) => {
                result.success = false;
                result.errors.push(error);
            }
        }
        result
    }

    fn all_of(&self, field: &str, value: &Value, rules: &[&FieldRule]) -> FieldResult {
        let mut result = FieldResult::unchanged(field, value);
        let mut current = value.clone();

        for rule in rules {
            match self.run_rule(rule, &current) {
                Ok(output) => {
                    current = output;
                    result.applied_rules.push(rule.name.clone());
                }
                Err(error) if rule.required => {
                    result.success = false;
                    result.errors.push(error);
                    result.applied_rules.clear();
                    return result;
                }
                Err(warning) => result.warnings.push(warning),
            }
        }

        result.processed_value = current;
        result
    }

    fn any_of(&self, field: &str, value: &Value, rules: &[&FieldRule]) -> FieldResult {
        let mut result = FieldResult::unchanged(field, value);

        for rule in rules {
            match self.run_rule(rule, value) {
                Ok(output) => {
                    result.processed_value = output;
                    result.applied_rules.push(rule.name.clone());
                    return result;
                }
                Err(warning) => result.warnings.push(warning),
            }
        }

        result.success = false;
        result.errors = std::mem::take(&mut result.warnings);
        result
    }

    /// Run one rule. Strategy failures, lookup errors and panics all become
    /// a [`RuleError`].
    fn run_rule(&self, rule: &FieldRule, value: &Value) -> Result<Value, RuleError> {
        let bound = self
            .cache
            .get_or_create(&rule.strategy, &rule.params)
            .map_err(|e| RuleError {
                rule: rule.name.clone(),
                code: e.code(),
                message: e.to_string(),
            })?;

        let outcome = catch_unwind(AssertUnwindSafe(|| bound.validate(value))).unwrap_or_else(|panic| {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(rule = %rule.name, strategy = %rule.strategy, reason = %reason, "Strategy panicked");
            ValidationResult::fail(ErrorCode::ProcessingError, format!("strategy '{}' panicked: {}", rule.strategy, reason))
        });

        if outcome.success {
            return Ok(outcome.value.unwrap_or_else(|| value.clone()));
        }

        let code = outcome.error_code.unwrap_or(ErrorCode::FieldValidationError);
        let message = match (&rule.error_message, code) {
            (_, ErrorCode::ProcessingError) | (None, _) => outcome
                .error
                .unwrap_or_else(|| format!("rule '{}' failed", rule.name)),
            (Some(custom), _) => custom.clone(),
        };
        Err(RuleError {
            rule: rule.name.clone(),
            code,
            message,
        })
    }
}
