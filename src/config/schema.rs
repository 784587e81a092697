//! Configuration schema definitions.
//!
//! This module defines the rule configuration document. All types derive
//! Serde traits; documents on disk use camelCase keys.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Key under which rules apply to every field.
pub const WILDCARD_FIELD: &str = "*";

/// Root rule configuration document.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfiguration {
    /// Identity and version of the rule set.
    pub metadata: ConfigMetadata,

    /// Rules per field name, column type, or `*`.
    #[serde(default)]
    pub field_rules: BTreeMap<String, Vec<FieldRule>>,

    /// Engine-wide behavior.
    #[serde(default)]
    pub global_settings: GlobalSettings,
}

impl RuleConfiguration {
    /// Total number of rules across all fields.
    pub fn rule_count(&self) -> usize {
        self.field_rules.values().map(Vec::len).sum()
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }
}

/// Metadata block.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMetadata {
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub version: String,

    #[serde(default)]
    pub priority: i64,
}

/// A strategy + parameters binding on a field.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRule {
    /// Unique within a field after deduplication.
    pub name: String,

    /// Registered strategy name.
    #[serde(alias = "strategyName")]
    pub strategy: String,

    /// Strategy parameters (JSON object).
    #[serde(default = "empty_params")]
    pub params: Value,

    /// Required rules switch the field to AND combination.
    #[serde(default)]
    pub required: bool,

    /// Higher priority runs first.
    #[serde(default)]
    pub priority: i32,

    /// Overrides the strategy's error text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Only apply when a sibling field satisfies this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<RuleCondition>,
}

fn empty_params() -> Value {
    json!({})
}

impl FieldRule {
    /// Build an unconditional rule.
    pub fn new(name: impl Into<String>, strategy: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            strategy: strategy.into(),
            params,
            required: false,
            priority: 0,
            error_message: None,
            condition: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_condition(mut self, condition: RuleCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Flat comparison against a sibling field.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RuleCondition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Condition operators. Unrecognized names are kept so evaluation can warn.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Gt,
    Lt,
    Contains,
    NotContains,
    IsEmpty,
    IsNotEmpty,
    Unknown(String),
}

impl From<String> for ConditionOperator {
    fn from(s: String) -> Self {
        match s.as_str() {
            "equals" => ConditionOperator::Equals,
            "not-equals" => ConditionOperator::NotEquals,
            "gt" => ConditionOperator::Gt,
            "lt" => ConditionOperator::Lt,
            "contains" => ConditionOperator::Contains,
            "not-contains" => ConditionOperator::NotContains,
            "is-empty" => ConditionOperator::IsEmpty,
            "is-not-empty" => ConditionOperator::IsNotEmpty,
            _ => ConditionOperator::Unknown(s),
        }
    }
}

impl From<ConditionOperator> for String {
    fn from(op: ConditionOperator) -> Self {
        match op {
            ConditionOperator::Equals => "equals".into(),
            ConditionOperator::NotEquals => "not-equals".into(),
            ConditionOperator::Gt => "gt".into(),
            ConditionOperator::Lt => "lt".into(),
            ConditionOperator::Contains => "contains".into(),
            ConditionOperator::NotContains => "not-contains".into(),
            ConditionOperator::IsEmpty => "is-empty".into(),
            ConditionOperator::IsNotEmpty => "is-not-empty".into(),
            ConditionOperator::Unknown(s) => s,
        }
    }
}

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalSettings {
    /// Optional-rule warnings also fail the row.
    pub strict_mode: bool,

    /// Keep processing a batch after a failed row.
    pub continue_on_error: bool,

    /// Field error budget for a batch. Must be positive.
    pub max_errors: i64,

    /// Per-row processing deadline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_timeout_ms: Option<u64>,

    /// Cap on rules evaluated for one field.
    pub max_rules_per_field: usize,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            strict_mode: false,
            continue_on_error: true,
            max_errors: 1000,
            row_timeout_ms: None,
            max_rules_per_field: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_document() {
        let doc = json!({
            "metadata": {"name": "contacts", "version": "1.0.0"},
            "fieldRules": {
                "phone": [{
                    "name": "phone_length",
                    "strategyName": "length",
                    "params": {"exactLength": 11},
                    "required": true,
                    "condition": {"field": "country", "operator": "equals", "value": "CN"}
                }]
            },
            "globalSettings": {"strictMode": true}
        });
        let config: RuleConfiguration = serde_json::from_value(doc).unwrap();
        let rule = &config.field_rules["phone"][0];
        assert_eq!(rule.strategy, "length");
        assert!(rule.required);
        assert_eq!(rule.condition.as_ref().unwrap().operator, ConditionOperator::Equals);
        assert!(config.global_settings.strict_mode);
        assert_eq!(config.global_settings.max_errors, 1000);
        assert_eq!(config.rule_count(), 1);
    }

    #[test]
    fn test_unknown_operator_round_trips() {
        let cond: RuleCondition =
            serde_json::from_value(json!({"field": "a", "operator": "matches"})).unwrap();
        assert_eq!(cond.operator, ConditionOperator::Unknown("matches".into()));
        let encoded = serde_json::to_value(&cond).unwrap();
        assert_eq!(encoded["operator"], json!("matches"));
    }

    #[test]
    fn test_params_default_to_object() {
        let rule: FieldRule =
            serde_json::from_value(json!({"name": "t", "strategy": "trim"})).unwrap();
        assert_eq!(rule.params, json!({}));
        assert_eq!(rule.priority, 0);
    }
}
