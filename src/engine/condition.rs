//! Rule condition evaluation against sibling fields.

use serde_json::Value;

use crate::config::schema::{ConditionOperator, RuleCondition};
use crate::engine::Row;
use crate::strategy::builtin::{coerce_number, value_as_text};

/// Decide whether a conditional rule applies.
///
/// Without row context every condition applies. Unknown operators apply
/// with a warning.
pub fn applies(condition: &RuleCondition, row: Option<&Row>) -> bool {
    let Some(row) = row else {
        return true;
    };
    let actual = row.get(&condition.field).unwrap_or(&Value::Null);
    let expected = condition.value.as_ref();

    match &condition.operator {
        ConditionOperator::Equals => expected.is_some_and(|e| loosely_equal(actual, e)),
        ConditionOperator::NotEquals => !expected.is_some_and(|e| loosely_equal(actual, e)),
        ConditionOperator::Gt => compare(actual, expected).is_some_and(|(a, e)| a > e),
        ConditionOperator::Lt => compare(actual, expected).is_some_and(|(a, e)| a < e),
        ConditionOperator::Contains => expected.is_some_and(|e| contains(actual, e)),
        ConditionOperator::NotContains => !expected.is_some_and(|e| contains(actual, e)),
        ConditionOperator::IsEmpty => is_empty(actual),
        ConditionOperator::IsNotEmpty => !is_empty(actual),
        ConditionOperator::Unknown(op) => {
            tracing::warn!(operator = %op, field = %condition.field, "Unknown condition operator, applying rule");
            true
        }
    }
}

fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (value_as_text(actual), value_as_text(expected)) {
        (Some(a), Some(e)) => a == e,
        _ => false,
    }
}

fn compare(actual: &Value, expected: Option<&Value>) -> Option<(f64, f64)> {
    Some((coerce_number(actual)?, coerce_number(expected?)?))
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, expected)),
        _ => match (value_as_text(actual), value_as_text(expected)) {
            (Some(a), Some(e)) => a.contains(&e),
            _ => false,
        },
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
