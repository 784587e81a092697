//! Built-in strategies.
//!
//! Generic checks and transforms that every deployment needs. Domain
//! validators (phone numbers, dates, addresses) are registered by the host
//! through the same trait.

use std::sync::Arc;
use dashmap::DashMap;
use regex::{Regex, RegexBuilder};
use serde_json::{json, Value};

use crate::strategy::types::{ErrorCode, ValidationResult};
use crate::strategy::ValidationStrategy;

/// Flags accepted in regex rule parameters.
pub const ALLOWED_REGEX_FLAGS: &str = "gimsuvy";

/// All built-in strategies.
pub fn all() -> Vec<Arc<dyn ValidationStrategy>> {
    vec![
        Arc::new(RequiredStrategy),
        Arc::new(TrimStrategy),
        Arc::new(CaseStrategy),
        Arc::new(RangeStrategy),
        Arc::new(LengthStrategy),
        Arc::new(RegexStrategy::default()),
        Arc::new(EnumStrategy),
    ]
}

/// Parse a number out of a JSON number or a numeric string.
pub(crate) fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Render scalars as text; containers and null have no text form.
pub(crate) fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Compile a pattern with JavaScript-style flags.
///
/// `g`, `y` and `v` have no meaning for a whole-value match and are ignored.
pub fn compile_pattern(pattern: &str, flags: &str) -> Result<Regex, String> {
    if let Some(bad) = flags.chars().find(|c| !ALLOWED_REGEX_FLAGS.contains(*c)) {
        return Err(format!("unsupported regex flag '{}'", bad));
    }
    RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
        .map_err(|e| e.to_string())
}

fn param_number(params: &Value, key: &str, errors: &mut Vec<String>) -> Option<f64> {
    match params.get(key) {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_f64() {
            Some(n) => Some(n),
            None => {
                errors.push(format!("{} must be a number", key));
                None
            }
        },
    }
}

fn param_length(params: &Value, key: &str, errors: &mut Vec<String>) -> Option<u64> {
    match params.get(key) {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_u64() {
            Some(n) => Some(n),
            None => {
                errors.push(format!("{} must be a non-negative integer", key));
                None
            }
        },
    }
}

fn param_bool(params: &Value, key: &str, default: bool) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn ensure_object(params: &Value) -> Result<(), Vec<String>> {
    if params.is_object() {
        Ok(())
    } else {
        Err(vec!["params must be an object".to_string()])
    }
}

fn finish(errors: Vec<String>) -> Result<(), Vec<String>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Fails on null, empty or whitespace-only values.
pub struct RequiredStrategy;

impl ValidationStrategy for RequiredStrategy {
    fn name(&self) -> &str {
        "required"
    }

    fn description(&self) -> &str {
        "Rejects missing or empty values"
    }

    fn validate_params(&self, params: &Value) -> Result<(), Vec<String>> {
        ensure_object(params)
    }

    fn validate(&self, value: &Value, params: &Value) -> ValidationResult {
        let allow_whitespace = param_bool(params, "allowWhitespace", false);
        let missing = match value {
            Value::Null => true,
            Value::String(s) if allow_whitespace => s.is_empty(),
            Value::String(s) => s.trim().is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            _ => false,
        };
        if missing {
            ValidationResult::fail(ErrorCode::RequiredFieldMissing, "value is required")
        } else {
            ValidationResult::ok(value.clone())
        }
    }
}

/// Trims surrounding whitespace from strings.
pub struct TrimStrategy;

impl ValidationStrategy for TrimStrategy {
    fn name(&self) -> &str {
        "trim"
    }

    fn description(&self) -> &str {
        "Trims whitespace, optionally collapsing inner runs"
    }

    fn validate_params(&self, params: &Value) -> Result<(), Vec<String>> {
        ensure_object(params)
    }

    fn validate(&self, value: &Value, params: &Value) -> ValidationResult {
        let Value::String(s) = value else {
            return ValidationResult::ok(value.clone());
        };
        let trimmed = if param_bool(params, "collapseWhitespace", false) {
            s.split_whitespace().collect::<Vec<_>>().join(" ")
        } else {
            s.trim().to_string()
        };
        ValidationResult::ok(Value::String(trimmed))
    }
}

/// Normalizes letter case.
pub struct CaseStrategy;

impl ValidationStrategy for CaseStrategy {
    fn name(&self) -> &str {
        "case"
    }

    fn description(&self) -> &str {
        "Converts strings to upper, lower or title case"
    }

    fn validate_params(&self, params: &Value) -> Result<(), Vec<String>> {
        ensure_object(params)?;
        match params.get("mode").and_then(Value::as_str) {
            Some("upper" | "lower" | "title") => Ok(()),
            Some(other) => Err(vec![format!("unknown case mode '{}'", other)]),
            None => Err(vec!["mode is required".to_string()]),
        }
    }

    fn validate(&self, value: &Value, params: &Value) -> ValidationResult {
        let Value::String(s) = value else {
            return ValidationResult::ok(value.clone());
        };
        let converted = match params.get("mode").and_then(Value::as_str) {
            Some("upper") => s.to_uppercase(),
            Some("lower") => s.to_lowercase(),
            Some("title") => s
                .split(' ')
                .map(|word| {
                    let mut chars = word.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<String>>()
                .join(" "),
            _ => s.clone(),
        };
        ValidationResult::ok(Value::String(converted))
    }
}

/// Numeric bounds check. Accepts numbers and numeric strings.
pub struct RangeStrategy;

impl ValidationStrategy for RangeStrategy {
    fn name(&self) -> &str {
        "range"
    }

    fn description(&self) -> &str {
        "Checks a numeric value against min/max bounds"
    }

    fn validate_params(&self, params: &Value) -> Result<(), Vec<String>> {
        ensure_object(params)?;
        let mut errors = Vec::new();
        let min = param_number(params, "min", &mut errors);
        let max = param_number(params, "max", &mut errors);
        if params.get("min").is_none() && params.get("max").is_none() {
            errors.push("at least one of min or max is required".to_string());
        }
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                errors.push(format!("min ({}) is greater than max ({})", min, max));
            }
        }
        finish(errors)
    }

    fn validate(&self, value: &Value, params: &Value) -> ValidationResult {
        let Some(n) = coerce_number(value) else {
            return ValidationResult::fail(ErrorCode::InvalidFormat, "value is not numeric");
        };
        let min = params.get("min").and_then(Value::as_f64);
        let max = params.get("max").and_then(Value::as_f64);

        if let Some(min) = min {
            if n < min {
                return ValidationResult::fail(
                    ErrorCode::OutOfRange,
                    format!("value {} is below minimum {}", n, min),
                );
            }
        }
        if let Some(max) = max {
            if n > max {
                return ValidationResult::fail(
                    ErrorCode::OutOfRange,
                    format!("value {} exceeds maximum {}", n, max),
                );
            }
        }
        ValidationResult::ok(value.clone())
    }
}

/// Character-length check.
pub struct LengthStrategy;

impl LengthStrategy {
    fn measure(value: &Value) -> Option<u64> {
        match value {
            Value::Null => Some(0),
            Value::Array(a) => Some(a.len() as u64),
            other => value_as_text(other).map(|s| s.chars().count() as u64),
        }
    }
}

impl ValidationStrategy for LengthStrategy {
    fn name(&self) -> &str {
        "length"
    }

    fn description(&self) -> &str {
        "Checks value length against minLength/maxLength/exactLength"
    }

    fn validate_params(&self, params: &Value) -> Result<(), Vec<String>> {
        ensure_object(params)?;
        let mut errors = Vec::new();
        let min = param_length(params, "minLength", &mut errors);
        let max = param_length(params, "maxLength", &mut errors);
        param_length(params, "exactLength", &mut errors);
        let has_bound = ["minLength", "maxLength", "exactLength"]
            .iter()
            .any(|k| params.get(*k).is_some_and(|v| !v.is_null()));
        if !has_bound {
            errors.push("at least one of minLength, maxLength or exactLength is required".to_string());
        }
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                errors.push(format!("minLength ({}) is greater than maxLength ({})", min, max));
            }
        }
        finish(errors)
    }

    fn validate(&self, value: &Value, params: &Value) -> ValidationResult {
        let Some(len) = Self::measure(value) else {
            return ValidationResult::fail(ErrorCode::InvalidFormat, "value has no length");
        };

        if let Some(exact) = params.get("exactLength").and_then(Value::as_u64) {
            if len != exact {
                return ValidationResult::fail(
                    ErrorCode::OutOfRange,
                    format!("length {} does not equal {}", len, exact),
                )
                .with_metadata("length", len);
            }
        }
        if let Some(min) = params.get("minLength").and_then(Value::as_u64) {
            if len < min {
                return ValidationResult::fail(
                    ErrorCode::OutOfRange,
                    format!("length {} is shorter than {}", len, min),
                )
                .with_metadata("length", len);
            }
        }
        if let Some(max) = params.get("maxLength").and_then(Value::as_u64) {
            if len > max {
                return ValidationResult::fail(
                    ErrorCode::OutOfRange,
                    format!("length {} is longer than {}", len, max),
                )
                .with_metadata("length", len);
            }
        }
        ValidationResult::ok(value.clone()).with_metadata("length", len)
    }
}

/// Compiled patterns kept before the map is flushed.
const MAX_COMPILED_PATTERNS: usize = 128;

/// Pattern match against the textual form of a value.
#[derive(Default)]
pub struct RegexStrategy {
    compiled: DashMap<String, Regex>,
}

impl RegexStrategy {
    fn regex_for(&self, pattern: &str, flags: &str) -> Result<Regex, String> {
        let key = format!("{}/{}", pattern, flags);
        if let Some(re) = self.compiled.get(&key) {
            return Ok(re.value().clone());
        }
        let re = compile_pattern(pattern, flags)?;
        if self.compiled.len() >= MAX_COMPILED_PATTERNS {
            tracing::debug!(patterns = self.compiled.len(), "Flushing compiled regex cache");
            self.compiled.clear();
        }
        self.compiled.insert(key, re.clone());
        Ok(re)
    }
}

impl ValidationStrategy for RegexStrategy {
    fn name(&self) -> &str {
        "regex"
    }

    fn description(&self) -> &str {
        "Matches the value against a regular expression"
    }

    fn validate_params(&self, params: &Value) -> Result<(), Vec<String>> {
        ensure_object(params)?;
        let Some(pattern) = params.get("pattern").and_then(Value::as_str) else {
            return Err(vec!["pattern must be a string".to_string()]);
        };
        let flags = params.get("flags").and_then(Value::as_str).unwrap_or("");
        compile_pattern(pattern, flags)
            .map(|_| ())
            .map_err(|e| vec![format!("invalid pattern: {}", e)])
    }

    fn validate(&self, value: &Value, params: &Value) -> ValidationResult {
        let pattern = params.get("pattern").and_then(Value::as_str).unwrap_or_default();
        let flags = params.get("flags").and_then(Value::as_str).unwrap_or("");
        let re = match self.regex_for(pattern, flags) {
            Ok(re) => re,
            Err(e) => return ValidationResult::fail(ErrorCode::RegexError, e),
        };
        let Some(text) = value_as_text(value) else {
            return ValidationResult::fail(ErrorCode::InvalidFormat, "value is not text");
        };
        if re.is_match(&text) {
            ValidationResult::ok(value.clone())
        } else {
            ValidationResult::fail(
                ErrorCode::InvalidFormat,
                format!("value does not match pattern {}", pattern),
            )
        }
    }
}

/// Membership in a fixed set; case-insensitive matches are normalized to
/// the configured spelling.
pub struct EnumStrategy;

impl ValidationStrategy for EnumStrategy {
    fn name(&self) -> &str {
        "enum"
    }

    fn description(&self) -> &str {
        "Accepts only values from a configured list"
    }

    fn validate_params(&self, params: &Value) -> Result<(), Vec<String>> {
        ensure_object(params)?;
        match params.get("values").and_then(Value::as_array) {
            Some(values) if !values.is_empty() => Ok(()),
            Some(_) => Err(vec!["values must not be empty".to_string()]),
            None => Err(vec!["values must be an array".to_string()]),
        }
    }

    fn validate(&self, value: &Value, params: &Value) -> ValidationResult {
        let allowed = params.get("values").and_then(Value::as_array).cloned().unwrap_or_default();
        let case_sensitive = param_bool(params, "caseSensitive", true);

        if allowed.contains(value) {
            return ValidationResult::ok(value.clone());
        }
        if let Some(text) = value_as_text(value) {
            let matched = allowed.iter().find(|candidate| match value_as_text(candidate) {
                Some(c) if case_sensitive => c == text,
                Some(c) => c.to_lowercase() == text.to_lowercase(),
                None => false,
            });
            if let Some(canonical) = matched {
                return ValidationResult::ok(canonical.clone());
            }
        }
        ValidationResult::fail(ErrorCode::InvalidFormat, "value is not an allowed option")
            .with_metadata("allowed", json!(allowed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_out_of_bounds() {
        let params = json!({"min": 0, "max": 100});
        let result = RangeStrategy.validate(&json!(150), &params);
        assert!(!result.success);
        assert_eq!(result.error_code, Some(ErrorCode::OutOfRange));

        let ok = RangeStrategy.validate(&json!("42"), &params);
        assert!(ok.success);
        assert_eq!(ok.value, Some(json!("42")));
    }

    #[test]
    fn test_range_requires_a_bound() {
        assert!(RangeStrategy.validate_params(&json!({})).is_err());
        assert!(RangeStrategy.validate_params(&json!({"max": 5})).is_ok());
        assert!(RangeStrategy.validate_params(&json!({"min": 10, "max": 5})).is_err());
    }

    #[test]
    fn test_length_exact() {
        let params = json!({"exactLength": 11});
        let result = LengthStrategy.validate(&json!("13812345678"), &params);
        assert!(result.success);
        assert_eq!(result.value, Some(json!("13812345678")));

        let short = LengthStrategy.validate(&json!("1381234"), &params);
        assert_eq!(short.error_code, Some(ErrorCode::OutOfRange));
    }

    #[test]
    fn test_length_counts_characters() {
        let params = json!({"maxLength": 3});
        assert!(LengthStrategy.validate(&json!("北京市"), &params).success);
        assert!(!LengthStrategy.validate(&json!("北京市区"), &params).success);
    }

    #[test]
    fn test_regex_flags() {
        let strategy = RegexStrategy::default();
        let params = json!({"pattern": "^[a-z]+$", "flags": "i"});
        assert!(strategy.validate_params(&params).is_ok());
        assert!(strategy.validate(&json!("ABC"), &params).success);
        assert!(!strategy.validate(&json!("AB1"), &params).success);

        let bad_flag = json!({"pattern": "a", "flags": "x"});
        assert!(strategy.validate_params(&bad_flag).is_err());
    }

    #[test]
    fn test_compiled_patterns_stay_bounded() {
        let strategy = RegexStrategy::default();
        for i in 0..(MAX_COMPILED_PATTERNS * 3) {
            let params = json!({"pattern": format!("^v{}$", i)});
            assert!(strategy.validate(&json!(format!("v{}", i)), &params).success);
            assert!(strategy.compiled.len() <= MAX_COMPILED_PATTERNS);
        }
    }

    #[test]
    fn test_trim_and_case() {
        let trimmed = TrimStrategy.validate(&json!("  a   b "), &json!({"collapseWhitespace": true}));
        assert_eq!(trimmed.value, Some(json!("a b")));

        let titled = CaseStrategy.validate(&json!("hello wORLD"), &json!({"mode": "title"}));
        assert_eq!(titled.value, Some(json!("Hello World")));

        let untouched = TrimStrategy.validate(&json!(12), &json!({}));
        assert_eq!(untouched.value, Some(json!(12)));
    }

    #[test]
    fn test_required() {
        assert!(!RequiredStrategy.validate(&Value::Null, &json!({})).success);
        assert!(!RequiredStrategy.validate(&json!("   "), &json!({})).success);
        assert!(RequiredStrategy.validate(&json!("   "), &json!({"allowWhitespace": true})).success);
        assert!(RequiredStrategy.validate(&json!(0), &json!({})).success);
    }

    #[test]
    fn test_enum_normalizes_case() {
        let params = json!({"values": ["Male", "Female"], "caseSensitive": false});
        let result = EnumStrategy.validate(&json!("male"), &params);
        assert_eq!(result.value, Some(json!("Male")));
        assert!(!EnumStrategy.validate(&json!("x"), &params).success);
    }
}
