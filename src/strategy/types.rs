//! Strategy result types and error definitions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Machine-readable error codes carried by every failed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    SchemaValidationError,
    FieldValidationError,
    RegexError,
    ParameterError,
    ConflictWarning,
    RequiredFieldMissing,
    InvalidFormat,
    OutOfRange,
    StrategyNotFound,
    ConfigurationError,
    ProcessingError,
}

impl ErrorCode {
    /// The wire representation, e.g. `OUT_OF_RANGE`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::SchemaValidationError => "SCHEMA_VALIDATION_ERROR",
            ErrorCode::FieldValidationError => "FIELD_VALIDATION_ERROR",
            ErrorCode::RegexError => "REGEX_ERROR",
            ErrorCode::ParameterError => "PARAMETER_ERROR",
            ErrorCode::ConflictWarning => "CONFLICT_WARNING",
            ErrorCode::RequiredFieldMissing => "REQUIRED_FIELD_MISSING",
            ErrorCode::InvalidFormat => "INVALID_FORMAT",
            ErrorCode::OutOfRange => "OUT_OF_RANGE",
            ErrorCode::StrategyNotFound => "STRATEGY_NOT_FOUND",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorCode::ProcessingError => "PROCESSING_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single strategy invocation.
///
/// On success `value` holds the (possibly transformed) value. On failure
/// `error` and `error_code` describe why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl ValidationResult {
    /// A passing result carrying the output value.
    pub fn ok(value: Value) -> Self {
        Self {
            success: true,
            value: Some(value),
            error: None,
            error_code: None,
            metadata: None,
        }
    }

    /// A failing result.
    pub fn fail(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            value: None,
            error: Some(message.into()),
            error_code: Some(code),
            metadata: None,
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value.into());
        self
    }
}

/// Errors raised by the registry and the cache.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StrategyError {
    /// No strategy is registered under the name.
    #[error("Strategy not found: {0}")]
    NotFound(String),

    /// The strategy rejected its parameters.
    #[error("Invalid parameters for strategy '{strategy}': {}", .reasons.join("; "))]
    InvalidParams {
        strategy: String,
        reasons: Vec<String>,
    },

    /// The strategy itself is malformed (empty name or description).
    #[error("Invalid strategy registration: {0}")]
    InvalidStrategy(String),
}

impl StrategyError {
    /// Map onto the public error taxonomy.
    pub fn code(&self) -> ErrorCode {
        match self {
            StrategyError::NotFound(_) => ErrorCode::StrategyNotFound,
            StrategyError::InvalidParams { .. } => ErrorCode::ParameterError,
            StrategyError::InvalidStrategy(_) => ErrorCode::ConfigurationError,
        }
    }
}

/// Result type for registry and cache operations.
pub type StrategyResult<T> = Result<T, StrategyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_code_wire_format() {
        let encoded = serde_json::to_value(ErrorCode::OutOfRange).unwrap();
        assert_eq!(encoded, json!("OUT_OF_RANGE"));
        assert_eq!(ErrorCode::StrategyNotFound.to_string(), "STRATEGY_NOT_FOUND");
    }

    #[test]
    fn test_result_serialization_skips_empty() {
        let result = ValidationResult::fail(ErrorCode::OutOfRange, "too big");
        let encoded = serde_json::to_value(&result).unwrap();
        assert_eq!(encoded["success"], json!(false));
        assert_eq!(encoded["errorCode"], json!("OUT_OF_RANGE"));
        assert!(encoded.get("value").is_none());
    }

    #[test]
    fn test_error_display() {
        let err = StrategyError::InvalidParams {
            strategy: "range".into(),
            reasons: vec!["min must be a number".into(), "max missing".into()],
        };
        assert_eq!(
            err.to_string(),
            "Invalid parameters for strategy 'range': min must be a number; max missing"
        );
        assert_eq!(err.code(), ErrorCode::ParameterError);
    }
}
