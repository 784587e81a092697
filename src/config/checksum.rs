//! Canonical JSON hashing.
//!
//! Object keys are sorted recursively before hashing so structurally equal
//! documents hash identically regardless of key order.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Return a copy of `value` with every object's keys sorted.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Canonical JSON text for a value.
pub fn canonical_string(value: &Value) -> String {
    canonicalize(value).to_string()
}

/// Hex SHA-256 of the canonical JSON form.
pub fn checksum_value(value: &Value) -> String {
    let digest = Sha256::digest(canonical_string(value).as_bytes());
    format!("{:x}", digest)
}

/// Checksum any serializable document. Serialization failures hash the
/// error text so the call never fails.
pub fn checksum<T: Serialize>(document: &T) -> String {
    match serde_json::to_value(document) {
        Ok(value) => checksum_value(&value),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize document for checksum");
            checksum_value(&Value::String(e.to_string()))
        }
    }
}

/// Short hash used in cache keys.
pub fn params_hash(params: &Value) -> String {
    checksum_value(params)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_is_irrelevant() {
        let a: Value = serde_json::from_str(r#"{"min": 0, "max": 100, "nested": {"b": 1, "a": 2}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"nested": {"a": 2, "b": 1}, "max": 100, "min": 0}"#).unwrap();
        assert_eq!(checksum_value(&a), checksum_value(&b));
        assert_eq!(params_hash(&a), params_hash(&b));
    }

    #[test]
    fn test_content_change_changes_hash() {
        assert_ne!(checksum_value(&json!({"min": 0})), checksum_value(&json!({"min": 1})));
        assert_eq!(params_hash(&json!({})).len(), 16);
    }

    #[test]
    fn test_array_order_matters() {
        assert_ne!(checksum_value(&json!([1, 2])), checksum_value(&json!([2, 1])));
    }
}
