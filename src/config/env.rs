//! Environment overrides.
//!
//! # Variables
//! - `RULES_CONFIG_NAME`, `RULES_CONFIG_DESCRIPTION`, `RULES_CONFIG_VERSION`,
//!   `RULES_CONFIG_PRIORITY` override metadata
//! - `RULES_STRICT_MODE`, `RULES_CONTINUE_ON_ERROR`, `RULES_MAX_ERRORS`
//!   override global settings
//! - `RULES_FIELD_RULES` holds a JSON object of field rules that replaces
//!   the file's field rules wholesale
//!
//! Malformed values are ignored with a warning.

use std::collections::BTreeMap;

use crate::config::schema::{FieldRule, RuleConfiguration};

pub const ENV_NAME: &str = "RULES_CONFIG_NAME";
pub const ENV_DESCRIPTION: &str = "RULES_CONFIG_DESCRIPTION";
pub const ENV_VERSION: &str = "RULES_CONFIG_VERSION";
pub const ENV_PRIORITY: &str = "RULES_CONFIG_PRIORITY";
pub const ENV_STRICT_MODE: &str = "RULES_STRICT_MODE";
pub const ENV_CONTINUE_ON_ERROR: &str = "RULES_CONTINUE_ON_ERROR";
pub const ENV_MAX_ERRORS: &str = "RULES_MAX_ERRORS";
pub const ENV_FIELD_RULES: &str = "RULES_FIELD_RULES";

/// Overrides captured from the process environment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub priority: Option<i64>,
    pub strict_mode: Option<bool>,
    pub continue_on_error: Option<bool>,
    pub max_errors: Option<i64>,
    pub field_rules: Option<BTreeMap<String, Vec<FieldRule>>>,
}

fn parse_bool(key: &str, raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(variable = key, value = raw, "Ignoring non-boolean environment override");
            None
        }
    }
}

fn parse_int(key: &str, raw: &str) -> Option<i64> {
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(variable = key, value = raw, "Ignoring non-numeric environment override");
            None
        }
    }
}

impl EnvOverrides {
    /// Read the current process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build from explicit key/value pairs.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut overrides = Self::default();
        for (key, value) in vars {
            let (key, raw) = (key.as_ref(), value.as_ref());
            if raw.trim().is_empty() {
                continue;
            }
            match key {
                ENV_NAME => overrides.name = Some(raw.to_string()),
                ENV_DESCRIPTION => overrides.description = Some(raw.to_string()),
                ENV_VERSION => overrides.version = Some(raw.to_string()),
                ENV_PRIORITY => overrides.priority = parse_int(key, raw),
                ENV_STRICT_MODE => overrides.strict_mode = parse_bool(key, raw),
                ENV_CONTINUE_ON_ERROR => overrides.continue_on_error = parse_bool(key, raw),
                ENV_MAX_ERRORS => overrides.max_errors = parse_int(key, raw),
                ENV_FIELD_RULES => match serde_json::from_str(raw) {
                    Ok(rules) => overrides.field_rules = Some(rules),
                    Err(e) => {
                        tracing::warn!(variable = key, error = %e, "Ignoring malformed field rules override");
                    }
                },
                _ => {}
            }
        }
        overrides
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply onto a configuration. Present keys win; field rules replace.
    pub fn apply(&self, config: &mut RuleConfiguration) {
        let meta = &mut config.metadata;
        if let Some(name) = &self.name {
            meta.name = name.clone();
        }
        if let Some(description) = &self.description {
            meta.description = description.clone();
        }
        if let Some(version) = &self.version {
            meta.version = version.clone();
        }
        if let Some(priority) = self.priority {
            meta.priority = priority;
        }

        let settings = &mut config.global_settings;
        if let Some(strict) = self.strict_mode {
            settings.strict_mode = strict;
        }
        if let Some(continue_on_error) = self.continue_on_error {
            settings.continue_on_error = continue_on_error;
        }
        if let Some(max_errors) = self.max_errors {
            settings.max_errors = max_errors;
        }

        if let Some(rules) = &self.field_rules {
            config.field_rules = rules.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::template::builtin_template;

    #[test]
    fn test_parse_and_apply() {
        let env = EnvOverrides::from_vars([
            (ENV_NAME, "from-env"),
            (ENV_STRICT_MODE, "true"),
            (ENV_MAX_ERRORS, "25"),
            (ENV_FIELD_RULES, r#"{"age": [{"name": "r", "strategy": "range", "params": {"min": 0}}]}"#),
            ("UNRELATED", "x"),
        ]);
        let mut config = builtin_template();
        env.apply(&mut config);

        assert_eq!(config.metadata.name, "from-env");
        assert_eq!(config.metadata.version, "1.0.0");
        assert!(config.global_settings.strict_mode);
        assert_eq!(config.global_settings.max_errors, 25);
        assert_eq!(config.field_rules.len(), 1);
        assert!(config.field_rules.contains_key("age"));
    }

    #[test]
    fn test_malformed_values_ignored() {
        let env = EnvOverrides::from_vars([
            (ENV_FIELD_RULES, "{not json"),
            (ENV_MAX_ERRORS, "many"),
            (ENV_STRICT_MODE, "perhaps"),
        ]);
        assert!(env.is_empty());
    }
}
