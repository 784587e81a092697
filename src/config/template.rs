//! Built-in configuration template.
//!
//! Last link of the loader's fallback chain and the substitute used when a
//! loaded configuration fails validation.

use std::collections::BTreeMap;
use serde_json::json;

use crate::config::schema::{
    ConfigMetadata, FieldRule, GlobalSettings, RuleConfiguration, WILDCARD_FIELD,
};

pub const TEMPLATE_NAME: &str = "builtin-default";
pub const TEMPLATE_VERSION: &str = "1.0.0";

/// The built-in rule set: trim surrounding whitespace on every field.
pub fn builtin_template() -> RuleConfiguration {
    let mut field_rules = BTreeMap::new();
    field_rules.insert(
        WILDCARD_FIELD.to_string(),
        vec![FieldRule::new("trim_whitespace", "trim", json!({}))],
    );

    RuleConfiguration {
        metadata: ConfigMetadata {
            name: TEMPLATE_NAME.to_string(),
            description: "Built-in default cleaning rules".to_string(),
            version: TEMPLATE_VERSION.to_string(),
            priority: 0,
        },
        field_rules,
        global_settings: GlobalSettings::default(),
    }
}

/// The template with a version suffix that is unique per generation.
pub fn generated_default(reason: &str) -> RuleConfiguration {
    let mut config = builtin_template();
    config.metadata.version = format!(
        "{}-default-{}",
        TEMPLATE_VERSION,
        chrono::Utc::now().timestamp_millis()
    );
    config.metadata.description = format!("Generated default ({})", reason);
    config
}
