//! Shared helpers for integration tests.

use std::path::Path;

use serde_json::{json, Value};

use field_cleaner::config::{ConfigMetadata, FieldRule, GlobalSettings, ManagerOptions, RuleConfiguration};
use field_cleaner::config::env::EnvOverrides;
use field_cleaner::engine::Row;
use field_cleaner::{bootstrap, Services, StartupOptions};

#[allow(dead_code)]
/// A rule set with the given version and `(field, rules)` pairs.
pub fn rules(version: &str, fields: Vec<(&str, Vec<FieldRule>)>) -> RuleConfiguration {
    RuleConfiguration {
        metadata: ConfigMetadata {
            name: "integration".into(),
            description: String::new(),
            version: version.into(),
            priority: 0,
        },
        field_rules: fields
            .into_iter()
            .map(|(field, rules)| (field.to_string(), rules))
            .collect(),
        global_settings: GlobalSettings::default(),
    }
}

#[allow(dead_code)]
/// Customer records: trimmed names, ages in range, 11-digit phones.
pub fn customer_rules(version: &str) -> RuleConfiguration {
    rules(
        version,
        vec![
            ("name", vec![FieldRule::new("trim_name", "trim", json!({"collapseWhitespace": true}))]),
            ("age", vec![FieldRule::new("age_range", "range", json!({"min": 0, "max": 120})).required()]),
            ("phone", vec![FieldRule::new("phone_length", "length", json!({"exactLength": 11})).required()]),
        ],
    )
}

#[allow(dead_code)]
/// Write `config` as `rules.custom.json` in `dir`.
pub fn write_custom(dir: &Path, config: &RuleConfiguration) {
    std::fs::write(
        dir.join("rules.custom.json"),
        serde_json::to_string_pretty(config).unwrap(),
    )
    .unwrap();
}

#[allow(dead_code)]
/// Write `config` as `rules.default.json` in `dir`.
pub fn write_default(dir: &Path, config: &RuleConfiguration) {
    std::fs::write(
        dir.join("rules.default.json"),
        serde_json::to_string_pretty(config).unwrap(),
    )
    .unwrap();
}

#[allow(dead_code)]
/// Save `rules.custom.json` the way editors do: write a sibling, rename over.
pub fn replace_custom(dir: &Path, config: &RuleConfiguration) {
    let tmp = dir.join("rules.custom.json.tmp");
    std::fs::write(&tmp, serde_json::to_string_pretty(config).unwrap()).unwrap();
    std::fs::rename(&tmp, dir.join("rules.custom.json")).unwrap();
}

/// Options rooted at `dir`, isolated from the process environment.
#[allow(dead_code)]
pub fn options(dir: &Path, persist: bool) -> StartupOptions {
    StartupOptions {
        env: Some(EnvOverrides::default()),
        manager: ManagerOptions {
            persist,
            ..Default::default()
        },
        ..StartupOptions::in_dir(dir)
    }
}

#[allow(dead_code)]
pub async fn start(dir: &Path) -> Services {
    bootstrap(options(dir, false)).await.unwrap()
}

#[allow(dead_code)]
pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("row must be an object, got {}", other),
    }
}
