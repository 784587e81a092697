//! Configuration validation.
//!
//! # Responsibilities
//! - Schema validation of raw documents before deserialization
//! - Field/rule checks (names, strategies, parameters, regex safety)
//! - Detect conflicting rules on the same field
//! - Semantic checks on global settings and priorities
//!
//! # Design Decisions
//! - Returns all findings, not just the first
//! - Only a schema failure stops the remaining passes
//! - Conflicts and warnings never fail validation

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::config::schema::{ConditionOperator, FieldRule, RuleConfiguration, WILDCARD_FIELD};
use crate::strategy::builtin::{compile_pattern, ALLOWED_REGEX_FLAGS};
use crate::strategy::registry::StrategyRegistry;
use crate::strategy::types::ErrorCode;

/// Rules per field above which a warning is raised.
pub const MAX_RULES_PER_FIELD_WARNING: usize = 20;
/// Hard limit on regex pattern length.
pub const MAX_PATTERN_LENGTH: usize = 1000;
/// Patterns longer than this are flagged as slow.
pub const LONG_PATTERN_WARNING: usize = 200;
/// Capture group count above which a warning is raised.
pub const MAX_PATTERN_GROUPS: usize = 10;

/// A single error or warning.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigIssue {
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    pub message: String,
}

impl ConfigIssue {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            field: None,
            rule: None,
            message: message.into(),
        }
    }

    pub fn at(mut self, field: &str, rule: Option<&str>) -> Self {
        self.field = Some(field.to_string());
        self.rule = rule.map(str::to_string);
        self
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code)?;
        if let Some(field) = &self.field {
            write!(f, " {}", field)?;
            if let Some(rule) = &self.rule {
                write!(f, "/{}", rule)?;
            }
            write!(f, ":")?;
        }
        write!(f, " {}", self.message)
    }
}

/// Kinds of cross-rule conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    DuplicateStrategy,
    ContradictoryParams,
    DuplicatePattern,
}

/// An inconsistency between rules on one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConflict {
    pub kind: ConflictKind,
    pub field: String,
    pub rules: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub total_fields: usize,
    pub total_rules: usize,
    pub error_count: usize,
    pub warning_count: usize,
    pub conflict_count: usize,
}

/// Outcome of a validation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// True iff there are no errors.
    pub success: bool,
    pub errors: Vec<ConfigIssue>,
    pub warnings: Vec<ConfigIssue>,
    pub conflicts: Vec<RuleConflict>,
    pub validated_fields: Vec<String>,
    pub summary: ValidationSummary,
}

impl ValidationReport {
    fn finish(mut self, total_fields: usize, total_rules: usize) -> Self {
        self.success = self.errors.is_empty();
        self.summary = ValidationSummary {
            total_fields,
            total_rules,
            error_count: self.errors.len(),
            warning_count: self.warnings.len(),
            conflict_count: self.conflicts.len(),
        };
        self
    }

    /// First error message, for compact logging.
    pub fn first_error(&self) -> Option<String> {
        self.errors.first().map(ToString::to_string)
    }
}

/// Schema pass over a raw document. Pure function.
pub fn check_schema(doc: &Value) -> Vec<ConfigIssue> {
    let mut errors = Vec::new();
    let schema_error = |message: String| ConfigIssue::new(ErrorCode::SchemaValidationError, message);

    let Some(root) = doc.as_object() else {
        return vec![schema_error("document must be a JSON object".into())];
    };

    match root.get("metadata") {
        Some(Value::Object(meta)) => {
            for key in ["name", "version"] {
                match meta.get(key) {
                    Some(Value::String(s)) if !s.trim().is_empty() => {}
                    Some(Value::String(_)) => errors.push(schema_error(format!("metadata.{} must not be empty", key))),
                    _ => errors.push(schema_error(format!("metadata.{} must be a string", key))),
                }
            }
        }
        _ => errors.push(schema_error("metadata must be an object".into())),
    }

    match root.get("fieldRules") {
        Some(Value::Object(fields)) => {
            for (field, rules) in fields {
                match rules {
                    Value::Array(items) => {
                        if let Some(pos) = items.iter().position(|r| !r.is_object()) {
                            errors.push(schema_error(format!("fieldRules.{}[{}] must be an object", field, pos)));
                        }
                    }
                    _ => errors.push(schema_error(format!("fieldRules.{} must be an array", field))),
                }
            }
        }
        _ => errors.push(schema_error("fieldRules must be an object".into())),
    }

    match root.get("globalSettings") {
        None | Some(Value::Object(_)) => {}
        Some(_) => errors.push(schema_error("globalSettings must be an object".into())),
    }

    errors
}

/// Schema-check and deserialize a raw document.
pub fn parse_document(doc: &Value) -> Result<RuleConfiguration, Vec<ConfigIssue>> {
    let errors = check_schema(doc);
    if !errors.is_empty() {
        return Err(errors);
    }
    serde_json::from_value(doc.clone()).map_err(|e| {
        vec![ConfigIssue::new(
            ErrorCode::SchemaValidationError,
            format!("document does not match schema: {}", e),
        )]
    })
}

fn field_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // \p{L} covers CJK ideographs.
    PATTERN.get_or_init(|| Regex::new(r"^\p{L}[\p{L}\p{N}_ ]*$").expect("field name pattern is valid"))
}

fn nested_quantifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\([^()]*[*+][^()]*\)[*+{]").expect("nested quantifier pattern is valid"))
}

/// Validates rule configurations against the registered strategies.
#[derive(Debug, Clone)]
pub struct RuleConfigurationValidator {
    registry: Arc<StrategyRegistry>,
}

impl RuleConfigurationValidator {
    pub fn new(registry: Arc<StrategyRegistry>) -> Self {
        Self { registry }
    }

    /// Validate a raw document, returning the parsed configuration when the
    /// schema pass succeeds.
    pub fn validate_document(&self, doc: &Value) -> (ValidationReport, Option<RuleConfiguration>) {
        match parse_document(doc) {
            Ok(config) => (self.validate(&config), Some(config)),
            Err(errors) => {
                let report = ValidationReport {
                    errors,
                    ..Default::default()
                };
                (report.finish(0, 0), None)
            }
        }
    }

    /// Run the field, conflict and semantic passes on a typed configuration.
    pub fn validate(&self, config: &RuleConfiguration) -> ValidationReport {
        let mut report = ValidationReport::default();

        if config.metadata.name.trim().is_empty() {
            report.errors.push(ConfigIssue::new(ErrorCode::SchemaValidationError, "metadata.name must not be empty"));
        }
        if config.metadata.version.trim().is_empty() {
            report.errors.push(ConfigIssue::new(ErrorCode::SchemaValidationError, "metadata.version must not be empty"));
        }
        if !report.errors.is_empty() {
            return report.finish(config.field_rules.len(), config.rule_count());
        }

        for (field, rules) in &config.field_rules {
            self.check_field(field, rules, &mut report);
            report.conflicts.extend(detect_conflicts(field, rules));
            report.validated_fields.push(field.clone());
        }

        check_semantics(config, &mut report);

        let report = report.finish(config.field_rules.len(), config.rule_count());
        tracing::debug!(
            name = %config.metadata.name,
            version = %config.metadata.version,
            errors = report.summary.error_count,
            warnings = report.summary.warning_count,
            conflicts = report.summary.conflict_count,
            "Configuration validated"
        );
        report
    }

    fn check_field(&self, field: &str, rules: &[FieldRule], report: &mut ValidationReport) {
        if field != WILDCARD_FIELD && !field_name_pattern().is_match(field) {
            report.errors.push(
                ConfigIssue::new(ErrorCode::FieldValidationError, "invalid field name").at(field, None),
            );
        }
        if rules.is_empty() {
            report.warnings.push(
                ConfigIssue::new(ErrorCode::FieldValidationError, "field has no rules").at(field, None),
            );
        }
        if rules.len() > MAX_RULES_PER_FIELD_WARNING {
            report.warnings.push(
                ConfigIssue::new(
                    ErrorCode::FieldValidationError,
                    format!("{} rules exceed the recommended {}", rules.len(), MAX_RULES_PER_FIELD_WARNING),
                )
                .at(field, None),
            );
        }

        let mut seen_names: HashMap<&str, usize> = HashMap::new();
        for rule in rules {
            *seen_names.entry(rule.name.as_str()).or_default() += 1;
            self.check_rule(field, rule, report);
        }
        for (name, count) in seen_names {
            if count > 1 {
                report.warnings.push(
                    ConfigIssue::new(
                        ErrorCode::FieldValidationError,
                        format!("rule name used {} times; only the first applies", count),
                    )
                    .at(field, Some(name)),
                );
            }
        }
    }

    fn check_rule(&self, field: &str, rule: &FieldRule, report: &mut ValidationReport) {
        let rule_name = if rule.name.trim().is_empty() { None } else { Some(rule.name.as_str()) };
        let error = |code: ErrorCode, message: String| ConfigIssue::new(code, message).at(field, rule_name);

        if rule_name.is_none() {
            report.errors.push(error(ErrorCode::FieldValidationError, "rule name is required".into()));
        }
        if rule.strategy.trim().is_empty() {
            report.errors.push(error(ErrorCode::FieldValidationError, "rule strategy is required".into()));
            return;
        }
        if !rule.params.is_object() {
            report.errors.push(error(ErrorCode::ParameterError, "params must be an object".into()));
            return;
        }

        if let Some(condition) = &rule.condition {
            if condition.field.trim().is_empty() {
                report.errors.push(error(ErrorCode::FieldValidationError, "condition field is required".into()));
            }
            if let ConditionOperator::Unknown(op) = &condition.operator {
                report.warnings.push(error(
                    ErrorCode::FieldValidationError,
                    format!("unknown condition operator '{}', rule will always apply", op),
                ));
            }
        }

        let strategy = match self.registry.get(&rule.strategy) {
            Ok(s) => s,
            Err(_) => {
                report.errors.push(error(
                    ErrorCode::StrategyNotFound,
                    format!("unknown strategy '{}'", rule.strategy),
                ));
                return;
            }
        };

        if rule.strategy == "regex" {
            self.check_regex(field, rule_name, &rule.params, report);
        } else if let Err(reasons) = strategy.validate_params(&rule.params) {
            for reason in reasons {
                report.errors.push(error(ErrorCode::ParameterError, reason));
            }
        }
    }

    fn check_regex(&self, field: &str, rule: Option<&str>, params: &Value, report: &mut ValidationReport) {
        let issue = |code: ErrorCode, message: String| ConfigIssue::new(code, message).at(field, rule);

        let Some(pattern) = params.get("pattern").and_then(Value::as_str) else {
            report.errors.push(issue(ErrorCode::RegexError, "pattern must be a string".into()));
            return;
        };
        let flags = params.get("flags").and_then(Value::as_str).unwrap_or("");

        if pattern.chars().count() > MAX_PATTERN_LENGTH {
            report.errors.push(issue(
                ErrorCode::RegexError,
                format!("pattern exceeds {} characters", MAX_PATTERN_LENGTH),
            ));
            return;
        }
        if let Some(bad) = flags.chars().find(|c| !ALLOWED_REGEX_FLAGS.contains(*c)) {
            report.errors.push(issue(
                ErrorCode::RegexError,
                format!("flag '{}' is not one of {}", bad, ALLOWED_REGEX_FLAGS),
            ));
        }

        for warning in backtracking_warnings(pattern) {
            report.warnings.push(issue(ErrorCode::RegexError, warning));
        }

        let known_flags: String = flags.chars().filter(|c| ALLOWED_REGEX_FLAGS.contains(*c)).collect();
        if let Err(e) = compile_pattern(pattern, &known_flags) {
            report.errors.push(issue(ErrorCode::RegexError, format!("pattern does not compile: {}", e)));
        }
    }
}

/// Heuristics for patterns prone to catastrophic backtracking.
pub fn backtracking_warnings(pattern: &str) -> Vec<String> {
    let mut warnings = Vec::new();
    let has_quantifier = pattern.contains(['*', '+', '{']);

    if (pattern.contains("(?=") || pattern.contains("(?!")) && has_quantifier {
        warnings.push("lookahead combined with quantifiers may backtrack heavily".to_string());
    }

    let greedy = pattern.matches(".*").count() + pattern.matches(".+").count();
    if greedy > 1 || nested_quantifier_pattern().is_match(pattern) {
        warnings.push("nested or repeated greedy quantifiers may backtrack heavily".to_string());
    }

    if pattern.chars().count() > LONG_PATTERN_WARNING {
        warnings.push(format!("pattern is longer than {} characters", LONG_PATTERN_WARNING));
    }

    let mut groups = 0;
    let mut escaped = false;
    for c in pattern.chars() {
        match c {
            '\\' if !escaped => escaped = true,
            '(' if !escaped => groups += 1,
            _ => escaped = false,
        }
        if c != '\\' {
            escaped = false;
        }
    }
    if groups > MAX_PATTERN_GROUPS {
        warnings.push(format!("{} groups exceed the recommended {}", groups, MAX_PATTERN_GROUPS));
    }

    warnings
}

/// Cross-rule conflicts for one field.
pub fn detect_conflicts(field: &str, rules: &[FieldRule]) -> Vec<RuleConflict> {
    let mut conflicts = Vec::new();

    let mut by_strategy: BTreeMap<&str, Vec<&FieldRule>> = BTreeMap::new();
    for rule in rules {
        by_strategy.entry(rule.strategy.as_str()).or_default().push(rule);
    }

    for (strategy, group) in &by_strategy {
        if group.len() > 1 {
            conflicts.push(RuleConflict {
                kind: ConflictKind::DuplicateStrategy,
                field: field.to_string(),
                rules: group.iter().map(|r| r.name.clone()).collect(),
                message: format!("strategy '{}' is used by {} rules", strategy, group.len()),
            });
        }
    }

    if let Some(group) = by_strategy.get("range").filter(|g| g.len() > 1) {
        conflicts.extend(range_conflict(field, group));
    }
    if let Some(group) = by_strategy.get("length").filter(|g| g.len() > 1) {
        conflicts.extend(length_conflict(field, group));
    }
    if let Some(group) = by_strategy.get("regex").filter(|g| g.len() > 1) {
        let mut by_pattern: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
        for rule in group {
            if let Some(pattern) = rule.params.get("pattern").and_then(Value::as_str) {
                let flags = rule.params.get("flags").and_then(Value::as_str).unwrap_or("");
                by_pattern
                    .entry((pattern.to_string(), flags.to_string()))
                    .or_default()
                    .push(rule.name.clone());
            }
        }
        for ((pattern, _), names) in by_pattern {
            if names.len() > 1 {
                conflicts.push(RuleConflict {
                    kind: ConflictKind::DuplicatePattern,
                    field: field.to_string(),
                    rules: names,
                    message: format!("pattern {} is declared more than once", pattern),
                });
            }
        }
    }

    conflicts
}

fn range_conflict(field: &str, group: &[&FieldRule]) -> Option<RuleConflict> {
    let mut lo = f64::NEG_INFINITY;
    let mut hi = f64::INFINITY;
    let mut involved = Vec::new();
    for rule in group {
        let min = rule.params.get("min").and_then(Value::as_f64);
        let max = rule.params.get("max").and_then(Value::as_f64);
        if min.is_some() || max.is_some() {
            involved.push(rule.name.clone());
        }
        lo = lo.max(min.unwrap_or(f64::NEG_INFINITY));
        hi = hi.min(max.unwrap_or(f64::INFINITY));
    }
    (lo > hi).then(|| RuleConflict {
        kind: ConflictKind::ContradictoryParams,
        field: field.to_string(),
        rules: involved,
        message: format!("range bounds do not overlap (min {} > max {})", lo, hi),
    })
}

fn length_conflict(field: &str, group: &[&FieldRule]) -> Option<RuleConflict> {
    let exact: Vec<(&str, u64)> = group
        .iter()
        .filter_map(|r| r.params.get("exactLength").and_then(Value::as_u64).map(|n| (r.name.as_str(), n)))
        .collect();

    let mut distinct: Vec<u64> = exact.iter().map(|(_, n)| *n).collect();
    distinct.sort_unstable();
    distinct.dedup();
    if distinct.len() > 1 {
        return Some(RuleConflict {
            kind: ConflictKind::ContradictoryParams,
            field: field.to_string(),
            rules: exact.iter().map(|(name, _)| name.to_string()).collect(),
            message: format!("exactLength values differ: {:?}", distinct),
        });
    }

    let mut lo = distinct.first().copied().unwrap_or(0);
    let mut hi = distinct.first().copied().unwrap_or(u64::MAX);
    for rule in group {
        if let Some(min) = rule.params.get("minLength").and_then(Value::as_u64) {
            lo = lo.max(min);
        }
        if let Some(max) = rule.params.get("maxLength").and_then(Value::as_u64) {
            hi = hi.min(max);
        }
    }
    (lo > hi).then(|| RuleConflict {
        kind: ConflictKind::ContradictoryParams,
        field: field.to_string(),
        rules: group.iter().map(|r| r.name.clone()).collect(),
        message: format!("length bounds do not overlap ({} > {})", lo, hi),
    })
}

fn check_semantics(config: &RuleConfiguration, report: &mut ValidationReport) {
    let settings = &config.global_settings;
    if settings.max_errors <= 0 {
        report.errors.push(ConfigIssue::new(
            ErrorCode::ConfigurationError,
            format!("globalSettings.maxErrors must be greater than 0, got {}", settings.max_errors),
        ));
    }
    if settings.max_rules_per_field == 0 {
        report.errors.push(ConfigIssue::new(
            ErrorCode::ConfigurationError,
            "globalSettings.maxRulesPerField must be greater than 0",
        ));
    }
    if !(0..=100).contains(&config.metadata.priority) {
        report.warnings.push(ConfigIssue::new(
            ErrorCode::ConfigurationError,
            format!("metadata.priority {} is outside the recommended 0..=100", config.metadata.priority),
        ));
    }
    for (field, rules) in &config.field_rules {
        for rule in rules.iter().filter(|r| !(0..=1000).contains(&r.priority)) {
            report.warnings.push(
                ConfigIssue::new(
                    ErrorCode::ConfigurationError,
                    format!("priority {} is outside the recommended 0..=1000", rule.priority),
                )
                .at(field, Some(&rule.name)),
            );
        }
    }
    if config.field_rules.is_empty() {
        report.warnings.push(ConfigIssue::new(ErrorCode::ConfigurationError, "no field rules configured"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> RuleConfigurationValidator {
        RuleConfigurationValidator::new(Arc::new(StrategyRegistry::with_builtins()))
    }

    fn doc(field_rules: Value) -> Value {
        json!({
            "metadata": {"name": "test", "version": "1.0.0", "priority": 10},
            "fieldRules": field_rules,
            "globalSettings": {"maxErrors": 10}
        })
    }

    #[test]
    fn test_valid_document() {
        let (report, config) = validator().validate_document(&doc(json!({
            "phone": [{"name": "len", "strategy": "length", "params": {"exactLength": 11}}],
            "城市": [{"name": "trim", "strategy": "trim", "params": {}}]
        })));
        assert!(report.success, "{:?}", report.errors);
        assert!(config.is_some());
        assert_eq!(report.validated_fields.len(), 2);
        assert_eq!(report.summary.total_rules, 2);
    }

    #[test]
    fn test_schema_failure_short_circuits() {
        let (report, config) = validator().validate_document(&json!({"metadata": {"name": "x"}, "fieldRules": []}));
        assert!(!report.success);
        assert!(config.is_none());
        assert!(report.errors.iter().all(|e| e.code == ErrorCode::SchemaValidationError));
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn test_unknown_strategy_and_bad_field_name() {
        let (report, _) = validator().validate_document(&doc(json!({
            "1phone": [{"name": "p", "strategy": "phone", "params": {}}]
        })));
        assert!(!report.success);
        let codes: Vec<ErrorCode> = report.errors.iter().map(|e| e.code).collect();
        assert!(codes.contains(&ErrorCode::FieldValidationError));
        assert!(codes.contains(&ErrorCode::StrategyNotFound));
    }

    #[test]
    fn test_parameter_errors() {
        let (report, _) = validator().validate_document(&doc(json!({
            "age": [{"name": "r", "strategy": "range", "params": {}}]
        })));
        assert!(!report.success);
        assert_eq!(report.errors[0].code, ErrorCode::ParameterError);
    }

    #[test]
    fn test_regex_checks() {
        let (report, _) = validator().validate_document(&doc(json!({
            "code": [
                {"name": "bad_flag", "strategy": "regex", "params": {"pattern": "^a+$", "flags": "ix"}},
                {"name": "greedy", "strategy": "regex", "params": {"pattern": "^(.*)+x.*$"}}
            ]
        })));
        assert!(report.errors.iter().any(|e| e.code == ErrorCode::RegexError && e.rule.as_deref() == Some("bad_flag")));
        assert!(report.warnings.iter().any(|w| w.rule.as_deref() == Some("greedy")));
    }

    #[test]
    fn test_oversized_pattern_rejected() {
        let pattern = "a".repeat(MAX_PATTERN_LENGTH + 1);
        let (report, _) = validator().validate_document(&doc(json!({
            "code": [{"name": "big", "strategy": "regex", "params": {"pattern": pattern}}]
        })));
        assert!(!report.success);
    }

    #[test]
    fn test_exact_length_conflict() {
        let (report, _) = validator().validate_document(&doc(json!({
            "zip": [
                {"name": "five", "strategy": "length", "params": {"exactLength": 5}},
                {"name": "ten", "strategy": "length", "params": {"exactLength": 10}}
            ]
        })));
        assert!(report.success, "conflicts must not fail validation");
        let contradictory: Vec<&RuleConflict> = report
            .conflicts
            .iter()
            .filter(|c| c.kind == ConflictKind::ContradictoryParams)
            .collect();
        assert_eq!(contradictory.len(), 1);
        assert_eq!(contradictory[0].rules, vec!["five".to_string(), "ten".to_string()]);
    }

    #[test]
    fn test_range_conflict_and_duplicates() {
        let conflicts = detect_conflicts("age", &[
            FieldRule::new("low", "range", json!({"max": 10})),
            FieldRule::new("high", "range", json!({"min": 20})),
            FieldRule::new("p1", "regex", json!({"pattern": "^\\d+$"})),
            FieldRule::new("p2", "regex", json!({"pattern": "^\\d+$"})),
        ]);
        let kinds: Vec<ConflictKind> = conflicts.iter().map(|c| c.kind).collect();
        assert_eq!(kinds.iter().filter(|k| **k == ConflictKind::DuplicateStrategy).count(), 2);
        assert!(kinds.contains(&ConflictKind::ContradictoryParams));
        assert!(kinds.contains(&ConflictKind::DuplicatePattern));
    }

    #[test]
    fn test_semantic_checks() {
        let (report, _) = validator().validate_document(&json!({
            "metadata": {"name": "t", "version": "1", "priority": 500},
            "fieldRules": {},
            "globalSettings": {"maxErrors": 0}
        }));
        assert!(!report.success);
        assert!(report.errors.iter().any(|e| e.message.contains("maxErrors")));
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn test_backtracking_group_count() {
        let pattern = "(a)".repeat(11);
        let warnings = backtracking_warnings(&pattern);
        assert!(warnings.iter().any(|w| w.contains("groups")));
        assert!(backtracking_warnings(r"\(\(\(").is_empty());
    }
}
