//! Configuration loading with a multi-source fallback chain.
//!
//! # Fallback Order
//! ```text
//! explicit path → custom file → default file → environment → built-in template
//! ```
//! The first parseable, schema-passing source wins. File sources are then
//! merged with environment overrides.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;

use crate::config::env::EnvOverrides;
use crate::config::schema::RuleConfiguration;
use crate::config::template::builtin_template;
use crate::config::validation::{parse_document, ConfigIssue, ValidationReport};

/// Error type for configuration loading and management.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Schema validation failed: {}", join_issues(.0))]
    Schema(Vec<ConfigIssue>),

    #[error("Validation failed: {}", .0.first_error().unwrap_or_default())]
    Validation(Box<ValidationReport>),

    #[error("Configuration manager is not initialized")]
    NotInitialized,

    #[error("Version not found: {0}")]
    VersionNotFound(String),
}

fn join_issues(issues: &[ConfigIssue]) -> String {
    issues.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Where a configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum ConfigSource {
    Explicit(PathBuf),
    Custom(PathBuf),
    Default(PathBuf),
    Environment,
    Builtin,
    Persisted(PathBuf),
    Update,
    Rollback,
}

impl ConfigSource {
    /// Cache key for the source.
    pub fn key(&self) -> String {
        match self {
            ConfigSource::Explicit(p)
            | ConfigSource::Custom(p)
            | ConfigSource::Default(p)
            | ConfigSource::Persisted(p) => p.display().to_string(),
            other => other.to_string(),
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Explicit(p) => write!(f, "explicit:{}", p.display()),
            ConfigSource::Custom(p) => write!(f, "custom:{}", p.display()),
            ConfigSource::Default(p) => write!(f, "default:{}", p.display()),
            ConfigSource::Persisted(p) => write!(f, "persisted:{}", p.display()),
            ConfigSource::Environment => f.write_str("environment"),
            ConfigSource::Builtin => f.write_str("builtin"),
            ConfigSource::Update => f.write_str("update"),
            ConfigSource::Rollback => f.write_str("rollback"),
        }
    }
}

/// Loader tuning.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Directory holding the conventional configuration files.
    pub config_dir: PathBuf,
    pub custom_file: String,
    pub default_file: String,
    /// Snapshot of the last accepted configuration.
    pub persisted_file: String,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("config"),
            custom_file: "rules.custom.json".to_string(),
            default_file: "rules.default.json".to_string(),
            persisted_file: "rules.active.json".to_string(),
            cache_ttl: Duration::from_secs(5 * 60),
            cache_capacity: 20,
        }
    }
}

impl LoaderOptions {
    /// Options rooted at a directory.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: dir.into(),
            ..Default::default()
        }
    }

    pub fn custom_path(&self) -> PathBuf {
        self.config_dir.join(&self.custom_file)
    }

    pub fn default_path(&self) -> PathBuf {
        self.config_dir.join(&self.default_file)
    }

    pub fn persisted_path(&self) -> PathBuf {
        self.config_dir.join(&self.persisted_file)
    }
}

/// A source that was tried and skipped.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFailure {
    pub source: ConfigSource,
    pub reason: String,
}

/// Result of walking the fallback chain.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub configuration: RuleConfiguration,
    pub source: ConfigSource,
    pub from_cache: bool,
    pub failures: Vec<SourceFailure>,
}

struct CachedSource {
    configuration: RuleConfiguration,
    loaded_at: Instant,
}

/// Loads rule configurations from files, environment and the template.
pub struct RuleConfigurationLoader {
    options: LoaderOptions,
    env: EnvOverrides,
    explicit_path: Option<PathBuf>,
    cache: DashMap<String, CachedSource>,
}

impl RuleConfigurationLoader {
    /// Create a loader reading overrides from the process environment.
    pub fn new(options: LoaderOptions) -> Self {
        Self::with_env(options, EnvOverrides::from_env())
    }

    /// Create a loader with explicit environment overrides.
    pub fn with_env(options: LoaderOptions, env: EnvOverrides) -> Self {
        Self {
            options,
            env,
            explicit_path: None,
            cache: DashMap::new(),
        }
    }

    /// Set the explicit override path tried before the conventional files.
    pub fn with_explicit_path(mut self, path: Option<PathBuf>) -> Self {
        self.explicit_path = path;
        self
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    pub fn explicit_path(&self) -> Option<&Path> {
        self.explicit_path.as_deref()
    }

    /// Every file path the chain reads, in fallback order.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.explicit_path.iter().cloned().collect();
        paths.push(self.options.custom_path());
        paths.push(self.options.default_path());
        paths
    }

    /// Walk the fallback chain, serving sources from cache when fresh.
    pub async fn load(&self) -> LoadOutcome {
        self.load_chain(true).await
    }

    /// Walk the fallback chain reading every source from its origin.
    pub async fn load_fresh(&self) -> LoadOutcome {
        self.load_chain(false).await
    }

    async fn load_chain(&self, use_cache: bool) -> LoadOutcome {
        let mut failures = Vec::new();

        let mut file_sources = Vec::new();
        if let Some(path) = &self.explicit_path {
            file_sources.push(ConfigSource::Explicit(path.clone()));
        }
        file_sources.push(ConfigSource::Custom(self.options.custom_path()));
        file_sources.push(ConfigSource::Default(self.options.default_path()));

        for source in file_sources {
            let path = match &source {
                ConfigSource::Explicit(p) | ConfigSource::Custom(p) | ConfigSource::Default(p) => p.clone(),
                _ => continue,
            };

            let (loaded, from_cache) = match self.cached(&source, use_cache) {
                Some(config) => (Ok(config), true),
                None => (self.load_file(&path).await, false),
            };

            match loaded {
                Ok(mut configuration) => {
                    if !from_cache {
                        self.store(&source, configuration.clone());
                    }
                    self.env.apply(&mut configuration);
                    tracing::info!(
                        source = %source,
                        version = %configuration.metadata.version,
                        from_cache,
                        "Configuration loaded"
                    );
                    return LoadOutcome {
                        configuration,
                        source,
                        from_cache,
                        failures,
                    };
                }
                Err(e) => {
                    if matches!(&e, ConfigError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound) {
                        tracing::debug!(source = %source, "Configuration file not present");
                    } else {
                        tracing::warn!(source = %source, error = %e, "Configuration source rejected, falling back");
                    }
                    failures.push(SourceFailure {
                        source,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if self.env.is_empty() {
            failures.push(SourceFailure {
                source: ConfigSource::Environment,
                reason: "no environment overrides set".to_string(),
            });
        } else {
            let mut configuration = builtin_template();
            self.env.apply(&mut configuration);
            tracing::info!(version = %configuration.metadata.version, "Configuration derived from environment");
            return LoadOutcome {
                configuration,
                source: ConfigSource::Environment,
                from_cache: false,
                failures,
            };
        }

        tracing::info!("Using built-in configuration template");
        LoadOutcome {
            configuration: builtin_template(),
            source: ConfigSource::Builtin,
            from_cache: false,
            failures,
        }
    }

    /// Read, parse and schema-check a single file.
    pub async fn load_file(&self, path: &Path) -> Result<RuleConfiguration, ConfigError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc: serde_json::Value = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        parse_document(&doc).map_err(ConfigError::Schema)
    }

    fn cached(&self, source: &ConfigSource, use_cache: bool) -> Option<RuleConfiguration> {
        if !use_cache {
            return None;
        }
        let key = source.key();
        let fresh = self
            .cache
            .get(&key)
            .filter(|entry| entry.loaded_at.elapsed() < self.options.cache_ttl)
            .map(|entry| entry.configuration.clone());
        if fresh.is_none() {
            self.cache.remove_if(&key, |_, entry| entry.loaded_at.elapsed() >= self.options.cache_ttl);
        }
        fresh
    }

    fn store(&self, source: &ConfigSource, configuration: RuleConfiguration) {
        self.cache.insert(
            source.key(),
            CachedSource {
                configuration,
                loaded_at: Instant::now(),
            },
        );
        while self.cache.len() > self.options.cache_capacity {
            let oldest = self
                .cache
                .iter()
                .min_by_key(|r| r.value().loaded_at)
                .map(|r| r.key().clone());
            match oldest {
                Some(key) => {
                    self.cache.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Drop one cached source, or all of them.
    pub fn clear_cache(&self, key: Option<&str>) {
        match key {
            Some(key) => {
                self.cache.remove(key);
            }
            None => self.cache.clear(),
        }
        tracing::debug!(key = ?key, "Loader cache cleared");
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::{ENV_FIELD_RULES, ENV_NAME};
    use crate::config::template::TEMPLATE_NAME;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &Path, file: &str, name: &str, version: &str) {
        let doc = json!({
            "metadata": {"name": name, "version": version},
            "fieldRules": {"age": [{"name": "r", "strategy": "range", "params": {"min": 0}}]},
            "globalSettings": {"maxErrors": 5}
        });
        std::fs::write(dir.join(file), doc.to_string()).unwrap();
    }

    fn loader(dir: &TempDir, env: EnvOverrides) -> RuleConfigurationLoader {
        RuleConfigurationLoader::with_env(LoaderOptions::in_dir(dir.path()), env)
    }

    #[tokio::test]
    async fn test_custom_wins_over_default() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "rules.custom.json", "custom", "2.0.0");
        write(dir.path(), "rules.default.json", "default", "1.0.0");

        let outcome = loader(&dir, EnvOverrides::default()).load().await;
        assert_eq!(outcome.configuration.metadata.name, "custom");
        assert!(matches!(outcome.source, ConfigSource::Custom(_)));
    }

    #[tokio::test]
    async fn test_malformed_custom_falls_back() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("rules.custom.json"), "{ broken").unwrap();
        write(dir.path(), "rules.default.json", "default", "1.0.0");

        let outcome = loader(&dir, EnvOverrides::default()).load().await;
        assert!(matches!(outcome.source, ConfigSource::Default(_)));
        assert_eq!(outcome.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_schema_failure_falls_back() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("rules.default.json"), r#"{"metadata": {}, "fieldRules": {}}"#).unwrap();

        let outcome = loader(&dir, EnvOverrides::default()).load().await;
        assert_eq!(outcome.source, ConfigSource::Builtin);
        assert_eq!(outcome.configuration.metadata.name, TEMPLATE_NAME);
        assert_eq!(outcome.failures.len(), 3);
    }

    #[tokio::test]
    async fn test_explicit_path_first() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "other.json", "explicit", "9.0.0");
        write(dir.path(), "rules.custom.json", "custom", "2.0.0");

        let outcome = loader(&dir, EnvOverrides::default())
            .with_explicit_path(Some(dir.path().join("other.json")))
            .load()
            .await;
        assert_eq!(outcome.configuration.metadata.name, "explicit");
    }

    #[tokio::test]
    async fn test_env_merges_over_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "rules.default.json", "default", "1.0.0");
        let env = EnvOverrides::from_vars([
            (ENV_NAME, "env-name"),
            (ENV_FIELD_RULES, r#"{"email": [{"name": "t", "strategy": "trim"}]}"#),
        ]);

        let outcome = loader(&dir, env).load().await;
        let config = outcome.configuration;
        assert_eq!(config.metadata.name, "env-name");
        assert_eq!(config.metadata.version, "1.0.0");
        assert_eq!(config.global_settings.max_errors, 5);
        assert!(config.field_rules.contains_key("email"));
        assert!(!config.field_rules.contains_key("age"));
    }

    #[tokio::test]
    async fn test_env_source_when_no_files() {
        let dir = TempDir::new().unwrap();
        let env = EnvOverrides::from_vars([(ENV_NAME, "env-only")]);
        let outcome = loader(&dir, env).load().await;
        assert_eq!(outcome.source, ConfigSource::Environment);
        assert_eq!(outcome.configuration.metadata.name, "env-only");
    }

    #[tokio::test]
    async fn test_cache_serves_until_cleared() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "rules.default.json", "first", "1.0.0");
        let loader = loader(&dir, EnvOverrides::default());

        assert!(!loader.load().await.from_cache);
        write(dir.path(), "rules.default.json", "second", "2.0.0");

        let cached = loader.load().await;
        assert!(cached.from_cache);
        assert_eq!(cached.configuration.metadata.name, "first");

        assert_eq!(loader.load_fresh().await.configuration.metadata.name, "second");

        loader.clear_cache(None);
        assert_eq!(loader.cache_len(), 0);
    }

    #[tokio::test]
    async fn test_cache_capacity_evicts_oldest() {
        let dir = TempDir::new().unwrap();
        let options = LoaderOptions {
            cache_capacity: 1,
            ..LoaderOptions::in_dir(dir.path())
        };
        let loader = RuleConfigurationLoader::with_env(options, EnvOverrides::default());
        loader.store(&ConfigSource::Custom(dir.path().join("a.json")), builtin_template());
        std::thread::sleep(Duration::from_millis(2));
        loader.store(&ConfigSource::Default(dir.path().join("b.json")), builtin_template());

        assert_eq!(loader.cache_len(), 1);
        assert!(loader.cached(&ConfigSource::Default(dir.path().join("b.json")), true).is_some());
    }
}
