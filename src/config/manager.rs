//! Configuration lifecycle management.
//!
//! # States
//! ```text
//! Uninitialized → Initializing → Ready
//! ```
//! Concurrent `initialize()` callers share one in-flight attempt.
//!
//! # Responsibilities
//! - Own the current configuration as an atomically swapped snapshot
//! - Keep a bounded, checksum-deduplicated version history
//! - Apply updates, reloads and rollbacks after validation
//! - Persist the accepted configuration (temp file + rename, with backups)
//! - Broadcast change events
//!
//! # Design Decisions
//! - Readers never block: `current()` is a lock-free `ArcSwap` load
//! - Writers (update/reload/rollback) are serialized by an async mutex
//! - Persistence is best effort and never rolls back the in-memory state
//! - `update()` with unchanged content still applies (logged), while history
//!   never stores the same checksum twice

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, OnceCell};

use crate::config::checksum::checksum;
use crate::config::loader::{ConfigError, ConfigSource, RuleConfigurationLoader};
use crate::config::schema::RuleConfiguration;
use crate::config::template::generated_default;
use crate::config::validation::RuleConfigurationValidator;
use crate::observability::metrics;

/// Manager lifecycle state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
}

impl From<u8> for ManagerState {
    fn from(val: u8) -> Self {
        match val {
            1 => ManagerState::Initializing,
            2 => ManagerState::Ready,
            _ => ManagerState::Uninitialized,
        }
    }
}

/// Manager tuning.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Maximum history entries kept (FIFO).
    pub history_limit: usize,
    /// Write accepted configurations to disk.
    pub persist: bool,
    /// Timestamped backups of the persisted file to keep.
    pub max_backups: usize,
    /// Capacity of the event channel.
    pub event_capacity: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            history_limit: 50,
            persist: true,
            max_backups: 5,
            event_capacity: 64,
        }
    }
}

/// An accepted configuration with provenance.
#[derive(Debug, Clone)]
pub struct ConfigurationVersion {
    pub version: String,
    pub configuration: Arc<RuleConfiguration>,
    pub timestamp: DateTime<Utc>,
    pub source: ConfigSource,
    pub checksum: String,
    pub description: Option<String>,
}

impl ConfigurationVersion {
    /// Serializable view without the configuration body.
    pub fn summary(&self) -> VersionSummary {
        VersionSummary {
            version: self.version.clone(),
            timestamp: self.timestamp,
            source: self.source.to_string(),
            checksum: self.checksum.clone(),
            description: self.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub checksum: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEventKind {
    Loaded,
    Updated,
    RolledBack,
    ValidationFailed,
}

impl ConfigEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigEventKind::Loaded => "loaded",
            ConfigEventKind::Updated => "updated",
            ConfigEventKind::RolledBack => "rolled_back",
            ConfigEventKind::ValidationFailed => "validation_failed",
        }
    }
}

/// Configuration change notification.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigEvent {
    pub kind: ConfigEventKind,
    pub version: Option<String>,
    pub source: String,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Structured rollback outcome. Rollback never returns an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackResult {
    pub success: bool,
    pub from_version: Option<String>,
    pub to_version: Option<String>,
    pub error: Option<String>,
}

impl RollbackResult {
    fn failed(from_version: Option<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            from_version,
            to_version: None,
            error: Some(error.into()),
        }
    }
}

/// Outcome of a reload.
#[derive(Debug, Clone)]
pub enum ReloadOutcome {
    Applied(ConfigurationVersion),
    Unchanged { version: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerStats {
    pub reloads: u64,
    pub updates: u64,
    pub rollbacks: u64,
    pub validation_failures: u64,
    pub history_len: usize,
}

/// On-disk snapshot of the last accepted configuration.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedSnapshot {
    version: String,
    checksum: String,
    saved_at: DateTime<Utc>,
    configuration: RuleConfiguration,
}

/// Owns the current rule configuration and its history.
pub struct ConfigurationManager {
    loader: Arc<RuleConfigurationLoader>,
    validator: RuleConfigurationValidator,
    options: ManagerOptions,
    state: AtomicU8,
    init: OnceCell<()>,
    active: ArcSwapOption<ConfigurationVersion>,
    history: Mutex<VecDeque<ConfigurationVersion>>,
    write_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<ConfigEvent>,
    reloads: AtomicU64,
    updates: AtomicU64,
    rollbacks: AtomicU64,
    validation_failures: AtomicU64,
}

impl ConfigurationManager {
    pub fn new(
        loader: Arc<RuleConfigurationLoader>,
        validator: RuleConfigurationValidator,
        options: ManagerOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        Self {
            loader,
            validator,
            options,
            state: AtomicU8::new(ManagerState::Uninitialized as u8),
            init: OnceCell::new(),
            active: ArcSwapOption::empty(),
            history: Mutex::new(VecDeque::new()),
            write_lock: tokio::sync::Mutex::new(()),
            events,
            reloads: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
            validation_failures: AtomicU64::new(0),
        }
    }

    pub fn loader(&self) -> &Arc<RuleConfigurationLoader> {
        &self.loader
    }

    pub fn validator(&self) -> &RuleConfigurationValidator {
        &self.validator
    }

    pub fn state(&self) -> ManagerState {
        ManagerState::from(self.state.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ManagerState::Ready
    }

    /// Subscribe to configuration change events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.events.subscribe()
    }

    /// Current configuration snapshot. Lock-free.
    pub fn current(&self) -> Option<Arc<RuleConfiguration>> {
        self.active.load_full().map(|v| v.configuration.clone())
    }

    /// Current version record.
    pub fn current_version(&self) -> Option<ConfigurationVersion> {
        self.active.load_full().map(|v| (*v).clone())
    }

    /// History, oldest first.
    pub fn history(&self) -> Vec<ConfigurationVersion> {
        self.lock_history().iter().cloned().collect()
    }

    fn lock_history(&self) -> MutexGuard<'_, VecDeque<ConfigurationVersion>> {
        self.history.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            reloads: self.reloads.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            history_len: self.lock_history().len(),
        }
    }

    /// Initialize once. Concurrent callers await the same attempt.
    pub async fn initialize(&self) -> ConfigurationVersion {
        self.init.get_or_init(|| self.run_initialize()).await;
        match self.current_version() {
            Some(version) => version,
            // run_initialize always stores a version before returning.
            None => self.accept(generated_default("missing after initialize"), ConfigSource::Builtin, None),
        }
    }

    async fn run_initialize(&self) {
        self.state.store(ManagerState::Initializing as u8, Ordering::Release);
        let _guard = self.write_lock.lock().await;
        tracing::info!("Initializing configuration manager");

        let persisted_path = self.loader.options().persisted_path();
        if let Some(config) = self.load_persisted(&persisted_path).await {
            let report = self.validator.validate(&config);
            if report.success {
                let version = self.accept(config, ConfigSource::Persisted(persisted_path), Some("restored snapshot".into()));
                self.finish_initialize(&version);
                return;
            }
            tracing::warn!(
                error = ?report.first_error(),
                "Persisted configuration failed validation, using fallback chain"
            );
        }

        let outcome = self.loader.load().await;
        let report = self.validator.validate(&outcome.configuration);
        let version = if report.success {
            self.accept(outcome.configuration, outcome.source, None)
        } else {
            let error = report.first_error().unwrap_or_default();
            tracing::warn!(source = %outcome.source, error = %error, "Loaded configuration invalid, substituting default template");
            self.validation_failures.fetch_add(1, Ordering::Relaxed);
            self.emit(ConfigEventKind::ValidationFailed, Some(outcome.configuration.metadata.version.clone()), &outcome.source, Some(error));
            self.accept(generated_default("validation failed"), ConfigSource::Builtin, Some("generated default".into()))
        };

        self.persist(&version).await;
        self.finish_initialize(&version);
    }

    fn finish_initialize(&self, version: &ConfigurationVersion) {
        self.state.store(ManagerState::Ready as u8, Ordering::Release);
        self.emit(ConfigEventKind::Loaded, Some(version.version.clone()), &version.source, None);
        metrics::record_config_change(ConfigEventKind::Loaded.as_str());
        tracing::info!(
            version = %version.version,
            source = %version.source,
            checksum = %version.checksum.get(..12).unwrap_or(&version.checksum),
            "Configuration manager ready"
        );
    }

    /// Validate and apply a new configuration.
    pub async fn update(&self, config: RuleConfiguration) -> Result<ConfigurationVersion, ConfigError> {
        self.update_described(config, None).await
    }

    /// `update` with a history description.
    pub async fn update_described(
        &self,
        config: RuleConfiguration,
        description: Option<String>,
    ) -> Result<ConfigurationVersion, ConfigError> {
        if !self.is_ready() {
            return Err(ConfigError::NotInitialized);
        }
        let _guard = self.write_lock.lock().await;

        let report = self.validator.validate(&config);
        if !report.success {
            self.validation_failures.fetch_add(1, Ordering::Relaxed);
            self.emit(
                ConfigEventKind::ValidationFailed,
                Some(config.metadata.version.clone()),
                &ConfigSource::Update,
                report.first_error(),
            );
            tracing::warn!(version = %config.metadata.version, error = ?report.first_error(), "Configuration update rejected");
            return Err(ConfigError::Validation(Box::new(report)));
        }

        let new_checksum = checksum(&config);
        let unchanged = self
            .active
            .load()
            .as_ref()
            .is_some_and(|current| current.checksum == new_checksum);

        let version = self.accept(config, ConfigSource::Update, description);
        self.loader.clear_cache(None);
        self.persist(&version).await;

        self.updates.fetch_add(1, Ordering::Relaxed);
        self.emit(ConfigEventKind::Updated, Some(version.version.clone()), &version.source, None);
        metrics::record_config_change(ConfigEventKind::Updated.as_str());
        tracing::info!(version = %version.version, unchanged, "Configuration updated");
        Ok(version)
    }

    /// Re-run the loader chain and apply the result if its content changed.
    pub async fn reload(&self) -> Result<ReloadOutcome, ConfigError> {
        if !self.is_ready() {
            return Err(ConfigError::NotInitialized);
        }
        let _guard = self.write_lock.lock().await;
        self.reloads.fetch_add(1, Ordering::Relaxed);

        let outcome = self.loader.load_fresh().await;
        let new_checksum = checksum(&outcome.configuration);
        if let Some(current) = self.active.load_full() {
            if current.checksum == new_checksum {
                tracing::debug!(version = %current.version, "Reload skipped, configuration unchanged");
                metrics::record_reload("unchanged");
                return Ok(ReloadOutcome::Unchanged {
                    version: current.version.clone(),
                });
            }
        }

        let report = self.validator.validate(&outcome.configuration);
        if !report.success {
            self.validation_failures.fetch_add(1, Ordering::Relaxed);
            self.emit(
                ConfigEventKind::ValidationFailed,
                Some(outcome.configuration.metadata.version.clone()),
                &outcome.source,
                report.first_error(),
            );
            metrics::record_reload("rejected");
            tracing::warn!(source = %outcome.source, error = ?report.first_error(), "Reloaded configuration rejected, keeping current");
            return Err(ConfigError::Validation(Box::new(report)));
        }

        let version = self.accept(outcome.configuration, outcome.source, Some("reload".into()));
        self.persist(&version).await;

        self.emit(ConfigEventKind::Loaded, Some(version.version.clone()), &version.source, None);
        metrics::record_reload("applied");
        metrics::record_config_change(ConfigEventKind::Loaded.as_str());
        tracing::info!(version = %version.version, source = %version.source, "Configuration reloaded");
        Ok(ReloadOutcome::Applied(version))
    }

    /// Restore a previous version.
    ///
    /// Without a version, picks the most recent history entry whose checksum
    /// differs from the current one.
    pub async fn rollback(&self, version: Option<&str>) -> RollbackResult {
        let _guard = self.write_lock.lock().await;
        let current = self.active.load_full();
        let from_version = current.as_ref().map(|c| c.version.clone());

        let target = {
            let history = self.lock_history();
            match version {
                Some(wanted) => history.iter().rev().find(|v| v.version == wanted).cloned(),
                None => history
                    .iter()
                    .rev()
                    .find(|v| current.as_ref().map_or(true, |c| c.checksum != v.checksum))
                    .cloned(),
            }
        };

        let Some(target) = target else {
            let error = match version {
                Some(v) => ConfigError::VersionNotFound(v.to_string()).to_string(),
                None => "no previous version to roll back to".to_string(),
            };
            tracing::warn!(error = %error, "Rollback failed");
            return RollbackResult::failed(from_version, error);
        };

        let report = self.validator.validate(&target.configuration);
        if !report.success {
            self.validation_failures.fetch_add(1, Ordering::Relaxed);
            let error = report.first_error().unwrap_or_default();
            self.emit(ConfigEventKind::ValidationFailed, Some(target.version.clone()), &ConfigSource::Rollback, Some(error.clone()));
            return RollbackResult::failed(from_version, format!("target version failed validation: {}", error));
        }

        let applied = self.accept(
            (*target.configuration).clone(),
            ConfigSource::Rollback,
            Some(format!("rollback to {}", target.version)),
        );
        self.loader.clear_cache(None);
        self.persist(&applied).await;

        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        self.emit(ConfigEventKind::RolledBack, Some(applied.version.clone()), &applied.source, None);
        metrics::record_config_change(ConfigEventKind::RolledBack.as_str());
        tracing::info!(from = ?from_version, to = %applied.version, "Configuration rolled back");

        RollbackResult {
            success: true,
            from_version,
            to_version: Some(applied.version),
            error: None,
        }
    }

    /// Swap in a configuration and record it in history.
    fn accept(
        &self,
        config: RuleConfiguration,
        source: ConfigSource,
        description: Option<String>,
    ) -> ConfigurationVersion {
        let version = ConfigurationVersion {
            version: config.metadata.version.clone(),
            checksum: checksum(&config),
            configuration: Arc::new(config),
            timestamp: Utc::now(),
            source,
            description,
        };
        self.active.store(Some(Arc::new(version.clone())));
        self.push_history(version.clone());
        version
    }

    fn push_history(&self, version: ConfigurationVersion) -> bool {
        let mut history = self.lock_history();
        if history.iter().any(|v| v.checksum == version.checksum) {
            tracing::debug!(version = %version.version, "Identical configuration already in history");
            return false;
        }
        history.push_back(version);
        while history.len() > self.options.history_limit {
            history.pop_front();
        }
        true
    }

    fn emit(&self, kind: ConfigEventKind, version: Option<String>, source: &ConfigSource, error: Option<String>) {
        let event = ConfigEvent {
            kind,
            version,
            source: source.to_string(),
            success: error.is_none(),
            error,
            timestamp: Utc::now(),
        };
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn load_persisted(&self, path: &Path) -> Option<RuleConfiguration> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read persisted configuration");
                return None;
            }
        };
        let snapshot: PersistedSnapshot = match serde_json::from_str(&content) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Persisted configuration is corrupt");
                return None;
            }
        };
        if checksum(&snapshot.configuration) != snapshot.checksum {
            tracing::warn!(path = %path.display(), "Persisted configuration checksum mismatch");
            return None;
        }
        tracing::info!(version = %snapshot.version, saved_at = %snapshot.saved_at, "Found persisted configuration");
        Some(snapshot.configuration)
    }

    async fn persist(&self, version: &ConfigurationVersion) {
        if !self.options.persist {
            return;
        }
        let path = self.loader.options().persisted_path();
        if let Err(e) = self.write_snapshot(&path, version).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to persist configuration, in-memory state kept");
        }
    }

    async fn write_snapshot(&self, path: &Path, version: &ConfigurationVersion) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            let backup = backup_path(path, Utc::now());
            tokio::fs::copy(path, &backup).await?;
            self.prune_backups(path).await;
        }

        let snapshot = PersistedSnapshot {
            version: version.version.clone(),
            checksum: version.checksum.clone(),
            saved_at: Utc::now(),
            configuration: (*version.configuration).clone(),
        };
        let body = serde_json::to_vec_pretty(&snapshot)?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, path).await?;
        tracing::debug!(path = %path.display(), version = %version.version, "Configuration persisted");
        Ok(())
    }

    async fn prune_backups(&self, path: &Path) {
        let (Some(dir), Some(file_name)) = (path.parent(), path.file_name().and_then(|n| n.to_str())) else {
            return;
        };
        let prefix = format!("{}.", file_name);
        let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
            return;
        };

        let mut backups = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&prefix) && name.ends_with(".bak") {
                backups.push(entry.path());
            }
        }
        // Timestamps sort lexicographically.
        backups.sort();
        let excess = backups.len().saturating_sub(self.options.max_backups);
        for old in backups.into_iter().take(excess) {
            if let Err(e) = tokio::fs::remove_file(&old).await {
                tracing::debug!(path = %old.display(), error = %e, "Failed to remove old backup");
            }
        }
    }
}

fn backup_path(path: &Path, at: DateTime<Utc>) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "rules.active.json".to_string());
    path.with_file_name(format!("{}.{}.bak", name, at.format("%Y%m%dT%H%M%S%.6fZ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::EnvOverrides;
    use crate::config::loader::LoaderOptions;
    use crate::config::schema::FieldRule;
    use crate::config::template::builtin_template;
    use crate::strategy::registry::StrategyRegistry;
    use serde_json::json;
    use tempfile::TempDir;

    fn manager_in(dir: &Path, options: ManagerOptions) -> ConfigurationManager {
        let loader = RuleConfigurationLoader::with_env(LoaderOptions::in_dir(dir), EnvOverrides::default());
        let validator = RuleConfigurationValidator::new(Arc::new(StrategyRegistry::with_builtins()));
        ConfigurationManager::new(Arc::new(loader), validator, options)
    }

    fn config_version(version: &str) -> RuleConfiguration {
        let mut config = builtin_template();
        config.metadata.version = version.to_string();
        config
            .field_rules
            .insert("age".into(), vec![FieldRule::new("age_range", "range", json!({"min": 0, "max": 150}))]);
        config
    }

    #[tokio::test]
    async fn test_initialize_falls_back_to_builtin() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(dir.path(), ManagerOptions::default());
        assert_eq!(manager.state(), ManagerState::Uninitialized);

        let version = manager.initialize().await;
        assert_eq!(version.source, ConfigSource::Builtin);
        assert!(manager.is_ready());
        assert_eq!(manager.history().len(), 1);
        assert!(dir.path().join("rules.active.json").exists());
    }

    #[tokio::test]
    async fn test_concurrent_initialize_shares_attempt() {
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(manager_in(dir.path(), ManagerOptions::default()));
        let mut events = manager.subscribe();

        let (a, b) = tokio::join!(manager.initialize(), manager.initialize());
        assert_eq!(a.checksum, b.checksum);

        let first = events.recv().await.unwrap();
        assert_eq!(first.kind, ConfigEventKind::Loaded);
        assert!(events.try_recv().is_err(), "only one load event expected");
    }

    #[tokio::test]
    async fn test_invalid_file_substitutes_generated_default() {
        let dir = TempDir::new().unwrap();
        let doc = json!({
            "metadata": {"name": "bad", "version": "3.0.0"},
            "fieldRules": {"age": [{"name": "r", "strategy": "nope", "params": {}}]}
        });
        std::fs::write(dir.path().join("rules.default.json"), doc.to_string()).unwrap();

        let manager = manager_in(dir.path(), ManagerOptions::default());
        let version = manager.initialize().await;
        assert!(version.version.starts_with("1.0.0-default-"));
        assert_eq!(manager.stats().validation_failures, 1);
    }

    #[tokio::test]
    async fn test_update_checksum_dedup() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(dir.path(), ManagerOptions::default());
        manager.initialize().await;

        manager.update(config_version("2.0.0")).await.unwrap();
        assert_eq!(manager.history().len(), 2);

        // Identical content applies but adds no history entry.
        manager.update(config_version("2.0.0")).await.unwrap();
        assert_eq!(manager.history().len(), 2);
        assert_eq!(manager.stats().updates, 2);

        manager.update(config_version("2.1.0")).await.unwrap();
        assert_eq!(manager.history().len(), 3);
        assert_eq!(manager.current().unwrap().metadata.version, "2.1.0");
    }

    #[tokio::test]
    async fn test_update_rejects_invalid() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(dir.path(), ManagerOptions::default());
        manager.initialize().await;
        let mut events = manager.subscribe();

        let mut bad = config_version("2.0.0");
        bad.global_settings.max_errors = 0;
        let err = manager.update(bad).await.unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert_eq!(manager.current().unwrap().metadata.version, "1.0.0");

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, ConfigEventKind::ValidationFailed);
        assert!(!event.success);
    }

    #[tokio::test]
    async fn test_update_requires_initialize() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(dir.path(), ManagerOptions::default());
        assert!(matches!(manager.update(config_version("2.0.0")).await, Err(ConfigError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(dir.path(), ManagerOptions {
            history_limit: 3,
            persist: false,
            ..Default::default()
        });
        manager.initialize().await;
        for i in 0..5 {
            manager.update(config_version(&format!("2.{}.0", i))).await.unwrap();
        }
        let versions: Vec<String> = manager.history().into_iter().map(|v| v.version).collect();
        assert_eq!(versions, vec!["2.2.0", "2.3.0", "2.4.0"]);
    }

    #[tokio::test]
    async fn test_rollback_without_version() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(dir.path(), ManagerOptions::default());
        manager.initialize().await;
        manager.update(config_version("2.0.0")).await.unwrap();
        manager.update(config_version("3.0.0")).await.unwrap();

        let result = manager.rollback(None).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.from_version.as_deref(), Some("3.0.0"));
        assert_eq!(result.to_version.as_deref(), Some("2.0.0"));
        assert_eq!(manager.current().unwrap().metadata.version, "2.0.0");
        assert_eq!(manager.history().len(), 3);
    }

    #[tokio::test]
    async fn test_rollback_to_named_version() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(dir.path(), ManagerOptions::default());
        manager.initialize().await;
        manager.update(config_version("2.0.0")).await.unwrap();

        let result = manager.rollback(Some("1.0.0")).await;
        assert!(result.success);
        assert_eq!(manager.current().unwrap().metadata.version, "1.0.0");

        let missing = manager.rollback(Some("9.9.9")).await;
        assert!(!missing.success);
        assert!(missing.error.unwrap().contains("9.9.9"));
    }

    #[tokio::test]
    async fn test_rollback_with_single_entry_fails() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(dir.path(), ManagerOptions::default());
        manager.initialize().await;
        let result = manager.rollback(None).await;
        assert!(!result.success);
        assert_eq!(result.from_version.as_deref(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn test_persisted_snapshot_restored() {
        let dir = TempDir::new().unwrap();
        {
            let manager = manager_in(dir.path(), ManagerOptions::default());
            manager.initialize().await;
            manager.update(config_version("4.0.0")).await.unwrap();
        }
        let backups = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".bak"))
            .count();
        assert_eq!(backups, 1);

        let restarted = manager_in(dir.path(), ManagerOptions::default());
        let version = restarted.initialize().await;
        assert_eq!(version.version, "4.0.0");
        assert!(matches!(version.source, ConfigSource::Persisted(_)));
    }

    #[tokio::test]
    async fn test_reload_skips_unchanged() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("rules.default.json"),
            serde_json::to_string(&config_version("5.0.0")).unwrap(),
        )
        .unwrap();
        let manager = manager_in(dir.path(), ManagerOptions { persist: false, ..Default::default() });
        manager.initialize().await;

        assert!(matches!(manager.reload().await.unwrap(), ReloadOutcome::Unchanged { .. }));

        std::fs::write(
            dir.path().join("rules.default.json"),
            serde_json::to_string(&config_version("5.1.0")).unwrap(),
        )
        .unwrap();
        match manager.reload().await.unwrap() {
            ReloadOutcome::Applied(v) => assert_eq!(v.version, "5.1.0"),
            other => panic!("expected reload to apply, got {:?}", other),
        }
        assert_eq!(manager.stats().reloads, 2);
    }
}
