//! Hot reload coordination.
//!
//! # Responsibilities
//! - React to watcher change/rename events with a manager reload
//! - Log configuration events for audit
//! - Publish reload outcomes on its own channel
//!
//! # Design Decisions
//! - A settle delay after the first event absorbs editors that write in
//!   several steps; events arriving meanwhile are folded into one reload
//! - Disabling suppresses reactions only; the watcher keeps running

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::config::manager::{ConfigEvent, ConfigurationManager, ReloadOutcome};
use crate::config::watcher::{FileEvent, FileEventKind, FileWatcher, WatchConfig, WatchError};

#[derive(Debug, Clone)]
pub struct ReloadOptions {
    pub settle_delay: Duration,
}

impl Default for ReloadOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
        }
    }
}

/// Outcome of one reload attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReloadEvent {
    Applied { version: String, trigger: String },
    Unchanged { version: String, trigger: String },
    Failed { error: String, trigger: String },
}

/// Bridges [`FileWatcher`] events to [`ConfigurationManager::reload`].
pub struct HotReloadCoordinator {
    manager: Arc<ConfigurationManager>,
    watcher: Arc<FileWatcher>,
    options: ReloadOptions,
    enabled: AtomicBool,
    events: broadcast::Sender<ReloadEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HotReloadCoordinator {
    pub fn new(manager: Arc<ConfigurationManager>, watcher: Arc<FileWatcher>, options: ReloadOptions) -> Arc<Self> {
        let (events, _) = broadcast::channel(32);
        Arc::new(Self {
            manager,
            watcher,
            options,
            enabled: AtomicBool::new(true),
            events,
            task: Mutex::new(None),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.events.subscribe()
    }

    pub fn watcher(&self) -> &Arc<FileWatcher> {
        &self.watcher
    }

    /// Watch every file the loader reads, using `template` for timing.
    ///
    /// The manager's own snapshot writes are ignored so a persisted
    /// update never reloads itself away.
    pub fn watch_loader_paths(&self, template: &WatchConfig) -> Result<Vec<PathBuf>, WatchError> {
        let loader = self.manager.loader();
        let paths = loader.watched_paths();
        let snapshot = loader.options().persisted_path();
        for path in &paths {
            let config = WatchConfig {
                file_path: path.clone(),
                ..template.clone()
            }
            .ignoring(snapshot.clone());
            self.watcher.watch(config)?;
        }
        Ok(paths)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        tracing::info!(enabled, "Hot reload toggled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Spawn the event loop. It ends on shutdown or [`Self::stop`].
    pub fn start(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let coordinator = Arc::clone(self);
        let mut file_events = self.watcher.subscribe();
        let mut config_events = self.manager.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::info!("Hot reload coordinator shutting down");
                        coordinator.watcher.stop();
                        break;
                    }
                    event = file_events.recv() => match event {
                        Ok(event) => coordinator.on_file_event(event, &mut file_events).await,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "File events lagged, reloading");
                            coordinator.settle_and_reload("lagged", &mut file_events).await;
                        }
                        Err(RecvError::Closed) => break,
                    },
                    event = config_events.recv() => match event {
                        Ok(event) => audit(&event),
                        Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Configuration events lagged"),
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });

        if let Some(previous) = self.lock_task().replace(handle) {
            previous.abort();
        }
    }

    /// Stop the event loop and every watch.
    pub fn stop(&self) {
        if let Some(handle) = self.lock_task().take() {
            handle.abort();
        }
        self.watcher.stop();
        tracing::info!("Hot reload coordinator stopped");
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn on_file_event(&self, event: FileEvent, file_events: &mut broadcast::Receiver<FileEvent>) {
        if event.kind == FileEventKind::Error {
            tracing::warn!(path = %event.path.display(), error = ?event.error, "Watcher reported an error");
            return;
        }
        if !self.is_enabled() {
            tracing::debug!(path = %event.path.display(), "Hot reload disabled, ignoring change");
            return;
        }
        let trigger = format!("{}:{}", event.kind.as_str(), event.path.display());
        self.settle_and_reload(&trigger, file_events).await;
    }

    async fn settle_and_reload(&self, trigger: &str, file_events: &mut broadcast::Receiver<FileEvent>) {
        tokio::time::sleep(self.options.settle_delay).await;
        let mut folded = 0;
        while file_events.try_recv().is_ok() {
            folded += 1;
        }
        if folded > 0 {
            tracing::debug!(folded, "Folded file events into one reload");
        }
        self.reload_now(trigger).await;
    }

    /// Reload immediately, regardless of the enabled flag.
    pub async fn reload_now(&self, trigger: &str) -> ReloadEvent {
        let trigger = trigger.to_string();
        let event = match self.manager.reload().await {
            Ok(ReloadOutcome::Applied(version)) => ReloadEvent::Applied {
                version: version.version,
                trigger,
            },
            Ok(ReloadOutcome::Unchanged { version }) => ReloadEvent::Unchanged { version, trigger },
            Err(e) => {
                tracing::error!(trigger = %trigger, error = %e, "Hot reload failed, keeping current configuration");
                ReloadEvent::Failed {
                    error: e.to_string(),
                    trigger,
                }
            }
        };
        let _ = self.events.send(event.clone());
        event
    }
}

fn audit(event: &ConfigEvent) {
    tracing::info!(
        kind = event.kind.as_str(),
        version = ?event.version,
        source = %event.source,
        success = event.success,
        error = ?event.error,
        "Configuration event"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::EnvOverrides;
    use crate::config::loader::{LoaderOptions, RuleConfigurationLoader};
    use crate::config::manager::ManagerOptions;
    use crate::config::template::builtin_template;
    use crate::config::validation::RuleConfigurationValidator;
    use crate::config::watcher::RawSignal;
    use crate::strategy::StrategyRegistry;
    use notify::event::{DataChange, EventKind, ModifyKind};
    use std::path::Path;
    use tempfile::TempDir;

    async fn setup(dir: &Path) -> (Arc<HotReloadCoordinator>, Arc<ConfigurationManager>) {
        let loader = RuleConfigurationLoader::with_env(LoaderOptions::in_dir(dir), EnvOverrides::default());
        let validator = RuleConfigurationValidator::new(Arc::new(StrategyRegistry::with_builtins()));
        let manager = Arc::new(ConfigurationManager::new(
            Arc::new(loader),
            validator,
            ManagerOptions {
                persist: false,
                ..Default::default()
            },
        ));
        manager.initialize().await;
        let coordinator = HotReloadCoordinator::new(
            manager.clone(),
            Arc::new(FileWatcher::new()),
            ReloadOptions {
                settle_delay: Duration::from_millis(20),
            },
        );
        (coordinator, manager)
    }

    fn write_version(dir: &Path, version: &str) {
        let mut config = builtin_template();
        config.metadata.version = version.to_string();
        std::fs::write(dir.join("rules.custom.json"), serde_json::to_string(&config).unwrap()).unwrap();
    }

    fn modified(path: &Path) -> RawSignal {
        RawSignal::Fs {
            kind: EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            paths: vec![path.to_path_buf()],
        }
    }

    #[tokio::test]
    async fn test_file_event_triggers_reload() {
        let dir = TempDir::new().unwrap();
        write_version(dir.path(), "1.0.0");
        let (coordinator, manager) = setup(dir.path()).await;
        let custom = dir.path().join("rules.custom.json");
        coordinator
            .watcher()
            .watch(WatchConfig::new(&custom).with_debounce(Duration::from_millis(20)))
            .unwrap();

        let (_tx, shutdown) = broadcast::channel(1);
        let mut reloads = coordinator.subscribe();
        coordinator.start(shutdown);

        write_version(dir.path(), "1.1.0");
        coordinator.watcher().inject(&custom, modified(&custom));

        let event = tokio::time::timeout(Duration::from_secs(2), reloads.recv()).await.unwrap().unwrap();
        assert!(matches!(event, ReloadEvent::Applied { ref version, .. } if version == "1.1.0"));
        assert_eq!(manager.current().unwrap().metadata.version, "1.1.0");
        coordinator.stop();
    }

    #[tokio::test]
    async fn test_disabled_coordinator_ignores_changes() {
        let dir = TempDir::new().unwrap();
        write_version(dir.path(), "1.0.0");
        let (coordinator, manager) = setup(dir.path()).await;
        let custom = dir.path().join("rules.custom.json");
        coordinator
            .watcher()
            .watch(WatchConfig::new(&custom).with_debounce(Duration::from_millis(20)))
            .unwrap();
        let (_tx, shutdown) = broadcast::channel(1);
        coordinator.start(shutdown);
        coordinator.set_enabled(false);

        write_version(dir.path(), "2.0.0");
        coordinator.watcher().inject(&custom, modified(&custom));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(manager.stats().reloads, 0);
        assert_eq!(manager.current().unwrap().metadata.version, "1.0.0");
        coordinator.stop();
    }

    #[tokio::test]
    async fn test_failed_reload_is_published() {
        let dir = TempDir::new().unwrap();
        write_version(dir.path(), "1.0.0");
        let (coordinator, manager) = setup(dir.path()).await;

        let mut config = builtin_template();
        config.metadata.version = "3.0.0".into();
        config.global_settings.max_errors = -1;
        std::fs::write(dir.path().join("rules.custom.json"), serde_json::to_string(&config).unwrap()).unwrap();

        let event = coordinator.reload_now("manual").await;
        assert!(matches!(event, ReloadEvent::Failed { .. }));
        assert_eq!(manager.current().unwrap().metadata.version, "1.0.0");
    }
}
