//! Configuration file watcher for hot reload.
//!
//! # Per-path States
//! ```text
//! Idle → Pending (raw event, debounce timer running)
//! Pending → Processing (debounce elapsed)
//! Processing → Retrying(n) → Processing (probe failed, n ≤ max_retries)
//! Processing → Idle (event published)
//! any → Failed (watch handle could not be reopened)
//! ```
//!
//! # Design Decisions
//! - The notify callback only forwards raw signals; all work happens on a
//!   per-path tokio task
//! - A missing target is watched through its parent directory
//! - A handle on the file itself is re-armed after every processed event,
//!   since an atomic replace leaves it on the old inode
//! - Ignored paths (and siblings sharing their file name as a prefix, such
//!   as `.tmp` and `.bak` copies) never count as a change
//! - Failures on one path never affect another

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::observability::metrics;
use crate::resilience::RetryPolicy;

/// Watch settings for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchConfig {
    pub file_path: PathBuf,
    pub enabled: bool,
    pub debounce: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Files written by this process that must not trigger a change.
    pub ignore: Vec<PathBuf>,
}

impl WatchConfig {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            enabled: true,
            debounce: Duration::from_millis(500),
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            ignore: Vec::new(),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_retry(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn ignoring(mut self, path: impl Into<PathBuf>) -> Self {
        self.ignore.push(path.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Failed to watch {path}: {source}")]
    Notify {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Already watching {0}")]
    AlreadyWatching(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEventKind {
    Change,
    Rename,
    Error,
}

impl FileEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileEventKind::Change => "change",
            FileEventKind::Rename => "rename",
            FileEventKind::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEvent {
    pub kind: FileEventKind,
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchState {
    Idle,
    Pending,
    Processing,
    Retrying(u32),
    Failed,
}

/// Observable state of one watched path.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathStatus {
    pub path: PathBuf,
    pub enabled: bool,
    pub watching: bool,
    /// Directory or file the OS handle is attached to.
    pub watch_target: Option<PathBuf>,
    pub retry_count: u32,
    pub restarts: u32,
    pub state: WatchState,
    pub events_published: u64,
    pub last_event: Option<DateTime<Utc>>,
}

/// What the notify callback forwards to the path task.
#[derive(Debug)]
pub(crate) enum RawSignal {
    Fs { kind: EventKind, paths: Vec<PathBuf> },
    HandleError(String),
}

struct WatchedPath {
    status: Arc<Mutex<PathStatus>>,
    raw_tx: mpsc::UnboundedSender<RawSignal>,
    task: JoinHandle<()>,
}

/// Watches configuration files and publishes debounced [`FileEvent`]s.
pub struct FileWatcher {
    paths: DashMap<PathBuf, WatchedPath>,
    events: broadcast::Sender<FileEvent>,
}

impl FileWatcher {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            paths: DashMap::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FileEvent> {
        self.events.subscribe()
    }

    /// Start watching a file. Must be called inside a tokio runtime.
    pub fn watch(&self, config: WatchConfig) -> Result<(), WatchError> {
        let path = config.file_path.clone();
        if self.paths.contains_key(&path) {
            return Err(WatchError::AlreadyWatching(path));
        }

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (handle, watch_target) = open_handle(&path, &raw_tx)?;

        let status = Arc::new(Mutex::new(PathStatus {
            path: path.clone(),
            enabled: config.enabled,
            watching: true,
            watch_target: Some(watch_target.clone()),
            retry_count: 0,
            restarts: 0,
            state: WatchState::Idle,
            events_published: 0,
            last_event: None,
        }));

        let task = PathTask {
            target: path.clone(),
            config,
            handle: Some(handle),
            raw_tx: raw_tx.clone(),
            status: status.clone(),
            events: self.events.clone(),
        };
        let task = tokio::spawn(task.run(raw_rx));

        tracing::info!(path = %path.display(), watch_target = %watch_target.display(), "Config watcher started");
        self.paths.insert(path, WatchedPath { status, raw_tx, task });
        Ok(())
    }

    /// Stop watching a file.
    pub fn unwatch(&self, path: &Path) -> bool {
        match self.paths.remove(path) {
            Some((_, watched)) => {
                watched.task.abort();
                tracing::info!(path = %path.display(), "Config watcher stopped");
                true
            }
            None => false,
        }
    }

    /// Pause or resume event processing without closing the handle.
    pub fn set_enabled(&self, path: &Path, enabled: bool) -> bool {
        match self.paths.get(path) {
            Some(watched) => {
                lock(&watched.status).enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn status(&self, path: &Path) -> Option<PathStatus> {
        self.paths.get(path).map(|w| lock(&w.status).clone())
    }

    pub fn statuses(&self) -> Vec<PathStatus> {
        self.paths.iter().map(|w| lock(&w.status).clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Stop every path task.
    pub fn stop(&self) {
        let paths: Vec<PathBuf> = self.paths.iter().map(|w| w.key().clone()).collect();
        for path in paths {
            self.unwatch(&path);
        }
    }

    /// Feed a raw signal to a path task as if it came from the OS.
    #[cfg(test)]
    pub(crate) fn inject(&self, path: &Path, signal: RawSignal) -> bool {
        self.paths
            .get(path)
            .map(|w| w.raw_tx.send(signal).is_ok())
            .unwrap_or(false)
    }
}

impl Default for FileWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        for watched in self.paths.iter() {
            watched.task.abort();
        }
    }
}

fn lock(status: &Mutex<PathStatus>) -> std::sync::MutexGuard<'_, PathStatus> {
    status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Open an OS watch on the file, or on its parent when the file is missing.
fn open_handle(
    target: &Path,
    raw_tx: &mpsc::UnboundedSender<RawSignal>,
) -> Result<(RecommendedWatcher, PathBuf), WatchError> {
    let watch_target = if target.exists() {
        target.to_path_buf()
    } else {
        let parent = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        std::fs::create_dir_all(&parent).map_err(|source| WatchError::Io {
            path: parent.clone(),
            source,
        })?;
        parent
    };

    let tx = raw_tx.clone();
    let notify_err = |source| WatchError::Notify {
        path: watch_target.clone(),
        source,
    };
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            let signal = match res {
                Ok(event) => RawSignal::Fs {
                    kind: event.kind,
                    paths: event.paths,
                },
                Err(e) => RawSignal::HandleError(e.to_string()),
            };
            let _ = tx.send(signal);
        },
        Config::default(),
    )
    .map_err(notify_err)?;
    watcher
        .watch(&watch_target, RecursiveMode::NonRecursive)
        .map_err(notify_err)?;

    Ok((watcher, watch_target))
}

/// Only events naming the target file or another JSON file matter.
fn is_relevant(target: &Path, ignore: &[PathBuf], kind: &EventKind, paths: &[PathBuf]) -> bool {
    if kind.is_access() {
        return false;
    }
    if paths.is_empty() {
        return true;
    }
    paths.iter().filter(|p| !is_ignored(ignore, p)).any(|p| {
        p.file_name() == target.file_name() || p.extension().is_some_and(|ext| ext == "json")
    })
}

fn is_ignored(ignore: &[PathBuf], path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    ignore.iter().any(|ignored| {
        let same_dir = ignored.parent() == path.parent();
        same_dir
            && ignored
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|ignored_name| name.starts_with(ignored_name))
    })
}

async fn probe(target: &Path) -> Result<FileEventKind, WatchError> {
    match tokio::fs::metadata(target).await {
        Ok(_) => Ok(FileEventKind::Change),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileEventKind::Rename),
        Err(source) => Err(WatchError::Io {
            path: target.to_path_buf(),
            source,
        }),
    }
}

struct PathTask {
    target: PathBuf,
    config: WatchConfig,
    handle: Option<RecommendedWatcher>,
    raw_tx: mpsc::UnboundedSender<RawSignal>,
    status: Arc<Mutex<PathStatus>>,
    events: broadcast::Sender<FileEvent>,
}

impl PathTask {
    async fn run(mut self, mut raw_rx: mpsc::UnboundedReceiver<RawSignal>) {
        while let Some(signal) = raw_rx.recv().await {
            match signal {
                RawSignal::HandleError(error) => self.restart(error).await,
                RawSignal::Fs { kind, paths } => {
                    if !lock(&self.status).enabled || !is_relevant(&self.target, &self.config.ignore, &kind, &paths) {
                        continue;
                    }
                    self.set_state(WatchState::Pending);

                    // Trailing-edge debounce: wait for a quiet period.
                    let mut handle_error = None;
                    loop {
                        match tokio::time::timeout(self.config.debounce, raw_rx.recv()).await {
                            Ok(Some(RawSignal::Fs { .. })) => continue,
                            Ok(Some(RawSignal::HandleError(error))) => {
                                handle_error = Some(error);
                                break;
                            }
                            Ok(None) => return,
                            Err(_) => break,
                        }
                    }

                    self.process().await;
                    if let Some(error) = handle_error {
                        self.restart(error).await;
                    }
                }
            }
        }
    }

    fn set_state(&self, state: WatchState) {
        lock(&self.status).state = state;
    }

    async fn process(&mut self) {
        self.set_state(WatchState::Processing);

        let policy = RetryPolicy::new(self.config.max_retries, self.config.retry_delay);
        let status = self.status.clone();
        let target = self.target.clone();
        let result = policy
            .run("watch_probe", |attempt| {
                if attempt > 0 {
                    let mut s = lock(&status);
                    s.retry_count = attempt;
                    s.state = WatchState::Retrying(attempt);
                }
                let target = target.clone();
                async move { probe(&target).await }
            })
            .await;

        match result {
            Ok(kind) => {
                {
                    let mut s = lock(&self.status);
                    s.retry_count = 0;
                    s.state = WatchState::Idle;
                }
                self.publish(kind, None);

                // Removal or rename-over leaves a file handle on a dead inode.
                let watching_file = lock(&self.status).watch_target.as_deref() == Some(self.target.as_path());
                if watching_file {
                    match self.reopen() {
                        Ok(()) => tracing::debug!(path = %self.target.display(), "Watch re-armed"),
                        Err(e) => {
                            tracing::warn!(path = %self.target.display(), error = %e, "Failed to re-arm watch");
                        }
                    }
                }
            }
            Err(e) => {
                self.set_state(WatchState::Idle);
                self.publish(FileEventKind::Error, Some(e.to_string()));
            }
        }
    }

    /// Close the handle, wait, reopen once.
    async fn restart(&mut self, error: String) {
        tracing::warn!(path = %self.target.display(), error = %error, "Watch handle failed, restarting");
        self.handle = None;
        lock(&self.status).watching = false;
        tokio::time::sleep(self.config.retry_delay).await;

        match self.reopen() {
            Ok(()) => {
                lock(&self.status).restarts += 1;
                tracing::info!(path = %self.target.display(), "Watch handle restarted");
            }
            Err(e) => {
                self.set_state(WatchState::Failed);
                tracing::error!(path = %self.target.display(), error = %e, "Watch restart failed, path disabled");
                self.publish(FileEventKind::Error, Some(e.to_string()));
            }
        }
    }

    fn reopen(&mut self) -> Result<(), WatchError> {
        self.handle = None;
        let (handle, watch_target) = open_handle(&self.target, &self.raw_tx)?;
        self.handle = Some(handle);
        let mut s = lock(&self.status);
        s.watching = true;
        s.watch_target = Some(watch_target);
        s.state = WatchState::Idle;
        Ok(())
    }

    fn publish(&self, kind: FileEventKind, error: Option<String>) {
        let event = FileEvent {
            kind,
            path: self.target.clone(),
            timestamp: Utc::now(),
            error,
        };
        {
            let mut s = lock(&self.status);
            s.events_published += 1;
            s.last_event = Some(event.timestamp);
        }
        metrics::record_watch_event(kind.as_str());
        tracing::debug!(path = %self.target.display(), kind = kind.as_str(), "File event");
        let _ = self.events.send(event);
    }
}
