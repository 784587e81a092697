//! Strategy instance cache.
//!
//! # Responsibilities
//! - Memoize bound strategies per (name, params hash)
//! - Expire entries after a TTL, evict least-recently-used on overflow
//! - Periodically sweep expired entries in the background
//! - Track hit/miss/eviction statistics
//!
//! # Design Decisions
//! - DashMap shards the map so lookups on different keys never contend
//! - Access bookkeeping uses atomics, so a hit only takes a shard read lock
//! - LRU selection is a linear scan; it only runs when capacity is exceeded

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::checksum::{canonicalize, params_hash};
use crate::observability::metrics;
use crate::strategy::registry::StrategyRegistry;
use crate::strategy::types::{StrategyError, StrategyResult};
use crate::strategy::{BoundStrategy, ValidationStrategy};

/// Cache tuning.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Lifetime of an entry after creation.
    pub ttl: Duration,
    /// Maximum number of entries before LRU eviction.
    pub max_size: usize,
    /// Interval of the background expiry sweep.
    pub sweep_interval: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            max_size: 1000,
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

struct CacheEntry {
    strategy: Arc<BoundStrategy>,
    created_at: Instant,
    expires_at: Instant,
    /// Nanoseconds since the cache epoch.
    last_accessed: AtomicU64,
    access_count: AtomicU64,
}

/// Point-in-time view of a cache entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntryInfo {
    pub key: String,
    pub strategy: String,
    pub params_hash: String,
    pub age_ms: u64,
    pub expires_in_ms: u64,
    pub access_count: u64,
}

/// Cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub hit_rate: f64,
}

/// Memoizes strategy instances keyed by name and canonical params hash.
pub struct StrategyCache {
    registry: Arc<StrategyRegistry>,
    entries: DashMap<String, CacheEntry>,
    options: CacheOptions,
    epoch: Instant,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl StrategyCache {
    /// Create a cache over a registry.
    pub fn new(registry: Arc<StrategyRegistry>, options: CacheOptions) -> Self {
        Self {
            registry,
            entries: DashMap::new(),
            options,
            epoch: Instant::now(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<StrategyRegistry> {
        &self.registry
    }

    /// Cache key for a strategy/params pair.
    pub fn cache_key(name: &str, params: &Value) -> String {
        format!("{}:{}", name, params_hash(params))
    }

    fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    /// Return the cached instance for (name, params), creating it on a miss.
    ///
    /// A miss looks the strategy up in the registry and validates the
    /// parameters before inserting.
    pub fn get_or_create(&self, name: &str, params: &Value) -> StrategyResult<Arc<BoundStrategy>> {
        let key = Self::cache_key(name, params);
        let now = Instant::now();

        if let Some(entry) = self.entries.get(&key) {
            if entry.expires_at > now {
                entry.last_accessed.store(self.now_nanos(), Ordering::Relaxed);
                entry.access_count.fetch_add(1, Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_lookup(true);
                return Ok(entry.strategy.clone());
            }
        }

        // Expired entries are dropped before re-creation.
        if self.entries.remove_if(&key, |_, e| e.expires_at <= now).is_some() {
            self.expirations.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_eviction("ttl");
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        metrics::record_cache_lookup(false);

        let strategy = self.registry.get(name)?;
        strategy
            .validate_params(params)
            .map_err(|reasons| StrategyError::InvalidParams {
                strategy: name.to_string(),
                reasons,
            })?;

        let hash = params_hash(params);
        let bound = Arc::new(BoundStrategy::new(strategy, canonicalize(params), hash));
        self.entries.insert(
            key.clone(),
            CacheEntry {
                strategy: bound.clone(),
                created_at: now,
                expires_at: now + self.options.ttl,
                last_accessed: AtomicU64::new(self.now_nanos()),
                access_count: AtomicU64::new(1),
            },
        );

        while self.entries.len() > self.options.max_size {
            if !self.evict_lru(&key) {
                break;
            }
        }
        metrics::record_cache_size(self.entries.len());

        tracing::debug!(strategy = %name, key = %key, "Strategy instance created");
        Ok(bound)
    }

    /// Evict the least recently used entry other than `keep`.
    fn evict_lru(&self, keep: &str) -> bool {
        let victim = self
            .entries
            .iter()
            .filter(|r| r.key() != keep)
            .min_by_key(|r| r.value().last_accessed.load(Ordering::Relaxed))
            .map(|r| r.key().clone());

        match victim {
            Some(victim) => {
                if self.entries.remove(&victim).is_some() {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    metrics::record_cache_eviction("lru");
                    tracing::debug!(key = %victim, "Evicted least recently used strategy");
                }
                true
            }
            None => false,
        }
    }

    /// Remove every entry whose TTL has passed. Returns the count removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|r| r.value().expires_at <= now)
            .map(|r| r.key().clone())
            .collect();

        let mut removed = 0;
        for key in expired {
            if self.entries.remove_if(&key, |_, e| e.expires_at <= now).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
            metrics::record_cache_size(self.entries.len());
            tracing::debug!(removed, "Swept expired strategy instances");
        }
        removed
    }

    /// Drop every cached instance of a strategy.
    pub fn invalidate_strategy(&self, name: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|r| r.value().strategy.name() == name)
            .map(|r| r.key().clone())
            .collect();
        let removed = keys.iter().filter(|k| self.entries.remove(*k).is_some()).count();
        metrics::record_cache_size(self.entries.len());
        tracing::debug!(strategy = %name, removed, "Strategy cache invalidated");
        removed
    }

    /// Register (or replace) a strategy and drop stale instances of it.
    pub fn register_strategy(&self, strategy: Arc<dyn ValidationStrategy>) -> StrategyResult<()> {
        let name = strategy.name().to_string();
        self.registry.register(strategy)?;
        self.invalidate_strategy(&name);
        Ok(())
    }

    pub fn clear(&self) {
        self.entries.clear();
        metrics::record_cache_size(0);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            size: self.entries.len(),
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
        }
    }

    /// Snapshot of the current entries, most accessed first.
    pub fn entries(&self) -> Vec<CacheEntryInfo> {
        let now = Instant::now();
        let mut infos: Vec<CacheEntryInfo> = self
            .entries
            .iter()
            .map(|r| {
                let entry = r.value();
                CacheEntryInfo {
                    key: r.key().clone(),
                    strategy: entry.strategy.name().to_string(),
                    params_hash: entry.strategy.params_hash().to_string(),
                    age_ms: now.duration_since(entry.created_at).as_millis() as u64,
                    expires_in_ms: entry.expires_at.saturating_duration_since(now).as_millis() as u64,
                    access_count: entry.access_count.load(Ordering::Relaxed),
                }
            })
            .collect();
        infos.sort_by(|a, b| b.access_count.cmp(&a.access_count));
        infos
    }

    /// Spawn the periodic expiry sweep. Stops on shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cache.options.sweep_interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cache.sweep_expired();
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Strategy cache sweeper stopping");
                        break;
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for StrategyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyCache")
            .field("size", &self.entries.len())
            .field("options", &self.options)
            .finish()
    }
}
