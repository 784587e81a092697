//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the strategy registry and cache
//! - Load, validate and install the initial configuration
//! - Start background tasks (cache sweeper)
//! - Hand back the wired services
//!
//! # Design Decisions
//! - Subsystems initialize in dependency order, not concurrently
//! - A bad configuration never fails startup; the manager falls back to
//!   a generated default
//! - Only a malformed custom strategy is fatal

use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::env::EnvOverrides;
use crate::config::loader::{LoaderOptions, RuleConfigurationLoader};
use crate::config::manager::{ConfigurationManager, ManagerOptions};
use crate::config::validation::RuleConfigurationValidator;
use crate::engine::rule_engine::{EngineOptions, RuleEngine};
use crate::lifecycle::shutdown::Shutdown;
use crate::strategy::{CacheOptions, StrategyCache, StrategyError, StrategyRegistry, ValidationStrategy};

/// Everything [`bootstrap`] needs.
#[derive(Default)]
pub struct StartupOptions {
    pub loader: LoaderOptions,
    /// Tried before the conventional files.
    pub explicit_config: Option<PathBuf>,
    /// Environment overrides; `None` reads the process environment.
    pub env: Option<EnvOverrides>,
    pub cache: CacheOptions,
    pub manager: ManagerOptions,
    pub engine: EngineOptions,
    /// Registered after the built-ins.
    pub strategies: Vec<Arc<dyn ValidationStrategy>>,
}

impl StartupOptions {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            loader: LoaderOptions::in_dir(dir),
            ..Default::default()
        }
    }
}

/// The wired subsystems.
pub struct Services {
    pub registry: Arc<StrategyRegistry>,
    pub cache: Arc<StrategyCache>,
    pub manager: Arc<ConfigurationManager>,
    pub engine: Arc<RuleEngine>,
    pub shutdown: Arc<Shutdown>,
    sweeper: JoinHandle<()>,
}

impl Services {
    /// Signal shutdown and wait for the cache sweeper to exit.
    pub async fn shutdown(self) {
        self.shutdown.trigger();
        if let Err(e) = self.sweeper.await {
            tracing::warn!(error = %e, "Cache sweeper did not exit cleanly");
        }
    }
}

/// Wire registry → cache → loader → manager → engine.
pub async fn bootstrap(options: StartupOptions) -> Result<Services, StrategyError> {
    let registry = Arc::new(StrategyRegistry::with_builtins());
    for strategy in options.strategies {
        registry.register(strategy)?;
    }
    tracing::info!(strategies = registry.len(), "Strategy registry ready");

    let shutdown = Arc::new(Shutdown::new());
    let cache = Arc::new(StrategyCache::new(registry.clone(), options.cache));
    let sweeper = cache.spawn_sweeper(shutdown.subscribe());

    let env = options.env.unwrap_or_else(EnvOverrides::from_env);
    let loader = RuleConfigurationLoader::with_env(options.loader, env).with_explicit_path(options.explicit_config);
    let validator = RuleConfigurationValidator::new(registry.clone());
    let manager = Arc::new(ConfigurationManager::new(Arc::new(loader), validator, options.manager));
    let version = manager.initialize().await;

    let engine = Arc::new(RuleEngine::new(manager.clone(), cache.clone(), options.engine));

    tracing::info!(
        version = %version.version,
        source = %version.source,
        rules = version.configuration.rule_count(),
        "Field cleaner ready"
    );

    Ok(Services {
        registry,
        cache,
        manager,
        engine,
        shutdown,
        sweeper,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::ValidationResult;
    use serde_json::Value;
    use tempfile::TempDir;

    struct Nameless;

    impl ValidationStrategy for Nameless {
        fn name(&self) -> &str {
            " "
        }

        fn description(&self) -> &str {
            "no name"
        }

        fn validate_params(&self, _params: &Value) -> Result<(), Vec<String>> {
            Ok(())
        }

        fn validate(&self, value: &Value, _params: &Value) -> ValidationResult {
            ValidationResult::ok(value.clone())
        }
    }

    #[tokio::test]
    async fn test_bootstrap_wires_ready_services() {
        let dir = TempDir::new().unwrap();
        let options = StartupOptions {
            env: Some(EnvOverrides::default()),
            ..StartupOptions::in_dir(dir.path())
        };
        let services = bootstrap(options).await.unwrap();

        assert!(services.manager.is_ready());
        assert!(services.registry.contains("trim"));
        assert_eq!(services.shutdown.receiver_count(), 1);
        services.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_strategy_is_fatal() {
        let dir = TempDir::new().unwrap();
        let options = StartupOptions {
            strategies: vec![Arc::new(Nameless)],
            ..StartupOptions::in_dir(dir.path())
        };
        assert!(matches!(bootstrap(options).await, Err(StrategyError::InvalidStrategy(_))));
    }
}
