//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! rules.custom.json / rules.default.json / environment / template
//!     → loader.rs (fallback chain, per-source cache, env merge)
//!     → validation.rs (schema, rule, conflict and semantic passes)
//!     → manager.rs (current snapshot, history, persistence, events)
//!     → shared via Arc to the rule engine
//!
//! On file change:
//!     watcher.rs detects change (debounced)
//!     → lifecycle::reload calls manager.reload()
//!     → loader.rs reloads uncached
//!     → validation.rs validates
//!     → atomic swap of the current snapshot
//! ```
//!
//! # Design Decisions
//! - A configuration is immutable once accepted; changes swap the whole snapshot
//! - Settings have defaults so minimal documents are accepted
//! - Structural (serde) checks are separate from semantic checks
//! - Content identity is a SHA-256 over canonical JSON

pub mod checksum;
pub mod env;
pub mod loader;
pub mod manager;
pub mod schema;
pub mod template;
pub mod validation;
pub mod watcher;

pub use loader::{ConfigError, ConfigSource, LoaderOptions, RuleConfigurationLoader};
pub use manager::{
    ConfigEvent, ConfigEventKind, ConfigurationManager, ConfigurationVersion, ManagerOptions,
    ReloadOutcome, RollbackResult,
};
pub use schema::{
    ConditionOperator, ConfigMetadata, FieldRule, GlobalSettings, RuleCondition, RuleConfiguration,
};
pub use validation::{RuleConfigurationValidator, ValidationReport};
pub use watcher::{FileEvent, FileEventKind, FileWatcher, WatchConfig, WatchError};
