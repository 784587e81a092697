//! Field-level cleaning rule engine with hot-reloadable configuration.
//!
//! # Architecture Overview
//!
//! ```text
//!     rules.custom.json / rules.default.json / RULES_* env / template
//!                  │
//!                  ▼
//!     ┌─────────────────────────┐  reload()  ┌──────────────────────┐
//!     │ RuleConfigurationLoader │◀───────────│ HotReloadCoordinator │◀── FileWatcher
//!     └────────────┬────────────┘            └──────────────────────┘
//!                  ▼
//!     ┌─────────────────────────┐  validate  ┌────────────────────────────┐
//!     │  ConfigurationManager   │───────────▶│ RuleConfigurationValidator │
//!     │  (snapshot + history)   │            └────────────────────────────┘
//!     └────────────┬────────────┘
//!                  │ current()
//!                  ▼
//!     ┌─────────────────────────┐     ┌────────────────┐     ┌────────────────┐
//!     │       RuleEngine        │────▶│ FieldProcessor │────▶│ StrategyCache  │
//!     │  clean_row/clean_batch  │     └────────────────┘     │   + Registry   │
//!     └─────────────────────────┘                            └────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod engine;
pub mod strategy;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::{ConfigurationManager, FieldRule, RuleConfiguration};
pub use engine::{BatchResult, Row, RowResult, RuleEngine};
pub use lifecycle::{bootstrap, HotReloadCoordinator, Services, Shutdown, StartupOptions};
pub use strategy::{ErrorCode, StrategyRegistry, ValidationResult, ValidationStrategy};
