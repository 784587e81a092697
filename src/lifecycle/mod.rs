//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Registry → Cache (+ sweeper) → Loader → Manager.initialize() → Engine
//!
//! Hot reload (reload.rs):
//!     FileWatcher event → settle delay → Manager.reload()
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → sweeper, watcher tasks, coordinator stop
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → graceful shutdown
//!     SIGHUP → manual reload
//! ```
//!
//! # Design Decisions
//! - Ordered startup: strategies first, then configuration, then the engine
//! - The manager is ready before any row can be cleaned

pub mod reload;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use reload::{HotReloadCoordinator, ReloadEvent, ReloadOptions};
pub use shutdown::Shutdown;
pub use signals::{Signal, SignalListener};
pub use startup::{bootstrap, Services, StartupOptions};
