//! Structured logging.
//!
//! `RUST_LOG` takes precedence over the default directive.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_DIRECTIVE: &str = "field_cleaner=info";

/// Install the global subscriber. Safe to call more than once.
pub fn init_logging(default_directive: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive.unwrap_or(DEFAULT_DIRECTIVE).into());

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init();

    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
}
