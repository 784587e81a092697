//! field-cleaner command line.
//!
//! ```text
//! field-cleaner [--config-dir DIR] [--config FILE] [--metrics-addr ADDR] <command>
//!
//!   validate <file>      check a rule document, print the report
//!   clean <rows.json>    clean a row or an array of rows, print the batch result
//!   watch                hot-reload until Ctrl+C (SIGHUP forces a reload)
//!   history              print the configuration history
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use field_cleaner::config::{FileWatcher, RuleConfigurationValidator, WatchConfig};
use field_cleaner::engine::{ColumnTypes, Row};
use field_cleaner::lifecycle::{HotReloadCoordinator, ReloadOptions, Signal, SignalListener};
use field_cleaner::observability::{logging, metrics};
use field_cleaner::{bootstrap, StartupOptions, StrategyRegistry};

#[derive(Parser)]
#[command(name = "field-cleaner")]
#[command(about = "Field-level data cleaning with hot-reloadable rules", long_about = None)]
struct Cli {
    /// Directory holding rules.custom.json and rules.default.json
    #[arg(long, global = true, default_value = "config")]
    config_dir: PathBuf,

    /// Rule file tried before the conventional ones
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serve Prometheus metrics on this address
    #[arg(long, global = true)]
    metrics_addr: Option<SocketAddr>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a rule configuration document
    Validate { file: PathBuf },
    /// Clean rows read from a JSON file
    Clean {
        rows: PathBuf,
        /// Column type for a field, as FIELD=TYPE (repeatable)
        #[arg(long = "column-type", value_parser = parse_column_type)]
        column_types: Vec<(String, String)>,
    },
    /// Watch the configuration files and hot-reload on change
    Watch {
        /// Debounce window in milliseconds
        #[arg(long, default_value_t = 500)]
        debounce_ms: u64,
    },
    /// Show accepted configuration versions
    History,
}

fn parse_column_type(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(field, kind)| (field.trim().to_string(), kind.trim().to_string()))
        .filter(|(field, kind)| !field.is_empty() && !kind.is_empty())
        .ok_or_else(|| format!("expected FIELD=TYPE, got '{}'", raw))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init_logging(None);

    if let Some(addr) = cli.metrics_addr {
        metrics::init_metrics(addr);
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "field-cleaner starting");

    match cli.command {
        Commands::Validate { file } => validate(&file).await,
        Commands::Clean { rows, column_types } => {
            let options = startup_options(&cli.config_dir, cli.config);
            clean(options, &rows, column_types.into_iter().collect()).await
        }
        Commands::Watch { debounce_ms } => {
            let options = startup_options(&cli.config_dir, cli.config);
            watch(options, Duration::from_millis(debounce_ms)).await
        }
        Commands::History => {
            let services = bootstrap(startup_options(&cli.config_dir, cli.config)).await?;
            let history: Vec<_> = services.manager.history().iter().map(|v| v.summary()).collect();
            print_json(&history)?;
            services.shutdown().await;
            Ok(())
        }
    }
}

fn startup_options(config_dir: &Path, explicit: Option<PathBuf>) -> StartupOptions {
    StartupOptions {
        explicit_config: explicit,
        ..StartupOptions::in_dir(config_dir)
    }
}

async fn validate(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let content = tokio::fs::read_to_string(file).await?;
    let doc: Value = serde_json::from_str(&content)?;
    let validator = RuleConfigurationValidator::new(StrategyRegistry::with_builtins().into());
    let (report, _) = validator.validate_document(&doc);
    print_json(&report)?;

    if report.success {
        Ok(())
    } else {
        Err(format!("{} validation error(s) in {}", report.summary.error_count, file.display()).into())
    }
}

async fn clean(
    options: StartupOptions,
    rows_file: &Path,
    column_types: ColumnTypes,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = tokio::fs::read_to_string(rows_file).await?;
    let rows: Vec<Row> = match serde_json::from_str(&content)? {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()?,
        Value::Object(row) => vec![row],
        _ => return Err("rows file must hold an object or an array of objects".into()),
    };

    let services = bootstrap(options).await?;
    let result = services.engine.clean_batch(rows, &column_types).await;
    print_json(&result)?;
    services.shutdown().await;
    Ok(())
}

async fn watch(options: StartupOptions, debounce: Duration) -> Result<(), Box<dyn std::error::Error>> {
    let mut signals = SignalListener::new()?;
    let services = bootstrap(options).await?;

    let coordinator = HotReloadCoordinator::new(
        services.manager.clone(),
        FileWatcher::new().into(),
        ReloadOptions::default(),
    );
    let template = WatchConfig::new(PathBuf::new()).with_debounce(debounce);
    let paths = coordinator.watch_loader_paths(&template)?;
    coordinator.start(services.shutdown.subscribe());
    tracing::info!(paths = ?paths, "Watching configuration files");

    loop {
        match signals.recv().await {
            Signal::Reload => {
                let event = coordinator.reload_now("signal").await;
                tracing::info!(event = ?event, "Manual reload finished");
            }
            Signal::Shutdown => break,
        }
    }

    coordinator.stop();
    services.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
