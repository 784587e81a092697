//! Row and batch cleaning facade.
//!
//! # Data Flow
//! ```text
//! clean_row(row)
//!     → snapshot current configuration (once)
//!     → fields in parallel (executor) or sequentially (blocking pool)
//!     → optional row deadline (detached race)
//!     → RowResult in input field order
//!
//! clean_batch(rows)
//!     → snapshot once
//!     → chunks of chunk_size rows
//!         → rows in parallel, fields sequential within a row
//!     → early stop on continueOnError=false or maxErrors
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use serde::Serialize;
use serde_json::Value;

use crate::config::manager::ConfigurationManager;
use crate::config::schema::{GlobalSettings, RuleConfiguration};
use crate::config::template::builtin_template;
use crate::engine::executor::{should_use_parallel, ExecutorError, ExecutorOptions, ParallelExecutor};
use crate::engine::processor::{FieldProcessor, FieldResult, RuleError};
use crate::engine::Row;
use crate::observability::metrics;
use crate::resilience::{race_detached, DetachedError};
use crate::strategy::{ErrorCode, StrategyCache};

/// Field name → column type used for rule fallback.
pub type ColumnTypes = HashMap<String, String>;

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub executor: ExecutorOptions,
}

/// A failure of the row as a whole (timeout, crashed worker).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub code: ErrorCode,
    pub message: String,
}

impl RowError {
    fn processing(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::ProcessingError,
            message: message.into(),
        }
    }
}

impl From<DetachedError> for RowError {
    fn from(e: DetachedError) -> Self {
        match e {
            DetachedError::Elapsed(limit) => {
                RowError::processing(format!("row processing exceeded {}ms", limit.as_millis()))
            }
            DetachedError::Panicked(reason) => RowError::processing(format!("row task panicked: {}", reason)),
        }
    }
}

impl From<ExecutorError> for RowError {
    fn from(e: ExecutorError) -> Self {
        RowError::processing(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowResult {
    /// Field → processed value, or the original row when the row failed as a whole.
    pub cleaned: Row,
    pub fields: Vec<FieldResult>,
    pub success: bool,
    pub error_count: usize,
    pub warning_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_error: Option<RowError>,
    pub config_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub rows: Vec<RowResult>,
    pub total_rows: usize,
    pub processed_rows: usize,
    pub successful_rows: usize,
    pub failed_rows: usize,
    pub total_errors: usize,
    /// Why the batch stopped early, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    pub config_version: String,
    pub duration_ms: u64,
}

/// Cleans rows against the manager's current configuration.
pub struct RuleEngine {
    manager: Arc<ConfigurationManager>,
    processor: Arc<FieldProcessor>,
    executor: Arc<ParallelExecutor>,
}

impl RuleEngine {
    pub fn new(manager: Arc<ConfigurationManager>, cache: Arc<StrategyCache>, options: EngineOptions) -> Self {
        Self {
            manager,
            processor: Arc::new(FieldProcessor::new(cache)),
            executor: Arc::new(ParallelExecutor::new(options.executor)),
        }
    }

    pub fn manager(&self) -> &Arc<ConfigurationManager> {
        &self.manager
    }

    pub fn processor(&self) -> &Arc<FieldProcessor> {
        &self.processor
    }

    pub fn executor(&self) -> &Arc<ParallelExecutor> {
        &self.executor
    }

    fn snapshot(&self) -> Arc<RuleConfiguration> {
        self.manager.current().unwrap_or_else(|| {
            tracing::warn!("Configuration manager not initialized, cleaning with built-in template");
            Arc::new(builtin_template())
        })
    }

    /// Clean one row.
    pub async fn clean_row(&self, row: Row, column_types: &ColumnTypes) -> RowResult {
        let config = self.snapshot();
        let row = Arc::new(row);
        let types = Arc::new(column_types.clone());

        let fields = if should_use_parallel(row.len(), 1) {
            let work = parallel_fields(
                self.processor.clone(),
                self.executor.clone(),
                config.clone(),
                row.clone(),
                types,
            );
            guarded(config.global_settings.row_timeout_ms, async move { Ok::<_, RowError>(work.await) }).await
        } else {
            guarded(
                config.global_settings.row_timeout_ms,
                blocking_fields(self.processor.clone(), config.clone(), row.clone(), types),
            )
            .await
        };

        assemble(&row, fields, &config)
    }

    /// Clean many rows with one configuration snapshot.
    pub async fn clean_batch(&self, rows: Vec<Row>, column_types: &ColumnTypes) -> BatchResult {
        let start = Instant::now();
        let config = self.snapshot();
        let settings = &config.global_settings;
        let types = Arc::new(column_types.clone());
        let total_rows = rows.len();

        let mut results: Vec<RowResult> = Vec::with_capacity(total_rows);
        let mut total_errors = 0usize;
        let mut aborted = None;
        let mut remaining = rows.into_iter().map(Arc::new).peekable();

        'chunks: while remaining.peek().is_some() {
            let chunk: Vec<Arc<Row>> = remaining.by_ref().take(self.executor.chunk_size()).collect();
            let field_count = chunk.iter().map(|r| r.len()).max().unwrap_or(0);

            let outcomes: Vec<FieldsOutcome> = if should_use_parallel(field_count, chunk.len()) {
                let units = chunk
                    .iter()
                    .map(|row| {
                        guarded(
                            settings.row_timeout_ms,
                            blocking_fields(self.processor.clone(), config.clone(), row.clone(), types.clone()),
                        )
                    })
                    .collect();
                self.executor
                    .run(units)
                    .await
                    .into_iter()
                    .map(|result| result.unwrap_or_else(|e| Err(e.into())))
                    .collect()
            } else {
                let mut outcomes = Vec::with_capacity(chunk.len());
                for row in &chunk {
                    outcomes.push(
                        guarded(
                            settings.row_timeout_ms,
                            blocking_fields(self.processor.clone(), config.clone(), row.clone(), types.clone()),
                        )
                        .await,
                    );
                }
                outcomes
            };

            for (row, fields) in chunk.iter().zip(outcomes) {
                let result = assemble(row, fields, &config);
                total_errors += result.error_count;
                let index = results.len();
                let failed = !result.success;
                results.push(result);

                if failed && !settings.continue_on_error {
                    aborted = Some(format!("row {} failed and continueOnError is disabled", index));
                    break 'chunks;
                }
                if total_errors as i64 >= settings.max_errors {
                    aborted = Some(format!("error limit of {} reached", settings.max_errors));
                    break 'chunks;
                }
            }
        }

        let successful_rows = results.iter().filter(|r| r.success).count();
        let batch = BatchResult {
            total_rows,
            processed_rows: results.len(),
            successful_rows,
            failed_rows: results.len() - successful_rows,
            total_errors,
            aborted,
            config_version: config.metadata.version.clone(),
            duration_ms: start.elapsed().as_millis() as u64,
            rows: results,
        };

        tracing::info!(
            total = batch.total_rows,
            processed = batch.processed_rows,
            failed = batch.failed_rows,
            errors = batch.total_errors,
            aborted = ?batch.aborted,
            version = %batch.config_version,
            "Batch cleaned"
        );
        batch
    }
}

type FieldsOutcome = Result<Vec<FieldResult>, RowError>;

/// Apply the optional row deadline.
async fn guarded<F>(row_timeout_ms: Option<u64>, work: F) -> FieldsOutcome
where
    F: Future<Output = FieldsOutcome> + Send + 'static,
{
    match row_timeout_ms {
        Some(ms) => race_detached(Duration::from_millis(ms), work)
            .await
            .unwrap_or_else(|e| Err(e.into())),
        None => work.await,
    }
}

fn sequential_fields(
    processor: &FieldProcessor,
    config: &RuleConfiguration,
    row: &Row,
    types: &ColumnTypes,
) -> Vec<FieldResult> {
    row.iter()
        .map(|(field, value)| {
            processor.process_field(config, field, value, types.get(field).map(String::as_str), Some(row))
        })
        .collect()
}

/// All fields of a row, one after another, on the blocking pool.
async fn blocking_fields(
    processor: Arc<FieldProcessor>,
    config: Arc<RuleConfiguration>,
    row: Arc<Row>,
    types: Arc<ColumnTypes>,
) -> FieldsOutcome {
    tokio::task::spawn_blocking(move || sequential_fields(&processor, &config, &row, &types))
        .await
        .map_err(|e| RowError::processing(format!("row task failed: {}", e)))
}

/// Each field as its own executor unit.
async fn parallel_fields(
    processor: Arc<FieldProcessor>,
    executor: Arc<ParallelExecutor>,
    config: Arc<RuleConfiguration>,
    row: Arc<Row>,
    types: Arc<ColumnTypes>,
) -> Vec<FieldResult> {
    let units: Vec<_> = row
        .iter()
        .map(|(field, value)| {
            let (processor, config, row, types) = (processor.clone(), config.clone(), row.clone(), types.clone());
            let (field, value) = (field.clone(), value.clone());
            move || {
                processor.process_field(&config, &field, &value, types.get(&field).map(String::as_str), Some(&row))
            }
        })
        .collect();

    executor
        .run_blocking(units)
        .await
        .into_iter()
        .zip(row.iter())
        .map(|(result, (field, value))| result.unwrap_or_else(|e| crashed_field(field, value, e)))
        .collect()
}

fn crashed_field(field: &str, value: &Value, error: ExecutorError) -> FieldResult {
    FieldResult {
        field_name: field.to_string(),
        original_value: value.clone(),
        processed_value: value.clone(),
        success: false,
        errors: vec![RuleError {
            rule: String::new(),
            code: ErrorCode::ProcessingError,
            message: error.to_string(),
        }],
        warnings: Vec::new(),
        applied_rules: Vec::new(),
    }
}

fn assemble(row: &Row, fields: FieldsOutcome, config: &RuleConfiguration) -> RowResult {
    let settings: &GlobalSettings = &config.global_settings;
    let version = config.metadata.version.clone();

    let result = match fields {
        Ok(fields) => {
            let error_count = fields.iter().map(|f| f.errors.len()).sum();
            let warning_count = fields.iter().map(|f| f.warnings.len()).sum();
            let success = fields.iter().all(|f| f.success) && !(settings.strict_mode && warning_count > 0);
            let cleaned = fields
                .iter()
                .map(|f| (f.field_name.clone(), f.processed_value.clone()))
                .collect();
            RowResult {
                cleaned,
                fields,
                success,
                error_count,
                warning_count,
                row_error: None,
                config_version: version,
            }
        }
        Err(row_error) => {
            tracing::warn!(error = %row_error.message, "Row failed");
            RowResult {
                cleaned: row.clone(),
                fields: Vec::new(),
                success: false,
                error_count: 1,
                warning_count: 0,
                row_error: Some(row_error),
                config_version: version,
            }
        }
    };

    metrics::record_row(result.success);
    result
}
