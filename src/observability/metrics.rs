//! Metrics collection and exposition.
//!
//! # Metrics
//! - `cleaner_fields_total` (counter): processed fields by outcome
//! - `cleaner_field_duration_seconds` (histogram): per-field latency
//! - `cleaner_rows_total` (counter): processed rows by outcome
//! - `cleaner_strategy_cache_lookups_total` (counter): cache lookups by result
//! - `cleaner_strategy_cache_evictions_total` (counter): evictions by reason
//! - `cleaner_strategy_cache_size` (gauge): cached strategy instances
//! - `cleaner_config_changes_total` (counter): configuration events by kind
//! - `cleaner_reloads_total` (counter): reloads by outcome
//! - `cleaner_watch_events_total` (counter): file events by kind

use std::net::SocketAddr;
use std::time::Instant;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_field_processed(success: bool, start: Instant) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("cleaner_fields_total", "outcome" => outcome).increment(1);
    metrics::histogram!("cleaner_field_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_row(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("cleaner_rows_total", "outcome" => outcome).increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!("cleaner_strategy_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_eviction(reason: &'static str) {
    metrics::counter!("cleaner_strategy_cache_evictions_total", "reason" => reason).increment(1);
}

pub fn record_cache_size(size: usize) {
    metrics::gauge!("cleaner_strategy_cache_size").set(size as f64);
}

pub fn record_config_change(kind: &'static str) {
    metrics::counter!("cleaner_config_changes_total", "kind" => kind).increment(1);
}

pub fn record_reload(outcome: &'static str) {
    metrics::counter!("cleaner_reloads_total", "outcome" => outcome).increment(1);
}

pub fn record_watch_event(kind: &'static str) {
    metrics::counter!("cleaner_watch_events_total", "kind" => kind).increment(1);
}
