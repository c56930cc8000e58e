// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter, Unit,
};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {}

// Macros for metrics when observability is disabled
#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! increment_counter {
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

// Macros for describe_* functions when observability is disabled
#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

// Re-export macros for use in this module when observability is disabled
#[cfg(not(feature = "observability"))]
use crate::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter,
};

/// Registers descriptions for every metric the engine emits. Call once
/// at startup; a no-op when the `observability` feature is disabled.
pub fn describe_metrics() {
    describe_gauge!("report_engine_up", "Process liveness (1=up).");

    describe_counter!(
        "report_engine_token_refresh_total",
        "OAuth2 token refreshes attempted, labeled by outcome."
    );
    describe_histogram!(
        "report_engine_token_refresh_duration_ms",
        "Milliseconds",
        "Latency of a single OAuth2 token refresh round trip."
    );

    describe_counter!(
        "report_engine_graphql_requests_total",
        "GraphQL requests issued, labeled by outcome (success, retried, rate_limited, error)."
    );
    describe_counter!(
        "report_engine_graphql_retries_total",
        "GraphQL request retries, labeled by reason (server_error, rate_limited, transport)."
    );
    describe_histogram!(
        "report_engine_graphql_request_duration_ms",
        "Milliseconds",
        "Latency of a single GraphQL request including retries."
    );

    describe_counter!(
        "report_engine_pagination_pages_total",
        "Event pages fetched, labeled by data_type."
    );
    describe_counter!(
        "report_engine_pagination_stalled_total",
        "Paginated fetches aborted due to a stalled cursor."
    );

    describe_gauge!(
        "report_engine_cache_entries",
        "Snapshot cache entries currently held."
    );
    describe_counter!(
        "report_engine_cache_hits_total",
        "Snapshot cache probes that returned a live entry."
    );
    describe_counter!(
        "report_engine_cache_misses_total",
        "Snapshot cache probes that required a fetch."
    );
    describe_counter!(
        "report_engine_cache_coalesced_total",
        "Snapshot fetches skipped because an identical fetch was already in flight."
    );

    describe_gauge!(
        "report_engine_queue_depth",
        "Jobs currently admitted and waiting for a worker permit."
    );
    describe_gauge!(
        "report_engine_queue_running",
        "Jobs currently holding a worker permit."
    );
    describe_counter!(
        "report_engine_jobs_total",
        "Jobs reaching a terminal state, labeled by outcome (completed, failed, canceled)."
    );
    describe_histogram!(
        "report_engine_job_duration_ms",
        "Milliseconds",
        "Wall-clock time from job admission to terminal state."
    );

    describe_histogram!(
        "report_engine_analyzer_duration_ms",
        "Milliseconds",
        "Time spent inside a single analyzer's pure `analyze` call, labeled by analyzer id."
    );
}

pub fn record_cache_hit() {
    increment_counter!("report_engine_cache_hits_total");
}

pub fn record_cache_miss() {
    increment_counter!("report_engine_cache_misses_total");
}

pub fn record_cache_coalesced() {
    increment_counter!("report_engine_cache_coalesced_total");
}

pub fn set_cache_entries(count: usize) {
    gauge!("report_engine_cache_entries", count as f64);
}

pub fn set_queue_depth(depth: usize) {
    gauge!("report_engine_queue_depth", depth as f64);
}

pub fn record_job_terminal(outcome: &str, duration_ms: f64) {
    counter!("report_engine_jobs_total", "outcome" => outcome.to_string());
    histogram!("report_engine_job_duration_ms", duration_ms);
}

pub fn record_graphql_request(outcome: &str, duration_ms: f64) {
    counter!("report_engine_graphql_requests_total", "outcome" => outcome.to_string());
    histogram!("report_engine_graphql_request_duration_ms", duration_ms);
}

pub fn record_graphql_retry(reason: &str) {
    counter!("report_engine_graphql_retries_total", "reason" => reason.to_string());
}

pub fn record_pagination_page(data_type: &str) {
    counter!("report_engine_pagination_pages_total", "data_type" => data_type.to_string());
}

pub fn record_pagination_stalled() {
    increment_counter!("report_engine_pagination_stalled_total");
}

pub fn record_analyzer_duration(analyzer_id: &str, duration_ms: f64) {
    histogram!("report_engine_analyzer_duration_ms", duration_ms, "analyzer" => analyzer_id.to_string());
}
