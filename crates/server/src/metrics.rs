//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the docflow server:
//! - HTTP request metrics (latency, counts)
//! - Document counts by stage and pipeline status (collected dynamically)
//! - Core component metrics (locks, tasks, ingestion)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

use docflow_core::{Stage, StateFilter};

/// Upper bound on states scanned per stage when collecting gauges.
const STAGE_SCAN_LIMIT: usize = 100_000;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "docflow_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("docflow_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "docflow_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Pipeline Status Metrics
// =============================================================================

/// Documents by current stage.
pub static DOCUMENTS_BY_STAGE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("docflow_documents_by_stage", "Number of documents in each stage"),
        &["stage"],
    )
    .unwrap()
});

/// Whether the orchestrator's background work is running.
pub static ORCHESTRATOR_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "docflow_orchestrator_running",
        "Whether the orchestrator is running (1) or not (0)",
    )
    .unwrap()
});

/// Locks tracked in memory.
pub static LOCKS_TRACKED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("docflow_locks_tracked", "Number of document locks tracked in memory").unwrap()
});

/// Documents being processed by the ingestion queue.
pub static INGESTION_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "docflow_ingestion_in_flight",
        "Number of documents dispatched and not yet finished",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Pipeline status
    registry
        .register(Box::new(DOCUMENTS_BY_STAGE.clone()))
        .unwrap();
    registry
        .register(Box::new(ORCHESTRATOR_RUNNING.clone()))
        .unwrap();
    registry.register(Box::new(LOCKS_TRACKED.clone())).unwrap();
    registry
        .register(Box::new(INGESTION_IN_FLIGHT.clone()))
        .unwrap();

    // Core metrics (locks, tasks, ingestion, LLM)
    for metric in docflow_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| e.to_string())?;
    String::from_utf8(buffer).map_err(|e| e.to_string())
}

/// Collect dynamic metrics from current application state.
///
/// This is called before encoding metrics to update gauges with current values
/// from the orchestrator, the ingestion queue and the state store.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.orchestrator().status();
    ORCHESTRATOR_RUNNING.set(if status.running { 1 } else { 0 });
    LOCKS_TRACKED.set(status.tracked_locks as i64);

    INGESTION_IN_FLIGHT.set(state.queue().stats().in_flight as i64);

    for stage in Stage::SEQUENCE.iter().chain(std::iter::once(&Stage::Error)) {
        let filter = StateFilter::new()
            .with_stage(*stage)
            .with_limit(STAGE_SCAN_LIMIT);
        if let Ok(states) = state.store().list_states(&filter) {
            DOCUMENTS_BY_STAGE
                .with_label_values(&[stage.as_str()])
                .set(states.len() as i64);
        }
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    // Replace UUIDs and content hashes with placeholders
    let uuid_regex = regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap();
    let hash_regex = regex_lite::Regex::new(r"[0-9a-fA-F]{64}").unwrap();
    // Remaining free-form document ids
    let document_regex = regex_lite::Regex::new(r"/documents/[^/{]+").unwrap();

    let result = uuid_regex.replace_all(path, "{id}");
    let result = hash_regex.replace_all(&result, "{hash}");
    let result = document_regex.replace_all(&result, "/documents/{id}");
    result.to_string()
}
