//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Locking (acquisitions, expiry sweeps)
//! - State tracking and task execution
//! - Ingestion (outcomes, retries, backpressure)
//! - LLM token usage

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Locking
// =============================================================================

/// Lock acquisition attempts by result.
pub static LOCK_ACQUISITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "docflow_lock_acquisitions_total",
            "Total document lock acquisition attempts",
        ),
        &["result"], // "acquired", "held"
    )
    .unwrap()
});

/// Expired locks cleared by the sweeper.
pub static LOCKS_SWEPT: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "docflow_locks_swept_total",
        "Total expired locks cleared by the sweeper",
    )
    .unwrap()
});

// =============================================================================
// State Tracking and Tasks
// =============================================================================

/// Stage transitions by target stage.
pub static STAGE_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "docflow_stage_transitions_total",
            "Total recorded stage transitions",
        ),
        &["stage"],
    )
    .unwrap()
});

/// Task duration in seconds.
pub static TASK_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("docflow_task_duration_seconds", "Duration of stage tasks")
            .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["stage", "result"], // result: "success", "failure", "fault"
    )
    .unwrap()
});

// =============================================================================
// Ingestion
// =============================================================================

/// Documents leaving the ingestion queue by result.
pub static INGEST_DOCUMENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "docflow_ingest_documents_total",
            "Total documents handled by the ingestion queue",
        ),
        &["result"], // "processed", "failed", "rejected"
    )
    .unwrap()
});

/// Enqueue attempts refused because the queue was full.
pub static QUEUE_REJECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "docflow_queue_rejections_total",
        "Total enqueue attempts refused by backpressure",
    )
    .unwrap()
});

/// Retry attempts after a fault.
pub static INGEST_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "docflow_ingest_retries_total",
        "Total processing retries after a fault",
    )
    .unwrap()
});

/// Documents waiting in the ingestion queue.
pub static QUEUE_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "docflow_queue_depth",
        "Number of documents waiting in the ingestion queue",
    )
    .unwrap()
});

// =============================================================================
// External Services
// =============================================================================

/// LLM token usage.
pub static LLM_TOKENS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("docflow_llm_tokens_total", "Total LLM tokens used"),
        &["provider", "direction"], // direction: "input", "output"
    )
    .unwrap()
});

/// All core metrics, for registration with a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Locking
        Box::new(LOCK_ACQUISITIONS.clone()),
        Box::new(LOCKS_SWEPT.clone()),
        // Tracking and tasks
        Box::new(STAGE_TRANSITIONS.clone()),
        Box::new(TASK_DURATION.clone()),
        // Ingestion
        Box::new(INGEST_DOCUMENTS.clone()),
        Box::new(QUEUE_REJECTIONS.clone()),
        Box::new(INGEST_RETRIES.clone()),
        Box::new(QUEUE_DEPTH.clone()),
        // External services
        Box::new(LLM_TOKENS.clone()),
    ]
}
