//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Pipeline (jobs, stage durations, engines, fallbacks)
//! - Lifecycle (purge sweeps)
//! - Downloads and notifications

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Pipeline Metrics
// =============================================================================

/// Jobs processed by outcome.
pub static JOBS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("inspectra_jobs_processed_total", "Total report jobs processed"),
        &["outcome"], // "done", "failed", "skipped", "dropped", "retry"
    )
    .unwrap()
});

/// Whole-job duration in seconds.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "inspectra_job_duration_seconds",
            "Duration of one report job",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
        &["outcome"],
    )
    .unwrap()
});

/// Per-stage duration in seconds.
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "inspectra_stage_duration_seconds",
            "Duration of individual pipeline stages",
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
        &["stage"], // "extract", "analyze", "render", "upload", "persist"
    )
    .unwrap()
});

/// Analyses by the engine that actually produced them.
pub static ENGINE_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("inspectra_engine_runs_total", "Analyses by engine"),
        &["engine"],
    )
    .unwrap()
});

/// AI failures that fell back to the rule engine.
pub static AI_FALLBACKS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "inspectra_ai_fallbacks_total",
            "AI analyses replaced by the rule engine",
        ),
        &["reason"], // "llm", "validation"
    )
    .unwrap()
});

/// Distribution of persisted scores.
pub static REPORT_SCORES: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("inspectra_report_score", "Scores of completed reports")
            .buckets(vec![10.0, 25.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0]),
        &[],
    )
    .unwrap()
});

/// Jobs abandoned after exceeding their timeout.
pub static JOB_TIMEOUTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("inspectra_job_timeouts_total", "Jobs that exceeded their timeout").unwrap()
});

// =============================================================================
// Lifecycle Metrics
// =============================================================================

/// Purge results per report.
pub static PURGE_RESULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("inspectra_purge_results_total", "Purge sweep results per report"),
        &["result"], // "purged", "failed"
    )
    .unwrap()
});

/// Objects removed from storage by purge sweeps.
pub static OBJECTS_PURGED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "inspectra_objects_purged_total",
        "Objects removed from storage by purge sweeps",
    )
    .unwrap()
});

// =============================================================================
// Access Metrics
// =============================================================================

/// Download authorizations by result.
pub static DOWNLOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("inspectra_downloads_total", "Download authorizations"),
        &["result"], // "granted", "not_found", "not_ready", "error"
    )
    .unwrap()
});

/// Notification deliveries by result.
pub static NOTIFICATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("inspectra_notifications_total", "Notification deliveries"),
        &["result"], // "delivered", "failed"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Pipeline
        Box::new(JOBS_PROCESSED.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(STAGE_DURATION.clone()),
        Box::new(ENGINE_RUNS.clone()),
        Box::new(AI_FALLBACKS.clone()),
        Box::new(REPORT_SCORES.clone()),
        Box::new(JOB_TIMEOUTS.clone()),
        // Lifecycle
        Box::new(PURGE_RESULTS.clone()),
        Box::new(OBJECTS_PURGED.clone()),
        // Access
        Box::new(DOWNLOADS.clone()),
        Box::new(NOTIFICATIONS.clone()),
    ]
}
