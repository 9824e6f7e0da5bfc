//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the Inspectra server:
//! - HTTP request metrics (latency, counts, errors)
//! - Upload and authentication outcomes
//! - Report and queue gauges (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use regex_lite::Regex;

use inspectra_core::report::{ReportFilter, ReportStatus, Scope};

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
            "inspectra_http_request_duration_seconds",
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
        Opts::new("inspectra_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "inspectra_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Authentication failures.
pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "inspectra_auth_failures_total",
            "Total authentication failures",
        ),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// Ingestion Metrics
// =============================================================================

/// Uploads by result (accepted, rejected, error).
pub static UPLOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("inspectra_uploads_total", "Uploaded documents by result"),
        &["result"],
    )
    .unwrap()
});

// =============================================================================
// Report and Queue Metrics (collected dynamically)
// =============================================================================

/// Live (not deleted) reports by status.
pub static REPORTS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("inspectra_reports_by_status", "Live reports by status"),
        &["status"],
    )
    .unwrap()
});

/// Jobs by queue state.
pub static QUEUE_JOBS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("inspectra_queue_jobs", "Jobs in the queue by state"),
        &["state"],
    )
    .unwrap()
});

/// Whether the worker pool is running.
pub static WORKERS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "inspectra_workers_running",
        "Whether the worker pool is running (1) or not (0)",
    )
    .unwrap()
});

/// Jobs currently being processed.
pub static ACTIVE_JOBS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("inspectra_active_jobs", "Jobs currently being processed").unwrap()
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
    registry
        .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
        .unwrap();

    // Ingestion
    registry.register(Box::new(UPLOADS_TOTAL.clone())).unwrap();

    // Reports and queue
    registry
        .register(Box::new(REPORTS_BY_STATUS.clone()))
        .unwrap();
    registry.register(Box::new(QUEUE_JOBS.clone())).unwrap();
    registry
        .register(Box::new(WORKERS_RUNNING.clone()))
        .unwrap();
    registry.register(Box::new(ACTIVE_JOBS.clone())).unwrap();

    // Core metrics (pipeline, lifecycle, downloads, notifications)
    for metric in inspectra_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the gauges reflect the store and queue.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    if let Some(pool) = state.worker_pool() {
        let status = pool.status();
        WORKERS_RUNNING.set(if status.running { 1 } else { 0 });
        ACTIVE_JOBS.set(status.active_jobs as i64);
    }

    if let Ok(stats) = state.queue().stats() {
        QUEUE_JOBS.with_label_values(&["queued"]).set(stats.queued as i64);
        QUEUE_JOBS.with_label_values(&["running"]).set(stats.running as i64);
        QUEUE_JOBS.with_label_values(&["done"]).set(stats.done as i64);
        QUEUE_JOBS.with_label_values(&["dead"]).set(stats.dead as i64);
    }

    for status in [ReportStatus::Processing, ReportStatus::Done, ReportStatus::Failed] {
        let filter = ReportFilter::new(Scope::All).with_status(status);
        if let Ok(count) = state.reports().count(&filter) {
            REPORTS_BY_STATUS
                .with_label_values(&[status.as_str()])
                .set(count);
        }
    }
}

static UUID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});
static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    // Object keys are unbounded; collapse them to one label.
    if let Some(prefix) = path.find("/objects/").map(|i| &path[..i]) {
        return format!("{}/objects/{{key}}", prefix);
    }
    let result = UUID_SEGMENT.replace_all(path, "{id}");
    let result = NUMERIC_SEGMENT.replace_all(&result, "/{id}$1");
    result.to_string()
}
