//! Production-grade metrics with Prometheus
//!
//! Exposes key operational metrics for monitoring dashboards:
//! - Request rates and latencies
//! - Inspection pipeline outcomes and durations
//! - Vision/embedding call performance
//! - Vector search performance
//!
//! Alert gating is handled separately by the sliding-window store in
//! `monitor`; these series are for scraping.
//!
//! NOTE: shop_id is intentionally absent from labels to prevent
//! high-cardinality explosion that can crash Prometheus.

use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Request Metrics
    // ============================================================================

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "drishti_http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["method", "endpoint", "status"]
    ).unwrap();

    /// Total HTTP requests
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("drishti_http_requests_total", "Total HTTP requests"),
        &["method", "endpoint", "status"]
    ).unwrap();

    // ============================================================================
    // Inspection Pipeline Metrics
    // ============================================================================

    /// Inspections finished, by terminal result
    pub static ref INSPECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("drishti_inspections_total", "Inspections finished by result"),
        &["result"]  // result: "complete", "failed"
    ).unwrap();

    /// End-to-end processing duration per inspection
    pub static ref INSPECTION_PROCESSING_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "drishti_inspection_processing_duration_seconds",
            "Inspection processing duration (assess + normalize + embed + persist)"
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0])
    ).unwrap();

    /// Inspections currently in the processing state
    pub static ref ACTIVE_INSPECTIONS: IntGauge = IntGauge::new(
        "drishti_active_inspections",
        "Inspections currently being processed"
    ).unwrap();

    // ============================================================================
    // Upstream Model Metrics
    // ============================================================================

    /// Vision assessment calls by result
    pub static ref VISION_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("drishti_vision_calls_total", "Vision model calls"),
        &["result"]
    ).unwrap();

    /// Vision assessment call duration (per attempt)
    pub static ref VISION_CALL_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "drishti_vision_call_duration_seconds",
            "Vision model call duration"
        )
        .buckets(vec![0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 30.0])
    ).unwrap();

    /// Embedding batch calls by result
    pub static ref EMBEDDING_BATCHES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("drishti_embedding_batches_total", "Embedding batch calls"),
        &["result"]
    ).unwrap();

    /// Embedding batch call duration (per attempt)
    pub static ref EMBEDDING_BATCH_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "drishti_embedding_batch_duration_seconds",
            "Embedding batch call duration"
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0])
    ).unwrap();

    // ============================================================================
    // Similarity Search Metrics
    // ============================================================================

    /// Vector search operations
    pub static ref VECTOR_SEARCH_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("drishti_vector_search_total", "Vector search operations"),
        &["result"]  // result: "ok", "degraded"
    ).unwrap();

    /// Vector search duration (embed + scan)
    pub static ref VECTOR_SEARCH_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "drishti_vector_search_duration_seconds",
            "Vector search duration"
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0])
    ).unwrap();

    // ============================================================================
    // Alerting Metrics
    // ============================================================================

    /// Alerts raised by severity
    pub static ref ALERTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("drishti_alerts_total", "Alerts raised"),
        &["severity"]
    ).unwrap();
}

/// Register all metrics with the global registry
pub fn register_metrics() -> Result<(), prometheus::Error> {
    METRICS_REGISTRY.register(Box::new(HTTP_REQUEST_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;

    METRICS_REGISTRY.register(Box::new(INSPECTIONS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(INSPECTION_PROCESSING_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(ACTIVE_INSPECTIONS.clone()))?;

    METRICS_REGISTRY.register(Box::new(VISION_CALLS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(VISION_CALL_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(EMBEDDING_BATCHES_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(EMBEDDING_BATCH_DURATION.clone()))?;

    METRICS_REGISTRY.register(Box::new(VECTOR_SEARCH_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(VECTOR_SEARCH_DURATION.clone()))?;

    METRICS_REGISTRY.register(Box::new(ALERTS_TOTAL.clone()))?;

    Ok(())
}

/// Helper to time operations with histogram (RAII pattern)
/// Usage: let _timer = Timer::new(SOME_HISTOGRAM.clone());
pub struct Timer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl Timer {
    /// Create timer that records duration to histogram on drop
    pub fn new(histogram: Histogram) -> Self {
        Self {
            histogram,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
