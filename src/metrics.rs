/// Metrics and telemetry for the flashcard graph service
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - Card operation counts and latencies
/// - Storage gateway call counts and latencies
/// - Practice session read-back polling

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    // ========== Card Operation Metrics ==========

    /// Card operations by operation name and outcome
    pub static ref CARD_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "card_operations_total",
        "Total number of card operations",
        &["operation", "outcome"]
    )
    .unwrap();

    /// Card operation duration in seconds
    pub static ref CARD_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "card_operation_duration_seconds",
        "Card operation latencies in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap();

    // ========== Storage Metrics ==========

    /// Storage gateway calls by operation and outcome
    pub static ref STORAGE_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "storage_calls_total",
        "Total number of storage gateway calls",
        &["operation", "outcome"]
    )
    .unwrap();

    /// Storage gateway call duration in seconds
    pub static ref STORAGE_CALL_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "storage_call_duration_seconds",
        "Storage gateway call latencies in seconds",
        &["operation"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // ========== Practice Session Metrics ==========

    /// Reads of the practice index made while waiting for it to settle
    pub static ref PRACTICE_SETTLE_POLLS_TOTAL: IntCounter = register_int_counter!(
        "practice_settle_polls_total",
        "Total number of practice index read-back polls"
    )
    .unwrap();
}

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record a card operation
pub fn record_card_operation(operation: &str, success: bool, duration: f64) {
    CARD_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome(success)])
        .inc();
    CARD_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration);
}

/// Record a storage gateway call
pub fn record_storage_call(operation: &str, success: bool, duration: f64) {
    STORAGE_CALLS_TOTAL
        .with_label_values(&[operation, outcome(success)])
        .inc();
    STORAGE_CALL_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration);
}

/// Record one practice index read-back poll
pub fn record_practice_settle_poll() {
    PRACTICE_SETTLE_POLLS_TOTAL.inc();
}

/// Times one card operation from creation until `finish`
pub struct OperationTimer {
    operation: &'static str,
    started: Instant,
}

impl OperationTimer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            operation,
            started: Instant::now(),
        }
    }

    /// Record the outcome of the result and hand it back unchanged
    pub fn finish<T, E>(self, result: Result<T, E>) -> Result<T, E> {
        record_card_operation(
            self.operation,
            result.is_ok(),
            self.started.elapsed().as_secs_f64(),
        );
        result
    }
}
