//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all FareInn metrics
pub const METRICS_PREFIX: &str = "fareinn";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: P50 < 50ms, P99 < 150ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - P50 target
    0.075,  // 75ms
    0.100,  // 100ms
    0.150,  // 150ms - P99 target
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
];

/// Buckets for upstream model latency (typically slower)
pub const CHAT_BUCKETS: &[f64] = &[
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Workflow metrics
    describe_counter!(
        format!("{}_saga_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Workflow runs by outcome"
    );

    describe_histogram!(
        format!("{}_saga_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Workflow latency in seconds"
    );

    describe_counter!(
        format!("{}_saga_compensations_total", METRICS_PREFIX),
        Unit::Count,
        "Compensating actions by step and outcome"
    );

    describe_counter!(
        format!("{}_availability_checks_total", METRICS_PREFIX),
        Unit::Count,
        "Booking availability checks by result"
    );

    // Chat metrics
    describe_counter!(
        format!("{}_chat_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total chat model requests"
    );

    describe_histogram!(
        format!("{}_chat_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Chat reply latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record a finished workflow run
pub fn record_saga(saga: &'static str, outcome: &'static str, duration_secs: f64) {
    counter!(
        format!("{}_saga_runs_total", METRICS_PREFIX),
        "saga" => saga,
        "outcome" => outcome
    )
    .increment(1);

    histogram!(
        format!("{}_saga_duration_seconds", METRICS_PREFIX),
        "saga" => saga
    )
    .record(duration_secs);
}

/// Helper to record one compensating action
pub fn record_compensation(saga: &'static str, step: &'static str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_saga_compensations_total", METRICS_PREFIX),
        "saga" => saga,
        "step" => step,
        "status" => status
    )
    .increment(1);
}

/// Helper to record an availability check result
pub fn record_availability(result: &'static str) {
    counter!(
        format!("{}_availability_checks_total", METRICS_PREFIX),
        "result" => result
    )
    .increment(1);
}

/// Helper to record chat metrics
pub fn record_chat(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_chat_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_chat_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}
