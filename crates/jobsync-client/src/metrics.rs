//! Client request metrics.
//!
//! Recorded through the `metrics` facade; installing an exporter is up to
//! the embedding application.

use metrics::{counter, histogram};

/// Metric name constants.
pub mod names {
    /// Total API requests by operation and status.
    pub const REQUESTS_TOTAL: &str = "jobsync_client_requests_total";

    /// Total retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "jobsync_client_retries_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "jobsync_client_latency_seconds";
}

/// Record metrics for a completed API request.
///
/// `status` is the HTTP status, or `"transport"` / `"decode"` when the
/// request failed without one.
pub fn record_request(operation: &'static str, status: &str, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation,
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(names::LATENCY_SECONDS, "operation" => operation).record(latency_ms / 1000.0);
}

/// Record a retry attempt.
pub fn record_retry(operation: &'static str) {
    counter!(names::RETRIES_TOTAL, "operation" => operation).increment(1);
}
