//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with standardized naming conventions for
//! the portal's request, workflow, and chat activity.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all portal metrics
pub const METRICS_PREFIX: &str = "civica";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, // 1ms
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
];

/// Register all metric descriptions
pub fn register_metrics() {
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

    describe_counter!(
        format!("{}_papers_submitted_total", METRICS_PREFIX),
        Unit::Count,
        "Total papers submitted"
    );

    describe_counter!(
        format!("{}_paper_status_changes_total", METRICS_PREFIX),
        Unit::Count,
        "Total paper status transitions"
    );

    describe_counter!(
        format!("{}_access_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total access requests received"
    );

    describe_counter!(
        format!("{}_access_approvals_total", METRICS_PREFIX),
        Unit::Count,
        "Total access requests approved"
    );

    describe_counter!(
        format!("{}_pin_logins_total", METRICS_PREFIX),
        Unit::Count,
        "Total PIN verification attempts"
    );

    describe_counter!(
        format!("{}_chat_messages_total", METRICS_PREFIX),
        Unit::Count,
        "Total chat messages broadcast"
    );

    describe_gauge!(
        format!("{}_chat_connections", METRICS_PREFIX),
        Unit::Count,
        "Currently connected chat clients"
    );

    describe_counter!(
        format!("{}_mail_dispatch_total", METRICS_PREFIX),
        Unit::Count,
        "Total mail dispatch attempts"
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

/// Record a submitted paper
pub fn record_paper_submitted(category: &str) {
    counter!(
        format!("{}_papers_submitted_total", METRICS_PREFIX),
        "category" => category.to_string()
    )
    .increment(1);
}

/// Record a paper status transition
pub fn record_status_change(to: &str) {
    counter!(
        format!("{}_paper_status_changes_total", METRICS_PREFIX),
        "to" => to.to_string()
    )
    .increment(1);
}

/// Record an access request or approval
pub fn record_access_request() {
    counter!(format!("{}_access_requests_total", METRICS_PREFIX)).increment(1);
}

pub fn record_access_approval() {
    counter!(format!("{}_access_approvals_total", METRICS_PREFIX)).increment(1);
}

/// Record a PIN verification attempt
pub fn record_pin_login(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        format!("{}_pin_logins_total", METRICS_PREFIX),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a broadcast chat message
pub fn record_chat_message() {
    counter!(format!("{}_chat_messages_total", METRICS_PREFIX)).increment(1);
}

/// Record the current chat connection count
pub fn record_chat_connections(count: usize) {
    gauge!(format!("{}_chat_connections", METRICS_PREFIX)).set(count as f64);
}

/// Record a mail dispatch attempt
pub fn record_mail_dispatch(success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        format!("{}_mail_dispatch_total", METRICS_PREFIX),
        "status" => status.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("GET", "/papers");
        std::thread::sleep(std::time::Duration::from_millis(5));
        metrics.finish(200);
        // Just verify it runs without panic
    }

    #[test]
    fn test_recorders_run() {
        record_paper_submitted("Economic Policy");
        record_status_change("approved");
        record_pin_login(true);
        record_chat_message();
        record_chat_connections(2);
        // Just verify they run without panic
    }
}
