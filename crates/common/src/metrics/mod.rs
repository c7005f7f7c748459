//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with standardized naming conventions for the
//! retrieval pipeline.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Vitrine metrics
pub const METRICS_PREFIX: &str = "vitrine";

/// Histogram buckets for end-to-end retrieval latency (in seconds).
/// Each query fans out to several provider round-trips, so the upper
/// buckets run well past typical single-call latencies.
pub const RETRIEVAL_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
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

    // Retrieval metrics
    describe_counter!(
        format!("{}_retrieval_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of retrieval queries"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end retrieval latency in seconds"
    );

    describe_gauge!(
        format!("{}_retrieval_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of grouped events returned"
    );

    // Fan-out metrics
    describe_counter!(
        format!("{}_sub_searches_total", METRICS_PREFIX),
        Unit::Count,
        "Total similarity sub-searches issued"
    );

    describe_counter!(
        format!("{}_sub_search_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Sub-searches skipped due to provider failures"
    );

    // Extraction metrics
    describe_counter!(
        format!("{}_extraction_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Analysis calls that degraded to defaults"
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

/// Helper to record retrieval metrics
pub fn record_retrieval(duration_secs: f64, result_count: usize, filtered: bool) {
    let filtered = if filtered { "filtered" } else { "unfiltered" };

    counter!(
        format!("{}_retrieval_queries_total", METRICS_PREFIX),
        "filter" => filtered.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        "filter" => filtered.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_retrieval_results_count", METRICS_PREFIX)
    )
    .set(result_count as f64);
}

/// Helper to record one sub-search outcome
pub fn record_sub_search(success: bool) {
    counter!(
        format!("{}_sub_searches_total", METRICS_PREFIX)
    )
    .increment(1);

    if !success {
        counter!(
            format!("{}_sub_search_failures_total", METRICS_PREFIX)
        )
        .increment(1);
    }
}

/// Helper to record an analysis degradation
pub fn record_extraction_fallback(kind: &str) {
    counter!(
        format!("{}_extraction_fallbacks_total", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retrieval_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in RETRIEVAL_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("POST", "/v1/search");
        std::thread::sleep(std::time::Duration::from_millis(10));
        metrics.finish(200);
        // Just verify it runs without panic
    }
}
