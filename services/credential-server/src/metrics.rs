//! Prometheus metrics exposition
//!
//! - `credential_requests_total` (counter): labels `operation`, `outcome`
//! - `credential_request_duration_seconds` (histogram): label `operation`

use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_METRIC: &str = "credential_request_duration_seconds";

/// Bucket boundaries from 1ms to the default store timeout and beyond.
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(DURATION_METRIC.to_string()), DURATION_BUCKETS)
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Explicit buckets make the duration metric render as a histogram (with
/// `_bucket` lines) rather than a summary.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a finished API request.
///
/// `outcome` is `"success"` or the error kind label.
pub fn record_request(operation: &'static str, outcome: &'static str, duration_secs: f64) {
    metrics::counter!("credential_requests_total", "operation" => operation, "outcome" => outcome)
        .increment(1);
    metrics::histogram!(DURATION_METRIC, "operation" => operation).record(duration_secs);
}

#[cfg(test)]
pub(crate) fn test_handle() -> PrometheusHandle {
    builder().build_recorder().handle()
}
