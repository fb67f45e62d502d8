//! Prometheus metrics exposition
//!
//! - `relay_requests_total` (counter): labels `route`, `status`
//! - `relay_request_duration_seconds` (histogram): label `route`
//! - `snapshot_runs_total` (counter): label `outcome`
//! - `token_acquisitions_total` (counter, recorded by `instant-on-auth`): label `outcome`

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Relay latency includes the four-step token flow, hence the long tail.
const DURATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("relay_request_duration_seconds".to_string()),
        DURATION_BUCKETS,
    )
}

/// Install the global Prometheus recorder and return its render handle.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    Ok(builder()?.install_recorder()?)
}

/// Record a completed relay request.
pub fn record_request(route: &'static str, status: u16, duration_secs: f64) {
    metrics::counter!("relay_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
    metrics::histogram!("relay_request_duration_seconds", "route" => route).record(duration_secs);
}

/// Record the outcome of one snapshot cycle.
pub fn record_snapshot(outcome: &'static str) {
    metrics::counter!("snapshot_runs_total", "outcome" => outcome).increment(1);
}
