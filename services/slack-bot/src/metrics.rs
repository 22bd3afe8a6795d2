//! Prometheus metrics exposition
//!
//! - `oauth_callbacks_total` (counter): label `outcome`
//! - `oauth_exchange_duration_seconds` (histogram)
//! - `slack_commands_total` (counter): label `command`

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const EXCHANGE_DURATION: &str = "oauth_exchange_duration_seconds";

/// Buckets from 10ms up to the longest exchange timeout worth configuring.
const EXCHANGE_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(EXCHANGE_DURATION.to_string()), EXCHANGE_BUCKETS)
}

/// Install the global Prometheus recorder and return a handle for `/metrics`.
///
/// Without explicit buckets the exporter renders the exchange histogram as a
/// summary, which `histogram_quantile()` cannot query.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record how a `/github/callback` request ended.
pub fn record_callback(outcome: &'static str) {
    metrics::counter!("oauth_callbacks_total", "outcome" => outcome).increment(1);
}

/// Record the latency of one token exchange, successful or not.
pub fn record_exchange_duration(duration_secs: f64) {
    metrics::histogram!(EXCHANGE_DURATION).record(duration_secs);
}

/// Record a dispatched slash command.
pub fn record_command(command: &str) {
    metrics::counter!("slack_commands_total", "command" => command.to_string()).increment(1);
}
