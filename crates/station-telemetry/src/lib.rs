//! Process-wide logging and metrics initialization (§11).
//!
//! The metric families themselves live in `station_common::metrics` since
//! they're registered once against the global Prometheus registry and read
//! by every crate; this crate owns bringing the `tracing` subscriber up.

use station_common::{Config, CoreError, Result};
use tracing_subscriber::EnvFilter;

pub use station_common::metrics::{ACTIONS_TOTAL, ANOMALIES_TOTAL, FRAMES_TOTAL, RCA_DURATION_SECONDS};

/// Installs the global `tracing` subscriber: an `EnvFilter` defaulting to
/// `info` (overridable via `RUST_LOG`), plain or JSON formatted per
/// `TelemetryConfig::json_logs`. Safe to call at most once per process;
/// a second call returns an `Internal` error rather than panicking.
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.telemetry.log_level.clone()));

    let result = if config.telemetry.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    result.map_err(|e| CoreError::Configuration(format!("tracing subscriber already installed: {e}")))
}

/// Renders the current Prometheus registry in text exposition format, for
/// the gateway's `/metrics` endpoint.
pub fn render_metrics() -> Result<String> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| CoreError::Internal(anyhow::anyhow!("encoding metrics: {e}")))?;
    String::from_utf8(buffer).map_err(|e| CoreError::Internal(anyhow::anyhow!("metrics not utf8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_render_without_error() {
        ANOMALIES_TOTAL.with_label_values(&["LOW"]).inc();
        let rendered = render_metrics().unwrap();
        assert!(rendered.contains("station_anomalies_total"));
    }
}
