//! Telemetry module
//!
//! Structured logging and Prometheus metrics for the sync and
//! resolution sweeps.

mod logging;
mod metrics;

pub use logging::init_logging;
pub use metrics::{increment, set_gauge, CounterMetric, GaugeMetric};

use crate::config::TelemetryConfig;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};

/// Initialize logging and the metrics exporter
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    init_logging(&config.log_level)?;

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.metrics_port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics exporter: {}", e))?;

    tracing::info!(metrics_port = config.metrics_port, "Telemetry initialized");
    Ok(())
}
