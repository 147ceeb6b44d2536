//! Metrics recording and the Prometheus recorder.

pub mod metrics;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and return the render
/// handle. Call once at startup, before any metric is recorded.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}
