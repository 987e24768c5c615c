//! Tracing subscriber setup, shared by the loader and server binaries.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

pub fn start_metrics_server(port: u16) {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(err) = builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
    {
        tracing::warn!(error = %err, "failed to install Prometheus metrics exporter");
    }
}
