//! Tracing subscriber and Prometheus exporter setup.

use crate::config::TelemetryConfig;
use campsite_runtime::metrics::{MetricsError, MetricsServer};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Telemetry could not be installed.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// A global subscriber is already set.
    #[error("Failed to install tracing subscriber: {0}")]
    Tracing(String),

    /// The Prometheus exporter failed to start.
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

/// Install the global subscriber and, when configured, the metrics endpoint.
///
/// `RUST_LOG` wins over the configured level. The returned server must be kept
/// alive for the lifetime of the process.
///
/// # Errors
///
/// Returns [`TelemetryError`] if either global recorder is already installed.
pub fn init(config: &TelemetryConfig) -> Result<Option<MetricsServer>, TelemetryError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| TelemetryError::Tracing(e.to_string()))?;

    let Some(addr) = config.metrics_addr else {
        tracing::info!("Metrics exporter disabled");
        return Ok(None);
    };
    let mut server = MetricsServer::new(addr);
    server.start()?;
    Ok(Some(server))
}
