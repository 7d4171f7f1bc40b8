//! Prometheus exporter for the saga counters.
//!
//! # Example
//!
//! ```rust,no_run
//! use campsite_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! // Scrape http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install the exporter and its HTTP listener
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus scrape endpoint.
///
/// Must be started from within a Tokio runtime; the HTTP listener runs as a
/// background task.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    started: bool,
}

impl MetricsServer {
    /// Create a server that will listen on `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            started: false,
        }
    }

    /// Install the global recorder and start serving `/metrics`.
    ///
    /// Starting twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if a recorder is already installed or the
    /// address cannot be bound.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        if self.started {
            return Ok(());
        }

        PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .install()
            .map_err(|e| MetricsError::Install(e.to_string()))?;
        describe_metrics();

        self.started = true;
        tracing::info!(addr = %self.addr, "Metrics available at http://{}/metrics", self.addr);
        Ok(())
    }

    /// Address the endpoint listens on.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whether [`start`](Self::start) has succeeded.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }
}

fn describe_metrics() {
    // Availability side
    describe_counter!(
        "availability.occupancy.confirmed",
        "Stays accepted and written to the occupancy store"
    );
    describe_counter!(
        "availability.occupancy.rejected",
        "Stays refused because they overlap an existing occupancy"
    );
    describe_counter!(
        "availability.occupancy.released",
        "Occupancies deleted after a cancellation"
    );

    // Reservation side
    describe_counter!(
        "reservation.transition",
        "Reservation state changes, labelled by target status"
    );

    // Plumbing
    describe_counter!("outbox.published", "Outbox records handed to the bus");
    describe_counter!("outbox.publish_failed", "Outbox publishes that failed after retries");
    describe_counter!("outbox.abandoned", "Outbox records that can never be published");
    describe_counter!("consumer.events", "Inbound events by handler and outcome");
    describe_counter!("consumer.retries", "Transient handler failures waited out by a consumer");
    describe_counter!("consumer.stream_errors", "Errors yielded by a subscription stream");
    describe_counter!("dlq.pushed", "Events parked in a dead-letter queue");
    describe_counter!("dlq.dropped", "Parked events evicted from a full dead-letter queue");
    describe_gauge!("dlq.size", "Events currently parked");
    describe_counter!(
        "store.version_conflicts",
        "Writes refused because the row changed since it was read"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_server_is_idle() {
        let server = MetricsServer::new(SocketAddr::from(([127, 0, 0, 1], 9898)));
        assert!(!server.is_started());
        assert_eq!(server.addr().port(), 9898);
    }
}
