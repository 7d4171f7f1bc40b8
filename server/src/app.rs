//! Wiring of each service from its stores, the bus and the configuration.
//!
//! The binaries hand in `PostgreSQL` stores and the Redpanda bus; the end-to-end
//! tests hand in the in-memory doubles. Everything else is identical.

use crate::config::{BrokerConfig, Config};
use availability_service::{AvailabilityCoordinator, AvailabilitySearch, OccupancyStore};
use campsite_core::environment::Clock;
use campsite_core::event_bus::{EventBus, EventBusError};
use campsite_core::outbox::OutboxStore;
use campsite_runtime::consumer::ConsumerError;
use campsite_redpanda::RedpandaEventBus;
use campsite_runtime::{DeadLetterQueue, EventConsumer, OutboxRelay, SagaEventHandler};
use reservation_service::{ReservationService, ReservationStore, VerdictHandler};
use std::sync::Arc;
use tokio::sync::watch;

fn consumer(
    bus: Arc<dyn EventBus>,
    config: &Config,
    handler: Arc<dyn SagaEventHandler>,
) -> EventConsumer {
    EventConsumer::new(bus, config.channels.clone(), handler)
        .with_retry_policy(config.consumer.retry_policy())
        .with_dead_letter_queue(DeadLetterQueue::new(config.consumer.dead_letter_capacity))
}

/// The availability service: the coordinator behind a consumer, plus the search
/// query.
pub struct AvailabilityApp {
    /// Calendar query
    pub search: AvailabilitySearch,
    /// Inbound reservation events
    pub consumer: EventConsumer,
}

impl AvailabilityApp {
    /// Wire the service.
    #[must_use]
    pub fn new(
        store: Arc<dyn OccupancyStore>,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        let coordinator = AvailabilityCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            config.channels.clone(),
            Arc::clone(&clock),
        );
        Self {
            search: AvailabilitySearch::new(store, clock, config.calendar),
            consumer: consumer(bus, config, Arc::new(coordinator)),
        }
    }

    /// Consume until `shutdown` flips to `true`.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError`] if the subscription cannot be established.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), ConsumerError> {
        self.consumer.run(shutdown).await
    }
}

/// The reservation service: the command shell, the outbox relay and the verdict
/// consumer.
pub struct ReservationApp {
    /// Commands and queries
    pub service: Arc<ReservationService>,
    /// Outbox drain
    pub relay: OutboxRelay,
    /// Inbound verdicts
    pub consumer: EventConsumer,
    poll_interval: std::time::Duration,
}

impl ReservationApp {
    /// Wire the service over a store that also owns the outbox.
    #[must_use]
    pub fn new<S>(store: Arc<S>, bus: Arc<dyn EventBus>, clock: Arc<dyn Clock>, config: &Config) -> Self
    where
        S: ReservationStore + OutboxStore + 'static,
    {
        let service = Arc::new(ReservationService::new(
            Arc::clone(&store) as Arc<dyn ReservationStore>,
            Arc::clone(&clock),
            config.booking,
        ));
        let relay = OutboxRelay::new(
            store as Arc<dyn OutboxStore>,
            Arc::clone(&bus),
            config.channels.clone(),
            clock,
        )
        .with_batch_size(config.outbox.batch_size);

        Self {
            consumer: consumer(bus, config, Arc::new(VerdictHandler::new(Arc::clone(&service)))),
            service,
            relay,
            poll_interval: config.outbox.poll_interval,
        }
    }

    /// Relay and consume until `shutdown` flips to `true`.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError`] if the subscription cannot be established.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), ConsumerError> {
        // Either side stopping ends the service; both stop on shutdown.
        tokio::select! {
            consumed = self.consumer.run(shutdown.clone()) => consumed,
            () = self.relay.run(self.poll_interval, shutdown) => Ok(()),
        }
    }
}

/// Redpanda bus for `config`.
///
/// # Errors
///
/// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be created.
pub fn redpanda_bus(config: &BrokerConfig) -> Result<Arc<dyn EventBus>, EventBusError> {
    let bus = RedpandaEventBus::builder()
        .brokers(&config.brokers)
        .consumer_group(&config.consumer_group)
        .producer_acks(&config.producer_acks)
        .compression(&config.compression)
        .auto_offset_reset(&config.auto_offset_reset)
        .build()?;
    Ok(Arc::new(bus))
}

/// Flip `shutdown` on Ctrl-C or SIGTERM.
pub async fn shutdown_on_signal(shutdown: watch::Sender<bool>) {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(%error, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("Shutdown requested");
    // Nobody listening means everything already stopped.
    let _ = shutdown.send(true);
}
