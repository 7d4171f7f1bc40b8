//! Reservation service: owns the reservation lifecycle, publishes its events
//! through the outbox and applies availability verdicts.

use anyhow::Context;
use campsite_core::environment::SystemClock;
use campsite_postgres::{PostgresReservationStore, connect, migrate_reservation};
use campsite_server::app::{redpanda_bus, shutdown_on_signal};
use campsite_server::{Config, ReservationApp, telemetry};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env("reservation-service")?;
    let _metrics = telemetry::init(&config.telemetry)?;
    tracing::info!(
        brokers = %config.broker.brokers,
        consumer_group = %config.broker.consumer_group,
        outbox_poll_ms = u64::try_from(config.outbox.poll_interval.as_millis()).unwrap_or(u64::MAX),
        "Starting reservation service"
    );

    let pool = connect(&config.postgres.url, config.postgres.max_connections)
        .await
        .context("connecting to the reservation database")?;
    migrate_reservation(&pool).await?;

    let bus = redpanda_bus(&config.broker)?;
    let app = ReservationApp::new(
        Arc::new(PostgresReservationStore::new(pool)),
        bus,
        Arc::new(SystemClock),
        &config,
    );

    let (shutdown, rx) = watch::channel(false);
    tokio::spawn(shutdown_on_signal(shutdown));
    app.run(rx).await?;

    tracing::info!("Reservation service stopped");
    Ok(())
}
