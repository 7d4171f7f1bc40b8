//! Availability service: validates requested stays and answers the reservation
//! service.

use anyhow::Context;
use campsite_core::environment::SystemClock;
use campsite_postgres::{PostgresOccupancyStore, connect, migrate_availability};
use campsite_server::app::{redpanda_bus, shutdown_on_signal};
use campsite_server::{AvailabilityApp, Config, telemetry};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env("availability-service")?;
    let _metrics = telemetry::init(&config.telemetry)?;
    tracing::info!(
        brokers = %config.broker.brokers,
        consumer_group = %config.broker.consumer_group,
        "Starting availability service"
    );

    let pool = connect(&config.postgres.url, config.postgres.max_connections)
        .await
        .context("connecting to the occupancy database")?;
    migrate_availability(&pool).await?;

    let bus = redpanda_bus(&config.broker)?;
    let app = AvailabilityApp::new(
        Arc::new(PostgresOccupancyStore::new(pool)),
        bus,
        Arc::new(SystemClock),
        &config,
    );

    let calendar = app.search.search(None, None).await?;
    tracing::info!(
        days = calendar.len(),
        available = calendar.iter().filter(|slot| slot.available).count(),
        "Current calendar loaded"
    );

    let (shutdown, rx) = watch::channel(false);
    tokio::spawn(shutdown_on_signal(shutdown));
    app.run(rx).await?;

    tracing::info!("Availability service stopped");
    Ok(())
}
