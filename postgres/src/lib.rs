//! `PostgreSQL` stores for the campsite saga.
//!
//! - [`PostgresOccupancyStore`]: the availability side's occupancy table
//! - [`PostgresReservationStore`]: reservations plus the transactional outbox the
//!   relay drains
//!
//! Each service owns its own schema. [`migrate_availability`] and
//! [`migrate_reservation`] apply the embedded migrations and tolerate each other's
//! history, so both may also share one database (as the end-to-end tests do).
//!
//! # Example
//!
//! ```ignore
//! use campsite_postgres::{connect, migrate_reservation, PostgresReservationStore};
//!
//! let pool = connect("postgres://localhost/reservations", 10).await?;
//! migrate_reservation(&pool).await?;
//! let store = PostgresReservationStore::new(pool);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod occupancy;
pub mod reservation;

pub use occupancy::PostgresOccupancyStore;
pub use reservation::PostgresReservationStore;

use campsite_core::store::StoreError;
use error::store_error;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if the database cannot be reached.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(store_error)?;
    tracing::info!(max_connections, "Connected to PostgreSQL");
    Ok(pool)
}

/// Create or upgrade the occupancy table.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if a migration fails.
pub async fn migrate_availability(pool: &PgPool) -> Result<(), StoreError> {
    run(sqlx::migrate!("./migrations/availability"), pool).await
}

/// Create or upgrade the reservation and outbox tables.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if a migration fails.
pub async fn migrate_reservation(pool: &PgPool) -> Result<(), StoreError> {
    run(sqlx::migrate!("./migrations/reservation"), pool).await
}

async fn run(mut migrator: Migrator, pool: &PgPool) -> Result<(), StoreError> {
    // The other service's migrations may share the history table.
    migrator.set_ignore_missing(true);
    migrator
        .run(pool)
        .await
        .map_err(|e| StoreError::Unavailable(format!("Migration failed: {e}")))
}
