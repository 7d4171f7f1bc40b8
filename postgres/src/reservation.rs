//! [`ReservationStore`] and [`OutboxStore`] over the `reservations` and `outbox`
//! tables.
//!
//! Every write opens a transaction, applies the row change, appends the outbox
//! records and commits. An update carries `WHERE version = $expected`; zero affected
//! rows means another writer got there first and the transaction is dropped, which
//! rolls it back.

use crate::error::store_error;
use campsite_core::contracts::ReservationId;
use campsite_core::outbox::{OutboxEntry, OutboxStore};
use campsite_core::store::{StoreError, StoreFuture};
use chrono::{DateTime, Utc};
use reservation_service::{Reservation, ReservationStatus, ReservationStore, StayDates};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

const COLUMNS: &str = "id, status, guest_email, first_name, last_name, arrival_date, \
    departure_date, previous_arrival_date, previous_departure_date, awaiting_verdict, version, \
    created_at, modified_at";

const OUTBOX_COLUMNS: &str = "id, aggregate_type, aggregate_id, event_type, payload, created_at, \
    attempts, last_error, published_at, abandoned_at";

/// `PostgreSQL`-backed reservations with a transactional outbox.
#[derive(Debug, Clone)]
pub struct PostgresReservationStore {
    pool: PgPool,
}

impl PostgresReservationStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn reservation_from_row(row: &PgRow) -> Result<Reservation, StoreError> {
    let status: String = row.try_get("status").map_err(store_error)?;
    let status = status
        .parse::<ReservationStatus>()
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    let previous_arrival: Option<DateTime<Utc>> =
        row.try_get("previous_arrival_date").map_err(store_error)?;
    let previous_departure: Option<DateTime<Utc>> =
        row.try_get("previous_departure_date").map_err(store_error)?;

    Ok(Reservation {
        id: ReservationId::from_uuid(row.try_get("id").map_err(store_error)?),
        status,
        guest_email: row.try_get("guest_email").map_err(store_error)?,
        first_name: row.try_get("first_name").map_err(store_error)?,
        last_name: row.try_get("last_name").map_err(store_error)?,
        dates: StayDates::new(
            row.try_get("arrival_date").map_err(store_error)?,
            row.try_get("departure_date").map_err(store_error)?,
        ),
        previous_dates: previous_arrival.zip(previous_departure).map(|(a, d)| StayDates::new(a, d)),
        awaiting_verdict: row.try_get("awaiting_verdict").map_err(store_error)?,
        version: row.try_get("version").map_err(store_error)?,
        created_at: row.try_get("created_at").map_err(store_error)?,
        modified_at: row.try_get("modified_at").map_err(store_error)?,
    })
}

fn entry_from_row(row: &PgRow) -> Result<OutboxEntry, StoreError> {
    let attempts: i32 = row.try_get("attempts").map_err(store_error)?;
    Ok(OutboxEntry {
        id: row.try_get("id").map_err(store_error)?,
        aggregate_type: row.try_get("aggregate_type").map_err(store_error)?,
        aggregate_id: row.try_get("aggregate_id").map_err(store_error)?,
        event_type: row.try_get("event_type").map_err(store_error)?,
        payload: row.try_get("payload").map_err(store_error)?,
        created_at: row.try_get("created_at").map_err(store_error)?,
        attempts: u32::try_from(attempts)
            .map_err(|_| StoreError::Serialization(format!("negative attempts: {attempts}")))?,
        last_error: row.try_get("last_error").map_err(store_error)?,
        published_at: row.try_get("published_at").map_err(store_error)?,
        abandoned_at: row.try_get("abandoned_at").map_err(store_error)?,
    })
}

async fn append_outbox(conn: &mut PgConnection, entries: &[OutboxEntry]) -> Result<(), StoreError> {
    for entry in entries {
        sqlx::query(
            r"
            INSERT INTO outbox
                (id, aggregate_type, aggregate_id, event_type, payload, created_at, attempts)
            VALUES ($1, $2, $3, $4, $5, $6, 0)
            ",
        )
        .bind(entry.id)
        .bind(&entry.aggregate_type)
        .bind(&entry.aggregate_id)
        .bind(&entry.event_type)
        .bind(&entry.payload)
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await
        .map_err(store_error)?;
    }
    Ok(())
}

impl ReservationStore for PostgresReservationStore {
    fn find(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move {
            let sql = format!("SELECT {COLUMNS} FROM reservations WHERE id = $1");
            let row = sqlx::query(&sql)
                .bind(*id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;
            row.as_ref().map(reservation_from_row).transpose()
        })
    }

    fn insert(&self, reservation: Reservation, outbox: Vec<OutboxEntry>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(store_error)?;
            let previous = reservation.previous_dates;
            sqlx::query(&format!(
                "INSERT INTO reservations ({COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
            ))
            .bind(*reservation.id.as_uuid())
            .bind(reservation.status.as_str())
            .bind(&reservation.guest_email)
            .bind(&reservation.first_name)
            .bind(&reservation.last_name)
            .bind(reservation.dates.arrival_date)
            .bind(reservation.dates.departure_date)
            .bind(previous.map(|d| d.arrival_date))
            .bind(previous.map(|d| d.departure_date))
            .bind(reservation.awaiting_verdict)
            .bind(reservation.version)
            .bind(reservation.created_at)
            .bind(reservation.modified_at)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

            append_outbox(&mut tx, &outbox).await?;
            tx.commit().await.map_err(store_error)?;

            tracing::debug!(
                reservation_id = %reservation.id,
                outbox = outbox.len(),
                "Reservation inserted"
            );
            Ok(())
        })
    }

    fn update(
        &self,
        reservation: Reservation,
        expected_version: i64,
        outbox: Vec<OutboxEntry>,
    ) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(store_error)?;
            let previous = reservation.previous_dates;
            let result = sqlx::query(
                r"
                UPDATE reservations
                SET status = $2, guest_email = $3, first_name = $4, last_name = $5,
                    arrival_date = $6, departure_date = $7,
                    previous_arrival_date = $8, previous_departure_date = $9,
                    awaiting_verdict = $10, version = $11, modified_at = $12
                WHERE id = $1 AND version = $13
                ",
            )
            .bind(*reservation.id.as_uuid())
            .bind(reservation.status.as_str())
            .bind(&reservation.guest_email)
            .bind(&reservation.first_name)
            .bind(&reservation.last_name)
            .bind(reservation.dates.arrival_date)
            .bind(reservation.dates.departure_date)
            .bind(previous.map(|d| d.arrival_date))
            .bind(previous.map(|d| d.departure_date))
            .bind(reservation.awaiting_verdict)
            .bind(reservation.version)
            .bind(reservation.modified_at)
            .bind(expected_version)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

            if result.rows_affected() == 0 {
                metrics::counter!("store.version_conflicts", "table" => "reservations").increment(1);
                return Err(StoreError::Conflict(format!(
                    "reservation {} is no longer at version {expected_version}",
                    reservation.id
                )));
            }

            append_outbox(&mut tx, &outbox).await?;
            tx.commit().await.map_err(store_error)?;
            Ok(())
        })
    }

    fn find_by_guest_email(&self, email: &str) -> StoreFuture<'_, Vec<Reservation>> {
        let email = email.to_string();
        Box::pin(async move {
            let sql = format!(
                "SELECT {COLUMNS} FROM reservations WHERE guest_email = $1 \
                 ORDER BY created_at DESC, id DESC"
            );
            let rows = sqlx::query(&sql)
                .bind(email)
                .fetch_all(&self.pool)
                .await
                .map_err(store_error)?;
            rows.iter().map(reservation_from_row).collect()
        })
    }
}

impl OutboxStore for PostgresReservationStore {
    fn pending(&self, limit: usize) -> StoreFuture<'_, Vec<OutboxEntry>> {
        Box::pin(async move {
            let sql = format!(
                "SELECT {OUTBOX_COLUMNS} FROM outbox \
                 WHERE published_at IS NULL AND abandoned_at IS NULL ORDER BY seq LIMIT $1"
            );
            let rows = sqlx::query(&sql)
                .bind(i64::try_from(limit).unwrap_or(i64::MAX))
                .fetch_all(&self.pool)
                .await
                .map_err(store_error)?;
            rows.iter().map(entry_from_row).collect()
        })
    }

    fn mark_published(&self, id: Uuid, at: DateTime<Utc>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("UPDATE outbox SET published_at = COALESCE(published_at, $2) WHERE id = $1")
                .bind(id)
                .bind(at)
                .execute(&self.pool)
                .await
                .map_err(store_error)?;
            Ok(())
        })
    }

    fn mark_failed(&self, id: Uuid, reason: String) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("UPDATE outbox SET attempts = attempts + 1, last_error = $2 WHERE id = $1")
                .bind(id)
                .bind(reason)
                .execute(&self.pool)
                .await
                .map_err(store_error)?;
            Ok(())
        })
    }

    fn mark_abandoned(&self, id: Uuid, reason: String, at: DateTime<Utc>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                UPDATE outbox
                SET attempts = attempts + 1, last_error = $2,
                    abandoned_at = COALESCE(abandoned_at, $3)
                WHERE id = $1
                ",
            )
            .bind(id)
            .bind(reason)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
            Ok(())
        })
    }
}
