//! [`OccupancyStore`] over the `occupancies` table.

use crate::error::store_error;
use availability_service::{OccupancyRecord, OccupancyStore, Stay};
use campsite_core::contracts::ReservationId;
use campsite_core::store::{StoreError, StoreFuture};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const COLUMNS: &str = "id, reservation_id, arrival_date, departure_date, created_at, modified_at";

/// `PostgreSQL`-backed occupancy collection.
///
/// The unique key on `reservation_id` enforces one record per reservation; a second
/// insert for the same reservation fails with [`StoreError::Conflict`].
#[derive(Debug, Clone)]
pub struct PostgresOccupancyStore {
    pool: PgPool,
}

impl PostgresOccupancyStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn select_range(
        &self,
        predicate: &str,
        a: DateTime<Utc>,
        b: DateTime<Utc>,
    ) -> Result<Vec<OccupancyRecord>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM occupancies WHERE {predicate} ORDER BY arrival_date, reservation_id"
        );
        let rows = sqlx::query(&sql)
            .bind(a)
            .bind(b)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: &PgRow) -> Result<OccupancyRecord, StoreError> {
    let stay = Stay::new(
        row.try_get("arrival_date").map_err(store_error)?,
        row.try_get("departure_date").map_err(store_error)?,
    )
    .map_err(|e| StoreError::Serialization(e.to_string()))?;

    Ok(OccupancyRecord {
        id: row.try_get("id").map_err(store_error)?,
        reservation_id: ReservationId::from_uuid(row.try_get("reservation_id").map_err(store_error)?),
        stay,
        created_at: row.try_get("created_at").map_err(store_error)?,
        modified_at: row.try_get("modified_at").map_err(store_error)?,
    })
}

impl OccupancyStore for PostgresOccupancyStore {
    fn find_by_reservation_id(
        &self,
        reservation_id: ReservationId,
    ) -> StoreFuture<'_, Option<OccupancyRecord>> {
        Box::pin(async move {
            let sql = format!("SELECT {COLUMNS} FROM occupancies WHERE reservation_id = $1");
            let row = sqlx::query(&sql)
                .bind(*reservation_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?;
            row.as_ref().map(record_from_row).transpose()
        })
    }

    fn insert(&self, record: OccupancyRecord) -> StoreFuture<'_, OccupancyRecord> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO occupancies
                    (id, reservation_id, arrival_date, departure_date, created_at, modified_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(record.id)
            .bind(*record.reservation_id.as_uuid())
            .bind(record.stay.arrival())
            .bind(record.stay.departure())
            .bind(record.created_at)
            .bind(record.modified_at)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

            tracing::debug!(reservation_id = %record.reservation_id, "Occupancy inserted");
            Ok(record)
        })
    }

    fn update(&self, record: OccupancyRecord) -> StoreFuture<'_, OccupancyRecord> {
        Box::pin(async move {
            let sql = format!(
                r"
                UPDATE occupancies
                SET arrival_date = $2, departure_date = $3, modified_at = $4
                WHERE reservation_id = $1
                RETURNING {COLUMNS}
                "
            );
            let row = sqlx::query(&sql)
                .bind(*record.reservation_id.as_uuid())
                .bind(record.stay.arrival())
                .bind(record.stay.departure())
                .bind(record.modified_at)
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error)?
                .ok_or_else(|| {
                    StoreError::Conflict(format!(
                        "no occupancy for reservation {}",
                        record.reservation_id
                    ))
                })?;
            record_from_row(&row)
        })
    }

    fn delete_by_reservation_id(&self, reservation_id: ReservationId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM occupancies WHERE reservation_id = $1")
                .bind(*reservation_id.as_uuid())
                .execute(&self.pool)
                .await
                .map_err(store_error)?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn find_covering(
        &self,
        x: DateTime<Utc>,
        y: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<OccupancyRecord>> {
        Box::pin(self.select_range("arrival_date <= $1 AND departure_date >= $2", x, y))
    }

    fn find_departing_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<OccupancyRecord>> {
        Box::pin(self.select_range("departure_date >= $1 AND departure_date <= $2", from, to))
    }

    fn find_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<OccupancyRecord>> {
        Box::pin(self.select_range("departure_date >= $1 AND arrival_date <= $2", start, end))
    }
}
