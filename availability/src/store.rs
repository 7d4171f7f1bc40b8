//! Occupancy persistence.
//!
//! [`OccupancyStore`] is the durable, indexed collection of occupancy records. The
//! PostgreSQL adapter lives in `campsite-postgres`; [`InMemoryOccupancyStore`] backs
//! tests and single-process demos.
//!
//! Range predicates are closed (`<=`/`>=`) and return full records, so callers can
//! compare reservation ids before deciding anything.

use crate::occupancy::OccupancyRecord;
use campsite_core::contracts::ReservationId;
use campsite_core::store::{StoreError, StoreFuture};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Durable occupancy collection keyed by reservation id.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures so the store can be shared as
/// `Arc<dyn OccupancyStore>`.
pub trait OccupancyStore: Send + Sync {
    /// The record held by `reservation_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the store cannot be queried.
    fn find_by_reservation_id(
        &self,
        reservation_id: ReservationId,
    ) -> StoreFuture<'_, Option<OccupancyRecord>>;

    /// Insert a new record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the reservation already holds a record.
    fn insert(&self, record: OccupancyRecord) -> StoreFuture<'_, OccupancyRecord>;

    /// Replace the dates of the record held by `record.reservation_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the reservation holds no record.
    fn update(&self, record: OccupancyRecord) -> StoreFuture<'_, OccupancyRecord>;

    /// Delete the record held by `reservation_id`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the store cannot be updated.
    fn delete_by_reservation_id(&self, reservation_id: ReservationId) -> StoreFuture<'_, bool>;

    /// Records with `arrival <= x` and `departure >= y`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the store cannot be queried.
    fn find_covering(
        &self,
        x: DateTime<Utc>,
        y: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<OccupancyRecord>>;

    /// Records with `from <= departure <= to`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the store cannot be queried.
    fn find_departing_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<OccupancyRecord>>;

    /// Records intersecting the closed window `[start, end]`, ordered by arrival.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the store cannot be queried.
    fn find_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<OccupancyRecord>>;
}

/// In-memory [`OccupancyStore`].
///
/// Writes for one reservation id are serialized by the lock, mirroring the unique
/// key on `reservation_id` in the relational schema.
#[derive(Debug, Default)]
pub struct InMemoryOccupancyStore {
    records: RwLock<HashMap<ReservationId, OccupancyRecord>>,
    offline: AtomicBool,
}

impl InMemoryOccupancyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of records held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether no record is held.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("occupancy store offline".to_string()))
        } else {
            Ok(())
        }
    }

    async fn select<F>(&self, predicate: F) -> Result<Vec<OccupancyRecord>, StoreError>
    where
        F: Fn(&OccupancyRecord) -> bool + Send,
    {
        self.check_online()?;
        let mut found: Vec<_> = self
            .records
            .read()
            .await
            .values()
            .filter(|record| predicate(record))
            .cloned()
            .collect();
        found.sort_by_key(|record| (record.stay.arrival(), record.reservation_id));
        Ok(found)
    }
}

impl OccupancyStore for InMemoryOccupancyStore {
    fn find_by_reservation_id(
        &self,
        reservation_id: ReservationId,
    ) -> StoreFuture<'_, Option<OccupancyRecord>> {
        Box::pin(async move {
            self.check_online()?;
            Ok(self.records.read().await.get(&reservation_id).cloned())
        })
    }

    fn insert(&self, record: OccupancyRecord) -> StoreFuture<'_, OccupancyRecord> {
        Box::pin(async move {
            self.check_online()?;
            let mut records = self.records.write().await;
            if records.contains_key(&record.reservation_id) {
                return Err(StoreError::Conflict(format!(
                    "occupancy for reservation {} already exists",
                    record.reservation_id
                )));
            }
            records.insert(record.reservation_id, record.clone());
            Ok(record)
        })
    }

    fn update(&self, record: OccupancyRecord) -> StoreFuture<'_, OccupancyRecord> {
        Box::pin(async move {
            self.check_online()?;
            let mut records = self.records.write().await;
            let Some(existing) = records.get_mut(&record.reservation_id) else {
                return Err(StoreError::Conflict(format!(
                    "no occupancy for reservation {}",
                    record.reservation_id
                )));
            };
            existing.stay = record.stay;
            existing.modified_at = record.modified_at;
            Ok(existing.clone())
        })
    }

    fn delete_by_reservation_id(&self, reservation_id: ReservationId) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.check_online()?;
            Ok(self.records.write().await.remove(&reservation_id).is_some())
        })
    }

    fn find_covering(
        &self,
        x: DateTime<Utc>,
        y: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<OccupancyRecord>> {
        Box::pin(self.select(move |r| r.stay.arrival() <= x && r.stay.departure() >= y))
    }

    fn find_departing_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<OccupancyRecord>> {
        Box::pin(self.select(move |r| r.stay.departure() >= from && r.stay.departure() <= to))
    }

    fn find_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<OccupancyRecord>> {
        Box::pin(self.select(move |r| r.stay.arrival() <= end && r.stay.departure() >= start))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::occupancy::Stay;
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 2, d, 0, 0, 0).unwrap()
    }

    fn record(from: u32, to: u32) -> OccupancyRecord {
        OccupancyRecord::new(ReservationId::new(), Stay::new(day(from), day(to)).unwrap(), day(1))
    }

    #[tokio::test]
    async fn one_record_per_reservation() {
        let store = InMemoryOccupancyStore::new();
        let first = record(4, 6);
        store.insert(first.clone()).await.unwrap();

        let duplicate = OccupancyRecord { id: uuid::Uuid::new_v4(), ..first.clone() };
        assert!(matches!(store.insert(duplicate).await, Err(StoreError::Conflict(_))));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn update_keeps_identity_and_moves_dates() {
        let store = InMemoryOccupancyStore::new();
        let original = store.insert(record(4, 6)).await.unwrap();

        let mut moved = original.clone();
        moved.reschedule(Stay::new(day(8), day(9)).unwrap(), day(2));
        let updated = store.update(moved).await.unwrap();

        assert_eq!(updated.id, original.id);
        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(updated.stay.arrival(), day(8));
        assert_eq!(updated.modified_at, day(2));
    }

    #[tokio::test]
    async fn update_of_missing_record_is_a_conflict() {
        let store = InMemoryOccupancyStore::new();
        assert!(matches!(store.update(record(4, 6)).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemoryOccupancyStore::new();
        let held = store.insert(record(4, 6)).await.unwrap();

        assert!(store.delete_by_reservation_id(held.reservation_id).await.unwrap());
        assert!(!store.delete_by_reservation_id(held.reservation_id).await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn range_predicates_are_closed() {
        let store = InMemoryOccupancyStore::new();
        let early = store.insert(record(2, 4)).await.unwrap();
        let late = store.insert(record(6, 9)).await.unwrap();

        let covering = store.find_covering(day(6), day(6)).await.unwrap();
        assert_eq!(covering, vec![late.clone()]);

        let departing = store.find_departing_between(day(4), day(6)).await.unwrap();
        assert_eq!(departing, vec![early.clone()]);

        let window = store.find_between(day(4), day(6)).await.unwrap();
        assert_eq!(window, vec![early, late]);
    }

    #[tokio::test]
    async fn offline_store_fails_transiently() {
        let store = InMemoryOccupancyStore::new();
        store.set_offline(true);
        let error = store.find_between(day(1), day(2)).await.unwrap_err();
        assert!(error.is_transient());
    }
}
