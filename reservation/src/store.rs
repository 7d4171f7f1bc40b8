//! Reservation persistence with a transactional outbox.
//!
//! Every write takes the reservation row and the outbox records produced by the same
//! transition, and commits them together or not at all. Updates are guarded by the
//! version read before the transition (optimistic concurrency).

use crate::model::Reservation;
use campsite_core::contracts::ReservationId;
use campsite_core::outbox::{OutboxEntry, OutboxStore};
use campsite_core::store::{StoreError, StoreFuture};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Durable reservations plus their outbox.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures so the store can be shared as
/// `Arc<dyn ReservationStore>`.
pub trait ReservationStore: Send + Sync {
    /// The reservation with `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the store cannot be queried.
    fn find(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>>;

    /// Insert a new reservation and its outbox records atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the id is already taken.
    fn insert(&self, reservation: Reservation, outbox: Vec<OutboxEntry>) -> StoreFuture<'_, ()>;

    /// Replace a reservation and append its outbox records atomically.
    ///
    /// `reservation.version` is the new version; the stored row must still be at
    /// `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the row is missing or at another version.
    fn update(
        &self,
        reservation: Reservation,
        expected_version: i64,
        outbox: Vec<OutboxEntry>,
    ) -> StoreFuture<'_, ()>;

    /// Every reservation of a guest, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the store cannot be queried.
    fn find_by_guest_email(&self, email: &str) -> StoreFuture<'_, Vec<Reservation>>;
}

#[derive(Debug, Default)]
struct Tables {
    reservations: HashMap<ReservationId, Reservation>,
    outbox: Vec<OutboxEntry>,
}

/// In-memory [`ReservationStore`] and [`OutboxStore`].
///
/// One lock covers both tables, so a write and its outbox records are observed
/// together.
#[derive(Debug, Default)]
pub struct InMemoryReservationStore {
    tables: Mutex<Tables>,
    offline: AtomicBool,
}

impl InMemoryReservationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every outbox record ever written, oldest first.
    pub async fn outbox(&self) -> Vec<OutboxEntry> {
        self.tables.lock().await.outbox.clone()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("reservation store offline".to_string()))
        } else {
            Ok(())
        }
    }

    async fn with_entry<F>(&self, id: Uuid, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut OutboxEntry) + Send,
    {
        self.check_online()?;
        let mut tables = self.tables.lock().await;
        let entry = tables
            .outbox
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| StoreError::Conflict(format!("no outbox entry {id}")))?;
        apply(entry);
        Ok(())
    }
}

impl ReservationStore for InMemoryReservationStore {
    fn find(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move {
            self.check_online()?;
            Ok(self.tables.lock().await.reservations.get(&id).cloned())
        })
    }

    fn insert(&self, reservation: Reservation, outbox: Vec<OutboxEntry>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check_online()?;
            let mut tables = self.tables.lock().await;
            if tables.reservations.contains_key(&reservation.id) {
                return Err(StoreError::Conflict(format!(
                    "reservation {} already exists",
                    reservation.id
                )));
            }
            tables.reservations.insert(reservation.id, reservation);
            tables.outbox.extend(outbox);
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
            self.check_online()?;
            let mut tables = self.tables.lock().await;
            let stored = tables.reservations.get(&reservation.id).map(|r| r.version);
            if stored != Some(expected_version) {
                return Err(StoreError::Conflict(format!(
                    "reservation {} expected at version {expected_version}, found {stored:?}",
                    reservation.id
                )));
            }
            tables.reservations.insert(reservation.id, reservation);
            tables.outbox.extend(outbox);
            Ok(())
        })
    }

    fn find_by_guest_email(&self, email: &str) -> StoreFuture<'_, Vec<Reservation>> {
        let email = email.to_string();
        Box::pin(async move {
            self.check_online()?;
            let mut found: Vec<_> = self
                .tables
                .lock()
                .await
                .reservations
                .values()
                .filter(|r| r.guest_email == email)
                .cloned()
                .collect();
            found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(found)
        })
    }
}

impl OutboxStore for InMemoryReservationStore {
    fn pending(&self, limit: usize) -> StoreFuture<'_, Vec<OutboxEntry>> {
        Box::pin(async move {
            self.check_online()?;
            Ok(self
                .tables
                .lock()
                .await
                .outbox
                .iter()
                .filter(|entry| entry.is_pending())
                .take(limit)
                .cloned()
                .collect())
        })
    }

    fn mark_published(&self, id: Uuid, at: DateTime<Utc>) -> StoreFuture<'_, ()> {
        Box::pin(self.with_entry(id, move |entry| {
            entry.published_at.get_or_insert(at);
        }))
    }

    fn mark_failed(&self, id: Uuid, reason: String) -> StoreFuture<'_, ()> {
        Box::pin(self.with_entry(id, move |entry| {
            entry.attempts += 1;
            entry.last_error = Some(reason);
        }))
    }

    fn mark_abandoned(&self, id: Uuid, reason: String, at: DateTime<Utc>) -> StoreFuture<'_, ()> {
        Box::pin(self.with_entry(id, move |entry| {
            entry.attempts += 1;
            entry.last_error = Some(reason);
            entry.abandoned_at.get_or_insert(at);
        }))
    }
}
