//! Imperative shell around the reservation state machine.
//!
//! Every operation follows the same path:
//!
//! 1. load the reservation (and its version)
//! 2. run the pure state machine
//! 3. skip the write entirely if nothing changed and nothing was emitted
//! 4. otherwise bump the version and write the row together with the outbox records
//!
//! A date selection is written under the request id the state machine now awaits,
//! so the verdict answering it can be matched.
//!
//! Publishing is left to the outbox relay.

use crate::error::ReservationError;
use crate::machine::{ReservationAction, ReservationEnvironment, ReservationStateMachine};
use crate::model::{Reservation, ReservationDraft, StayDates};
use crate::store::ReservationStore;
use crate::validation::BookingRules;
use campsite_core::contracts::{ReservationId, SagaEvent};
use campsite_core::environment::Clock;
use campsite_core::event::EventError;
use campsite_core::outbox::OutboxEntry;
use campsite_core::reducer::Reducer;
use campsite_core::store::StoreError;
use std::sync::Arc;
use uuid::Uuid;

/// Aggregate type written on outbox records.
pub const AGGREGATE_TYPE: &str = "reservation";

/// Commands and queries of the reservation service.
pub struct ReservationService {
    store: Arc<dyn ReservationStore>,
    machine: ReservationStateMachine,
    env: ReservationEnvironment,
}

impl ReservationService {
    /// Create a service.
    #[must_use]
    pub fn new(store: Arc<dyn ReservationStore>, clock: Arc<dyn Clock>, rules: BookingRules) -> Self {
        Self {
            store,
            machine: ReservationStateMachine::new(),
            env: ReservationEnvironment::new(clock, rules),
        }
    }

    /// Book a new stay. The reservation starts `PENDING`.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Validation`] if the draft breaks a booking rule,
    /// or a store error.
    pub async fn create(&self, draft: ReservationDraft) -> Result<Reservation, ReservationError> {
        let id = ReservationId::new();
        self.execute(ReservationAction::Create {
            id,
            draft,
            request: Uuid::new_v4(),
        })
        .await
    }

    /// Apply a `CAMPSITE_RESERVED` verdict answering the selection `answering`.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::NotFound`] if `id` is unknown, or a store error.
    pub async fn confirm(
        &self,
        id: ReservationId,
        answering: Option<Uuid>,
    ) -> Result<Reservation, ReservationError> {
        self.execute(ReservationAction::Confirm { id, answering }).await
    }

    /// Apply a `RESERVATION_ROLLBACK` verdict answering the selection `answering`.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::NotFound`] if `id` is unknown, or a store error.
    pub async fn rollback(
        &self,
        id: ReservationId,
        answering: Option<Uuid>,
    ) -> Result<Reservation, ReservationError> {
        self.execute(ReservationAction::Rollback { id, answering }).await
    }

    /// Move a confirmed stay to new dates. Unchanged dates are a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::NotFound`], [`ReservationError::InvalidTransition`]
    /// unless the reservation is confirmed, [`ReservationError::Validation`], or a
    /// store error.
    pub async fn patch(
        &self,
        id: ReservationId,
        dates: StayDates,
    ) -> Result<Reservation, ReservationError> {
        self.execute(ReservationAction::Patch {
            id,
            dates,
            request: Uuid::new_v4(),
        })
        .await
    }

    /// Cancel a reservation. Cancelling twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::NotFound`], [`ReservationError::InvalidTransition`]
    /// for a rejected reservation, or a store error.
    pub async fn cancel(&self, id: ReservationId) -> Result<Reservation, ReservationError> {
        self.execute(ReservationAction::Cancel { id }).await
    }

    /// Look a reservation up.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::NotFound`] if `id` is unknown, or a store error.
    pub async fn find(&self, id: ReservationId) -> Result<Reservation, ReservationError> {
        self.store
            .find(id)
            .await?
            .ok_or(ReservationError::NotFound(id))
    }

    /// Every reservation of a guest, newest first.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn reservations_for_guest(
        &self,
        email: &str,
    ) -> Result<Vec<Reservation>, ReservationError> {
        Ok(self.store.find_by_guest_email(email).await?)
    }

    async fn execute(&self, action: ReservationAction) -> Result<Reservation, ReservationError> {
        let id = action.id();
        let request = action.request();
        let loaded = self.store.find(id).await?;
        let mut state = loaded.clone();

        let events = self.machine.reduce(&mut state, action, &self.env)?;
        let Some(mut next) = state else {
            return Err(ReservationError::NotFound(id));
        };
        if events.is_empty() && loaded.as_ref() == Some(&next) {
            tracing::debug!(reservation_id = %id, status = %next.status, "No change");
            return Ok(next);
        }

        let now = self.env.clock.now();
        let outbox = events
            .iter()
            .map(|event| {
                let entry = OutboxEntry::record(AGGREGATE_TYPE, event, now)?;
                Ok(match (event, request) {
                    (
                        SagaEvent::ReservationCreated(_) | SagaEvent::ReservationModified(_),
                        Some(request),
                    ) => entry.with_id(request),
                    _ => entry,
                })
            })
            .collect::<Result<Vec<_>, EventError>>()?;

        let previous = loaded.map(|r| (r.status, r.version));
        let written = match previous {
            None => {
                next.version = 1;
                self.store.insert(next.clone(), outbox).await
            }
            Some((_, version)) => {
                next.version = version + 1;
                self.store.update(next.clone(), version, outbox).await
            }
        };
        written.map_err(|error| match error {
            StoreError::Conflict(_) => ReservationError::ConcurrentModification(id),
            other => ReservationError::Store(other),
        })?;

        let from = previous.map(|(status, _)| status);
        if from != Some(next.status) {
            metrics::counter!("reservation.transition", "to" => next.status.as_str()).increment(1);
            tracing::info!(
                reservation_id = %id,
                from = from.map_or("NONE", |s| s.as_str()),
                to = %next.status,
                events = events.len(),
                "Reservation transitioned"
            );
        } else {
            tracing::info!(
                reservation_id = %id,
                status = %next.status,
                events = events.len(),
                "Reservation re-emitted events"
            );
        }

        Ok(next)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::ReservationStatus;
    use crate::store::InMemoryReservationStore;
    use campsite_core::channels::EventKind;
    use campsite_core::store::StoreFuture;
    use campsite_testing::{FixedClock, test_now};
    use chrono::Duration;

    struct Fixture {
        store: Arc<InMemoryReservationStore>,
        clock: FixedClock,
        service: ReservationService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryReservationStore::new());
        let clock = FixedClock::new(test_now());
        let service = ReservationService::new(
            Arc::clone(&store) as Arc<dyn ReservationStore>,
            Arc::new(clock.clone()),
            BookingRules::default(),
        );
        Fixture {
            store,
            clock,
            service,
        }
    }

    fn dates(arrive_in_days: i64, nights: i64) -> StayDates {
        let arrival = test_now() + Duration::days(arrive_in_days);
        StayDates::new(arrival, arrival + Duration::days(nights))
    }

    fn draft() -> ReservationDraft {
        ReservationDraft {
            guest_email: "jane@example.com".into(),
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            dates: dates(3, 2),
        }
    }

    async fn outbox_kinds(store: &InMemoryReservationStore) -> Vec<String> {
        store.outbox().await.into_iter().map(|e| e.event_type).collect()
    }

    #[tokio::test]
    async fn create_persists_pending_with_outbox_record() {
        let f = fixture();

        let created = f.service.create(draft()).await.unwrap();

        assert_eq!(created.status, ReservationStatus::Pending);
        assert_eq!(created.version, 1);
        assert_eq!(f.service.find(created.id).await.unwrap(), created);
        assert_eq!(outbox_kinds(&f.store).await, vec!["RESERVATION_CREATED"]);
        assert_eq!(f.store.outbox().await[0].aggregate_id, created.id.to_string());
    }

    #[tokio::test]
    async fn invalid_draft_persists_nothing() {
        let f = fixture();
        let mut bad = draft();
        bad.dates = dates(0, 1);

        let error = f.service.create(bad).await.unwrap_err();

        assert!(matches!(error, ReservationError::Validation(_)));
        assert!(f.store.outbox().await.is_empty());
        assert!(f.service.reservations_for_guest("jane@example.com").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn confirm_then_patch_then_rollback() {
        let f = fixture();
        let created = f.service.create(draft()).await.unwrap();

        let confirmed = f.service.confirm(created.id, None).await.unwrap();
        assert_eq!(confirmed.status, ReservationStatus::Confirmed);
        assert_eq!(confirmed.version, 2);

        let patched = f.service.patch(created.id, dates(5, 1)).await.unwrap();
        assert_eq!(patched.status, ReservationStatus::ChangePending);

        let reverted = f.service.rollback(created.id, None).await.unwrap();
        assert_eq!(reverted.status, ReservationStatus::Confirmed);
        assert_eq!(reverted.dates, created.dates);
        assert_eq!(
            outbox_kinds(&f.store).await,
            vec!["RESERVATION_CREATED", "RESERVATION_MODIFIED"]
        );
    }

    #[tokio::test]
    async fn verdicts_are_matched_to_the_selection_they_answer() {
        let f = fixture();
        let created = f.service.create(draft()).await.unwrap();
        let booking = f.store.outbox().await[0].id;
        assert_eq!(created.awaiting_verdict, Some(booking));

        f.service.confirm(created.id, Some(booking)).await.unwrap();
        let patched = f.service.patch(created.id, dates(5, 1)).await.unwrap();
        let change = f.store.outbox().await[1].id;
        assert_eq!(patched.awaiting_verdict, Some(change));

        let redelivered = f.service.confirm(created.id, Some(booking)).await.unwrap();
        assert_eq!(redelivered, patched);

        let reverted = f.service.rollback(created.id, Some(change)).await.unwrap();
        assert_eq!(reverted.status, ReservationStatus::Confirmed);
        assert_eq!(reverted.dates, created.dates);
        assert_eq!(reverted.awaiting_verdict, None);
    }

    #[tokio::test]
    async fn unchanged_patch_does_not_write() {
        let f = fixture();
        let created = f.service.create(draft()).await.unwrap();
        f.clock.advance(Duration::hours(1));

        let same = f.service.patch(created.id, created.dates).await.unwrap();

        assert_eq!(same, created);
        assert_eq!(f.service.find(created.id).await.unwrap().version, 1);
        assert_eq!(f.store.outbox().await.len(), 1);
    }

    #[tokio::test]
    async fn cancel_twice_emits_once() {
        let f = fixture();
        let created = f.service.create(draft()).await.unwrap();

        let first = f.service.cancel(created.id).await.unwrap();
        let second = f.service.cancel(created.id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.status, ReservationStatus::Cancelled);
        assert_eq!(
            outbox_kinds(&f.store).await,
            vec!["RESERVATION_CREATED", "RESERVATION_CANCELLED"]
        );
    }

    #[tokio::test]
    async fn late_confirmation_after_cancel_releases_again() {
        let f = fixture();
        let created = f.service.create(draft()).await.unwrap();
        f.service.cancel(created.id).await.unwrap();

        let still_cancelled = f.service.confirm(created.id, None).await.unwrap();

        assert_eq!(still_cancelled.status, ReservationStatus::Cancelled);
        let kinds = outbox_kinds(&f.store).await;
        assert_eq!(
            kinds.iter().filter(|k| *k == EventKind::ReservationCancelled.as_str()).count(),
            2
        );
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let f = fixture();
        let id = ReservationId::new();
        assert_eq!(
            f.service.confirm(id, None).await.unwrap_err(),
            ReservationError::NotFound(id)
        );
        assert_eq!(f.service.find(id).await.unwrap_err(), ReservationError::NotFound(id));
    }

    #[tokio::test]
    async fn store_outage_surfaces_as_store_error() {
        let f = fixture();
        f.store.set_offline(true);
        let error = f.service.create(draft()).await.unwrap_err();
        assert!(matches!(error, ReservationError::Store(StoreError::Unavailable(_))));
    }

    /// Store whose rows are always rewritten by someone else before we update.
    struct RacingStore(InMemoryReservationStore);

    impl ReservationStore for RacingStore {
        fn find(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
            self.0.find(id)
        }

        fn insert(&self, reservation: Reservation, outbox: Vec<OutboxEntry>) -> StoreFuture<'_, ()> {
            self.0.insert(reservation, outbox)
        }

        fn update(&self, reservation: Reservation, _: i64, outbox: Vec<OutboxEntry>) -> StoreFuture<'_, ()> {
            self.0.update(reservation, -1, outbox)
        }

        fn find_by_guest_email(&self, email: &str) -> StoreFuture<'_, Vec<Reservation>> {
            self.0.find_by_guest_email(email)
        }
    }

    #[tokio::test]
    async fn lost_update_is_reported_as_concurrent_modification() {
        let service = ReservationService::new(
            Arc::new(RacingStore(InMemoryReservationStore::new())),
            Arc::new(FixedClock::new(test_now())),
            BookingRules::default(),
        );
        let created = service.create(draft()).await.unwrap();

        let error = service.confirm(created.id, None).await.unwrap_err();

        assert_eq!(error, ReservationError::ConcurrentModification(created.id));
        assert_eq!(service.find(created.id).await.unwrap().status, ReservationStatus::Pending);
    }

    #[tokio::test]
    async fn guest_read_path_is_newest_first() {
        let f = fixture();
        let first = f.service.create(draft()).await.unwrap();
        f.clock.advance(Duration::minutes(5));
        let second = f.service.create(draft()).await.unwrap();

        let ids: Vec<_> = f
            .service
            .reservations_for_guest("jane@example.com")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();

        assert_eq!(ids, vec![second.id, first.id]);
    }
}
