//! Availability side of the saga.
//!
//! The coordinator consumes reservation events and answers each date selection with
//! a verdict event:
//!
//! ```text
//! RESERVATION_CREATED / RESERVATION_MODIFIED
//!     → query nearby stays → validate overlap
//!         ├─ conflict → publish RESERVATION_ROLLBACK (nothing written)
//!         └─ free     → insert/update occupancy → publish CAMPSITE_RESERVED
//! RESERVATION_CANCELLED
//!     → delete occupancy (absence is fine)
//! ```
//!
//! Every path is safe to replay. A redelivered creation finds its own record and
//! re-publishes the confirmation; a redelivered modification re-validates against
//! everything but itself and lands on the same verdict.
//!
//! Each verdict carries the `event_id` of the selection it answers as its
//! `causation_id`, so the reservation side can drop verdicts on superseded requests.

use crate::error::AvailabilityError;
use crate::occupancy::{OccupancyRecord, Stay};
use crate::overlap::{ConflictField, FieldConflict, conflicts};
use crate::store::OccupancyStore;
use campsite_core::channels::{ChannelConfig, EventKind};
use campsite_core::contracts::{DateSelection, Received, ReservationId, SagaEvent};
use campsite_core::environment::Clock;
use campsite_core::event_bus::EventBus;
use campsite_runtime::{HandlerError, HandlerFuture, SagaEventHandler};
use std::sync::Arc;
use uuid::Uuid;

/// Message used when the requested interval is empty or inverted.
pub const DEPARTURE_BEFORE_ARRIVAL: &str = "The departure date must be after the arrival date.";

/// What the coordinator decided for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The stay is held; `CAMPSITE_RESERVED` was published.
    Reserved,
    /// The stay was refused; `RESERVATION_ROLLBACK` was published.
    Rejected(Vec<FieldConflict>),
    /// A cancellation was applied. `false` when there was nothing to release.
    Released(bool),
}

/// Whether a date selection creates a stay or moves an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Selection {
    Create,
    Modify,
}

/// Validates, records and answers date selections.
pub struct AvailabilityCoordinator {
    store: Arc<dyn OccupancyStore>,
    bus: Arc<dyn EventBus>,
    channels: ChannelConfig,
    clock: Arc<dyn Clock>,
}

impl AvailabilityCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub fn new(
        store: Arc<dyn OccupancyStore>,
        bus: Arc<dyn EventBus>,
        channels: ChannelConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            bus,
            channels,
            clock,
        }
    }

    /// Apply one saga event.
    ///
    /// Verdict events (`CAMPSITE_RESERVED`, `RESERVATION_ROLLBACK`) are not for this
    /// side and are answered with `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`AvailabilityError`] when the store or the bus fails.
    pub async fn apply(
        &self,
        received: impl Into<Received> + Send,
    ) -> Result<Option<Verdict>, AvailabilityError> {
        let received = received.into();
        let answering = received.event_id;
        let verdict = match received.event {
            SagaEvent::ReservationCreated(selection) => {
                self.select_dates(selection, Selection::Create, answering).await?
            }
            SagaEvent::ReservationModified(selection) => {
                self.select_dates(selection, Selection::Modify, answering).await?
            }
            SagaEvent::ReservationCancelled(r) => Verdict::Released(self.release(r.reservation_id).await?),
            SagaEvent::CampsiteReserved(_) | SagaEvent::ReservationRollback(_) => return Ok(None),
        };
        Ok(Some(verdict))
    }

    /// Validate and record a requested stay, then publish the verdict.
    async fn select_dates(
        &self,
        selection: DateSelection,
        kind: Selection,
        answering: Option<Uuid>,
    ) -> Result<Verdict, AvailabilityError> {
        let reservation_id = selection.reservation_id;
        let Ok(stay) = Stay::try_from(&selection) else {
            tracing::warn!(%reservation_id, "Refusing empty or inverted stay");
            let conflict = FieldConflict {
                field: ConflictField::DepartureDate,
                message: DEPARTURE_BEFORE_ARRIVAL.to_string(),
            };
            return self.refuse(reservation_id, vec![conflict], answering).await;
        };

        let existing = self.store.find_by_reservation_id(reservation_id).await?;
        if kind == Selection::Create {
            if let Some(record) = &existing {
                tracing::info!(
                    %reservation_id,
                    held_since = %record.created_at,
                    "Duplicate creation, stay already held"
                );
                self.publish(SagaEvent::reserved(reservation_id), answering).await?;
                return Ok(Verdict::Reserved);
            }
        }

        // The reads and the write below are not one transaction. Two concurrent
        // selections for different reservations can both pass validation and both be
        // written. This window is known and deliberately left open.
        let nearby = self.nearby(&stay).await?;
        let found = conflicts(&stay, &nearby, Some(reservation_id));
        if !found.is_empty() {
            return self.refuse(reservation_id, found, answering).await;
        }

        let now = self.clock.now();
        match existing {
            Some(mut record) => {
                record.reschedule(stay, now);
                self.store.update(record).await?;
            }
            None => {
                if kind == Selection::Modify {
                    tracing::warn!(%reservation_id, "Modification for unknown stay, recording it");
                }
                self.store.insert(OccupancyRecord::new(reservation_id, stay, now)).await?;
            }
        }

        metrics::counter!("availability.occupancy.confirmed").increment(1);
        tracing::info!(
            %reservation_id,
            arrival = %stay.arrival(),
            departure = %stay.departure(),
            "Stay reserved"
        );
        self.publish(SagaEvent::reserved(reservation_id), answering).await?;
        Ok(Verdict::Reserved)
    }

    /// Every record touching the closed range of `stay`.
    ///
    /// Union of the stays holding the requested departure and the stays ending
    /// inside the request.
    async fn nearby(&self, stay: &Stay) -> Result<Vec<OccupancyRecord>, AvailabilityError> {
        let mut nearby = self
            .store
            .find_covering(stay.departure(), stay.departure())
            .await?;
        for record in self
            .store
            .find_departing_between(stay.arrival(), stay.departure())
            .await?
        {
            if !nearby.iter().any(|r| r.reservation_id == record.reservation_id) {
                nearby.push(record);
            }
        }
        Ok(nearby)
    }

    async fn refuse(
        &self,
        reservation_id: ReservationId,
        found: Vec<FieldConflict>,
        answering: Option<Uuid>,
    ) -> Result<Verdict, AvailabilityError> {
        metrics::counter!("availability.occupancy.rejected").increment(1);
        tracing::info!(
            %reservation_id,
            fields = ?found.iter().map(|c| c.field.as_str()).collect::<Vec<_>>(),
            "Stay refused"
        );
        self.publish(SagaEvent::rollback(reservation_id), answering).await?;
        Ok(Verdict::Rejected(found))
    }

    async fn release(&self, reservation_id: ReservationId) -> Result<bool, AvailabilityError> {
        let released = self.store.delete_by_reservation_id(reservation_id).await?;
        if released {
            metrics::counter!("availability.occupancy.released").increment(1);
            tracing::info!(%reservation_id, "Stay released");
        } else {
            tracing::debug!(%reservation_id, "Nothing to release");
        }
        Ok(released)
    }

    async fn publish(&self, event: SagaEvent, answering: Option<Uuid>) -> Result<(), AvailabilityError> {
        let envelope = event.to_serialized_answering(answering)?;
        self.bus
            .publish(self.channels.channel(event.kind()), &envelope)
            .await?;
        Ok(())
    }
}

impl SagaEventHandler for AvailabilityCoordinator {
    fn name(&self) -> &'static str {
        "availability"
    }

    fn kinds(&self) -> &'static [EventKind] {
        &[
            EventKind::ReservationCreated,
            EventKind::ReservationModified,
            EventKind::ReservationCancelled,
        ]
    }

    fn handle(&self, received: Received) -> HandlerFuture<'_> {
        Box::pin(async move {
            self.apply(received).await.map_err(HandlerError::from)?;
            Ok(())
        })
    }
}
