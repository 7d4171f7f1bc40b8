//! Inbound verdicts from the availability side.

use crate::service::ReservationService;
use campsite_core::channels::EventKind;
use campsite_core::contracts::{Received, SagaEvent};
use campsite_runtime::{HandlerError, HandlerFuture, SagaEventHandler};
use std::sync::Arc;

/// Applies `CAMPSITE_RESERVED` and `RESERVATION_ROLLBACK` to reservations.
///
/// A verdict for an unknown reservation can never succeed and is rejected (the
/// consumer parks it). A lost optimistic-concurrency race is transient and retried.
/// The verdict's `causation_id` is passed on so answers to superseded date
/// selections are dropped.
pub struct VerdictHandler {
    service: Arc<ReservationService>,
}

impl VerdictHandler {
    /// Create a handler over `service`.
    #[must_use]
    pub const fn new(service: Arc<ReservationService>) -> Self {
        Self { service }
    }
}

impl SagaEventHandler for VerdictHandler {
    fn name(&self) -> &'static str {
        "reservation"
    }

    fn kinds(&self) -> &'static [EventKind] {
        &[EventKind::CampsiteReserved, EventKind::ReservationRollback]
    }

    fn handle(&self, received: Received) -> HandlerFuture<'_> {
        Box::pin(async move {
            let Received {
                event,
                causation_id,
                ..
            } = received;
            let applied = match event {
                SagaEvent::CampsiteReserved(r) => {
                    self.service.confirm(r.reservation_id, causation_id).await
                }
                SagaEvent::ReservationRollback(r) => {
                    self.service.rollback(r.reservation_id, causation_id).await
                }
                SagaEvent::ReservationCreated(_)
                | SagaEvent::ReservationModified(_)
                | SagaEvent::ReservationCancelled(_) => return Ok(()),
            };
            let reservation = applied.map_err(HandlerError::from)?;
            tracing::debug!(
                reservation_id = %reservation.id,
                kind = %event.kind(),
                status = %reservation.status,
                "Verdict applied"
            );
            Ok(())
        })
    }
}
