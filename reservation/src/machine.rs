//! Reservation lifecycle as a pure reducer.
//!
//! The state is the reservation as loaded from the store (`None` when it does not
//! exist yet). Guest commands and availability verdicts are both actions; the
//! reducer decides the next state and which saga events must go through the
//! outbox. It performs no I/O, so the shell can persist the new state and the
//! events in one unit of work.
//!
//! Verdicts may arrive late or twice. A verdict for a status that no longer awaits
//! one is a no-op, with one exception: a confirmation for a cancelled or rejected
//! reservation means the campsite holds dates nobody will use, so the cancellation
//! is re-emitted to release them.
//!
//! Every date selection is stamped with a request id (the outbox id of its event),
//! and verdicts name the request they answer. While a verdict is awaited, one that
//! answers an older request is dropped, so a redelivered confirmation of the
//! original booking cannot settle a later change of dates.

use crate::error::ReservationError;
use crate::model::{Reservation, ReservationDraft, ReservationStatus, StayDates};
use crate::validation::BookingRules;
use campsite_core::contracts::{ReservationId, SagaEvent};
use campsite_core::environment::Clock;
use campsite_core::reducer::{Emitted, Reducer};
use campsite_core::{SmallVec, smallvec};
use std::sync::Arc;
use uuid::Uuid;

/// Commands and inbound verdicts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReservationAction {
    /// Book a new stay.
    Create {
        /// Id assigned by the caller
        id: ReservationId,
        /// Guest request
        draft: ReservationDraft,
        /// Id of the emitted `RESERVATION_CREATED`
        request: Uuid,
    },
    /// The campsite holds the requested dates.
    Confirm {
        /// Reservation
        id: ReservationId,
        /// Request the verdict answers, when it names one
        answering: Option<Uuid>,
    },
    /// The campsite refused the requested dates.
    Rollback {
        /// Reservation
        id: ReservationId,
        /// Request the verdict answers, when it names one
        answering: Option<Uuid>,
    },
    /// Move the stay to new dates.
    Patch {
        /// Reservation
        id: ReservationId,
        /// Requested dates
        dates: StayDates,
        /// Id of the emitted `RESERVATION_MODIFIED`
        request: Uuid,
    },
    /// Give the stay up.
    Cancel {
        /// Reservation
        id: ReservationId,
    },
}

impl ReservationAction {
    /// Reservation the action targets.
    #[must_use]
    pub const fn id(&self) -> ReservationId {
        match self {
            Self::Create { id, .. }
            | Self::Confirm { id, .. }
            | Self::Rollback { id, .. }
            | Self::Patch { id, .. }
            | Self::Cancel { id } => *id,
        }
    }

    /// Id stamped on the date selection this action emits, if any.
    #[must_use]
    pub const fn request(&self) -> Option<Uuid> {
        match self {
            Self::Create { request, .. } | Self::Patch { request, .. } => Some(*request),
            Self::Confirm { .. } | Self::Rollback { .. } | Self::Cancel { .. } => None,
        }
    }
}

/// Dependencies of the state machine.
#[derive(Clone)]
pub struct ReservationEnvironment {
    /// Time source for booking rules and timestamps
    pub clock: Arc<dyn Clock>,
    /// Booking limits
    pub rules: BookingRules,
}

impl ReservationEnvironment {
    /// Create an environment.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, rules: BookingRules) -> Self {
        Self { clock, rules }
    }
}

/// Reducer for the reservation lifecycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReservationStateMachine;

impl ReservationStateMachine {
    /// Create the state machine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn create(
        state: &mut Option<Reservation>,
        id: ReservationId,
        draft: ReservationDraft,
        request: Uuid,
        env: &ReservationEnvironment,
    ) -> Result<Emitted<SagaEvent>, ReservationError> {
        if let Some(existing) = state {
            return Err(ReservationError::InvalidTransition {
                action: "create",
                status: existing.status,
            });
        }
        let now = env.clock.now();
        env.rules.validate_draft(now, &draft)?;

        let reservation = Reservation {
            id,
            status: ReservationStatus::Pending,
            guest_email: draft.guest_email,
            first_name: draft.first_name,
            last_name: draft.last_name,
            dates: draft.dates,
            previous_dates: None,
            awaiting_verdict: Some(request),
            version: 0,
            created_at: now,
            modified_at: now,
        };
        let event = SagaEvent::ReservationCreated(reservation.selection());
        *state = Some(reservation);
        Ok(smallvec![event])
    }

    fn confirm(
        reservation: &mut Reservation,
        answering: Option<Uuid>,
        env: &ReservationEnvironment,
    ) -> Emitted<SagaEvent> {
        match reservation.status {
            ReservationStatus::Pending | ReservationStatus::ChangePending
                if !reservation.awaits(answering) =>
            {
                stale(reservation, "confirmation", answering);
                SmallVec::new()
            }
            ReservationStatus::Pending | ReservationStatus::ChangePending => {
                reservation.status = ReservationStatus::Confirmed;
                reservation.previous_dates = None;
                reservation.awaiting_verdict = None;
                reservation.modified_at = env.clock.now();
                SmallVec::new()
            }
            ReservationStatus::Cancelled | ReservationStatus::Rejected => {
                smallvec![SagaEvent::cancelled(reservation.id)]
            }
            ReservationStatus::Confirmed => SmallVec::new(),
        }
    }

    fn rollback(
        reservation: &mut Reservation,
        answering: Option<Uuid>,
        env: &ReservationEnvironment,
    ) {
        match reservation.status {
            ReservationStatus::Pending | ReservationStatus::ChangePending
                if !reservation.awaits(answering) =>
            {
                stale(reservation, "rollback", answering);
            }
            ReservationStatus::Pending => {
                reservation.status = ReservationStatus::Rejected;
                reservation.awaiting_verdict = None;
                reservation.modified_at = env.clock.now();
            }
            ReservationStatus::ChangePending => {
                if let Some(previous) = reservation.previous_dates.take() {
                    reservation.dates = previous;
                }
                reservation.status = ReservationStatus::Confirmed;
                reservation.awaiting_verdict = None;
                reservation.modified_at = env.clock.now();
            }
            ReservationStatus::Confirmed
            | ReservationStatus::Rejected
            | ReservationStatus::Cancelled => {}
        }
    }

    fn patch(
        reservation: &mut Reservation,
        dates: StayDates,
        request: Uuid,
        env: &ReservationEnvironment,
    ) -> Result<Emitted<SagaEvent>, ReservationError> {
        if reservation.dates == dates {
            return Ok(SmallVec::new());
        }
        if reservation.status != ReservationStatus::Confirmed {
            return Err(ReservationError::InvalidTransition {
                action: "patch",
                status: reservation.status,
            });
        }
        let now = env.clock.now();
        env.rules.validate_dates(now, &dates)?;

        reservation.previous_dates = Some(reservation.dates);
        reservation.dates = dates;
        reservation.status = ReservationStatus::ChangePending;
        reservation.awaiting_verdict = Some(request);
        reservation.modified_at = now;
        Ok(smallvec![SagaEvent::ReservationModified(reservation.selection())])
    }

    fn cancel(
        reservation: &mut Reservation,
        env: &ReservationEnvironment,
    ) -> Result<Emitted<SagaEvent>, ReservationError> {
        match reservation.status {
            ReservationStatus::Cancelled => Ok(SmallVec::new()),
            ReservationStatus::Rejected => Err(ReservationError::InvalidTransition {
                action: "cancel",
                status: reservation.status,
            }),
            ReservationStatus::Pending
            | ReservationStatus::Confirmed
            | ReservationStatus::ChangePending => {
                reservation.status = ReservationStatus::Cancelled;
                reservation.previous_dates = None;
                reservation.awaiting_verdict = None;
                reservation.modified_at = env.clock.now();
                Ok(smallvec![SagaEvent::cancelled(reservation.id)])
            }
        }
    }
}

impl Reducer for ReservationStateMachine {
    type State = Option<Reservation>;
    type Action = ReservationAction;
    type Event = SagaEvent;
    type Error = ReservationError;
    type Environment = ReservationEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Result<Emitted<Self::Event>, Self::Error> {
        match action {
            ReservationAction::Create { id, draft, request } => {
                Self::create(state, id, draft, request, env)
            }
            ReservationAction::Confirm { id, answering } => {
                Ok(Self::confirm(existing(state, id)?, answering, env))
            }
            ReservationAction::Rollback { id, answering } => {
                Self::rollback(existing(state, id)?, answering, env);
                Ok(SmallVec::new())
            }
            ReservationAction::Patch { id, dates, request } => {
                Self::patch(existing(state, id)?, dates, request, env)
            }
            ReservationAction::Cancel { id } => Self::cancel(existing(state, id)?, env),
        }
    }
}

fn stale(reservation: &Reservation, verdict: &'static str, answering: Option<Uuid>) {
    tracing::info!(
        reservation_id = %reservation.id,
        status = %reservation.status,
        verdict,
        answering = ?answering,
        awaiting = ?reservation.awaiting_verdict,
        "Dropping verdict on a superseded request"
    );
}

fn existing(
    state: &mut Option<Reservation>,
    id: ReservationId,
) -> Result<&mut Reservation, ReservationError> {
    state.as_mut().ok_or(ReservationError::NotFound(id))
}
