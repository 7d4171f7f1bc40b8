//! Error type for the reservation service.

use crate::model::ReservationStatus;
use crate::validation::ValidationErrors;
use campsite_core::contracts::ReservationId;
use campsite_core::event::EventError;
use campsite_core::store::StoreError;
use campsite_runtime::HandlerError;
use thiserror::Error;

/// Why a reservation command or saga event was not applied.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReservationError {
    /// The request broke one or more booking rules. Nothing was persisted.
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// No reservation has this id.
    #[error("Reservation {0} not found")]
    NotFound(ReservationId),

    /// The command is not defined for the current status.
    #[error("Cannot {action} a reservation that is {status}")]
    InvalidTransition {
        /// Refused command
        action: &'static str,
        /// Status at the time of the command
        status: ReservationStatus,
    },

    /// Another writer changed the reservation between load and save.
    #[error("Reservation {0} was modified concurrently")]
    ConcurrentModification(ReservationId),

    /// An outbox record could not be encoded.
    #[error(transparent)]
    Encode(#[from] EventError),

    /// The reservation store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ReservationError> for HandlerError {
    fn from(error: ReservationError) -> Self {
        let transient = match &error {
            ReservationError::ConcurrentModification(_) => true,
            ReservationError::Store(store) => store.is_transient(),
            ReservationError::Validation(_)
            | ReservationError::NotFound(_)
            | ReservationError::InvalidTransition { .. }
            | ReservationError::Encode(_) => false,
        };
        if transient {
            Self::Transient(error.to_string())
        } else {
            Self::Rejected(error.to_string())
        }
    }
}
