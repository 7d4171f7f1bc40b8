//! Error type for the availability service.

use campsite_core::event::EventError;
use campsite_core::event_bus::EventBusError;
use campsite_core::store::StoreError;
use campsite_runtime::HandlerError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised while checking or recording availability.
///
/// An overlap is not an error: it is answered with a rollback event.
#[derive(Error, Debug, Clone)]
pub enum AvailabilityError {
    /// The requested interval is empty or inverted.
    #[error("Invalid stay: arrival {arrival} is not before departure {departure}")]
    InvalidStay {
        /// Requested arrival
        arrival: DateTime<Utc>,
        /// Requested departure
        departure: DateTime<Utc>,
    },

    /// The occupancy store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The verdict could not be encoded.
    #[error(transparent)]
    Encode(#[from] EventError),

    /// The verdict could not be published.
    #[error(transparent)]
    Publish(#[from] EventBusError),
}

impl From<AvailabilityError> for HandlerError {
    fn from(error: AvailabilityError) -> Self {
        match &error {
            AvailabilityError::Store(store) if !store.is_transient() => match store {
                // A unique-key clash means another delivery of the same event won the
                // race; the retry sees its record and re-publishes the verdict.
                StoreError::Conflict(_) => Self::Transient(error.to_string()),
                _ => Self::Rejected(error.to_string()),
            },
            AvailabilityError::Store(_) | AvailabilityError::Publish(_) => {
                Self::Transient(error.to_string())
            }
            AvailabilityError::InvalidStay { .. } | AvailabilityError::Encode(_) => {
                Self::Rejected(error.to_string())
            }
        }
    }
}
