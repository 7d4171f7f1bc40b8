//! Stays and the occupancy records that hold them.
//!
//! A [`Stay`] is the half-open interval `[arrival, departure)`: the campsite is held
//! from the arrival instant up to, but not including, the departure instant. Two
//! stays that meet exactly (one departs when the next arrives) do not overlap.

use crate::error::AvailabilityError;
use campsite_core::contracts::{DateSelection, ReservationId};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Midnight UTC at or before `instant`.
#[must_use]
pub fn truncate_day(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Midnight UTC at or after `instant`.
#[must_use]
pub fn ceil_day(instant: DateTime<Utc>) -> DateTime<Utc> {
    let floor = truncate_day(instant);
    if floor == instant {
        floor
    } else {
        floor + Duration::days(1)
    }
}

/// A non-empty half-open interval `[arrival, departure)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stay {
    arrival: DateTime<Utc>,
    departure: DateTime<Utc>,
}

impl Stay {
    /// Build a stay.
    ///
    /// # Errors
    ///
    /// Returns [`AvailabilityError::InvalidStay`] unless `arrival < departure`.
    pub fn new(arrival: DateTime<Utc>, departure: DateTime<Utc>) -> Result<Self, AvailabilityError> {
        if arrival < departure {
            Ok(Self { arrival, departure })
        } else {
            Err(AvailabilityError::InvalidStay { arrival, departure })
        }
    }

    /// First instant the campsite is held.
    #[must_use]
    pub const fn arrival(&self) -> DateTime<Utc> {
        self.arrival
    }

    /// Instant the campsite is released.
    #[must_use]
    pub const fn departure(&self) -> DateTime<Utc> {
        self.departure
    }

    /// Whether the two stays share at least one instant.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.arrival < other.departure && other.arrival < self.departure
    }

    /// Whether this stay holds any part of the calendar day starting at `day`.
    ///
    /// `day` must be a midnight.
    #[must_use]
    pub fn blocks_day(&self, day: DateTime<Utc>) -> bool {
        day >= truncate_day(self.arrival) && day < ceil_day(self.departure)
    }
}

impl TryFrom<&DateSelection> for Stay {
    type Error = AvailabilityError;

    fn try_from(selection: &DateSelection) -> Result<Self, Self::Error> {
        Self::new(selection.arrival_date, selection.departure_date)
    }
}

/// The stay a reservation currently holds on the campsite.
///
/// At most one record exists per reservation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupancyRecord {
    /// Record id
    pub id: Uuid,
    /// Reservation holding the stay
    pub reservation_id: ReservationId,
    /// Held interval
    pub stay: Stay,
    /// When the record was first written
    pub created_at: DateTime<Utc>,
    /// When the dates last changed
    pub modified_at: DateTime<Utc>,
}

impl OccupancyRecord {
    /// A fresh record for `reservation_id`.
    #[must_use]
    pub fn new(reservation_id: ReservationId, stay: Stay, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            reservation_id,
            stay,
            created_at: now,
            modified_at: now,
        }
    }

    /// Move the record to `stay`.
    pub fn reschedule(&mut self, stay: Stay, now: DateTime<Utc>) {
        self.stay = stay;
        self.modified_at = now;
    }
}
