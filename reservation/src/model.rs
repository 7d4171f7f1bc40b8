//! Reservation aggregate.

use campsite_core::contracts::{DateSelection, ReservationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of a reservation.
///
/// ```text
/// PENDING ──reserved──▶ CONFIRMED ──patch──▶ CHANGE_PENDING
///    │                     ▲  │                   │
///    │ rollback            │  └─cancel─┐          │ reserved → CONFIRMED
///    ▼                     └───────────┼──────────┘ rollback → CONFIRMED (old dates)
/// REJECTED                             ▼
///                                  CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    /// Waiting for the availability verdict on the initial dates
    Pending,
    /// Dates are held on the campsite
    Confirmed,
    /// Waiting for the availability verdict on changed dates
    ChangePending,
    /// The initial dates were refused. Terminal.
    Rejected,
    /// Cancelled by the guest. Terminal.
    Cancelled,
}

impl ReservationStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Confirmed,
        Self::ChangePending,
        Self::Rejected,
        Self::Cancelled,
    ];

    /// Stored and logged name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::ChangePending => "CHANGE_PENDING",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether no transition leaves this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Cancelled)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status name that is not one of [`ReservationStatus::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown reservation status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for ReservationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Requested arrival and departure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StayDates {
    /// Arrival instant
    pub arrival_date: DateTime<Utc>,
    /// Departure instant
    pub departure_date: DateTime<Utc>,
}

impl StayDates {
    /// Pair an arrival with a departure.
    #[must_use]
    pub const fn new(arrival_date: DateTime<Utc>, departure_date: DateTime<Utc>) -> Self {
        Self {
            arrival_date,
            departure_date,
        }
    }
}

/// What a guest submits to book a stay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationDraft {
    /// Contact address, also the key of the guest read path
    pub guest_email: String,
    /// Guest first name
    pub first_name: String,
    /// Guest last name
    pub last_name: String,
    /// Requested stay
    #[serde(flatten)]
    pub dates: StayDates,
}

/// A reservation as persisted by the reservation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    /// Reservation id, shared with the availability side
    pub id: ReservationId,
    /// Lifecycle status
    pub status: ReservationStatus,
    /// Contact address
    pub guest_email: String,
    /// Guest first name
    pub first_name: String,
    /// Guest last name
    pub last_name: String,
    /// Current (or requested, while pending) stay
    #[serde(flatten)]
    pub dates: StayDates,
    /// Last confirmed stay while a change is pending
    pub previous_dates: Option<StayDates>,
    /// Outbox id of the date selection the next verdict must answer
    #[serde(skip)]
    pub awaiting_verdict: Option<Uuid>,
    /// Optimistic concurrency version, bumped on every write
    pub version: i64,
    /// When the reservation was created
    pub created_at: DateTime<Utc>,
    /// When the reservation last changed
    pub modified_at: DateTime<Utc>,
}

impl Reservation {
    /// The dates as carried by `RESERVATION_CREATED`/`RESERVATION_MODIFIED`.
    #[must_use]
    pub const fn selection(&self) -> DateSelection {
        DateSelection {
            reservation_id: self.id,
            arrival_date: self.dates.arrival_date,
            departure_date: self.dates.departure_date,
        }
    }

    /// Whether a verdict answering `request` decides the selection this
    /// reservation is waiting on. Uncorrelated verdicts are taken at face value.
    #[must_use]
    pub fn awaits(&self, request: Option<Uuid>) -> bool {
        match (request, self.awaiting_verdict) {
            (Some(request), Some(awaited)) => request == awaited,
            _ => true,
        }
    }
}
