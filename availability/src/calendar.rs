//! Day-by-day availability calendar.
//!
//! The search window is cut into one-day buckets starting at midnight of the first
//! day. A day is unavailable when a one-night stay on that day would overlap some
//! occupancy, which is the same half-open rule the overlap check applies: a stay
//! blocks every day from its arrival day up to the day before a midnight departure,
//! or up to and including the departure day otherwise.

use crate::occupancy::{Stay, truncate_day};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Availability of one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySlot {
    /// Whether the day can be booked
    pub available: bool,
    /// Midnight starting the day
    pub checkin: DateTime<Utc>,
    /// Midnight ending the day (24h after `checkin`)
    pub checkout: DateTime<Utc>,
}

/// Build the calendar for `[truncate_day(start), end)`.
///
/// Yields one slot per day, ascending and contiguous, and nothing when `end` is not
/// after the first midnight. The result is computed from scratch on every call.
/// Callers bound the window; a day whose checkout is past the representable range
/// ends the calendar.
#[must_use]
pub fn build_calendar(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    occupied: &[Stay],
) -> Vec<AvailabilitySlot> {
    let first = truncate_day(start);
    let days = usize::try_from(day_span(first, end)).unwrap_or(0);
    let mut slots = Vec::with_capacity(days);

    let mut day = first;
    while day < end {
        let Some(checkout) = day.checked_add_signed(Duration::days(1)) else {
            break;
        };
        slots.push(AvailabilitySlot {
            available: !occupied.iter().any(|stay| stay.blocks_day(day)),
            checkin: day,
            checkout,
        });
        day = checkout;
    }

    slots
}

/// Number of day buckets starting at `first` that begin before `end`.
fn day_span(first: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let span = end - first;
    if span <= Duration::zero() {
        return 0;
    }
    let whole = span.num_days();
    if span > Duration::days(whole) {
        whole + 1
    } else {
        whole
    }
}
