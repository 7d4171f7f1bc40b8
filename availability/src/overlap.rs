//! Overlap validation between a requested stay and existing occupancy.
//!
//! The check reports conflicts per field, the way a form would highlight them:
//!
//! - `arrivalDate` when some existing stay is already running at the requested
//!   arrival (`existing.arrival <= candidate.arrival < existing.departure`);
//! - `departureDate` when some overlapping stay either starts after the requested
//!   arrival or is still running at the requested departure.
//!
//! An existing stay that spans the whole request yields both. Every overlap yields
//! at least one. Back-to-back stays never conflict.

use crate::occupancy::{OccupancyRecord, Stay};
use campsite_core::contracts::ReservationId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Message attached to every overlap conflict.
pub const DATES_UNAVAILABLE: &str = "The dates specified are not available.";

/// Field a conflict is reported against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictField {
    /// The requested arrival falls inside an existing stay.
    #[serde(rename = "arrivalDate")]
    ArrivalDate,
    /// The requested stay runs into an existing stay.
    #[serde(rename = "departureDate")]
    DepartureDate,
}

impl ConflictField {
    /// Wire name of the field.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ArrivalDate => "arrivalDate",
            Self::DepartureDate => "departureDate",
        }
    }
}

impl fmt::Display for ConflictField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field-level conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldConflict {
    /// Offending field
    pub field: ConflictField,
    /// Human-readable reason
    pub message: String,
}

impl FieldConflict {
    fn unavailable(field: ConflictField) -> Self {
        Self {
            field,
            message: DATES_UNAVAILABLE.to_string(),
        }
    }
}

/// Conflicts between `candidate` and `existing`.
///
/// Records belonging to `exclude` are ignored, so re-validating a reservation
/// against its own current occupancy never conflicts. Returns an empty list when
/// the stay is free, otherwise at most one entry per field, arrival first.
///
/// # Example
///
/// ```
/// use availability_service::occupancy::{OccupancyRecord, Stay};
/// use availability_service::overlap::{conflicts, ConflictField};
/// use campsite_core::contracts::ReservationId;
/// use chrono::{TimeZone, Utc};
///
/// let day = |d| Utc.with_ymd_and_hms(2022, 2, d, 0, 0, 0).unwrap();
/// let held = OccupancyRecord::new(ReservationId::new(), Stay::new(day(4), day(7)).unwrap(), day(1));
///
/// let inside = Stay::new(day(5), day(6)).unwrap();
/// let found = conflicts(&inside, &[held.clone()], None);
/// assert_eq!(found.len(), 2);
///
/// assert!(conflicts(&inside, &[held.clone()], Some(held.reservation_id)).is_empty());
/// assert!(conflicts(&Stay::new(day(7), day(9)).unwrap(), &[held], None).is_empty());
/// ```
#[must_use]
pub fn conflicts(
    candidate: &Stay,
    existing: &[OccupancyRecord],
    exclude: Option<ReservationId>,
) -> Vec<FieldConflict> {
    let mut arrival_taken = false;
    let mut departure_taken = false;

    for record in existing {
        if Some(record.reservation_id) == exclude || !record.stay.overlaps(candidate) {
            continue;
        }
        let other = record.stay;
        arrival_taken |= other.arrival() <= candidate.arrival();
        departure_taken |=
            other.arrival() > candidate.arrival() || other.departure() >= candidate.departure();
    }

    let mut found = Vec::with_capacity(2);
    if arrival_taken {
        found.push(FieldConflict::unavailable(ConflictField::ArrivalDate));
    }
    if departure_taken {
        found.push(FieldConflict::unavailable(ConflictField::DepartureDate));
    }
    found
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 2, d, 0, 0, 0).unwrap()
    }

    fn stay(from: u32, to: u32) -> Stay {
        Stay::new(day(from), day(to)).unwrap()
    }

    fn held(from: u32, to: u32) -> OccupancyRecord {
        OccupancyRecord::new(ReservationId::new(), stay(from, to), day(1))
    }

    fn fields(found: &[FieldConflict]) -> Vec<ConflictField> {
        found.iter().map(|c| c.field).collect()
    }

    #[test]
    fn free_when_nothing_is_held() {
        assert!(conflicts(&stay(4, 6), &[], None).is_empty());
    }

    #[test]
    fn arrival_inside_existing_stay() {
        // held [4, 6), request [5, 8)
        let found = conflicts(&stay(5, 8), &[held(4, 6)], None);
        assert_eq!(fields(&found), vec![ConflictField::ArrivalDate]);
        assert_eq!(found[0].message, DATES_UNAVAILABLE);
    }

    #[test]
    fn departure_runs_into_existing_stay() {
        // held [6, 9), request [4, 7)
        let found = conflicts(&stay(4, 7), &[held(6, 9)], None);
        assert_eq!(fields(&found), vec![ConflictField::DepartureDate]);
    }

    #[test]
    fn request_swallowing_existing_stay() {
        // held [5, 6), request [4, 8)
        let found = conflicts(&stay(4, 8), &[held(5, 6)], None);
        assert_eq!(fields(&found), vec![ConflictField::DepartureDate]);
    }

    #[test]
    fn identical_stays_conflict_on_both_fields() {
        let found = conflicts(&stay(4, 7), &[held(4, 7)], None);
        assert_eq!(
            fields(&found),
            vec![ConflictField::ArrivalDate, ConflictField::DepartureDate]
        );
    }

    #[test]
    fn back_to_back_is_free_on_either_side() {
        let existing = [held(2, 4), held(6, 8)];
        assert!(conflicts(&stay(4, 6), &existing, None).is_empty());
    }

    #[test]
    fn own_record_is_excluded_but_others_are_not() {
        let own = held(4, 7);
        let other = held(7, 9);
        let request = stay(5, 8);

        let found = conflicts(&request, &[own.clone(), other], Some(own.reservation_id));
        assert_eq!(fields(&found), vec![ConflictField::DepartureDate]);
    }

    #[test]
    fn several_records_report_each_field_once() {
        let found = conflicts(&stay(3, 9), &[held(2, 4), held(5, 6), held(8, 10)], None);
        assert_eq!(
            fields(&found),
            vec![ConflictField::ArrivalDate, ConflictField::DepartureDate]
        );
    }

    #[test]
    fn field_names_serialize_as_form_fields() {
        let json = serde_json::to_value(FieldConflict::unavailable(ConflictField::ArrivalDate)).unwrap();
        assert_eq!(json["field"], "arrivalDate");
    }
}
