//! Booking rules.
//!
//! Checks run before anything is persisted and report every violation at once, one
//! entry per offending field, the way a form highlights them. Day differences are
//! whole 24-hour periods, truncated toward zero, measured from the injected clock.

use crate::model::{ReservationDraft, StayDates};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message for an arrival sooner than the minimum lead time.
pub const ARRIVAL_TOO_SOON: &str = "The arrival date must be in minimum 1 day or more.";
/// Message for an arrival beyond the booking horizon.
pub const ARRIVAL_TOO_FAR: &str = "The arrival date can be up to 1 month in advance.";
/// Message for a stay longer than allowed.
pub const STAY_TOO_LONG: &str = "The departure date is too far, duration must not exceed 3 days.";
/// Message for an empty or inverted stay.
pub const DEPARTURE_NOT_AFTER_ARRIVAL: &str = "The departure date must be after the arrival date.";
/// Message for a missing text field.
pub const MUST_NOT_BE_BLANK: &str = "must not be blank";

/// One field-level violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Form field name (`arrivalDate`, `guestEmail`, ...)
    pub field: String,
    /// Human-readable reason
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Every violation found in one request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Validation failed: {}", summary(.0))]
pub struct ValidationErrors(Vec<FieldError>);

fn summary(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    /// The violations, in the order they were found.
    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    /// Messages reported against `field`.
    #[must_use]
    pub fn messages_for(&self, field: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|e| e.field == field)
            .map(|e| e.message.as_str())
            .collect()
    }

    fn check(errors: Vec<FieldError>) -> Result<(), Self> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Self(errors))
        }
    }
}

/// Booking limits.
///
/// The defaults are one day of lead time, a one-month horizon and three nights
/// at most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRules {
    /// Minimum whole days between now and arrival
    pub min_days_ahead: i64,
    /// Maximum whole days between now and arrival
    pub max_days_ahead: i64,
    /// Maximum whole days between arrival and departure
    pub max_stay_days: i64,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            min_days_ahead: 1,
            max_days_ahead: 30,
            max_stay_days: 3,
        }
    }
}

impl BookingRules {
    /// Check a new reservation.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationErrors`] listing every violated rule.
    pub fn validate_draft(
        &self,
        now: DateTime<Utc>,
        draft: &ReservationDraft,
    ) -> Result<(), ValidationErrors> {
        let mut errors = Vec::new();
        for (field, value) in [
            ("guestEmail", &draft.guest_email),
            ("firstName", &draft.first_name),
            ("lastName", &draft.last_name),
        ] {
            if value.trim().is_empty() {
                errors.push(FieldError::new(field, MUST_NOT_BE_BLANK));
            }
        }
        self.check_dates(now, &draft.dates, &mut errors);
        ValidationErrors::check(errors)
    }

    /// Check new dates for an existing reservation.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationErrors`] listing every violated rule.
    pub fn validate_dates(
        &self,
        now: DateTime<Utc>,
        dates: &StayDates,
    ) -> Result<(), ValidationErrors> {
        let mut errors = Vec::new();
        self.check_dates(now, dates, &mut errors);
        ValidationErrors::check(errors)
    }

    fn check_dates(&self, now: DateTime<Utc>, dates: &StayDates, errors: &mut Vec<FieldError>) {
        let lead = (dates.arrival_date - now).num_days();
        if lead < self.min_days_ahead {
            errors.push(FieldError::new("arrivalDate", ARRIVAL_TOO_SOON));
        }
        if lead > self.max_days_ahead {
            errors.push(FieldError::new("arrivalDate", ARRIVAL_TOO_FAR));
        }

        if dates.arrival_date >= dates.departure_date {
            errors.push(FieldError::new("departureDate", DEPARTURE_NOT_AFTER_ARRIVAL));
        } else if (dates.departure_date - dates.arrival_date).num_days() > self.max_stay_days {
            errors.push(FieldError::new("departureDate", STAY_TOO_LONG));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use campsite_testing::test_now;
    use chrono::Duration;

    fn dates(arrive_in: Duration, stay: Duration) -> StayDates {
        let arrival = test_now() + arrive_in;
        StayDates::new(arrival, arrival + stay)
    }

    fn draft(dates: StayDates) -> ReservationDraft {
        ReservationDraft {
            guest_email: "jane@example.com".into(),
            first_name: "Jane".into(),
            last_name: "Doe".into(),
            dates,
        }
    }

    #[test]
    fn valid_draft_passes() {
        let rules = BookingRules::default();
        let ok = draft(dates(Duration::days(2), Duration::days(3)));
        assert!(rules.validate_draft(test_now(), &ok).is_ok());
    }

    #[test]
    fn arrival_today_is_too_soon() {
        let rules = BookingRules::default();
        let errors = rules
            .validate_draft(test_now(), &draft(dates(Duration::zero(), Duration::days(1))))
            .unwrap_err();
        assert_eq!(errors.messages_for("arrivalDate"), vec![ARRIVAL_TOO_SOON]);
    }

    #[test]
    fn lead_time_is_counted_in_whole_days() {
        let rules = BookingRules::default();
        // 23 hours ahead truncates to zero days
        let almost = dates(Duration::hours(23), Duration::days(1));
        assert!(rules.validate_dates(test_now(), &almost).is_err());

        let exactly = dates(Duration::hours(24), Duration::days(1));
        assert!(rules.validate_dates(test_now(), &exactly).is_ok());

        // 30 days and 23 hours is still 30 whole days
        let edge = dates(Duration::days(30) + Duration::hours(23), Duration::days(1));
        assert!(rules.validate_dates(test_now(), &edge).is_ok());

        let beyond = dates(Duration::days(31), Duration::days(1));
        let errors = rules.validate_dates(test_now(), &beyond).unwrap_err();
        assert_eq!(errors.messages_for("arrivalDate"), vec![ARRIVAL_TOO_FAR]);
    }

    #[test]
    fn stay_length_is_bounded() {
        let rules = BookingRules::default();
        let three_and_a_bit = dates(Duration::days(2), Duration::days(3) + Duration::hours(20));
        assert!(rules.validate_dates(test_now(), &three_and_a_bit).is_ok());

        let four = dates(Duration::days(2), Duration::days(4));
        let errors = rules.validate_dates(test_now(), &four).unwrap_err();
        assert_eq!(errors.messages_for("departureDate"), vec![STAY_TOO_LONG]);
    }

    #[test]
    fn inverted_stay_is_reported_on_departure() {
        let rules = BookingRules::default();
        let inverted = dates(Duration::days(2), -Duration::days(1));
        let errors = rules.validate_dates(test_now(), &inverted).unwrap_err();
        assert_eq!(
            errors.messages_for("departureDate"),
            vec![DEPARTURE_NOT_AFTER_ARRIVAL]
        );
    }

    #[test]
    fn all_violations_are_collected() {
        let rules = BookingRules::default();
        let mut bad = draft(dates(Duration::zero(), Duration::days(5)));
        bad.guest_email = "   ".into();
        bad.last_name = String::new();

        let errors = rules.validate_draft(test_now(), &bad).unwrap_err();

        let fields: Vec<_> = errors.errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["guestEmail", "lastName", "arrivalDate", "departureDate"]);
        assert!(errors.to_string().contains("guestEmail: must not be blank"));
    }

    #[test]
    fn limits_are_configurable() {
        let rules = BookingRules {
            min_days_ahead: 0,
            max_days_ahead: 365,
            max_stay_days: 14,
        };
        let long = dates(Duration::hours(2), Duration::days(10));
        assert!(rules.validate_dates(test_now(), &long).is_ok());
    }
}
