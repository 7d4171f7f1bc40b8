//! Availability search: occupancy window query plus calendar.

use crate::calendar::{AvailabilitySlot, build_calendar};
use crate::error::AvailabilityError;
use crate::occupancy::truncate_day;
use crate::store::OccupancyStore;
use campsite_core::environment::Clock;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Calendar search settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarConfig {
    /// Window searched when no end is given, counted from the start
    pub default_window: Duration,
    /// Longest window answered, counted from the first midnight. Later ends are clamped.
    pub max_window: Duration,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            default_window: Duration::days(30),
            max_window: Duration::days(366),
        }
    }
}

/// Read side answering "which days are free?".
pub struct AvailabilitySearch {
    store: Arc<dyn OccupancyStore>,
    clock: Arc<dyn Clock>,
    config: CalendarConfig,
}

impl AvailabilitySearch {
    /// Create a search over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn OccupancyStore>, clock: Arc<dyn Clock>, config: CalendarConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Calendar for `[start, end)`.
    ///
    /// `start` defaults to now and `end` to `start` plus the configured window. An
    /// empty or inverted window yields no slots, and `end` is clamped to
    /// [`CalendarConfig::max_window`] past the first midnight.
    ///
    /// # Errors
    ///
    /// Returns [`AvailabilityError::Store`] if the occupancy window cannot be read.
    pub async fn search(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<AvailabilitySlot>, AvailabilityError> {
        let start = start.unwrap_or_else(|| self.clock.now());
        let end = end.unwrap_or_else(|| later(start, self.config.default_window));
        let first = truncate_day(start);
        if end <= first {
            return Ok(Vec::new());
        }
        let limit = later(first, self.config.max_window);
        let end = if end > limit {
            tracing::debug!(requested = %end, %limit, "Clamping availability window");
            limit
        } else {
            end
        };

        let occupied: Vec<_> = self
            .store
            .find_between(first, end)
            .await?
            .into_iter()
            .map(|record| record.stay)
            .collect();
        tracing::debug!(%first, %end, occupied = occupied.len(), "Building availability calendar");

        Ok(build_calendar(first, end, &occupied))
    }
}

/// `at + span`, saturating at the last representable instant.
fn later(at: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    at.checked_add_signed(span).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::occupancy::{OccupancyRecord, Stay};
    use crate::store::InMemoryOccupancyStore;
    use campsite_core::contracts::ReservationId;
    use campsite_testing::{FixedClock, test_now};
    use chrono::TimeZone;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 2, d, 0, 0, 0).unwrap()
    }

    async fn search_with(stays: &[(u32, u32)]) -> AvailabilitySearch {
        let store = Arc::new(InMemoryOccupancyStore::new());
        for &(from, to) in stays {
            let stay = Stay::new(day(from), day(to)).unwrap();
            store
                .insert(OccupancyRecord::new(ReservationId::new(), stay, day(1)))
                .await
                .unwrap();
        }
        AvailabilitySearch::new(
            store,
            Arc::new(FixedClock::new(test_now())),
            CalendarConfig::default(),
        )
    }

    #[tokio::test]
    async fn explicit_window() {
        let search = search_with(&[(3, 5), (7, 11)]).await;

        let slots = search.search(Some(day(1)), Some(day(11))).await.unwrap();

        let free: Vec<bool> = slots.iter().map(|s| s.available).collect();
        assert_eq!(
            free,
            vec![true, true, false, false, true, true, false, false, false, false]
        );
    }

    #[tokio::test]
    async fn default_window_starts_today() {
        let search = search_with(&[]).await;

        let slots = search.search(None, None).await.unwrap();

        // now is 10:30, so the 30-day window touches 31 calendar days
        assert_eq!(slots.len(), 31);
        assert_eq!(slots[0].checkin, truncate_day(test_now()));
    }

    #[tokio::test]
    async fn oversized_window_is_clamped() {
        let search = search_with(&[]).await;

        let far = Utc.with_ymd_and_hms(9999, 1, 1, 0, 0, 0).unwrap();
        let slots = search.search(Some(day(1)), Some(far)).await.unwrap();

        assert_eq!(slots.len(), 366);
        assert_eq!(slots.last().unwrap().checkout, day(1) + Duration::days(366));
    }

    #[tokio::test]
    async fn window_near_the_end_of_time_does_not_overflow() {
        let search = search_with(&[]).await;
        let last = DateTime::<Utc>::MAX_UTC;

        let slots = search.search(Some(last - Duration::days(2)), None).await.unwrap();

        assert!(!slots.is_empty());
        assert!(slots.iter().all(|s| s.checkin < s.checkout));
    }

    #[tokio::test]
    async fn inverted_window_is_empty() {
        let search = search_with(&[(3, 5)]).await;
        assert!(search.search(Some(day(9)), Some(day(2))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_reported() {
        let store = Arc::new(InMemoryOccupancyStore::new());
        store.set_offline(true);
        let search = AvailabilitySearch::new(
            store,
            Arc::new(FixedClock::new(test_now())),
            CalendarConfig::default(),
        );

        let error = search.search(None, None).await.unwrap_err();
        assert!(matches!(error, AvailabilityError::Store(_)));
    }
}
