//! # Campsite Testing
//!
//! Test doubles and helpers shared by the service crates.
//!
//! This crate provides:
//! - `FixedClock` and `test_clock()` for deterministic booking-rule checks
//! - `InMemoryEventBus`, a FIFO-per-channel bus with redelivery and failure injection
//! - `TransitionTest`, a Given-When-Then harness for reducers
//! - proptest strategies for instants and stays
//!
//! ## Example
//!
//! ```ignore
//! use campsite_testing::{InMemoryEventBus, test_clock};
//!
//! #[tokio::test]
//! async fn created_reservation_is_published() {
//!     let bus = Arc::new(InMemoryEventBus::new());
//!     let service = ReservationService::new(store, Arc::new(test_clock()), rules);
//!     service.create(draft).await?;
//!     relay.run_once().await?;
//!     assert_eq!(bus.published("event.reservation.created").len(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use campsite_core::environment::Clock;

pub mod event_bus;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Clock frozen at a given instant. Clones share the same time.
    ///
    /// # Example
    ///
    /// ```
    /// use campsite_testing::mocks::FixedClock;
    /// use campsite_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let start = Utc::now();
    /// let clock = FixedClock::new(start);
    /// assert_eq!(clock.now(), clock.now());
    ///
    /// clock.advance(Duration::days(1));
    /// assert_eq!(clock.now(), start + Duration::days(1));
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a clock frozen at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = time;
        }

        /// Move the clock forward by `by`
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Default fixed clock for tests: 2022-02-01 10:30:00 UTC.
    ///
    /// Mid-morning, so that "whole days ahead" arithmetic is exercised with a
    /// non-midnight `now`.
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_now())
    }

    /// The instant [`test_clock`] is frozen at.
    #[must_use]
    pub fn test_now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_643_711_400, 0).unwrap_or_default()
    }
}

/// Property-based testing utilities
pub mod properties {
    use chrono::{DateTime, Duration, Utc};
    use proptest::prelude::*;

    /// Instants within `horizon_hours` hours after `base`, on whole hours.
    pub fn instant_after(
        base: DateTime<Utc>,
        horizon_hours: i64,
    ) -> impl Strategy<Value = DateTime<Utc>> {
        (0..horizon_hours).prop_map(move |h| base + Duration::hours(h))
    }

    /// `(arrival, departure)` pairs with `arrival < departure`.
    ///
    /// Arrivals fall within `horizon_hours` of `base`; stays last between one hour
    /// and `max_len_hours`.
    pub fn stay_bounds(
        base: DateTime<Utc>,
        horizon_hours: i64,
        max_len_hours: i64,
    ) -> impl Strategy<Value = (DateTime<Utc>, DateTime<Utc>)> {
        (instant_after(base, horizon_hours), 1..=max_len_hours.max(1))
            .prop_map(|(arrival, len)| (arrival, arrival + Duration::hours(len)))
    }
}

/// Install a tracing subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs anything. Honors
/// `RUST_LOG`.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use event_bus::InMemoryEventBus;
pub use mocks::{FixedClock, test_clock, test_now};
pub use transition_test::TransitionTest;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use proptest::prelude::*;

    #[test]
    fn test_clock_is_frozen_mid_morning() {
        let clock = test_clock();
        let now = clock.now();
        assert_eq!(now, clock.now());
        assert_eq!((now.year(), now.month(), now.day()), (2022, 2, 1));
        assert_eq!((now.hour(), now.minute()), (10, 30));
    }

    #[test]
    fn cloned_clocks_move_together() {
        let clock = test_clock();
        let other = clock.clone();
        clock.advance(chrono::Duration::hours(2));
        assert_eq!(other.now(), test_now() + chrono::Duration::hours(2));
    }

    proptest! {
        #[test]
        fn stays_are_non_empty((arrival, departure) in properties::stay_bounds(test_now(), 240, 72)) {
            prop_assert!(arrival < departure);
        }
    }
}
