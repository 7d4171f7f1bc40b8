//! # Availability Service
//!
//! Single authority over which days the campsite is held.
//!
//! The reservation side asks for dates by publishing `RESERVATION_CREATED` or
//! `RESERVATION_MODIFIED`; this service answers `CAMPSITE_RESERVED` or
//! `RESERVATION_ROLLBACK` and releases the stay on `RESERVATION_CANCELLED`.
//!
//! ## Components
//!
//! - [`overlap`]: pure conflict check between a requested stay and held stays
//! - [`calendar`]: pure day-by-day availability calendar
//! - [`store`]: occupancy persistence trait and an in-memory implementation
//! - [`coordinator`]: the saga participant, plugged into an `EventConsumer`
//! - [`search`]: the calendar read path
//!
//! ## Example
//!
//! ```ignore
//! let store: Arc<dyn OccupancyStore> = Arc::new(PostgresOccupancyStore::new(pool));
//! let coordinator = AvailabilityCoordinator::new(store.clone(), bus.clone(), channels.clone(), clock.clone());
//! let consumer = EventConsumer::new(bus, channels, Arc::new(coordinator));
//! consumer.run(shutdown).await?;
//! ```

pub mod calendar;
pub mod coordinator;
pub mod error;
pub mod occupancy;
pub mod overlap;
pub mod search;
pub mod store;

pub use calendar::{AvailabilitySlot, build_calendar};
pub use coordinator::{AvailabilityCoordinator, Verdict};
pub use error::AvailabilityError;
pub use occupancy::{OccupancyRecord, Stay};
pub use overlap::{ConflictField, FieldConflict, conflicts};
pub use search::{AvailabilitySearch, CalendarConfig};
pub use store::{InMemoryOccupancyStore, OccupancyStore};
