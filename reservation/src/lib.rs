//! # Reservation Service
//!
//! Owns the reservation lifecycle and starts the saga with the availability
//! service.
//!
//! A guest books a stay; the reservation is stored `PENDING` and a
//! `RESERVATION_CREATED` record lands in the outbox in the same write. The outbox
//! relay publishes it, the availability side answers, and [`VerdictHandler`]
//! settles the reservation as `CONFIRMED` or `REJECTED`. Date changes and
//! cancellations go through the same path.
//!
//! ## Components
//!
//! - [`model`]: the aggregate and its statuses
//! - [`validation`]: booking rules, reported per field
//! - [`machine`]: the pure lifecycle reducer
//! - [`store`]: persistence trait with transactional outbox, plus an in-memory store
//! - [`service`]: load, reduce, write
//! - [`handler`]: inbound verdicts
//!
//! ## Example
//!
//! ```ignore
//! let store = Arc::new(PostgresReservationStore::new(pool));
//! let service = Arc::new(ReservationService::new(store.clone(), clock.clone(), BookingRules::default()));
//! let reservation = service.create(draft).await?;
//!
//! let relay = OutboxRelay::new(store, bus.clone(), channels.clone(), clock);
//! let consumer = EventConsumer::new(bus, channels, Arc::new(VerdictHandler::new(service)));
//! ```

pub mod error;
pub mod handler;
pub mod machine;
pub mod model;
pub mod service;
pub mod store;
pub mod validation;

pub use error::ReservationError;
pub use handler::VerdictHandler;
pub use machine::{ReservationAction, ReservationEnvironment, ReservationStateMachine};
pub use model::{Reservation, ReservationDraft, ReservationStatus, StayDates};
pub use service::ReservationService;
pub use store::{InMemoryReservationStore, ReservationStore};
pub use validation::{BookingRules, FieldError, ValidationErrors};
