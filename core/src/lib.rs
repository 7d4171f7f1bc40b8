//! # Campsite Core
//!
//! Core traits and types shared by the reservation and availability services.
//!
//! The two services never share a transaction. They agree on whether a stay can be
//! booked by exchanging events over named channels (a saga with an explicit
//! compensating step). This crate holds the vocabulary of that protocol:
//!
//! - **Reducer**: pure transition function `(State, Action, Environment) → Result<Events>`
//! - **Clock**: injected time source, so that validation is deterministic in tests
//! - **`SerializedEvent`**: the envelope every channel carries
//! - **`EventBus`**: publish/subscribe abstraction with at-least-once delivery
//! - **`SagaEvent`**: one variant per event kind, each with its own typed payload
//! - **`ChannelConfig`**: explicit event kind → channel name mapping
//! - **Outbox**: event records written in the same unit of work as a state change
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell
//! - Explicit results instead of exceptions for validation and lookups
//! - Dependency injection via traits (`Clock`, `EventBus`, stores)
//! - Every consumer is idempotent under redelivery

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

pub mod channels;
pub mod contracts;
pub mod event;
pub mod event_bus;
pub mod outbox;
pub mod store;

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → Result<Events, Error>`.
///
/// They contain all business rules of an aggregate, perform no I/O, and are
/// deterministic given the same environment. The imperative shell loads the state,
/// runs the reducer, and persists the new state together with the emitted events.
pub mod reducer {
    use smallvec::SmallVec;

    /// Events emitted by a single reduction. Most transitions emit zero or one.
    pub type Emitted<E> = SmallVec<[E; 2]>;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The commands and inbound events this reducer processes
    /// - `Event`: The outbound events a transition may emit
    /// - `Error`: Why an action was refused
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for ReservationStateMachine {
    ///     type State = Option<Reservation>;
    ///     type Action = ReservationAction;
    ///     type Event = SagaEvent;
    ///     type Error = ReservationError;
    ///     type Environment = ReservationEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut Option<Reservation>,
    ///         action: ReservationAction,
    ///         env: &ReservationEnvironment,
    ///     ) -> Result<Emitted<SagaEvent>, ReservationError> {
    ///         // Business logic here
    ///         Ok(Emitted::new())
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The event type a transition emits
        type Event;

        /// The error type returned when an action is refused
        type Error;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into a state change and the events it produced.
        ///
        /// Implementations must leave `state` untouched when they return an error.
        ///
        /// # Errors
        ///
        /// Returns `Self::Error` when the action is invalid for the current state.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Result<Emitted<Self::Event>, Self::Error>;
    }
}

/// Environment module - Dependency injection traits
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use campsite_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let _now = clock.now();
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
