//! # Campsite Runtime
//!
//! The imperative shell shared by both services.
//!
//! ## Core Components
//!
//! - **`EventConsumer`**: subscribes to saga channels and dispatches decoded events
//!   to a [`SagaEventHandler`](consumer::SagaEventHandler), retrying transient failures until they clear
//! - **`OutboxRelay`**: drains unpublished outbox records onto the bus in order
//! - **`RetryPolicy`**: exponential backoff with jitter
//! - **`DeadLetterQueue`**: bounded parking lot for events that can never be handled
//! - **`MetricsServer`**: Prometheus scrape endpoint
//!
//! ## Example
//!
//! ```ignore
//! let consumer = EventConsumer::new(bus.clone(), channels.clone(), coordinator);
//! let relay = OutboxRelay::new(outbox, bus, channels, clock);
//!
//! tokio::join!(
//!     consumer.run(shutdown.clone()),
//!     relay.run(Duration::from_millis(250), shutdown),
//! );
//! ```

/// Inbound event dispatch
pub mod consumer;

/// Dead-letter parking for failed events
pub mod dead_letter;

/// Prometheus metrics for observability
pub mod metrics;

/// Outbox draining
pub mod relay;

/// Retry logic with exponential backoff
pub mod retry;

pub use consumer::{EventConsumer, HandlerError, HandlerFuture, Outcome, SagaEventHandler};
pub use dead_letter::{DeadLetter, DeadLetterQueue};
pub use relay::{OutboxRelay, RelayError};
pub use retry::RetryPolicy;
