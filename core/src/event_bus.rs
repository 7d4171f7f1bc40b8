//! Event bus abstraction for the saga channels.
//!
//! The reservation and availability services talk to each other only through an
//! [`EventBus`]. A bus offers named channels with at-least-once delivery and FIFO
//! order within a channel. Nothing is guaranteed across channels, so a confirmation
//! may overtake a later modification issued locally.
//!
//! # Flow
//!
//! ```text
//! ┌──────────────┐  outbox relay   ┌─────────────────────────────┐
//! │ Reservation  │ ──────────────► │ event.reservation.created   │ ──┐
//! │   service    │                 │ event.reservation.modified  │   │
//! │              │                 │ event.reservation.cancelled │   │
//! └──────▲───────┘                 └─────────────────────────────┘   │
//!        │                                                           ▼
//!        │        ┌─────────────────────────────┐           ┌──────────────┐
//!        └─────── │ event.campsite.reserved     │ ◄──────── │ Availability │
//!                 │ event.reservation.rollback  │           │   service    │
//!                 └─────────────────────────────┘           └──────────────┘
//! ```
//!
//! # Implementations
//!
//! - `InMemoryEventBus` in `campsite-testing` for tests
//! - `RedpandaEventBus` in `campsite-redpanda` for production (Kafka-compatible)

use crate::event::SerializedEvent;
use futures::Stream;
use futures::channel::oneshot;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the broker
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a channel
    #[error("Publish failed for channel '{channel}': {reason}")]
    PublishFailed {
        /// The channel that failed
        channel: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to channels
    #[error("Subscription failed for channels {channels:?}: {reason}")]
    SubscriptionFailed {
        /// The channels that failed to subscribe
        channels: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// A received message could not be turned into an event
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

impl EventBusError {
    /// Whether retrying the same operation later may succeed.
    ///
    /// A message that failed to deserialize will fail the same way on every attempt.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::DeserializationFailed(_))
    }
}

/// Resolves once the matching [`Delivery`] is acknowledged, or fails with
/// `Canceled` when it was dropped unacknowledged.
pub type Acknowledgement = oneshot::Receiver<()>;

/// An event handed to a subscriber.
///
/// A broker may only treat the event as consumed after [`Delivery::ack`]. A delivery
/// dropped without an acknowledgement stays owed to the subscriber group and is
/// delivered again.
#[derive(Debug)]
pub struct Delivery {
    event: SerializedEvent,
    ack: Option<oneshot::Sender<()>>,
}

impl Delivery {
    /// A delivery nobody waits on.
    #[must_use]
    pub const fn new(event: SerializedEvent) -> Self {
        Self { event, ack: None }
    }

    /// A delivery plus the handle that observes its acknowledgement.
    #[must_use]
    pub fn tracked(event: SerializedEvent) -> (Self, Acknowledgement) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                event,
                ack: Some(sender),
            },
            receiver,
        )
    }

    /// The delivered event.
    #[must_use]
    pub const fn event(&self) -> &SerializedEvent {
        &self.event
    }

    /// Mark the event as consumed and take it back.
    pub fn ack(mut self) -> SerializedEvent {
        if let Some(sender) = self.ack.take() {
            // The broker side may already be gone; then there is nothing to commit.
            let _ = sender.send(());
        }
        self.event
    }
}

/// Stream of deliveries from a subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Delivery, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// # Dyn Compatibility
///
/// Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so that the bus
/// can be shared as `Arc<dyn EventBus>` between the coordinator, the relay and the
/// consumers.
pub trait EventBus: Send + Sync {
    /// Publish an event to a channel.
    ///
    /// Delivery is at-least-once: subscribers may see the same event more than once.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the broker did not accept the event.
    fn publish(
        &self,
        channel: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Subscribe to one or more channels.
    ///
    /// Events published to a channel are yielded in publish order. Events from
    /// different channels may interleave arbitrarily. Every yielded [`Delivery`]
    /// must be acknowledged once processed; an unacknowledged one is redelivered.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if the subscription cannot be set up.
    fn subscribe(
        &self,
        channels: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ping() -> SerializedEvent {
        SerializedEvent::new("PING".into(), b"{}".to_vec(), None)
    }

    #[test]
    fn ack_reaches_the_broker_side() {
        let (delivery, mut acked) = Delivery::tracked(ping());
        assert_eq!(acked.try_recv().unwrap(), None);

        assert_eq!(delivery.ack(), ping());
        assert_eq!(acked.try_recv().unwrap(), Some(()));
    }

    #[test]
    fn dropped_delivery_is_not_acknowledged() {
        let (delivery, mut acked) = Delivery::tracked(ping());
        drop(delivery);
        assert!(acked.try_recv().is_err());
    }

    #[test]
    fn untracked_delivery_acks_silently() {
        assert_eq!(Delivery::new(ping()).ack(), ping());
    }

    #[test]
    fn only_decode_failures_are_permanent() {
        assert!(!EventBusError::DeserializationFailed("bad".into()).is_transient());
        assert!(EventBusError::TransportError("down".into()).is_transient());
        assert!(
            EventBusError::PublishFailed {
                channel: "c".into(),
                reason: "timeout".into(),
            }
            .is_transient()
        );
    }
}
