//! Inbound side of the saga: subscribe, decode, dispatch.
//!
//! An [`EventConsumer`] subscribes to the channels carrying the kinds its handler
//! cares about, decodes every envelope into a [`Received`] saga event, and hands it
//! to a [`SagaEventHandler`].
//!
//! A transient handler failure (store or bus down) is retried with backoff for as
//! long as it takes; the delivery is only acknowledged once the handler got through,
//! so an outage holds the channel instead of losing the event. Stopping while a
//! failure is being waited out leaves the delivery unacknowledged, and the broker
//! hands it out again after the restart.
//!
//! Only events that can never succeed (undecodable payload, permanent rejection) are
//! logged, parked in a dead-letter queue and acknowledged. There is no caller to
//! report to, so nothing is propagated.
//!
//! Events are processed one at a time, which keeps per-channel FIFO order intact.

use crate::dead_letter::DeadLetterQueue;
use crate::retry::RetryPolicy;
use campsite_core::channels::{ChannelConfig, EventKind};
use campsite_core::contracts::{Received, SagaEvent};
use campsite_core::event::SerializedEvent;
use campsite_core::event_bus::{EventBus, EventBusError};
use futures::StreamExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Why a handler could not process an event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Infrastructure was unavailable. Retrying may succeed.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The event can never be applied (e.g. it names an unknown reservation).
    #[error("Rejected: {0}")]
    Rejected(String),
}

impl HandlerError {
    /// Whether the consumer should retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Boxed future returned by [`SagaEventHandler::handle`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;

/// Application logic reacting to saga events.
///
/// Implementations must be idempotent: the bus delivers at least once.
pub trait SagaEventHandler: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Event kinds this handler reacts to.
    fn kinds(&self) -> &'static [EventKind];

    /// Apply one event.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Transient`] for retryable infrastructure failures and
    /// [`HandlerError::Rejected`] for events that can never be applied.
    fn handle(&self, received: Received) -> HandlerFuture<'_>;
}

/// What happened to one delivered envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The handler applied the event.
    Handled,
    /// The event kind is not one this handler reacts to.
    Ignored,
    /// The event was parked in the dead-letter queue.
    Parked,
}

impl Outcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Handled => "handled",
            Self::Ignored => "ignored",
            Self::Parked => "parked",
        }
    }
}

/// Errors that stop a consumer loop.
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// Subscribing to the channels failed.
    #[error("Failed to subscribe: {0}")]
    Subscribe(#[from] EventBusError),
}

/// Drives a [`SagaEventHandler`] from an [`EventBus`] subscription.
pub struct EventConsumer {
    bus: Arc<dyn EventBus>,
    channels: ChannelConfig,
    handler: Arc<dyn SagaEventHandler>,
    retry: RetryPolicy,
    dead_letters: DeadLetterQueue<SerializedEvent>,
}

impl EventConsumer {
    /// Create a consumer with the default retry policy and a fresh dead-letter queue.
    #[must_use]
    pub fn new(
        bus: Arc<dyn EventBus>,
        channels: ChannelConfig,
        handler: Arc<dyn SagaEventHandler>,
    ) -> Self {
        Self {
            bus,
            channels,
            handler,
            retry: RetryPolicy::default(),
            dead_letters: DeadLetterQueue::default(),
        }
    }

    /// Backoff between attempts while a handler fails transiently. After
    /// `max_retries` attempts the consumer keeps retrying at `max_delay`, logging
    /// every failure as an error.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Park failures in `queue` instead of a private one.
    #[must_use]
    pub fn with_dead_letter_queue(mut self, queue: DeadLetterQueue<SerializedEvent>) -> Self {
        self.dead_letters = queue;
        self
    }

    /// Handle to the dead-letter queue.
    #[must_use]
    pub fn dead_letters(&self) -> DeadLetterQueue<SerializedEvent> {
        self.dead_letters.clone()
    }

    /// Channels this consumer listens on.
    #[must_use]
    pub fn subscribed_channels(&self) -> Vec<&str> {
        self.channels.channels_for(self.handler.kinds())
    }

    /// Decode and dispatch a single envelope.
    ///
    /// Returns once the event was handled, ignored or parked. A transiently failing
    /// handler is retried until it succeeds or rejects the event.
    pub async fn process(&self, envelope: SerializedEvent) -> Outcome {
        let outcome = self.dispatch(envelope).await;
        metrics::counter!(
            "consumer.events",
            "handler" => self.handler.name(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
        outcome
    }

    async fn dispatch(&self, envelope: SerializedEvent) -> Outcome {
        let received = match Received::from_serialized(&envelope) {
            Ok(received) => received,
            Err(error) => {
                tracing::warn!(
                    handler = self.handler.name(),
                    event_type = %envelope.event_type,
                    %error,
                    "Dropping undecodable event"
                );
                self.dead_letters.push(envelope, error.to_string(), 0);
                return Outcome::Parked;
            }
        };
        let event = received.event;

        if !self.handler.kinds().contains(&event.kind()) {
            tracing::debug!(handler = self.handler.name(), kind = %event.kind(), "Ignoring event");
            return Outcome::Ignored;
        }

        let mut attempts = 0_usize;
        loop {
            attempts += 1;
            match self.handler.handle(received).await {
                Ok(()) => {
                    tracing::debug!(
                        handler = self.handler.name(),
                        kind = %event.kind(),
                        reservation_id = %event.reservation_id(),
                        attempts,
                        "Event handled"
                    );
                    return Outcome::Handled;
                }
                Err(HandlerError::Rejected(reason)) => {
                    tracing::error!(
                        handler = self.handler.name(),
                        kind = %event.kind(),
                        reservation_id = %event.reservation_id(),
                        attempts,
                        %reason,
                        "Event rejected"
                    );
                    self.dead_letters.push(envelope, reason, attempts);
                    return Outcome::Parked;
                }
                Err(HandlerError::Transient(reason)) => {
                    self.back_off(&event, attempts, &reason).await;
                }
            }
        }
    }

    async fn back_off(&self, event: &SagaEvent, attempts: usize, reason: &str) {
        metrics::counter!("consumer.retries", "handler" => self.handler.name()).increment(1);
        let delay = self.retry.jittered_delay(attempts - 1);
        if attempts > self.retry.max_retries {
            tracing::error!(
                handler = self.handler.name(),
                kind = %event.kind(),
                reservation_id = %event.reservation_id(),
                attempts,
                %reason,
                ?delay,
                "Event still failing, holding the channel until it recovers"
            );
        } else {
            tracing::warn!(
                handler = self.handler.name(),
                kind = %event.kind(),
                reservation_id = %event.reservation_id(),
                attempts,
                %reason,
                ?delay,
                "Transient failure, retrying"
            );
        }
        tokio::time::sleep(delay).await;
    }

    /// Consume until `shutdown` flips to `true` or the subscription ends.
    ///
    /// # Errors
    ///
    /// Returns [`ConsumerError::Subscribe`] if the subscription cannot be established.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), ConsumerError> {
        let channels = self.subscribed_channels();
        let mut stream = self.bus.subscribe(&channels).await?;
        tracing::info!(handler = self.handler.name(), ?channels, "Consumer started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                next = stream.next() => match next {
                    Some(Ok(delivery)) => {
                        // Leaving mid-handler keeps the delivery owed to this group.
                        tokio::select! {
                            _ = self.process(delivery.event().clone()) => {
                                delivery.ack();
                            }
                            _ = shutdown.changed() => {
                                tracing::info!(
                                    handler = self.handler.name(),
                                    event_type = %delivery.event().event_type,
                                    "Stopping before the event settled, it will be redelivered"
                                );
                                break;
                            }
                        }
                    }
                    Some(Err(error)) => {
                        tracing::warn!(handler = self.handler.name(), %error, "Event stream error");
                        metrics::counter!("consumer.stream_errors", "handler" => self.handler.name())
                            .increment(1);
                    }
                    None => {
                        tracing::warn!(handler = self.handler.name(), "Event stream ended");
                        break;
                    }
                },
            }
        }

        tracing::info!(handler = self.handler.name(), "Consumer stopped");
        Ok(())
    }
}
