//! In-memory [`EventBus`] for tests.
//!
//! Every published event is appended to a per-channel log and forwarded to the
//! current subscribers of that channel, in publish order. The log survives so tests
//! can assert on what was published and replay it to simulate redelivery. Every
//! delivery is tracked until it is acknowledged, so tests can check what a
//! subscriber left unconsumed.

use campsite_core::event::SerializedEvent;
use campsite_core::event_bus::{Acknowledgement, Delivery, EventBus, EventBusError, EventStream};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

struct Subscriber {
    channels: Vec<String>,
    sender: mpsc::UnboundedSender<Delivery>,
}

struct InFlight {
    event: SerializedEvent,
    acked: Acknowledgement,
}

impl InFlight {
    /// Whether the subscriber acknowledged the delivery.
    fn settled(&mut self) -> bool {
        matches!(self.acked.try_recv(), Ok(Some(())))
    }
}

#[derive(Default)]
struct BusState {
    log: HashMap<String, Vec<SerializedEvent>>,
    history: Vec<(String, SerializedEvent)>,
    subscribers: Vec<Subscriber>,
    in_flight: Vec<InFlight>,
    failures_to_inject: usize,
}

impl BusState {
    fn deliver(&mut self, channel: &str, event: &SerializedEvent) {
        let in_flight = &mut self.in_flight;
        in_flight.retain_mut(|delivery| !delivery.settled());
        self.subscribers.retain(|subscriber| {
            if !subscriber.channels.iter().any(|c| c == channel) {
                return !subscriber.sender.is_closed();
            }
            let (delivery, acked) = Delivery::tracked(event.clone());
            if subscriber.sender.send(delivery).is_err() {
                return false;
            }
            in_flight.push(InFlight {
                event: event.clone(),
                acked,
            });
            true
        });
    }
}

/// In-memory event bus with at-least-once test hooks.
///
/// # Example
///
/// ```
/// use campsite_core::event::SerializedEvent;
/// use campsite_core::event_bus::EventBus;
/// use campsite_testing::InMemoryEventBus;
///
/// # tokio_test::block_on(async {
/// let bus = InMemoryEventBus::new();
/// let event = SerializedEvent::new("PING".into(), b"{}".to_vec(), None);
/// bus.publish("pings", &event).await.unwrap();
/// assert_eq!(bus.published("pings"), vec![event]);
/// # });
/// ```
#[derive(Default)]
pub struct InMemoryEventBus {
    state: Mutex<BusState>,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every event published to `channel`, oldest first.
    #[must_use]
    pub fn published(&self, channel: &str) -> Vec<SerializedEvent> {
        self.lock().log.get(channel).cloned().unwrap_or_default()
    }

    /// Every event published to any channel, in global publish order.
    #[must_use]
    pub fn history(&self) -> Vec<(String, SerializedEvent)> {
        self.lock().history.clone()
    }

    /// Make the next `count` publishes fail with a transport error.
    pub fn fail_next_publishes(&self, count: usize) {
        self.lock().failures_to_inject = count;
    }

    /// Send every event already published to `channel` to current subscribers again.
    ///
    /// Returns the number of events redelivered.
    pub fn redeliver(&self, channel: &str) -> usize {
        let mut state = self.lock();
        let events = state.log.get(channel).cloned().unwrap_or_default();
        for event in &events {
            state.deliver(channel, event);
        }
        events.len()
    }

    /// Deliveries not acknowledged yet, oldest first.
    ///
    /// Includes deliveries still being processed and deliveries dropped without an
    /// acknowledgement, which a broker would hand out again.
    #[must_use]
    pub fn unacknowledged(&self) -> Vec<SerializedEvent> {
        let mut state = self.lock();
        state.in_flight.retain_mut(|delivery| !delivery.settled());
        state.in_flight.iter().map(|d| d.event.clone()).collect()
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|s| !s.sender.is_closed());
        state.subscribers.len()
    }

    /// Wait until at least `count` subscriptions are live.
    ///
    /// Useful after spawning a consumer, so that no event is published before it
    /// is listening.
    pub async fn wait_for_subscribers(&self, count: usize) {
        while self.subscriber_count() < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        channel: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let channel = channel.to_string();
        let event = event.clone();

        Box::pin(async move {
            let mut state = self.lock();
            if state.failures_to_inject > 0 {
                state.failures_to_inject -= 1;
                return Err(EventBusError::PublishFailed {
                    channel,
                    reason: "injected failure".to_string(),
                });
            }

            state.log.entry(channel.clone()).or_default().push(event.clone());
            state.history.push((channel.clone(), event.clone()));
            state.deliver(&channel, &event);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        channels: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let channels: Vec<String> = channels.iter().map(|c| (*c).to_string()).collect();

        Box::pin(async move {
            if channels.is_empty() {
                return Err(EventBusError::SubscriptionFailed {
                    channels,
                    reason: "no channels given".to_string(),
                });
            }

            let (sender, mut receiver) = mpsc::unbounded_channel();
            self.lock().subscribers.push(Subscriber { channels, sender });

            let stream = async_stream::stream! {
                while let Some(delivery) = receiver.recv().await {
                    yield Ok(delivery);
                }
            };
            Ok(Box::pin(stream) as EventStream)
        })
    }
}
