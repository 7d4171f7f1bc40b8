//! Redpanda event bus for the campsite saga.
//!
//! Implements [`EventBus`] over rdkafka, so any Kafka-compatible broker works
//! (Redpanda, Apache Kafka, MSK). Each saga channel is one topic.
//!
//! # Delivery Semantics
//!
//! **At-least-once** with manual offset commits:
//! - An offset is committed only after the subscriber acknowledged the
//!   [`Delivery`](campsite_core::event_bus::Delivery), i.e. after its handler
//!   finished. A crash or shutdown before that means redelivery.
//! - One record per subscription is in flight at a time; the next one is only
//!   handed out after the previous one was acknowledged.
//! - Records are keyed by aggregate id, so all events of one reservation share a
//!   partition and arrive in publish order.
//! - Nothing is ordered across topics.
//!
//! Handlers downstream must therefore be idempotent, which both saga handlers are.
//!
//! # Example
//!
//! ```no_run
//! use campsite_redpanda::RedpandaEventBus;
//! use campsite_core::event_bus::EventBus;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("availability-service")
//!     .auto_offset_reset("earliest")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod wire;

use campsite_core::event::SerializedEvent;
use campsite_core::event_bus::{Delivery, EventBus, EventBusError, EventStream};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const DEFAULT_OFFSET_RESET: &str = "earliest";

/// Kafka-compatible [`EventBus`].
///
/// One producer is shared by every publish. Each `subscribe` call creates its own
/// consumer in the configured group, so two service instances with the same group
/// split the partitions between them.
pub struct RedpandaEventBus {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
    consumer_group: Option<String>,
    auto_offset_reset: String,
}

impl RedpandaEventBus {
    /// Create a bus with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Start configuring a bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Bootstrap servers this bus talks to.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    fn group_for(&self, channels: &[String]) -> String {
        self.consumer_group.clone().unwrap_or_else(|| {
            let mut sorted = channels.to_vec();
            sorted.sort();
            format!("campsite-{}", sorted.join("-"))
        })
    }
}

/// Builder for [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Comma-separated bootstrap servers.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Producer acknowledgement mode: `"0"`, `"1"` or `"all"`. Default `"all"`.
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Compression codec. Default `"none"`.
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Producer send timeout. Default 5 seconds.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Consumer group shared by all instances of one service.
    ///
    /// Without it the group is derived from the subscribed channels.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Where a new group starts reading: `"earliest"` or `"latest"`. Default
    /// `"earliest"`, so no saga event published before the first start is skipped.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the bus.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if no brokers were set or the
    /// producer cannot be created.
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self
            .brokers
            .ok_or_else(|| EventBusError::ConnectionFailed("Brokers not configured".to_string()))?;
        let acks = self.producer_acks.unwrap_or_else(|| "all".to_string());
        let compression = self.compression.unwrap_or_else(|| "none".to_string());

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", &acks)
            .set("compression.type", &compression)
            .create()
            .map_err(|e| {
                EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
            })?;

        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| DEFAULT_OFFSET_RESET.to_string());

        tracing::info!(
            brokers = %brokers,
            acks = %acks,
            compression = %compression,
            auto_offset_reset = %auto_offset_reset,
            "RedpandaEventBus created"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            consumer_group: self.consumer_group,
            auto_offset_reset,
        })
    }
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        channel: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let channel = channel.to_string();
        let event = event.clone();

        Box::pin(async move {
            let headers = wire::headers(&channel, &event)?;
            let record = FutureRecord::to(&channel)
                .payload(&event.data)
                .key(wire::partition_key(&event))
                .headers(headers);

            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        channel = %channel,
                        partition,
                        offset,
                        event_type = %event.event_type,
                        "Event published"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        channel = %channel,
                        event_type = %event.event_type,
                        error = %kafka_error,
                        "Failed to publish event"
                    );
                    Err(EventBusError::PublishFailed {
                        channel,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe(
        &self,
        channels: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let channels: Vec<String> = channels.iter().map(|s| (*s).to_string()).collect();

        Box::pin(async move {
            let group = self.group_for(&channels);
            let subscription_failed = |reason: String| EventBusError::SubscriptionFailed {
                channels: channels.clone(),
                reason,
            };

            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &self.brokers)
                .set("group.id", &group)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &self.auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| subscription_failed(format!("Failed to create consumer: {e}")))?;

            let topics: Vec<&str> = channels.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topics)
                .map_err(|e| subscription_failed(format!("Failed to subscribe: {e}")))?;

            tracing::info!(
                channels = ?channels,
                consumer_group = %group,
                "Subscribed to channels"
            );

            let (tx, rx) = tokio::sync::mpsc::channel(1);

            // The task owns the consumer; it ends when the subscriber drops the stream
            // or drops a delivery without acknowledging it.
            tokio::spawn(async move {
                use futures::StreamExt;

                let mut stream = consumer.stream();
                while let Some(received) = stream.next().await {
                    let message = match received {
                        Ok(message) => message,
                        Err(e) => {
                            let error =
                                EventBusError::TransportError(format!("Failed to receive: {e}"));
                            if tx.send(Err(error)).await.is_err() {
                                break;
                            }
                            continue;
                        }
                    };

                    match wire::decode(message.payload(), message.headers()) {
                        Ok(event) => {
                            tracing::trace!(
                                channel = message.topic(),
                                partition = message.partition(),
                                offset = message.offset(),
                                event_type = %event.event_type,
                                "Received event"
                            );
                            let (delivery, acked) = Delivery::tracked(event);
                            if tx.send(Ok(delivery)).await.is_err() {
                                tracing::debug!("Subscriber dropped, closing consumer");
                                break;
                            }
                            if acked.await.is_err() {
                                tracing::info!(
                                    channel = message.topic(),
                                    partition = message.partition(),
                                    offset = message.offset(),
                                    "Delivery not acknowledged, leaving it for redelivery"
                                );
                                break;
                            }
                        }
                        // A record that cannot be decoded fails the same way forever;
                        // report it and move past it.
                        Err(error) => {
                            if tx.send(Err(error)).await.is_err() {
                                break;
                            }
                        }
                    }

                    if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                        tracing::warn!(
                            channel = message.topic(),
                            partition = message.partition(),
                            offset = message.offset(),
                            error = %e,
                            "Failed to commit offset, record may be redelivered"
                        );
                    }
                }
                tracing::debug!("Consumer task exiting");
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };
            Ok(Box::pin(stream) as EventStream)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn bus_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RedpandaEventBus>();
    }

    #[test]
    fn brokers_are_required() {
        let result = RedpandaEventBus::builder().build();
        assert!(matches!(result, Err(EventBusError::ConnectionFailed(_))));
    }

    #[test]
    fn group_defaults_to_the_channel_set() {
        // Producer creation does not contact the broker.
        let bus = RedpandaEventBus::new("localhost:9092").unwrap();
        let channels = vec![
            "event.reservation.rollback".to_string(),
            "event.campsite.reserved".to_string(),
        ];
        assert_eq!(
            bus.group_for(&channels),
            "campsite-event.campsite.reserved-event.reservation.rollback"
        );

        let grouped = RedpandaEventBus::builder()
            .brokers("localhost:9092")
            .consumer_group("reservation-service")
            .build()
            .unwrap();
        assert_eq!(grouped.group_for(&channels), "reservation-service");
    }
}
