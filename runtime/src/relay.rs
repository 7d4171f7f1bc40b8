//! Outbox relay: drains unpublished records onto the bus.
//!
//! The relay reads pending [`OutboxEntry`] rows oldest first, publishes each to the
//! channel configured for its kind, and marks it published. A publish that still
//! fails after retries stops the batch, so a later event for the same aggregate can
//! never overtake an earlier one. The failed record is retried on the next tick.
//!
//! A record that can never be published is marked abandoned, which takes it out of
//! the pending set for good.

use crate::retry::{RetryPolicy, retry_with_backoff};
use campsite_core::channels::ChannelConfig;
use campsite_core::environment::Clock;
use campsite_core::event_bus::{EventBus, EventBusError};
use campsite_core::outbox::{OutboxEntry, OutboxStore};
use campsite_core::store::StoreError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Errors from one relay pass.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Reading or marking the outbox failed.
    #[error("Outbox store error: {0}")]
    Store(#[from] StoreError),

    /// The bus did not accept an event. Entries from this one onwards stay pending.
    #[error("Publishing outbox entry {entry_id} failed: {source}")]
    Publish {
        /// Id of the entry that could not be published
        entry_id: uuid::Uuid,
        /// Underlying bus error
        source: EventBusError,
    },
}

/// Publishes outbox records to their channels.
pub struct OutboxRelay {
    outbox: Arc<dyn OutboxStore>,
    bus: Arc<dyn EventBus>,
    channels: ChannelConfig,
    clock: Arc<dyn Clock>,
    batch_size: usize,
    retry: RetryPolicy,
}

impl OutboxRelay {
    /// Create a relay draining up to 100 records per pass.
    #[must_use]
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        bus: Arc<dyn EventBus>,
        channels: ChannelConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            outbox,
            bus,
            channels,
            clock,
            batch_size: 100,
            retry: RetryPolicy::default(),
        }
    }

    /// Records read per pass.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Backoff applied to each publish.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Drain one batch. Returns how many records were published.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Store`] when the outbox cannot be read or updated, and
    /// [`RelayError::Publish`] when an entry could not be published.
    pub async fn run_once(&self) -> Result<usize, RelayError> {
        let pending = self.outbox.pending(self.batch_size).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let mut published = 0;
        for entry in pending {
            if self.publish_entry(&entry).await? {
                published += 1;
            }
        }

        tracing::info!(published, "Outbox batch relayed");
        Ok(published)
    }

    /// Publish one entry. Returns `false` for records that can never be published.
    async fn publish_entry(&self, entry: &OutboxEntry) -> Result<bool, RelayError> {
        let prepared = entry
            .kind()
            .and_then(|kind| entry.to_serialized().map(|envelope| (kind, envelope)));
        let (kind, envelope) = match prepared {
            Ok(pair) => pair,
            Err(error) => {
                tracing::error!(
                    entry_id = %entry.id,
                    event_type = %entry.event_type,
                    %error,
                    "Abandoning unpublishable outbox entry"
                );
                metrics::counter!("outbox.abandoned").increment(1);
                self.outbox
                    .mark_abandoned(entry.id, error.to_string(), self.clock.now())
                    .await?;
                return Ok(false);
            }
        };
        let channel = self.channels.channel(kind);

        let result = retry_with_backoff(&self.retry, || self.bus.publish(channel, &envelope)).await;
        if let Err(source) = result {
            metrics::counter!("outbox.publish_failed", "event_type" => kind.as_str()).increment(1);
            self.outbox.mark_failed(entry.id, source.to_string()).await?;
            return Err(RelayError::Publish {
                entry_id: entry.id,
                source,
            });
        }

        self.outbox.mark_published(entry.id, self.clock.now()).await?;
        metrics::counter!("outbox.published", "event_type" => kind.as_str()).increment(1);
        tracing::debug!(
            entry_id = %entry.id,
            aggregate_id = %entry.aggregate_id,
            %channel,
            "Outbox entry published"
        );
        Ok(true)
    }

    /// Poll the outbox every `interval` until `shutdown` flips to `true`.
    ///
    /// Pass errors are logged and the next tick tries again.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "Outbox relay started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(error) = self.run_once().await {
                        tracing::warn!(%error, "Outbox relay pass failed");
                    }
                }
            }
        }

        tracing::info!("Outbox relay stopped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use campsite_core::channels::EventKind;
    use campsite_core::contracts::{ReservationId, SagaEvent};
    use campsite_core::store::StoreFuture;
    use campsite_testing::{InMemoryEventBus, test_clock};
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    #[derive(Default)]
    struct VecOutbox {
        entries: Mutex<Vec<OutboxEntry>>,
    }

    impl VecOutbox {
        fn with(events: &[SagaEvent]) -> Arc<Self> {
            let outbox = Self::default();
            for event in events {
                let entry = OutboxEntry::record("reservation", event, Utc::now()).unwrap();
                outbox.entries.lock().unwrap().push(entry);
            }
            Arc::new(outbox)
        }

        fn pending_count(&self) -> usize {
            self.entries.lock().unwrap().iter().filter(|e| e.is_pending()).count()
        }
    }

    impl OutboxStore for VecOutbox {
        fn pending(&self, limit: usize) -> StoreFuture<'_, Vec<OutboxEntry>> {
            Box::pin(async move {
                Ok(self
                    .entries
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|e| e.is_pending())
                    .take(limit)
                    .cloned()
                    .collect())
            })
        }

        fn mark_published(&self, id: uuid::Uuid, at: DateTime<Utc>) -> StoreFuture<'_, ()> {
            Box::pin(async move {
                for entry in self.entries.lock().unwrap().iter_mut() {
                    if entry.id == id && entry.published_at.is_none() {
                        entry.published_at = Some(at);
                    }
                }
                Ok(())
            })
        }

        fn mark_failed(&self, id: uuid::Uuid, reason: String) -> StoreFuture<'_, ()> {
            Box::pin(async move {
                for entry in self.entries.lock().unwrap().iter_mut() {
                    if entry.id == id {
                        entry.attempts += 1;
                        entry.last_error = Some(reason.clone());
                    }
                }
                Ok(())
            })
        }

        fn mark_abandoned(
            &self,
            id: uuid::Uuid,
            reason: String,
            at: DateTime<Utc>,
        ) -> StoreFuture<'_, ()> {
            Box::pin(async move {
                for entry in self.entries.lock().unwrap().iter_mut() {
                    if entry.id == id {
                        entry.last_error = Some(reason.clone());
                        entry.abandoned_at = Some(at);
                    }
                }
                Ok(())
            })
        }
    }

    fn relay(outbox: &Arc<VecOutbox>, bus: &Arc<InMemoryEventBus>) -> OutboxRelay {
        OutboxRelay::new(
            Arc::clone(outbox) as Arc<dyn OutboxStore>,
            Arc::clone(bus) as Arc<dyn EventBus>,
            ChannelConfig::default(),
            Arc::new(test_clock()),
        )
        .with_retry_policy(RetryPolicy::none())
    }

    #[tokio::test]
    async fn publishes_in_creation_order_to_mapped_channels() {
        let id = ReservationId::new();
        let outbox = VecOutbox::with(&[
            SagaEvent::created(id, Utc::now(), Utc::now()),
            SagaEvent::cancelled(id),
        ]);
        let bus = Arc::new(InMemoryEventBus::new());

        assert_eq!(relay(&outbox, &bus).run_once().await.unwrap(), 2);

        let created = bus.published(EventKind::ReservationCreated.default_channel());
        let cancelled = bus.published(EventKind::ReservationCancelled.default_channel());
        assert_eq!(created.len(), 1);
        assert_eq!(cancelled.len(), 1);
        assert_eq!(outbox.pending_count(), 0);
    }

    #[tokio::test]
    async fn stops_at_first_failure_and_resumes_later() {
        let first = ReservationId::new();
        let second = ReservationId::new();
        let outbox = VecOutbox::with(&[SagaEvent::cancelled(first), SagaEvent::cancelled(second)]);
        let bus = Arc::new(InMemoryEventBus::new());
        bus.fail_next_publishes(1);
        let relay = relay(&outbox, &bus);

        let error = relay.run_once().await.unwrap_err();
        assert!(matches!(error, RelayError::Publish { .. }));
        assert_eq!(outbox.pending_count(), 2);
        assert_eq!(outbox.entries.lock().unwrap()[0].attempts, 1);

        assert_eq!(relay.run_once().await.unwrap(), 2);
        let order: Vec<_> = bus
            .published(EventKind::ReservationCancelled.default_channel())
            .iter()
            .map(|e| SagaEvent::from_serialized(e).unwrap().reservation_id())
            .collect();
        assert_eq!(order, vec![first, second]);
    }

    #[tokio::test]
    async fn empty_outbox_is_a_quiet_pass() {
        let outbox = VecOutbox::with(&[]);
        let bus = Arc::new(InMemoryEventBus::new());
        assert_eq!(relay(&outbox, &bus).run_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unpublishable_entries_do_not_block_the_batch_behind_them() {
        let id = ReservationId::new();
        let outbox = VecOutbox::with(&[]);
        {
            let mut entries = outbox.entries.lock().unwrap();
            for _ in 0..3 {
                let mut poisoned =
                    OutboxEntry::record("reservation", &SagaEvent::cancelled(id), Utc::now()).unwrap();
                poisoned.event_type = "RESERVATION_TELEPORTED".into();
                entries.push(poisoned);
            }
            entries.push(OutboxEntry::record("reservation", &SagaEvent::cancelled(id), Utc::now()).unwrap());
        }
        let bus = Arc::new(InMemoryEventBus::new());
        let relay = relay(&outbox, &bus).with_batch_size(2);

        assert_eq!(relay.run_once().await.unwrap(), 0);
        assert_eq!(relay.run_once().await.unwrap(), 1);

        assert_eq!(bus.published(EventKind::ReservationCancelled.default_channel()).len(), 1);
        assert_eq!(outbox.pending_count(), 0);
        let abandoned = outbox
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.abandoned_at.is_some())
            .count();
        assert_eq!(abandoned, 3);
    }
}
