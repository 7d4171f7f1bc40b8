//! Transactional outbox records.
//!
//! A state change and the events it produced are written in one unit of work. The
//! events land in an outbox table as [`OutboxEntry`] rows with no `published_at`.
//! A relay later drains unpublished rows in creation order, publishes them and marks
//! them published. A crash between publish and mark means the event goes out twice,
//! never zero times.
//!
//! A record that can never be published (unknown kind, unencodable payload) is
//! marked abandoned instead. Abandoned records are terminal and no longer pending,
//! so they cannot hold back the records written after them.

use crate::channels::EventKind;
use crate::contracts::SagaEvent;
use crate::event::{AGGREGATE_ID_KEY, EVENT_ID_KEY, EventError, SerializedEvent};
use crate::store::StoreFuture;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An event waiting in (or already drained from) the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Unique id of this record
    pub id: Uuid,
    /// Aggregate type that produced the event (e.g. `"reservation"`)
    pub aggregate_type: String,
    /// Id of the aggregate instance
    pub aggregate_id: String,
    /// Wire name of the event kind
    pub event_type: String,
    /// Snapshot the consumer needs, as JSON
    pub payload: serde_json::Value,
    /// When the record was written
    pub created_at: DateTime<Utc>,
    /// Failed publish attempts so far
    pub attempts: u32,
    /// Last publish error, if any
    pub last_error: Option<String>,
    /// Set once the relay has handed the event to the bus
    pub published_at: Option<DateTime<Utc>>,
    /// Set when the relay gave up on a record that can never be published
    #[serde(default)]
    pub abandoned_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    /// Record a saga event produced by `aggregate_type`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the payload cannot be encoded.
    pub fn record(
        aggregate_type: &str,
        event: &SagaEvent,
        created_at: DateTime<Utc>,
    ) -> Result<Self, EventError> {
        Ok(Self {
            id: Uuid::new_v4(),
            aggregate_type: aggregate_type.to_string(),
            aggregate_id: event.reservation_id().to_string(),
            event_type: event.kind().as_str().to_string(),
            payload: event.payload()?,
            created_at,
            attempts: 0,
            last_error: None,
            published_at: None,
            abandoned_at: None,
        })
    }

    /// Use `id` as the record id, so the record can be referred to before it is written.
    #[must_use]
    pub const fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Kind of the recorded event.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownEventType`] if the stored type is not a known kind.
    pub fn kind(&self) -> Result<EventKind, EventError> {
        self.event_type
            .parse()
            .map_err(|_| EventError::UnknownEventType(self.event_type.clone()))
    }

    /// Whether the relay still has to publish this record.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.published_at.is_none() && self.abandoned_at.is_none()
    }

    /// Wire envelope for this record.
    ///
    /// The metadata carries the aggregate id (partition key) and the record id, so
    /// consumers can recognise a redelivered event in logs.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the payload cannot be encoded.
    pub fn to_serialized(&self) -> Result<SerializedEvent, EventError> {
        let metadata = serde_json::json!({
            AGGREGATE_ID_KEY: self.aggregate_id,
            EVENT_ID_KEY: self.id.to_string(),
        });
        SerializedEvent::from_payload(self.event_type.clone(), &self.payload, Some(metadata))
    }
}

/// Read/mark side of an outbox, used by the relay.
///
/// Writing entries is not part of this trait: entries are only ever written by the
/// store that owns the aggregate, inside the same transaction as the state change.
pub trait OutboxStore: Send + Sync {
    /// Up to `limit` entries that are neither published nor abandoned, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::store::StoreError) if the outbox cannot be read.
    fn pending(&self, limit: usize) -> StoreFuture<'_, Vec<OutboxEntry>>;

    /// Mark an entry as published at `at`.
    ///
    /// Marking an already published entry is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::store::StoreError) if the update fails.
    fn mark_published(&self, id: Uuid, at: DateTime<Utc>) -> StoreFuture<'_, ()>;

    /// Record a failed publish attempt. The entry stays pending.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::store::StoreError) if the update fails.
    fn mark_failed(&self, id: Uuid, reason: String) -> StoreFuture<'_, ()>;

    /// Give up on an entry that can never be published. It is no longer pending.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](crate::store::StoreError) if the update fails.
    fn mark_abandoned(&self, id: Uuid, reason: String, at: DateTime<Utc>) -> StoreFuture<'_, ()>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::contracts::ReservationId;
    use chrono::TimeZone;

    #[test]
    fn record_captures_event_snapshot() {
        let id = ReservationId::new();
        let now = Utc.with_ymd_and_hms(2022, 2, 1, 12, 0, 0).unwrap();
        let arrival = Utc.with_ymd_and_hms(2022, 2, 4, 0, 0, 0).unwrap();
        let departure = Utc.with_ymd_and_hms(2022, 2, 7, 0, 0, 0).unwrap();

        let entry = OutboxEntry::record("reservation", &SagaEvent::created(id, arrival, departure), now)
            .unwrap();

        assert!(entry.is_pending());
        assert_eq!(entry.aggregate_id, id.to_string());
        assert_eq!(entry.kind().unwrap(), EventKind::ReservationCreated);
        assert_eq!(entry.payload["arrivalDate"], "2022-02-04T00:00:00Z");
    }

    #[test]
    fn envelope_decodes_back_to_the_recorded_event() {
        let id = ReservationId::new();
        let entry = OutboxEntry::record("reservation", &SagaEvent::cancelled(id), Utc::now()).unwrap();

        let serialized = entry.to_serialized().unwrap();

        assert_eq!(serialized.event_type, "RESERVATION_CANCELLED");
        assert_eq!(serialized.metadata_str(EVENT_ID_KEY), Some(entry.id.to_string().as_str()));
        assert_eq!(SagaEvent::from_serialized(&serialized).unwrap(), SagaEvent::cancelled(id));
    }

    #[test]
    fn abandoned_record_is_no_longer_pending() {
        let mut entry =
            OutboxEntry::record("reservation", &SagaEvent::cancelled(ReservationId::new()), Utc::now())
                .unwrap();
        entry.abandoned_at = Some(Utc::now());

        assert!(!entry.is_pending());
        assert_eq!(entry.published_at, None);
    }
}
