//! Wire envelope for events crossing a service boundary.
//!
//! Every channel carries [`SerializedEvent`] values. The `data` field holds the JSON
//! encoding of a typed payload, and `metadata` carries routing hints such as the
//! aggregate id used for partitioning and the outbox record id used for tracing
//! duplicates.
//!
//! # Example
//!
//! ```
//! use campsite_core::event::SerializedEvent;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Ping {
//!     id: u32,
//! }
//!
//! let event = SerializedEvent::from_payload("PING", &Ping { id: 7 }, None).unwrap();
//! let back: Ping = event.decode().unwrap();
//! assert_eq!(back, Ping { id: 7 });
//! ```

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use uuid::Uuid;

/// Metadata key holding the aggregate id an event belongs to.
pub const AGGREGATE_ID_KEY: &str = "aggregate_id";

/// Metadata key holding the id of the outbox record an event was published from.
pub const EVENT_ID_KEY: &str = "event_id";

/// Metadata key holding the id of the event a reply answers.
pub const CAUSATION_ID_KEY: &str = "causation_id";

/// Error types for event operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Failed to serialize a payload to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Failed to deserialize a payload from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),

    /// Unknown event type encountered during deserialization.
    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}

/// A serialized event as it travels over the bus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedEvent {
    /// The event type identifier (e.g., `"RESERVATION_CREATED"`)
    pub event_type: String,

    /// JSON-encoded payload
    pub data: Vec<u8>,

    /// Optional routing metadata
    pub metadata: Option<serde_json::Value>,
}

impl SerializedEvent {
    /// Creates a new `SerializedEvent` from already encoded bytes.
    #[must_use]
    pub const fn new(
        event_type: String,
        data: Vec<u8>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            event_type,
            data,
            metadata,
        }
    }

    /// Encodes `payload` as JSON and wraps it in an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if the payload cannot be encoded.
    pub fn from_payload<T: Serialize>(
        event_type: impl Into<String>,
        payload: &T,
        metadata: Option<serde_json::Value>,
    ) -> Result<Self, EventError> {
        let data = serde_json::to_vec(payload)
            .map_err(|e| EventError::SerializationError(e.to_string()))?;
        Ok(Self::new(event_type.into(), data, metadata))
    }

    /// Decodes the JSON payload into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] if the bytes are not a valid `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, EventError> {
        serde_json::from_slice(&self.data)
            .map_err(|e| EventError::DeserializationError(e.to_string()))
    }

    /// Looks up a string value in the metadata object.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref()?.get(key)?.as_str()
    }

    /// The aggregate id this event belongs to, when the producer recorded one.
    #[must_use]
    pub fn aggregate_id(&self) -> Option<&str> {
        self.metadata_str(AGGREGATE_ID_KEY)
    }

    /// A metadata value parsed as a UUID. Missing or malformed values are `None`.
    #[must_use]
    pub fn metadata_uuid(&self, key: &str) -> Option<Uuid> {
        self.metadata_str(key)?.parse().ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_rejects_garbage() {
        let event = SerializedEvent::new("X".to_string(), b"not json".to_vec(), None);
        let result: Result<serde_json::Value, _> = event.decode();
        assert!(matches!(result, Err(EventError::DeserializationError(_))));
    }

    #[test]
    fn metadata_lookup() {
        let event = SerializedEvent::new(
            "X".to_string(),
            b"{}".to_vec(),
            Some(json!({ AGGREGATE_ID_KEY: "abc", "count": 3 })),
        );
        assert_eq!(event.aggregate_id(), Some("abc"));
        assert_eq!(event.metadata_str("count"), None);
        assert_eq!(event.metadata_str("missing"), None);
    }

    #[test]
    fn uuid_metadata_must_parse() {
        let id = Uuid::new_v4();
        let event = SerializedEvent::new(
            "X".to_string(),
            b"{}".to_vec(),
            Some(json!({ CAUSATION_ID_KEY: id.to_string(), EVENT_ID_KEY: "not-a-uuid" })),
        );
        assert_eq!(event.metadata_uuid(CAUSATION_ID_KEY), Some(id));
        assert_eq!(event.metadata_uuid(EVENT_ID_KEY), None);
    }

    #[test]
    fn no_metadata_means_no_aggregate() {
        let event = SerializedEvent::from_payload("X", &json!({"a": 1}), None).unwrap();
        assert_eq!(event.aggregate_id(), None);
    }
}
