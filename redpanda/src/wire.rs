//! Mapping between [`SerializedEvent`] and Kafka records.
//!
//! The record value is the JSON payload exactly as produced, so any Kafka tool can
//! read it. The event type and the metadata object travel as headers, and the
//! aggregate id is the record key: all events of one reservation land on the same
//! partition and keep their order.

use campsite_core::event::SerializedEvent;
use campsite_core::event_bus::EventBusError;
use rdkafka::message::{Header, Headers, OwnedHeaders};

/// Header carrying the event type.
pub const EVENT_TYPE_HEADER: &str = "event_type";

/// Header carrying the JSON metadata object.
pub const METADATA_HEADER: &str = "metadata";

/// Partition key for `event`: its aggregate id, or the event type for events
/// produced without one.
#[must_use]
pub fn partition_key(event: &SerializedEvent) -> &str {
    event.aggregate_id().unwrap_or(&event.event_type)
}

/// Headers for an outgoing record.
///
/// # Errors
///
/// Returns [`EventBusError::PublishFailed`] if the metadata cannot be encoded.
pub fn headers(channel: &str, event: &SerializedEvent) -> Result<OwnedHeaders, EventBusError> {
    let headers = OwnedHeaders::new().insert(Header {
        key: EVENT_TYPE_HEADER,
        value: Some(event.event_type.as_str()),
    });
    let Some(metadata) = &event.metadata else {
        return Ok(headers);
    };
    let metadata = serde_json::to_string(metadata).map_err(|e| EventBusError::PublishFailed {
        channel: channel.to_string(),
        reason: format!("Failed to encode metadata: {e}"),
    })?;
    Ok(headers.insert(Header {
        key: METADATA_HEADER,
        value: Some(metadata.as_str()),
    }))
}

/// Rebuild an event from a received record.
///
/// # Errors
///
/// Returns [`EventBusError::DeserializationFailed`] if the record has no payload, no
/// event type header, or metadata that is not JSON.
pub fn decode<H: Headers>(
    payload: Option<&[u8]>,
    headers: Option<&H>,
) -> Result<SerializedEvent, EventBusError> {
    let payload = payload
        .ok_or_else(|| EventBusError::DeserializationFailed("Message has no payload".to_string()))?;

    let mut event_type = None;
    let mut metadata = None;
    if let Some(headers) = headers {
        for header in headers.iter() {
            match header.key {
                EVENT_TYPE_HEADER => event_type = header.value,
                METADATA_HEADER => metadata = header.value,
                _ => {}
            }
        }
    }

    let event_type = event_type
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .ok_or_else(|| {
            EventBusError::DeserializationFailed("Message has no event_type header".to_string())
        })?;
    let metadata = metadata
        .map(serde_json::from_slice::<serde_json::Value>)
        .transpose()
        .map_err(|e| EventBusError::DeserializationFailed(format!("Invalid metadata header: {e}")))?;

    Ok(SerializedEvent::new(event_type, payload.to_vec(), metadata))
}
