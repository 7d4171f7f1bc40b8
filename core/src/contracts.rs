//! Saga event contracts.
//!
//! [`SagaEvent`] is a tagged union with one variant per [`EventKind`]. Each variant
//! carries its own typed payload, and the JSON field names (`reservationId`,
//! `arrivalDate`, `departureDate`) are the ones both services agree on. Dates travel
//! as ISO-8601 instants.

use crate::channels::EventKind;
use crate::event::{AGGREGATE_ID_KEY, CAUSATION_ID_KEY, EVENT_ID_KEY, EventError, SerializedEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a reservation, shared by both services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(Uuid);

impl ReservationId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ReservationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Payload for events that carry a requested date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateSelection {
    /// Reservation the dates belong to
    pub reservation_id: ReservationId,
    /// First instant of the stay
    pub arrival_date: DateTime<Utc>,
    /// Instant the campsite is released
    pub departure_date: DateTime<Utc>,
}

/// Payload for events that only name a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRef {
    /// Reservation the event is about
    pub reservation_id: ReservationId,
}

/// Every event exchanged between the reservation and availability services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaEvent {
    /// `RESERVATION_CREATED`
    ReservationCreated(DateSelection),
    /// `RESERVATION_MODIFIED`, only emitted when dates change
    ReservationModified(DateSelection),
    /// `RESERVATION_CANCELLED`
    ReservationCancelled(ReservationRef),
    /// `CAMPSITE_RESERVED`, availability accepted the dates
    CampsiteReserved(ReservationRef),
    /// `RESERVATION_ROLLBACK`, availability refused the dates
    ReservationRollback(ReservationRef),
}

impl SagaEvent {
    /// `RESERVATION_CREATED` for the given stay.
    #[must_use]
    pub const fn created(
        reservation_id: ReservationId,
        arrival_date: DateTime<Utc>,
        departure_date: DateTime<Utc>,
    ) -> Self {
        Self::ReservationCreated(DateSelection {
            reservation_id,
            arrival_date,
            departure_date,
        })
    }

    /// `RESERVATION_MODIFIED` with the new dates.
    #[must_use]
    pub const fn modified(
        reservation_id: ReservationId,
        arrival_date: DateTime<Utc>,
        departure_date: DateTime<Utc>,
    ) -> Self {
        Self::ReservationModified(DateSelection {
            reservation_id,
            arrival_date,
            departure_date,
        })
    }

    /// `RESERVATION_CANCELLED`
    #[must_use]
    pub const fn cancelled(reservation_id: ReservationId) -> Self {
        Self::ReservationCancelled(ReservationRef { reservation_id })
    }

    /// `CAMPSITE_RESERVED`
    #[must_use]
    pub const fn reserved(reservation_id: ReservationId) -> Self {
        Self::CampsiteReserved(ReservationRef { reservation_id })
    }

    /// `RESERVATION_ROLLBACK`
    #[must_use]
    pub const fn rollback(reservation_id: ReservationId) -> Self {
        Self::ReservationRollback(ReservationRef { reservation_id })
    }

    /// The kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::ReservationCreated(_) => EventKind::ReservationCreated,
            Self::ReservationModified(_) => EventKind::ReservationModified,
            Self::ReservationCancelled(_) => EventKind::ReservationCancelled,
            Self::CampsiteReserved(_) => EventKind::CampsiteReserved,
            Self::ReservationRollback(_) => EventKind::ReservationRollback,
        }
    }

    /// The reservation this event is about.
    #[must_use]
    pub const fn reservation_id(&self) -> ReservationId {
        match self {
            Self::ReservationCreated(dates) | Self::ReservationModified(dates) => {
                dates.reservation_id
            }
            Self::ReservationCancelled(r) | Self::CampsiteReserved(r) | Self::ReservationRollback(r) => {
                r.reservation_id
            }
        }
    }

    /// Encode the payload as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if encoding fails.
    pub fn payload(&self) -> Result<serde_json::Value, EventError> {
        let value = match self {
            Self::ReservationCreated(dates) | Self::ReservationModified(dates) => {
                serde_json::to_value(dates)
            }
            Self::ReservationCancelled(r) | Self::CampsiteReserved(r) | Self::ReservationRollback(r) => {
                serde_json::to_value(r)
            }
        };
        value.map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Rebuild an event from its kind and JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] if the payload does not match the kind.
    pub fn from_payload(kind: EventKind, payload: serde_json::Value) -> Result<Self, EventError> {
        let decode_err = |e: serde_json::Error| EventError::DeserializationError(e.to_string());
        Ok(match kind {
            EventKind::ReservationCreated => {
                Self::ReservationCreated(serde_json::from_value(payload).map_err(decode_err)?)
            }
            EventKind::ReservationModified => {
                Self::ReservationModified(serde_json::from_value(payload).map_err(decode_err)?)
            }
            EventKind::ReservationCancelled => {
                Self::ReservationCancelled(serde_json::from_value(payload).map_err(decode_err)?)
            }
            EventKind::CampsiteReserved => {
                Self::CampsiteReserved(serde_json::from_value(payload).map_err(decode_err)?)
            }
            EventKind::ReservationRollback => {
                Self::ReservationRollback(serde_json::from_value(payload).map_err(decode_err)?)
            }
        })
    }

    /// Wrap this event in a wire envelope keyed by its reservation id.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if encoding fails.
    pub fn to_serialized(&self) -> Result<SerializedEvent, EventError> {
        self.to_serialized_answering(None)
    }

    /// Wrap this event in a wire envelope that names the event it answers.
    ///
    /// Verdicts echo the id of the selection they decide on, so the reservation side
    /// can tell a verdict on its latest request from a redelivered older one.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if encoding fails.
    pub fn to_serialized_answering(
        &self,
        causation_id: Option<Uuid>,
    ) -> Result<SerializedEvent, EventError> {
        let mut metadata = serde_json::json!({ AGGREGATE_ID_KEY: self.reservation_id().to_string() });
        if let Some(causation_id) = causation_id {
            metadata[CAUSATION_ID_KEY] = serde_json::Value::String(causation_id.to_string());
        }
        SerializedEvent::from_payload(self.kind().as_str(), &self.payload()?, Some(metadata))
    }

    /// Decode a wire envelope.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::UnknownEventType`] for an unrecognised `event_type`, or
    /// [`EventError::DeserializationError`] when the payload does not match it.
    pub fn from_serialized(event: &SerializedEvent) -> Result<Self, EventError> {
        let kind: EventKind = event
            .event_type
            .parse()
            .map_err(|_| EventError::UnknownEventType(event.event_type.clone()))?;
        Self::from_payload(kind, event.decode()?)
    }
}

/// A decoded saga event with the ids its envelope carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Received {
    /// The event itself
    pub event: SagaEvent,
    /// Outbox record the event was published from, when the producer used one
    pub event_id: Option<Uuid>,
    /// Event this one answers, for verdicts
    pub causation_id: Option<Uuid>,
}

impl Received {
    /// Decode a wire envelope together with its ids.
    ///
    /// # Errors
    ///
    /// Same as [`SagaEvent::from_serialized`].
    pub fn from_serialized(envelope: &SerializedEvent) -> Result<Self, EventError> {
        Ok(Self {
            event: SagaEvent::from_serialized(envelope)?,
            event_id: envelope.metadata_uuid(EVENT_ID_KEY),
            causation_id: envelope.metadata_uuid(CAUSATION_ID_KEY),
        })
    }
}

impl From<SagaEvent> for Received {
    fn from(event: SagaEvent) -> Self {
        Self {
            event,
            event_id: None,
            causation_id: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 2, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn date_payload_uses_agreed_field_names() {
        let id = ReservationId::new();
        let event = SagaEvent::created(id, at(4), at(7));
        let payload = event.payload().unwrap();

        assert_eq!(payload["reservationId"], id.to_string());
        assert_eq!(payload["arrivalDate"], "2022-02-04T00:00:00Z");
        assert_eq!(payload["departureDate"], "2022-02-07T00:00:00Z");
    }

    #[test]
    fn envelope_carries_kind_and_aggregate() {
        let id = ReservationId::new();
        let serialized = SagaEvent::rollback(id).to_serialized().unwrap();

        assert_eq!(serialized.event_type, "RESERVATION_ROLLBACK");
        assert_eq!(serialized.aggregate_id(), Some(id.to_string().as_str()));
        assert_eq!(
            SagaEvent::from_serialized(&serialized).unwrap(),
            SagaEvent::rollback(id)
        );
    }

    #[test]
    fn verdict_names_the_selection_it_answers() {
        let id = ReservationId::new();
        let selection = Uuid::new_v4();

        let envelope = SagaEvent::reserved(id)
            .to_serialized_answering(Some(selection))
            .unwrap();
        let received = Received::from_serialized(&envelope).unwrap();

        assert_eq!(received.event, SagaEvent::reserved(id));
        assert_eq!(received.causation_id, Some(selection));
        assert_eq!(received.event_id, None);
        assert_eq!(
            Received::from_serialized(&SagaEvent::reserved(id).to_serialized().unwrap())
                .unwrap()
                .causation_id,
            None
        );
    }

    #[test]
    fn decodes_payload_written_by_another_producer() {
        let raw = br#"{"reservationId":"6f1c1e1a-3a43-4c43-9a7e-0d1d7b0c2f11","arrivalDate":"2022-02-05T00:00:00Z","departureDate":"2022-02-06T00:00:00Z"}"#;
        let envelope = SerializedEvent::new("RESERVATION_MODIFIED".into(), raw.to_vec(), None);

        let SagaEvent::ReservationModified(dates) = SagaEvent::from_serialized(&envelope).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(dates.arrival_date, at(5));
        assert_eq!(dates.departure_date, at(6));
    }

    #[test]
    fn unknown_type_and_mismatched_payload_are_errors() {
        let envelope = SerializedEvent::new("RESERVATION_DELETED".into(), b"{}".to_vec(), None);
        assert!(matches!(
            SagaEvent::from_serialized(&envelope),
            Err(EventError::UnknownEventType(_))
        ));

        let envelope = SerializedEvent::new("RESERVATION_CREATED".into(), br#"{"reservationId":"x"}"#.to_vec(), None);
        assert!(matches!(
            SagaEvent::from_serialized(&envelope),
            Err(EventError::DeserializationError(_))
        ));
    }
}
