//! Event kinds and the channels they travel on.
//!
//! The mapping from event kind to channel name is an explicit value built at startup
//! and handed to every publisher and consumer. There is no global registry.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Every event kind exchanged by the saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// A reservation was created and needs an availability verdict.
    ReservationCreated,
    /// A confirmed reservation changed its dates.
    ReservationModified,
    /// A reservation was cancelled and its occupancy must be released.
    ReservationCancelled,
    /// Availability accepted the dates.
    CampsiteReserved,
    /// Availability refused the dates.
    ReservationRollback,
}

impl EventKind {
    /// All kinds, in a stable order.
    pub const ALL: [Self; 5] = [
        Self::ReservationCreated,
        Self::ReservationModified,
        Self::ReservationCancelled,
        Self::CampsiteReserved,
        Self::ReservationRollback,
    ];

    /// Wire name stored in `SerializedEvent::event_type`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReservationCreated => "RESERVATION_CREATED",
            Self::ReservationModified => "RESERVATION_MODIFIED",
            Self::ReservationCancelled => "RESERVATION_CANCELLED",
            Self::CampsiteReserved => "CAMPSITE_RESERVED",
            Self::ReservationRollback => "RESERVATION_ROLLBACK",
        }
    }

    /// Conventional `event.<aggregate>.<verb>` channel name.
    #[must_use]
    pub const fn default_channel(self) -> &'static str {
        match self {
            Self::ReservationCreated => "event.reservation.created",
            Self::ReservationModified => "event.reservation.modified",
            Self::ReservationCancelled => "event.reservation.cancelled",
            Self::CampsiteReserved => "event.campsite.reserved",
            Self::ReservationRollback => "event.reservation.rollback",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known event kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

/// Event kind → channel name mapping.
///
/// # Examples
///
/// ```
/// use campsite_core::channels::{ChannelConfig, EventKind};
///
/// let channels = ChannelConfig::default().with_channel(EventKind::CampsiteReserved, "test.reserved");
/// assert_eq!(channels.channel(EventKind::CampsiteReserved), "test.reserved");
/// assert_eq!(channels.channel(EventKind::ReservationCreated), "event.reservation.created");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    reservation_created: String,
    reservation_modified: String,
    reservation_cancelled: String,
    campsite_reserved: String,
    reservation_rollback: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reservation_created: EventKind::ReservationCreated.default_channel().to_string(),
            reservation_modified: EventKind::ReservationModified.default_channel().to_string(),
            reservation_cancelled: EventKind::ReservationCancelled.default_channel().to_string(),
            campsite_reserved: EventKind::CampsiteReserved.default_channel().to_string(),
            reservation_rollback: EventKind::ReservationRollback.default_channel().to_string(),
        }
    }
}

impl ChannelConfig {
    /// Override the channel used for `kind`.
    #[must_use]
    pub fn with_channel(mut self, kind: EventKind, channel: impl Into<String>) -> Self {
        *self.slot_mut(kind) = channel.into();
        self
    }

    /// Channel that carries `kind`.
    #[must_use]
    pub fn channel(&self, kind: EventKind) -> &str {
        match kind {
            EventKind::ReservationCreated => &self.reservation_created,
            EventKind::ReservationModified => &self.reservation_modified,
            EventKind::ReservationCancelled => &self.reservation_cancelled,
            EventKind::CampsiteReserved => &self.campsite_reserved,
            EventKind::ReservationRollback => &self.reservation_rollback,
        }
    }

    /// Channels carrying any of `kinds`, deduplicated, in the given order.
    #[must_use]
    pub fn channels_for(&self, kinds: &[EventKind]) -> Vec<&str> {
        let mut channels: Vec<&str> = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let channel = self.channel(*kind);
            if !channels.contains(&channel) {
                channels.push(channel);
            }
        }
        channels
    }

    const fn slot_mut(&mut self, kind: EventKind) -> &mut String {
        match kind {
            EventKind::ReservationCreated => &mut self.reservation_created,
            EventKind::ReservationModified => &mut self.reservation_modified,
            EventKind::ReservationCancelled => &mut self.reservation_cancelled,
            EventKind::CampsiteReserved => &mut self.campsite_reserved,
            EventKind::ReservationRollback => &mut self.reservation_rollback,
        }
    }
}
