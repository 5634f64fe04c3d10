use super::types::TrackRecord;
use crate::ws::SessionEvent;

/// Events published by a gateway [`Client`](super::Client).
///
/// Session events are forwarded untouched and in arrival order. Track events for one packet
/// follow the [`SessionEvent::Message`] that carried it, and the current track is already updated
/// when they are delivered.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum Event {
    /// Forwarded session event
    Session(SessionEvent),
    /// A different song started playing
    TrackUpdated(TrackRecord),
    /// Any track broadcast, including metadata refreshes of the current song
    DataUpdated(TrackRecord),
    /// Answer to a track request
    TrackUpdateResponse(TrackRecord),
}

impl Event {
    /// The track carried by this event, if it is a track event.
    #[must_use]
    pub fn track(&self) -> Option<&TrackRecord> {
        match self {
            Self::TrackUpdated(record)
            | Self::DataUpdated(record)
            | Self::TrackUpdateResponse(record) => Some(record),
            Self::Session(_) => None,
        }
    }
}

impl From<SessionEvent> for Event {
    fn from(event: SessionEvent) -> Self {
        Self::Session(event)
    }
}
