use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::now_playing::NowPlaying;
use crate::serde_helpers::deserialize_with_warnings;

/// `t` of a track broadcast pushed by the gateway.
pub const TRACK_UPDATE: &str = "TRACK_UPDATE";
/// `t` of the answer to a track request ([`Packet::request_track`](crate::ws::protocol::Packet::request_track)).
pub const TRACK_UPDATE_REQUEST: &str = "TRACK_UPDATE_REQUEST";

/// Last known "now playing" payload, exactly as the gateway sent it.
///
/// The record is opaque on purpose: [`TrackRecord::now_playing`] offers a typed view, but the raw
/// JSON is always what gets cached and re-emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackRecord(Value);

impl TrackRecord {
    #[must_use]
    pub fn new(data: Value) -> Self {
        Self(data)
    }

    #[must_use]
    pub fn data(&self) -> &Value {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> Value {
        self.0
    }

    /// `song.id` of the record, whether the gateway sent it as a number or a string.
    #[must_use]
    pub fn song_id(&self) -> Option<&Value> {
        self.0
            .get("song")?
            .get("id")
            .filter(|id| !id.is_null())
    }

    /// Whether `other` describes the same song as this record.
    ///
    /// Records without a song id never match anything, so an update lacking one always counts as
    /// a track change.
    #[must_use]
    pub fn is_same_track(&self, other: &TrackRecord) -> bool {
        match (self.song_id(), other.song_id()) {
            (Some(current), Some(next)) => current == next,
            _ => false,
        }
    }

    /// Typed view of the record, `None` when the payload does not have the expected shape.
    #[must_use]
    pub fn now_playing(&self) -> Option<NowPlaying> {
        deserialize_with_warnings(self.0.clone()).ok()
    }
}

impl From<Value> for TrackRecord {
    fn from(data: Value) -> Self {
        Self(data)
    }
}
