use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::serde_helpers::LenientId;

/// Typed view of a track broadcast.
///
/// Every field except `song` is optional, since the gateway omits or nulls them freely.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct NowPlaying {
    /// Song currently on air
    pub song: Song,
    /// User who requested the song, if it was requested
    #[serde(default)]
    pub requester: Option<Requester>,
    /// Radio event running at the moment
    #[serde(default)]
    pub event: Option<RadioEvent>,
    /// When the song started playing
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Songs played before this one, most recent first
    #[serde(default)]
    #[builder(default)]
    pub last_played: Vec<Song>,
    /// Current listener count
    #[serde(default)]
    pub listeners: Option<u64>,
}

/// Song metadata.
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Builder)]
pub struct Song {
    #[serde_as(as = "LenientId")]
    #[builder(into)]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Length in seconds
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    #[builder(default)]
    pub artists: Vec<Credit>,
    #[serde(default)]
    #[builder(default)]
    pub albums: Vec<Credit>,
    #[serde(default)]
    #[builder(default)]
    pub sources: Vec<Credit>,
    #[serde(default)]
    #[builder(default)]
    pub characters: Vec<Credit>,
}

/// Artist, album, source or character credited on a [`Song`].
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct Credit {
    #[serde_as(as = "LenientId")]
    #[builder(into)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_romaji: Option<String>,
    /// Image file name on the LISTEN.moe CDN
    #[serde(default)]
    pub image: Option<String>,
}

impl Credit {
    /// Romanized name when there is one, otherwise the plain name.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.name_romaji.as_deref().or(self.name.as_deref())
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct Requester {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Special programming on the radio.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Builder)]
pub struct RadioEvent {
    #[builder(into)]
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;
    use serde_json::json;

    use super::*;
    use crate::gateway::types::TrackRecord;

    #[test]
    fn decode_full_broadcast() {
        let record = TrackRecord::new(json!({
            "song": {
                "id": 4133,
                "title": "Snow halation",
                "duration": 258,
                "artists": [{ "id": 12, "name": "μ's", "nameRomaji": "Muse", "image": "muse.jpg" }],
                "albums": [],
                "sources": [{ "id": "88", "name": "ラブライブ!" }]
            },
            "requester": { "uuid": "u-1", "username": "kanade", "displayName": "Kanade" },
            "event": null,
            "startTime": "2024-03-01T12:00:00.000Z",
            "lastPlayed": [{ "id": 1, "title": "Previous" }],
            "listeners": 311
        }));

        let now_playing = record.now_playing().unwrap();

        assert_eq!(now_playing.song.id, "4133");
        assert_eq!(now_playing.song.title.as_deref(), Some("Snow halation"));
        assert_eq!(now_playing.song.duration, Some(258));
        assert_eq!(now_playing.song.artists[0].display_name(), Some("Muse"));
        assert_eq!(now_playing.song.sources[0].id, "88");
        assert_eq!(
            now_playing.requester.and_then(|r| r.display_name).as_deref(),
            Some("Kanade")
        );
        assert_eq!(now_playing.event, None);
        assert_eq!(
            now_playing.start_time,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(now_playing.last_played[0].id, "1");
        assert_eq!(now_playing.listeners, Some(311));
    }

    #[test]
    fn minimal_broadcast_uses_defaults() {
        let now_playing = TrackRecord::new(json!({ "song": { "id": "A" } }))
            .now_playing()
            .unwrap();

        assert_eq!(now_playing.song, Song::builder().id("A").build());
        assert!(now_playing.last_played.is_empty());
        assert_eq!(now_playing.start_time, None);
    }

    #[test]
    fn unexpected_shape_yields_none() {
        assert!(TrackRecord::new(json!({ "listeners": 3 })).now_playing().is_none());
        assert!(
            TrackRecord::new(json!({ "song": { "id": 1 }, "startTime": "yesterday" }))
                .now_playing()
                .is_none()
        );
    }

    #[test]
    fn credit_display_name_falls_back_to_name() {
        let credit = Credit::builder()
            .id("3")
            .name("ClariS".to_owned())
            .build();

        assert_eq!(credit.display_name(), Some("ClariS"));
    }
}
