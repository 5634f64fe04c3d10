pub mod now_playing;
pub mod track;

pub use now_playing::{Credit, NowPlaying, RadioEvent, Requester, Song};
pub use track::{TRACK_UPDATE, TRACK_UPDATE_REQUEST, TrackRecord};
