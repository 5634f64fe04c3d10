#![expect(
    clippy::module_name_repetitions,
    reason = "Re-exported names intentionally match their modules for API clarity"
)]

//! LISTEN.moe now-playing client.
//!
//! Builds on a [`crate::ws::Session`]: track broadcasts are cached, turned into
//! [`Event::TrackUpdated`] / [`Event::DataUpdated`] events and can be requested on demand with
//! [`Client::fetch_track`].
//!
//! # Example
//!
//! ```rust, no_run
//! use listenmoe_client_sdk::gateway::{Client, Event};
//! use listenmoe_client_sdk::ws::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::new(Config::builder().token("jwt".to_owned()).build())?;
//!     let mut events = client.subscribe();
//!     client.connect()?;
//!
//!     while let Ok(event) = events.recv().await {
//!         if let Event::TrackUpdated(track) = event {
//!             println!("Now playing: {:?}", track.song_id());
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
mod consumer;
pub mod event;
pub mod types;

pub use client::Client;
pub use event::Event;
pub use types::{
    Credit, NowPlaying, RadioEvent, Requester, Song, TRACK_UPDATE, TRACK_UPDATE_REQUEST,
    TrackRecord,
};
