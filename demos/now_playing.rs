//! Prints every song change announced by the LISTEN.moe gateway.
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info,listenmoe_client_sdk=debug cargo run --example now_playing --features tracing
//! ```
//!
//! Set `LISTENMOE_GATEWAY=wss://listen.moe/kpop/gateway_v2` to follow another station, and
//! `LISTENMOE_TOKEN` to identify as a user.

use futures::StreamExt as _;
use listenmoe_client_sdk::gateway::{Client, Event};
use listenmoe_client_sdk::ws::SessionEvent;
use listenmoe_client_sdk::{Config, DEFAULT_GATEWAY};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let endpoint =
        std::env::var("LISTENMOE_GATEWAY").unwrap_or_else(|_| DEFAULT_GATEWAY.to_owned());
    let config = Config::builder()
        .endpoint(endpoint)
        .maybe_token(std::env::var("LISTENMOE_TOKEN").ok())
        .build();

    let client = Client::new(config)?;
    let mut events = client.subscribe();
    client.connect()?;

    // Latency and close reasons
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::Session(SessionEvent::HeartbeatAck { latency }) => {
                    info!(latency_ms = latency.as_millis(), "heartbeat acknowledged");
                }
                Event::Session(SessionEvent::Close(close)) => {
                    warn!(code = %close.code, reason = %close.reason, "connection closed");
                }
                Event::Session(SessionEvent::Error(e)) => error!(error = %e),
                _ => {}
            }
        }
    });

    client
        .state_receiver()
        .wait_for(|state| state.is_ready())
        .await?;
    match client.fetch_track().await {
        Ok(current) => info!(song_id = ?current.song_id(), "currently playing"),
        Err(e) => warn!(error = %e, "could not fetch the current track"),
    }

    let mut tracks = Box::pin(client.track_updates());
    while let Some(track) = tracks.next().await {
        let track = track?;
        let Some(now_playing) = track.now_playing() else {
            info!(song_id = ?track.song_id(), "track changed");
            continue;
        };

        let artists: Vec<_> = now_playing
            .song
            .artists
            .iter()
            .filter_map(|artist| artist.display_name())
            .collect();
        info!(
            title = now_playing.song.title.as_deref().unwrap_or("unknown"),
            artists = %artists.join(", "),
            listeners = now_playing.listeners,
            ping_ms = client.ping().map(|ping| ping.as_millis()),
            "now playing"
        );
    }

    Ok(())
}
