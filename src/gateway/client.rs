use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::time::timeout;

use super::consumer::Consumer;
use super::event::Event;
use super::types::TrackRecord;
use crate::Result;
use crate::error::Error;
use crate::ws::config::Config;
use crate::ws::protocol::Packet;
use crate::ws::{ConnectionState, Session, Transport, WsError};

/// Broadcast channel capacity for client events.
const BROADCAST_CAPACITY: usize = 1024;

/// LISTEN.moe gateway client.
///
/// Wraps a [`Session`] and keeps track of what is playing. Every session event is re-published as
/// [`Event::Session`]; track broadcasts additionally produce [`Event::DataUpdated`],
/// [`Event::TrackUpdated`] and, for answers to [`Client::fetch_track`],
/// [`Event::TrackUpdateResponse`].
///
/// # Examples
///
/// ```rust, no_run
/// use futures::StreamExt as _;
/// use listenmoe_client_sdk::gateway::Client;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let client = Client::default();
///     client.connect()?;
///
///     let mut tracks = Box::pin(client.track_updates());
///     while let Some(track) = tracks.next().await {
///         let track = track?;
///         if let Some(now_playing) = track.now_playing() {
///             println!("{:?}", now_playing.song.title);
///         }
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(Config::default())
            .expect("Gateway client with default configuration should succeed")
    }
}

struct ClientInner {
    /// Configuration the session was created with
    config: Config,
    /// Underlying gateway session
    session: Session,
    /// Last track broadcast, written by the consumer task only
    current_rx: watch::Receiver<Option<TrackRecord>>,
    /// Broadcast sender for client events
    event_tx: broadcast::Sender<Event>,
}

impl Client {
    /// Create a client for `config.endpoint`. Nothing is opened until [`Client::connect`].
    pub fn new(config: Config) -> Result<Self> {
        let session = Session::new(config.clone())?;
        Ok(Self::from_session(config, session))
    }

    /// Create a client whose session opens connections through `transport`.
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        let session = Session::with_transport(config.clone(), transport)?;
        Ok(Self::from_session(config, session))
    }

    fn from_session(config: Config, session: Session) -> Self {
        let (current_tx, current_rx) = watch::channel(None);
        let (event_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

        // Subscribed before any connect so no packet is missed
        Consumer::new(
            config.protocol,
            session.subscribe(),
            current_tx,
            event_tx.clone(),
        )
        .spawn();

        Self {
            inner: Arc::new(ClientInner {
                config,
                session,
                current_rx,
                event_tx,
            }),
        }
    }

    /// Connect to the gateway. Reconnection is handled automatically afterwards.
    pub fn connect(&self) -> Result<()> {
        self.inner.session.connect()
    }

    /// Disconnect from the gateway and stop reconnecting.
    pub fn disconnect(&self) -> Result<()> {
        self.inner.session.disconnect()
    }

    /// Use `endpoint` from the next connection on.
    pub fn set_gateway(&self, endpoint: &str) -> Result<()> {
        self.inner.session.set_endpoint(endpoint)
    }

    /// Mean heartbeat round-trip time over the last five heartbeats.
    #[must_use]
    pub fn ping(&self) -> Option<Duration> {
        self.inner.session.ping()
    }

    /// Last five heartbeat round-trip times, newest first.
    #[must_use]
    pub fn latency_data(&self) -> Vec<Duration> {
        self.inner.session.latency_data()
    }

    /// Last track broadcast received, kept across reconnects.
    #[must_use]
    pub fn current_track(&self) -> Option<TrackRecord> {
        self.inner.current_rx.borrow().clone()
    }

    /// Ask the gateway for the current track and wait for the answer.
    ///
    /// # Errors
    ///
    /// - [`Kind::Validation`](crate::error::Kind::Validation) under
    ///   [`ProtocolRevision::Legacy`](crate::ws::config::ProtocolRevision::Legacy), which has no
    ///   track requests
    /// - [`WsError::ConnectionClosed`] when the client is not connected
    /// - [`WsError::Timeout`] when no answer arrives within
    ///   [`Config::fetch_timeout`]
    ///
    /// Concurrent calls all resolve with the first answer.
    pub async fn fetch_track(&self) -> Result<TrackRecord> {
        if !self.inner.config.protocol.supports_track_requests() {
            return Err(Error::validation(format!(
                "track requests are not supported by the {} gateway protocol",
                self.inner.config.protocol
            )));
        }

        let mut events = self.inner.event_tx.subscribe();
        self.inner.session.send(Packet::request_track())?;

        let response = async move {
            loop {
                match events.recv().await {
                    Ok(Event::TrackUpdateResponse(record)) => return Ok::<_, Error>(record),
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Track request lagged, missed {n} events");
                        #[cfg(not(feature = "tracing"))]
                        let _ = n;
                    }
                    Err(RecvError::Closed) => return Err(WsError::ConnectionClosed.into()),
                }
            }
        };

        timeout(self.inner.config.fetch_timeout, response)
            .await
            .map_err(|_elapsed| WsError::Timeout)?
    }

    /// Stream of song changes.
    ///
    /// Yields [`WsError::Lagged`] and ends when the consumer falls too far behind.
    pub fn track_updates(&self) -> impl Stream<Item = Result<TrackRecord>> {
        let mut rx = self.inner.event_tx.subscribe();

        try_stream! {
            loop {
                match rx.recv().await {
                    Ok(Event::TrackUpdated(record)) => yield record,
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Track update stream lagged, missed {n} events");
                        Err(WsError::Lagged { count: n })?;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    /// Subscribe to every client event.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.event_tx.subscribe()
    }

    /// Get the current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.session.state()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.inner.session.state_receiver()
    }

    /// Configuration the client was created with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}
