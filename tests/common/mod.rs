#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests, and https://github.com/rust-lang/rust-clippy/issues/13981"
)]
#![allow(
    unused,
    reason = "Each test binary only uses part of the shared helpers"
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc as frames;
use futures::{FutureExt as _, SinkExt as _, StreamExt as _};
use listenmoe_client_sdk::Result;
use listenmoe_client_sdk::error::{Error, Kind};
use listenmoe_client_sdk::ws::{
    CloseEvent, Connection, ConnectionState, Inbound, Outbound, SessionEvent, Transport, WsError,
};
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::timeout;

/// Upper bound for anything a test waits on. Generous because paused clocks jump to timers.
pub const WAIT: Duration = Duration::from_secs(120);

/// In-memory transport handing the server half of every connection to the test.
pub struct MockTransport {
    accepted_tx: mpsc::UnboundedSender<ServerSide>,
    attempts: AtomicUsize,
    refuse: AtomicBool,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> (Arc<Self>, Listener) {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            accepted_tx,
            attempts: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
        });

        (transport, Listener { accepted_rx })
    }

    /// Number of connection attempts so far, refused ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Make every following attempt fail (or succeed again).
    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, endpoint: &str) -> Result<Connection> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(WsError::ConnectionClosed.into());
        }

        let (to_client, client_rx) = frames::unbounded::<Result<Inbound>>();
        let (client_tx, from_client) = frames::unbounded::<Outbound>();

        let sink = client_tx.sink_map_err(|e| Error::with_source(Kind::Internal, e));
        _ = self.accepted_tx.send(ServerSide {
            endpoint: endpoint.to_owned(),
            to_client,
            from_client,
        });

        Ok(Connection::new(Box::pin(sink), Box::pin(client_rx)))
    }
}

/// Receives the server half of each accepted connection.
pub struct Listener {
    accepted_rx: mpsc::UnboundedReceiver<ServerSide>,
}

impl Listener {
    pub async fn accept(&mut self) -> ServerSide {
        timeout(WAIT, self.accepted_rx.recv())
            .await
            .expect("no connection was opened")
            .expect("transport dropped")
    }

    pub fn try_accept(&mut self) -> Option<ServerSide> {
        self.accepted_rx.try_recv().ok()
    }
}

/// Server half of one in-memory connection.
pub struct ServerSide {
    pub endpoint: String,
    to_client: frames::UnboundedSender<Result<Inbound>>,
    from_client: frames::UnboundedReceiver<Outbound>,
}

impl ServerSide {
    pub fn send_json(&self, value: &Value) {
        self.send_text(&value.to_string());
    }

    pub fn send_text(&self, text: &str) {
        _ = self.to_client.unbounded_send(Ok(Inbound::Text(text.to_owned())));
    }

    pub fn close(&self, code: Option<u16>, reason: &str) {
        _ = self.to_client.unbounded_send(Ok(Inbound::Close {
            code,
            reason: reason.to_owned(),
        }));
    }

    pub fn fail(&self, error: Error) {
        _ = self.to_client.unbounded_send(Err(error));
    }

    pub async fn recv(&mut self) -> Outbound {
        timeout(WAIT, self.from_client.next())
            .await
            .expect("client sent nothing")
            .expect("client dropped the connection")
    }

    pub async fn recv_json(&mut self) -> Value {
        match self.recv().await {
            Outbound::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    pub async fn recv_close(&mut self) -> (u16, String) {
        loop {
            match self.recv().await {
                Outbound::Close { code, reason } => return (code, reason),
                Outbound::Text(_) => {}
                other => panic!("unexpected frame {other:?}"),
            }
        }
    }

    /// Frame already sent by the client, without waiting.
    pub fn try_recv(&mut self) -> Option<Outbound> {
        self.from_client.next().now_or_never().flatten()
    }

    /// Answer the identify packet with `heartbeat_ms` and swallow the immediate heartbeat.
    pub async fn handshake(&mut self, heartbeat_ms: u64) {
        assert_eq!(self.recv_json().await["op"], 0);
        self.send_json(&json!({ "op": 0, "d": { "heartbeat": heartbeat_ms } }));
        assert_eq!(self.recv_json().await, json!({ "op": 9 }));
    }

    pub fn ack(&self) {
        self.send_json(&json!({ "op": 10 }));
    }

    pub fn track(&self, event_type: &str, song_id: &str) {
        self.send_json(&track_packet(event_type, song_id));
    }
}

#[must_use]
pub fn track_packet(event_type: &str, song_id: &str) -> Value {
    json!({
        "op": 1,
        "t": event_type,
        "d": {
            "song": { "id": song_id, "title": format!("Song {song_id}") },
            "listeners": 100
        }
    })
}

/// Next event matching `pick`, skipping everything else.
pub async fn next_matching<E: Clone, T>(
    rx: &mut broadcast::Receiver<E>,
    mut pick: impl FnMut(E) -> Option<T>,
) -> T {
    timeout(WAIT, async {
        loop {
            if let Some(found) = pick(rx.recv().await.unwrap()) {
                return found;
            }
        }
    })
    .await
    .expect("expected event never arrived")
}

pub async fn next_close(rx: &mut broadcast::Receiver<SessionEvent>) -> CloseEvent {
    next_matching(rx, |event| match event {
        SessionEvent::Close(close) => Some(close),
        _ => None,
    })
    .await
}

pub async fn wait_for_state(rx: &mut watch::Receiver<ConnectionState>, state: ConnectionState) {
    timeout(WAIT, rx.wait_for(|current| *current == state))
        .await
        .expect("state never reached")
        .unwrap();
}

/// Events already published, without waiting.
pub fn drain<E: Clone>(rx: &mut broadcast::Receiver<E>) -> Vec<E> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

pub fn close_code(close: &CloseEvent) -> u16 {
    close.code.into()
}
