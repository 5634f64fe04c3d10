//! Transport seam between the session state machine and the socket.
//!
//! A [`Session`](super::Session) never opens sockets itself: it asks its [`Transport`] for a new
//! [`Connection`] on every connect and drops the old one. [`TungsteniteTransport`] is the
//! production implementation; tests substitute in-memory transports.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, SinkExt as _, Stream, StreamExt as _, future};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

use crate::Result;
use crate::error::Error;

pub type FrameSink = Pin<Box<dyn Sink<Outbound, Error = Error> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Inbound>> + Send>>;

/// Frame delivered by the transport.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Text payload (binary payloads are decoded lossily as UTF-8)
    Text(String),
    /// The peer started the closing handshake
    Close {
        /// Status code, if the peer sent one
        code: Option<u16>,
        /// Close reason, possibly empty
        reason: String,
    },
}

/// Frame handed to the transport.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// An open connection: a sink for outbound frames and a stream of inbound frames.
///
/// The stream ending is treated as a close by the peer without status.
#[non_exhaustive]
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Connection {
    #[must_use]
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// Factory for gateway connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a new connection to `endpoint`.
    async fn connect(&self, endpoint: &str) -> Result<Connection>;
}

/// [`Transport`] backed by `tokio-tungstenite`, with TLS through rustls and native roots.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn connect(&self, endpoint: &str) -> Result<Connection> {
        let (ws_stream, _) = connect_async(endpoint).await?;
        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(Error::from)
            .with(|frame: Outbound| future::ready(Ok::<_, Error>(into_message(frame))));
        let stream = read.filter_map(|message| future::ready(from_message(message)));

        Ok(Connection::new(Box::pin(sink), Box::pin(stream)))
    }
}

fn into_message(frame: Outbound) -> Message {
    match frame {
        Outbound::Text(text) => Message::Text(text.into()),
        Outbound::Close { code, reason } => Message::Close(Some(CloseFrame {
            code: code.into(),
            reason: reason.into(),
        })),
    }
}

fn from_message(
    message: std::result::Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<Inbound>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(Inbound::Text(text.as_str().to_owned()))),
        Ok(Message::Binary(bytes)) => Some(Ok(Inbound::Text(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))),
        Ok(Message::Close(frame)) => Some(Ok(match frame {
            Some(frame) => Inbound::Close {
                code: Some(frame.code.into()),
                reason: frame.reason.as_str().to_owned(),
            },
            None => Inbound::Close {
                code: None,
                reason: String::new(),
            },
        })),
        // Ping/pong are answered by tungstenite itself
        Ok(_) => None,
        Err(e) => Some(Err(e.into())),
    }
}
