#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the gateway
    Connection(tokio_tungstenite::tungstenite::Error),
    /// Error parsing a gateway frame
    MessageParse(serde_json::Error),
    /// The server answered the identify handshake with an unusable packet
    InvalidHandshake(String),
    /// The gateway connection is closed (or was never opened)
    ConnectionClosed,
    /// Operation timed out
    Timeout,
    /// Event stream lagged and missed events
    Lagged {
        /// Number of events that were missed
        count: u64,
    },
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::MessageParse(e) => write!(f, "Failed to parse gateway frame: {e}"),
            Self::InvalidHandshake(reason) => write!(f, "Invalid handshake: {reason}"),
            Self::ConnectionClosed => write!(f, "Gateway connection closed"),
            Self::Timeout => write!(f, "Gateway operation timed out"),
            Self::Lagged { count } => write!(f, "Event stream lagged, missed {count} events"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::MessageParse(e) => Some(e),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for crate::error::Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        crate::error::Error::with_source(crate::error::Kind::WebSocket, WsError::Connection(e))
    }
}
