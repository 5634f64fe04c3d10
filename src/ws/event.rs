use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::protocol::{CloseCode, Packet};
use crate::error::Error;

/// Direction of a frame reported by [`SessionEvent::Raw`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Direction {
    In,
    Out,
}

/// Why a session closed.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: CloseCode,
    pub reason: String,
}

impl CloseEvent {
    #[must_use]
    pub fn new<S: Into<String>>(code: CloseCode, reason: S) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// Everything a [`Session`](super::Session) publishes, in the order it happened.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The transport opened and the identify packet was sent
    Open,
    /// The handshake completed; carries the server's identify packet
    Ready(Packet),
    /// Application payload ([`OpCode::MessageIn`](super::protocol::OpCode::MessageIn))
    Message(Packet),
    /// Transport or protocol failure, always followed by a [`SessionEvent::Close`]
    Error(Arc<Error>),
    /// The session closed
    Close(CloseEvent),
    /// A heartbeat is about to be sent
    Heartbeat,
    /// A heartbeat was acknowledged
    HeartbeatAck {
        /// Round-trip time of the acknowledged heartbeat
        latency: Duration,
    },
    /// Every decoded inbound frame and every outbound frame
    Raw {
        direction: Direction,
        frame: Value,
    },
}
