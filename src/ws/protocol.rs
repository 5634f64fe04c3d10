//! Gateway wire format: packets, operation codes and close codes.

use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret as _, SecretString};
use serde::de::value::{Error as ValueError, U64Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use serde_repr::{Deserialize_repr, Serialize_repr};

use super::error::WsError;
use crate::serde_helpers::{deserialize_lenient_code, integer_from_value};

/// Close status used when the peer closed without sending one.
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// Gateway operation codes. [`OpCode::Identify`] travels in both directions.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum OpCode {
    /// Client identify, answered by the server with the heartbeat cadence
    Identify = 0,
    /// Application payload from the server
    MessageIn = 1,
    /// Application request from the client
    MessageOut = 2,
    /// Client liveness ping
    Heartbeat = 9,
    /// Server acknowledgment of a heartbeat
    HeartbeatAck = 10,
}

impl OpCode {
    /// The known operation code numbered `code`, if any.
    #[must_use]
    pub fn from_code(code: u64) -> Option<Self> {
        Self::deserialize(U64Deserializer::<ValueError>::new(code)).ok()
    }

    #[must_use]
    pub const fn code(self) -> u64 {
        self as u64
    }
}

/// One JSON frame exchanged with the gateway.
///
/// # Security
///
/// The identify packet carries the auth token in plaintext. It is only ever sent over the
/// session's own connection, but it also shows up in outbound
/// [`SessionEvent::Raw`](super::event::SessionEvent::Raw) events.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Raw operation code, kept numeric so unknown codes survive decoding. Integral floats
    /// (`10.0`) are accepted, anything else decodes as `None`.
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_code",
        skip_serializing_if = "Option::is_none"
    )]
    pub op: Option<u64>,
    /// Application event type (`TRACK_UPDATE`, ...) on [`OpCode::MessageIn`] packets
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Packet body
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Packet {
    #[must_use]
    pub fn new(op: OpCode) -> Self {
        Self {
            op: Some(op.code()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_event_type<S: Into<String>>(mut self, event_type: S) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// `{"op":0,"d":{"auth":"Bearer <token>"}}`, with an empty `auth` when there is no token.
    #[must_use]
    pub fn identify(token: Option<&SecretString>) -> Self {
        let auth = token.map_or_else(String::new, |token| {
            format!("Bearer {}", token.expose_secret())
        });
        Self::new(OpCode::Identify).with_data(json!({ "auth": auth }))
    }

    /// `{"op":9}`
    #[must_use]
    pub fn heartbeat() -> Self {
        Self::new(OpCode::Heartbeat)
    }

    /// `{"op":2}`, answered with a `TRACK_UPDATE_REQUEST` packet.
    #[must_use]
    pub fn request_track() -> Self {
        Self::new(OpCode::MessageOut)
    }

    /// The known operation code of this packet, if any.
    #[must_use]
    pub fn opcode(&self) -> Option<OpCode> {
        self.op.and_then(OpCode::from_code)
    }

    /// Heartbeat cadence announced by an identify acknowledgment (`d.heartbeat`, milliseconds).
    ///
    /// Accepts numbers and numeric strings, dropping any fraction (`1500.7` is 1500 ms).
    /// Missing, zero, negative or otherwise malformed values yield `None`.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        let millis = integer_from_value(self.data.as_ref()?.get("heartbeat")?)?;

        (millis > 0).then_some(Duration::from_millis(millis))
    }
}

/// Decode one inbound text frame into JSON.
pub fn decode_frame(text: &str) -> Result<Value, WsError> {
    serde_json::from_str(text).map_err(WsError::MessageParse)
}

/// Reason a session closed.
///
/// Codes in the 3000 range are raised by this client, codes in the 4000 range by the gateway.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// 3001: closed by [`Session::disconnect`](super::Session::disconnect)
    Disconnect,
    /// 3002: transport or handshake error
    Error,
    /// 3003: the identify acknowledgment did not arrive in time
    ReadyTimeout,
    /// 3004: a heartbeat was not acknowledged in time
    Timeout,
    /// 4001: the gateway did not receive a heartbeat in time
    HeartbeatMissed,
    /// 4002: the gateway received an unknown operation code
    InvalidOpcode,
    /// 4003: the gateway rejected the auth token
    InvalidAuth,
    /// 4004: identify was sent twice
    AlreadyAuthed,
    /// 4005: a packet that requires `d` arrived without one
    PacketNeedsBody,
    /// Any other status code
    Other(u16),
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            3001 => Self::Disconnect,
            3002 => Self::Error,
            3003 => Self::ReadyTimeout,
            3004 => Self::Timeout,
            4001 => Self::HeartbeatMissed,
            4002 => Self::InvalidOpcode,
            4003 => Self::InvalidAuth,
            4004 => Self::AlreadyAuthed,
            4005 => Self::PacketNeedsBody,
            other => Self::Other(other),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        match code {
            CloseCode::Disconnect => 3001,
            CloseCode::Error => 3002,
            CloseCode::ReadyTimeout => 3003,
            CloseCode::Timeout => 3004,
            CloseCode::HeartbeatMissed => 4001,
            CloseCode::InvalidOpcode => 4002,
            CloseCode::InvalidAuth => 4003,
            CloseCode::AlreadyAuthed => 4004,
            CloseCode::PacketNeedsBody => 4005,
            CloseCode::Other(other) => other,
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(code) => write!(f, "{code}"),
            named => write!(f, "{named:?} ({})", u16::from(*named)),
        }
    }
}
