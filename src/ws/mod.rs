//! Gateway session infrastructure.
//!
//! This module owns the connection-level concerns of the LISTEN.moe gateway: the identify
//! handshake, heartbeats and their acknowledgment timeouts, latency sampling and automatic
//! reconnection. It knows nothing about tracks; [`crate::gateway`] builds on top of it.
//!
//! # Architecture
//!
//! - [`Session`]: cloneable handle to a background task that owns the connection and all timers
//! - [`Transport`]: factory for connections, [`TungsteniteTransport`] by default
//! - [`SessionEvent`]: everything the session reports, published on a broadcast channel
//!
//! # Example
//!
//! ```rust, no_run
//! use listenmoe_client_sdk::ws::config::{Config, ProtocolRevision};
//! use listenmoe_client_sdk::ws::Session;
//!
//! # async fn run() -> listenmoe_client_sdk::Result<()> {
//! let config = Config::builder().protocol(ProtocolRevision::Legacy).build();
//! let session = Session::new(config)?;
//! session.connect()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod latency;
pub mod protocol;
pub mod session;
pub mod transport;

pub use event::{CloseEvent, Direction, SessionEvent};
pub use session::{ConnectionState, Session};
pub use transport::{Connection, Inbound, Outbound, Transport, TungsteniteTransport};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
