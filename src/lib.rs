#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod error;
pub mod gateway;
pub(crate) mod serde_helpers;
pub mod ws;

pub use error::Error;
pub use gateway::{Client, Event, TrackRecord};
pub use ws::config::{Config, DEFAULT_GATEWAY, ProtocolRevision};

pub type Result<T> = std::result::Result<T, Error>;
