#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::backoff::Backoff as _;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use bon::Builder;
use secrecy::SecretString;

/// Latest LISTEN.moe gateway, served for both protocol revisions.
pub const DEFAULT_GATEWAY: &str = "wss://listen.moe/gateway";

const DEFAULT_READY_TIMEOUT_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_HEARTBEAT_TIMEOUT_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_MIN_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_FETCH_TIMEOUT_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_RECONNECT_DELAY_DURATION: Duration = Duration::from_secs(5);
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Gateway protocol revision.
///
/// Both revisions share the wire format and close codes. [`ProtocolRevision::V4`] additionally
/// enforces a ready timeout during the handshake and supports on-demand track requests.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum_macros::Display)]
pub enum ProtocolRevision {
    /// Identify handshake without a ready timeout, `TRACK_UPDATE` packets only
    Legacy,
    /// Ready timeout on identify, `TRACK_UPDATE_REQUEST` responses and `fetch_track`
    #[default]
    V4,
}

impl ProtocolRevision {
    /// Whether the session closes when the server does not finish the handshake in time.
    #[must_use]
    pub const fn has_ready_timeout(self) -> bool {
        matches!(self, Self::V4)
    }

    /// Whether the gateway answers explicit track requests.
    #[must_use]
    pub const fn supports_track_requests(self) -> bool {
        matches!(self, Self::V4)
    }

    /// Whether a broadcast repeating the current song is reported as data only. Under
    /// [`ProtocolRevision::Legacy`] every `TRACK_UPDATE` counts as a track change.
    #[must_use]
    pub const fn dedupes_track_updates(self) -> bool {
        matches!(self, Self::V4)
    }
}

/// Configuration for gateway session behavior.
///
/// ```
/// use listenmoe_client_sdk::ws::config::{Config, ProtocolRevision};
///
/// let config = Config::builder()
///     .token("jwt".to_owned())
///     .protocol(ProtocolRevision::Legacy)
///     .build();
/// assert!(config.auto_reconnect);
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Builder)]
pub struct Config {
    /// Gateway URI
    #[builder(default = String::from(DEFAULT_GATEWAY), into)]
    pub endpoint: String,
    /// Token sent as `Bearer <token>` in the identify packet
    #[builder(into)]
    pub token: Option<SecretString>,
    /// Protocol revision spoken with the gateway
    #[builder(default)]
    pub protocol: ProtocolRevision,
    /// Whether the session reconnects after a close it did not request
    #[builder(default = true)]
    pub auto_reconnect: bool,
    /// Maximum time between transport open and the identify acknowledgment
    #[builder(default = DEFAULT_READY_TIMEOUT_DURATION)]
    pub ready_timeout: Duration,
    /// Maximum time to wait for a heartbeat acknowledgment before considering the connection dead
    #[builder(default = DEFAULT_HEARTBEAT_TIMEOUT_DURATION)]
    pub heartbeat_timeout: Duration,
    /// Lower bound applied to the heartbeat cadence announced by the server
    #[builder(default = DEFAULT_MIN_HEARTBEAT_INTERVAL_DURATION)]
    pub min_heartbeat_interval: Duration,
    /// Maximum time to wait for the answer to a track request
    #[builder(default = DEFAULT_FETCH_TIMEOUT_DURATION)]
    pub fetch_timeout: Duration,
    /// Reconnection strategy configuration
    #[builder(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Delay policy between reconnection attempts.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectStrategy {
    /// Same delay before every attempt
    Fixed(Duration),
    /// Exponentially growing, jittered delay
    Exponential {
        /// Delay before the first attempt
        initial: Duration,
        /// Upper bound for a single delay
        max: Duration,
        /// Growth factor between consecutive delays
        multiplier: f64,
    },
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive reconnection attempts before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
    /// Delay policy
    pub strategy: ReconnectStrategy,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY_DURATION)
    }
}

impl ReconnectConfig {
    /// Reconnect after the same `delay` every time, forever.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            strategy: ReconnectStrategy::Fixed(delay),
        }
    }

    /// Reconnect with exponential backoff starting at one second, capped at one minute.
    #[must_use]
    pub const fn exponential() -> Self {
        Self {
            max_attempts: None,
            strategy: ReconnectStrategy::Exponential {
                initial: DEFAULT_INITIAL_BACKOFF_DURATION,
                max: DEFAULT_MAX_BACKOFF_DURATION,
                multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            },
        }
    }

    /// Give up after `attempts` consecutive failed reconnection attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub(crate) fn schedule(&self) -> ReconnectSchedule {
        match &self.strategy {
            ReconnectStrategy::Fixed(delay) => ReconnectSchedule::Fixed(*delay),
            ReconnectStrategy::Exponential {
                initial,
                max,
                multiplier,
            } => ReconnectSchedule::Backoff(
                ExponentialBackoffBuilder::default()
                    .with_initial_interval(*initial)
                    .with_max_interval(*max)
                    .with_multiplier(*multiplier)
                    .with_max_elapsed_time(None) // We handle max attempts separately
                    .build(),
            ),
        }
    }
}

/// Running state of a [`ReconnectStrategy`].
#[derive(Debug)]
pub(crate) enum ReconnectSchedule {
    Fixed(Duration),
    Backoff(ExponentialBackoff),
}

impl ReconnectSchedule {
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        match self {
            Self::Fixed(delay) => Some(*delay),
            Self::Backoff(backoff) => backoff.next_backoff(),
        }
    }

    pub(crate) fn reset(&mut self) {
        if let Self::Backoff(backoff) = self {
            backoff.reset();
        }
    }
}
