//! Client configuration.
//!
//! [`ClientConfig`] deserializes from camelCase JSON so a host can load it
//! from a file. Every field except `url` and `roomId` has a default.
//!
//! # Example
//!
//! ```ignore
//! let config: ClientConfig = serde_json::from_str(r#"{
//!     "url": "wss://broadcastlv.chat.example.com/sub",
//!     "roomId": 21452505,
//!     "keepAlive": { "enabled": true, "reconnectIntervalMs": 5000 }
//! }"#)?;
//! config.validate()?;
//! ```
//!
//! # Defaults
//!
//! | Key | Default |
//! |-----|---------|
//! | `userId` | `0` |
//! | `clientVersion` | crate version |
//! | `keepAlive.enabled` | `true` |
//! | `keepAlive.reconnectIntervalMs` | `5000` |
//! | `handshakeTimeoutMs` | `5000` |
//! | `heartbeatIntervalMs` | `30000` |
//! | `heartbeatDelayMs` | `1000` |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};
use crate::layer::DataTiming;
use crate::protocol::HandshakePayload;

// ============================================================================
// Constants
// ============================================================================

/// Default delay between losing a stack and rebuilding it.
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 5_000;

/// Default handshake timeout.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5_000;

/// Default heartbeat period.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Default delay before the first heartbeat.
pub const DEFAULT_HEARTBEAT_DELAY_MS: u64 = 1_000;

/// Path of the chat endpoint on a host.
pub const SOCKET_PATH: &str = "/sub";

// ============================================================================
// KeepAlive
// ============================================================================

/// Reconnect policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeepAlive {
    /// Rebuild the stack after it closes.
    pub enabled: bool,
    /// Fixed delay before rebuilding.
    pub reconnect_interval_ms: u64,
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self {
            enabled: true,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
        }
    }
}

impl KeepAlive {
    /// Policy that never reconnects.
    pub const DISABLED: Self = Self {
        enabled: false,
        reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
    };

    /// Returns the reconnect delay.
    #[inline]
    #[must_use]
    pub const fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

// ============================================================================
// ClientConfig
// ============================================================================

/// Everything a client needs to join one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: String,
    /// Room to join.
    pub room_id: u64,
    /// User id announced in the handshake, `0` for anonymous.
    #[serde(default)]
    pub user_id: u64,
    /// Client version announced in the handshake.
    #[serde(default = "default_client_version")]
    pub client_version: String,
    /// Reconnect policy.
    #[serde(default)]
    pub keep_alive: KeepAlive,
    /// Time allowed for the handshake ack.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Heartbeat period.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Delay before the first heartbeat.
    #[serde(default = "default_heartbeat_delay_ms")]
    pub heartbeat_delay_ms: u64,
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

const fn default_handshake_timeout_ms() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT_MS
}

const fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

const fn default_heartbeat_delay_ms() -> u64 {
    DEFAULT_HEARTBEAT_DELAY_MS
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientConfig {
    /// Creates a configuration with default timings.
    #[must_use]
    pub fn new(url: impl Into<String>, room_id: u64) -> Self {
        Self {
            url: url.into(),
            room_id,
            user_id: 0,
            client_version: default_client_version(),
            keep_alive: KeepAlive::default(),
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            heartbeat_delay_ms: DEFAULT_HEARTBEAT_DELAY_MS,
        }
    }

    /// Creates a configuration for `wss://<host>/sub`.
    #[must_use]
    pub fn for_host(host: &str, room_id: u64) -> Self {
        Self::new(format!("wss://{host}{SOCKET_PATH}"), room_id)
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl ClientConfig {
    /// Returns the handshake timeout.
    #[inline]
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Returns the heartbeat period.
    #[inline]
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Returns the delay before the first heartbeat.
    #[inline]
    #[must_use]
    pub const fn heartbeat_delay(&self) -> Duration {
        Duration::from_millis(self.heartbeat_delay_ms)
    }

    /// Returns the data layer timer settings.
    #[inline]
    #[must_use]
    pub const fn timing(&self) -> DataTiming {
        DataTiming {
            handshake_timeout: self.handshake_timeout(),
            heartbeat_interval: self.heartbeat_interval(),
            heartbeat_delay: self.heartbeat_delay(),
        }
    }

    /// Returns the handshake payload for this room.
    #[must_use]
    pub fn handshake(&self) -> HandshakePayload {
        HandshakePayload::new(self.room_id, self.user_id, self.client_version.clone())
    }

    /// Returns the handshake payload as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn handshake_value(&self) -> Result<Value> {
        self.handshake().to_value()
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientConfig {
    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if `url` does not parse
    /// - [`Error::Config`] if the scheme is not `ws`/`wss`, the room id is
    ///   zero, or a required duration is zero
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "Unsupported URL scheme '{}'. Expected ws:// or wss://",
                url.scheme()
            )));
        }

        if self.room_id == 0 {
            return Err(Error::config("Room id must be non-zero"));
        }

        if self.handshake_timeout_ms == 0 {
            return Err(Error::config("handshakeTimeoutMs must be greater than 0"));
        }

        if self.heartbeat_interval_ms == 0 {
            return Err(Error::config("heartbeatIntervalMs must be greater than 0"));
        }

        if self.keep_alive.enabled && self.keep_alive.reconnect_interval_ms == 0 {
            return Err(Error::config(
                "keepAlive.reconnectIntervalMs must be greater than 0 when keep-alive is enabled",
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
