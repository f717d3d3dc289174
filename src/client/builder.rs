//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`Client`] instances.
//!
//! # Example
//!
//! ```ignore
//! use danmaku_socket::Client;
//!
//! let client = Client::builder()
//!     .host("broadcastlv.chat.example.com")
//!     .room_id(21452505)
//!     .reconnect_interval(Duration::from_secs(10))
//!     .extension(GiftExtension)
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::event::{Extension, MessageRegistry};
use crate::transport::{Transport, TransportFactory, websocket_factory};

use super::config::{ClientConfig, SOCKET_PATH};
use super::core::Client;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] instance.
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Clone)]
pub struct ClientBuilder {
    /// Configuration being assembled.
    config: ClientConfig,
    /// Extensions, installed in order.
    extensions: Vec<Arc<dyn Extension>>,
    /// Transport override.
    transport: Option<TransportFactory>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            config: ClientConfig::new(String::new(), 0),
            extensions: Vec::new(),
            transport: None,
        }
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let extensions: Vec<_> = self.extensions.iter().map(|e| e.name()).collect();
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("extensions", &extensions)
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a new client builder with default timings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration, e.g. one loaded from JSON.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the WebSocket endpoint.
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    /// Sets the endpoint to `wss://<host>/sub`.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: &str) -> Self {
        self.config.url = format!("wss://{host}{SOCKET_PATH}");
        self
    }

    /// Sets the room to join.
    #[inline]
    #[must_use]
    pub fn room_id(mut self, room_id: u64) -> Self {
        self.config.room_id = room_id;
        self
    }

    /// Sets the user id announced in the handshake.
    #[inline]
    #[must_use]
    pub fn user_id(mut self, user_id: u64) -> Self {
        self.config.user_id = user_id;
        self
    }

    /// Sets the client version announced in the handshake.
    #[inline]
    #[must_use]
    pub fn client_version(mut self, version: impl Into<String>) -> Self {
        self.config.client_version = version.into();
        self
    }

    /// Enables or disables reconnecting after the stack closes.
    #[inline]
    #[must_use]
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.config.keep_alive.enabled = enabled;
        self
    }

    /// Sets the fixed delay before reconnecting.
    #[inline]
    #[must_use]
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.config.keep_alive.reconnect_interval_ms = millis(interval);
        self
    }

    /// Sets the time allowed for the handshake ack.
    #[inline]
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout_ms = millis(timeout);
        self
    }

    /// Sets the heartbeat period.
    #[inline]
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval_ms = millis(interval);
        self
    }

    /// Sets the delay before the first heartbeat.
    #[inline]
    #[must_use]
    pub fn heartbeat_delay(mut self, delay: Duration) -> Self {
        self.config.heartbeat_delay_ms = millis(delay);
        self
    }

    /// Adds an extension. Extensions are installed in the order added.
    #[inline]
    #[must_use]
    pub fn extension(mut self, extension: impl Extension + 'static) -> Self {
        self.extensions.push(Arc::new(extension));
        self
    }

    /// Replaces the WebSocket transport.
    #[inline]
    #[must_use]
    pub fn transport(
        mut self,
        factory: impl Fn(&str) -> Arc<dyn Transport> + Send + Sync + 'static,
    ) -> Self {
        self.transport = Some(Arc::new(factory));
        self
    }

    /// Builds the client with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL or room id is missing or invalid
    /// - [`Error::Url`] if the URL does not parse
    pub fn build(self) -> Result<Client> {
        self.validate_required()?;
        self.config.validate()?;

        let registry = self.install_extensions();
        let transport = self.transport.unwrap_or_else(websocket_factory);

        Client::new(self.config, registry, transport)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    /// Validates that required fields were set.
    fn validate_required(&self) -> Result<()> {
        if self.config.url.is_empty() {
            return Err(Error::config(
                "Server URL is required. Use .url() or .host() to set it.\n\
                 Example: Client::builder().host(\"broadcastlv.chat.example.com\")",
            ));
        }

        if self.config.room_id == 0 {
            return Err(Error::config(
                "Room id is required. Use .room_id() to set it.\n\
                 Example: Client::builder().room_id(21452505)",
            ));
        }

        Ok(())
    }

    /// Builds the message registry from the configured extensions.
    fn install_extensions(&self) -> MessageRegistry {
        let mut registry = MessageRegistry::new();
        for extension in &self.extensions {
            debug!(extension = extension.name(), "Installing extension");
            extension.install(&mut registry);
        }
        registry
    }
}

/// Converts a duration to whole milliseconds, saturating.
#[inline]
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{Value, json};

    use crate::client::ClientState;

    struct Upper;

    impl Extension for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn install(&self, registry: &mut MessageRegistry) {
            registry.register("X", |raw: &Value| -> Result<Value> {
                Ok(json!(raw["text"].as_str().unwrap_or_default().to_uppercase()))
            });
        }
    }

    #[test]
    fn test_requires_url() {
        let err = ClientBuilder::new().room_id(1).build().unwrap_err();
        assert!(err.to_string().contains("URL is required"));
    }

    #[test]
    fn test_requires_room_id() {
        let err = ClientBuilder::new()
            .url("wss://host/sub")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Room id is required"));
    }

    #[test]
    fn test_rejects_non_websocket_url() {
        let err = ClientBuilder::new()
            .url("http://host/sub")
            .room_id(1)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_host_sets_url() {
        let builder = ClientBuilder::new().host("chat.example.com");
        assert_eq!(builder.config.url, "wss://chat.example.com/sub");
    }

    #[test]
    fn test_durations_stored_as_millis() {
        let builder = ClientBuilder::new()
            .reconnect_interval(Duration::from_secs(2))
            .handshake_timeout(Duration::from_millis(1500))
            .heartbeat_interval(Duration::from_secs(10))
            .heartbeat_delay(Duration::ZERO);

        assert_eq!(builder.config.keep_alive.reconnect_interval_ms, 2_000);
        assert_eq!(builder.config.handshake_timeout_ms, 1_500);
        assert_eq!(builder.config.heartbeat_interval_ms, 10_000);
        assert_eq!(builder.config.heartbeat_delay_ms, 0);
    }

    #[test]
    fn test_build_installs_extensions() {
        let client = ClientBuilder::new()
            .url("wss://host/sub")
            .room_id(1)
            .extension(Upper)
            .build()
            .expect("build");

        assert_eq!(client.state(), ClientState::Idle);
        let event = client.registry().map(json!({"cmd": "X", "text": "hi"}));
        assert_eq!(event.mapped(), Some(&json!("HI")));
    }

    #[test]
    fn test_config_replaces_everything() {
        let config = ClientConfig::new("ws://localhost:1/sub", 5);
        let client = ClientBuilder::new()
            .config(config.clone())
            .build()
            .expect("build");
        assert_eq!(client.config(), &config);
    }

    #[test]
    fn test_debug_lists_extensions() {
        let builder = ClientBuilder::new().extension(Upper);
        assert!(format!("{builder:?}").contains("upper"));
    }
}
