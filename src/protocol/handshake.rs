//! Handshake payload.
//!
//! # Format
//!
//! ```json
//! {
//!   "protocolVersion": 1,
//!   "platform": "web",
//!   "clientVersion": "0.1.0",
//!   "userId": 0,
//!   "roomId": 21452505
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Handshake protocol version.
pub const HANDSHAKE_PROTOCOL_VERSION: u8 = 1;

/// Platform string announced to the server.
pub const PLATFORM: &str = "web";

// ============================================================================
// HandshakePayload
// ============================================================================

/// JSON body of the handshake section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakePayload {
    /// Always [`HANDSHAKE_PROTOCOL_VERSION`].
    pub protocol_version: u8,
    /// Always [`PLATFORM`].
    pub platform: String,
    /// Client version string.
    pub client_version: String,
    /// User id, `0` for anonymous.
    pub user_id: u64,
    /// Room to join.
    pub room_id: u64,
}

impl HandshakePayload {
    /// Creates a payload for `room_id`.
    #[must_use]
    pub fn new(room_id: u64, user_id: u64, client_version: impl Into<String>) -> Self {
        Self {
            protocol_version: HANDSHAKE_PROTOCOL_VERSION,
            platform: PLATFORM.to_string(),
            client_version: client_version.into(),
            user_id,
            room_id,
        }
    }

    /// Serializes into the JSON value carried by the section.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if serialization fails.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_serialized_keys() {
        let payload = HandshakePayload::new(21452505, 7, "0.1.0");
        let value = payload.to_value().expect("serialize");

        assert_eq!(
            value,
            json!({
                "protocolVersion": 1,
                "platform": "web",
                "clientVersion": "0.1.0",
                "userId": 7,
                "roomId": 21452505
            })
        );
    }

    #[test]
    fn test_deserialize_round_trip() {
        let payload = HandshakePayload::new(1, 0, "x");
        let json = serde_json::to_string(&payload).expect("serialize");
        let parsed: HandshakePayload = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, payload);
    }
}
