//! Wire protocol: sections, coders and binary framing.
//!
//! # Protocol Overview
//!
//! | Section | Direction | Purpose |
//! |---------|-----------|---------|
//! | `handshake` | Local → Remote | Join a room |
//! | `handshake-ack` | Remote → Local | Room joined |
//! | `heartbeat` | Local → Remote | Keep the socket alive |
//! | `heartbeat-ack` | Remote → Local | Keep-alive reply |
//! | `data` | Both | Application JSON payload |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Section list ↔ byte buffer |
//! | `handshake` | Handshake payload |
//! | `section` | Section, coder and registry types |

// ============================================================================
// Submodules
// ============================================================================

/// Section list ↔ byte buffer.
pub mod codec;

/// Handshake payload.
pub mod handshake;

/// Section, coder and registry types.
pub mod section;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{decode_sections, encode_sections};
pub use handshake::HandshakePayload;
pub use section::{
    DATA, DEFAULT_CODERS, HANDSHAKE, HANDSHAKE_ACK, HEARTBEAT, HEARTBEAT_ACK, Payload,
    PayloadKind, Section, SectionCoder, SectionHeader, find_coder,
};

// ============================================================================
// Constants
// ============================================================================

/// Size of a section header in bytes.
pub const HEADER_LEN: usize = 16;

/// Protocol version written at bytes 4..6 of every section.
pub const PROTOCOL_VERSION: u16 = 0x0010;

/// Heartbeat content kept byte-for-byte for server compatibility.
pub const HEARTBEAT_PAYLOAD: &str = "[object Object]";
