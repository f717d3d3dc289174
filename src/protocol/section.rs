//! Sections, coders and the default coder registry.
//!
//! A [`Section`] is one typed unit on the wire. Its [`SectionCoder`] knows
//! the header that identifies the sub-type and how the payload is turned
//! into content bytes and back.
//!
//! # Default Registry
//!
//! | Coder | opCode | control | binary | Payload |
//! |-------|--------|---------|--------|---------|
//! | [`HANDSHAKE`] | 7 | yes | yes | JSON |
//! | [`HANDSHAKE_ACK`] | 8 | yes | yes | opaque |
//! | [`DATA`] | 5 | no | no | JSON |
//! | [`HEARTBEAT`] | 2 | yes | yes | UTF-8 string |
//! | [`HEARTBEAT_ACK`] | 3 | yes | yes | opaque |

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::error::{Error, Result};

use super::HEARTBEAT_PAYLOAD;

// ============================================================================
// SectionHeader
// ============================================================================

/// Header fields that identify a section sub-type.
///
/// Incoming sections are matched against the registry by value equality of
/// this struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionHeader {
    /// Control flag (byte 7).
    pub control: bool,
    /// Operation code (bytes 8..12).
    pub op_code: u32,
    /// Binary flag (byte 15).
    pub binary: bool,
}

impl SectionHeader {
    /// Creates a header.
    #[inline]
    #[must_use]
    pub const fn new(control: bool, op_code: u32, binary: bool) -> Self {
        Self {
            control,
            op_code,
            binary,
        }
    }
}

// ============================================================================
// Payload
// ============================================================================

/// Coder-specific section payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw bytes, not interpreted.
    Bytes(Vec<u8>),
    /// UTF-8 text.
    Text(String),
    /// Parsed JSON document.
    Json(Value),
}

impl Payload {
    /// Short name of the variant, for diagnostics.
    #[inline]
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::Text(_) => "text",
            Self::Json(_) => "json",
        }
    }

    /// Returns the JSON value, if this is a JSON payload.
    #[inline]
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the raw bytes, if this is an opaque payload.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

// ============================================================================
// PayloadKind
// ============================================================================

/// Content encoding used by a coder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// JSON document ([`Payload::Json`]).
    Json,
    /// UTF-8 string ([`Payload::Text`]).
    Text,
    /// Uninterpreted bytes ([`Payload::Bytes`]).
    Opaque,
}

// ============================================================================
// SectionCoder
// ============================================================================

/// A registered {header, encode, decode} triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionCoder {
    /// Name used in logs and errors.
    pub name: &'static str,
    /// Header identifying this sub-type on the wire.
    pub header: SectionHeader,
    /// Content encoding.
    pub kind: PayloadKind,
}

impl SectionCoder {
    /// Creates a coder.
    #[inline]
    #[must_use]
    pub const fn new(name: &'static str, header: SectionHeader, kind: PayloadKind) -> Self {
        Self { name, header, kind }
    }

    /// Encodes `payload` into content bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if the payload variant does not match this
    /// coder's kind, or if JSON serialization fails.
    pub fn encode(&self, payload: &Payload) -> Result<Vec<u8>> {
        match (self.kind, payload) {
            (PayloadKind::Json, Payload::Json(value)) => serde_json::to_vec(value)
                .map_err(|e| Error::codec(self.name, e.to_string())),
            (PayloadKind::Text, Payload::Text(text)) => Ok(text.as_bytes().to_vec()),
            (PayloadKind::Opaque, Payload::Bytes(bytes)) => Ok(bytes.clone()),
            (kind, other) => Err(Error::codec(
                self.name,
                format!("cannot encode {} payload as {kind:?}", other.kind_name()),
            )),
        }
    }

    /// Decodes content bytes into a payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if the content is not valid for this
    /// coder's kind.
    pub fn decode(&self, content: &[u8]) -> Result<Payload> {
        match self.kind {
            PayloadKind::Json => serde_json::from_slice(content)
                .map(Payload::Json)
                .map_err(|e| Error::codec(self.name, e.to_string())),
            PayloadKind::Text => String::from_utf8(content.to_vec())
                .map(Payload::Text)
                .map_err(|e| Error::codec(self.name, e.to_string())),
            PayloadKind::Opaque => Ok(Payload::Bytes(content.to_vec())),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Joins a room.
pub const HANDSHAKE: SectionCoder =
    SectionCoder::new("handshake", SectionHeader::new(true, 7, true), PayloadKind::Json);

/// Server acknowledgement of the handshake.
pub const HANDSHAKE_ACK: SectionCoder = SectionCoder::new(
    "handshake-ack",
    SectionHeader::new(true, 8, true),
    PayloadKind::Opaque,
);

/// Application payload.
pub const DATA: SectionCoder =
    SectionCoder::new("data", SectionHeader::new(false, 5, false), PayloadKind::Json);

/// Periodic keep-alive.
pub const HEARTBEAT: SectionCoder =
    SectionCoder::new("heartbeat", SectionHeader::new(true, 2, true), PayloadKind::Text);

/// Server acknowledgement of a heartbeat.
pub const HEARTBEAT_ACK: SectionCoder = SectionCoder::new(
    "heartbeat-ack",
    SectionHeader::new(true, 3, true),
    PayloadKind::Opaque,
);

/// Ordered coder registry used by default.
pub static DEFAULT_CODERS: [SectionCoder; 5] =
    [HANDSHAKE, HANDSHAKE_ACK, DATA, HEARTBEAT, HEARTBEAT_ACK];

/// Returns the first coder in `registry` whose header equals `header`.
#[inline]
#[must_use]
pub fn find_coder<'a>(
    registry: &'a [SectionCoder],
    header: &SectionHeader,
) -> Option<&'a SectionCoder> {
    registry.iter().find(|coder| coder.header == *header)
}

// ============================================================================
// Section
// ============================================================================

/// One typed unit of the wire protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    /// Coder identifying the sub-type.
    coder: SectionCoder,
    /// Coder-specific payload.
    payload: Payload,
}

impl Section {
    /// Creates a section.
    #[inline]
    #[must_use]
    pub fn new(coder: SectionCoder, payload: Payload) -> Self {
        Self { coder, payload }
    }

    /// Creates a handshake section.
    #[inline]
    #[must_use]
    pub fn handshake(payload: Value) -> Self {
        Self::new(HANDSHAKE, Payload::Json(payload))
    }

    /// Creates a heartbeat section with the fixed legacy payload.
    #[inline]
    #[must_use]
    pub fn heartbeat() -> Self {
        Self::new(HEARTBEAT, Payload::Text(HEARTBEAT_PAYLOAD.to_string()))
    }

    /// Creates a data section.
    #[inline]
    #[must_use]
    pub fn data(payload: Value) -> Self {
        Self::new(DATA, Payload::Json(payload))
    }

    /// Returns the coder.
    #[inline]
    #[must_use]
    pub const fn coder(&self) -> &SectionCoder {
        &self.coder
    }

    /// Returns the payload.
    #[inline]
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Consumes the section, returning its payload.
    #[inline]
    #[must_use]
    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Returns `true` if this section was produced by `coder`.
    #[inline]
    #[must_use]
    pub fn is(&self, coder: &SectionCoder) -> bool {
        self.coder.header == coder.header
    }
}

// ============================================================================
// Tests
// ============================================================================
