//! Section codec layer.
//!
//! Wraps a [`Transport`] and exchanges `Vec<Section>` instead of raw
//! frames. All four notifications are mirrored; a frame that yields no
//! section raises no message.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use crate::connection::{ComposedConnection, Layer, Mirror};
use crate::protocol::{DEFAULT_CODERS, Section, SectionCoder, decode_sections, encode_sections};
use crate::transport::Transport;

// ============================================================================
// Types
// ============================================================================

/// Connection exchanging section lists over a transport.
pub type SectionConnection = ComposedConnection<SectionCodec>;

// ============================================================================
// SectionCodec
// ============================================================================

/// Layer hooks mapping section lists to transport frames.
#[derive(Debug, Clone, Copy)]
pub struct SectionCodec {
    /// Ordered coder registry used to recognize inbound sections.
    registry: &'static [SectionCoder],
}

impl Default for SectionCodec {
    fn default() -> Self {
        Self::new(&DEFAULT_CODERS)
    }
}

impl SectionCodec {
    /// Creates a codec layer using `registry`.
    #[inline]
    #[must_use]
    pub const fn new(registry: &'static [SectionCoder]) -> Self {
        Self { registry }
    }

    /// Returns the coder registry.
    #[inline]
    #[must_use]
    pub const fn registry(&self) -> &'static [SectionCoder] {
        self.registry
    }

    /// Wraps `transport` with the default registry.
    #[must_use]
    pub fn connection(transport: Arc<dyn Transport>) -> Arc<SectionConnection> {
        Self::default().wrap(transport)
    }

    /// Wraps `transport` with this codec.
    #[must_use]
    pub fn wrap(self, transport: Arc<dyn Transport>) -> Arc<SectionConnection> {
        ComposedConnection::new(transport, self, Mirror::ALL)
    }
}

impl Layer for SectionCodec {
    type Inner = dyn Transport;
    type Message = Vec<Section>;

    fn transform(&self, data: Vec<Section>) -> Vec<u8> {
        encode_sections(&data)
    }

    fn detransform(&self, data: &Vec<u8>) -> Option<Vec<Section>> {
        let sections = decode_sections(self.registry, data);
        (!sections.is_empty()).then_some(sections)
    }
}

// ============================================================================
// Tests
// ============================================================================
