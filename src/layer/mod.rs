//! Protocol layers stacked on a transport.
//!
//! # Modules
//!
//! | Module | Layer | Message type |
//! |--------|-------|--------------|
//! | `section` | [`SectionConnection`] | `Vec<Section>` |
//! | `data` | [`DataConnection`] | `serde_json::Value` |

// ============================================================================
// Submodules
// ============================================================================

/// Handshake and heartbeat layer.
pub mod data;

/// Section codec layer.
pub mod section;

// ============================================================================
// Re-exports
// ============================================================================

pub use data::{DataConnection, DataProtocol, DataTiming};
pub use section::{SectionCodec, SectionConnection};

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use crate::transport::Transport;

// ============================================================================
// Stack
// ============================================================================

/// Wires the section and data layers on top of `transport`.
///
/// No I/O happens here; call [`Transport::connect`] on the same transport
/// once the returned connection has its listeners.
#[must_use]
pub fn build_stack(
    transport: Arc<dyn Transport>,
    protocol: DataProtocol,
) -> Arc<DataConnection> {
    protocol.wrap(SectionCodec::connection(transport))
}
