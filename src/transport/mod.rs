//! Raw socket transport.
//!
//! The bottom of the stack: a [`Connection`] over binary frames. The
//! protocol layers only rely on the [`Transport`] trait, so the socket
//! implementation can be swapped (tests use [`MemoryTransport`]).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐                          ┌─────────────────┐
//! │  WebSocketTransport │        WebSocket         │  Chat server    │
//! │                     │◄────────────────────────►│                 │
//! │  event loop task    │     wss://<host>/sub     │  /sub endpoint  │
//! └─────────────────────┘                          └─────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | `tokio-tungstenite` adapter and its event loop |
//! | `memory` | In-process transport driven by the caller |

// ============================================================================
// Submodules
// ============================================================================

/// In-process transport driven by the caller.
pub mod memory;

/// WebSocket adapter.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::MemoryTransport;
pub use websocket::WebSocketTransport;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use crate::connection::Connection;

// ============================================================================
// Transport
// ============================================================================

/// A connection carrying raw binary frames.
///
/// Constructing a transport performs no I/O. The owner wires the layers
/// above it first and then calls [`connect`](Transport::connect), so no
/// notification can be raised before every layer is subscribed.
pub trait Transport: Connection<Message = Vec<u8>> {
    /// Starts opening the socket.
    ///
    /// Calling it more than once has no effect.
    fn connect(&self);
}

/// Creates one transport per connection attempt from the target URL.
pub type TransportFactory = Arc<dyn Fn(&str) -> Arc<dyn Transport> + Send + Sync>;

/// Returns the factory creating [`WebSocketTransport`]s.
#[must_use]
pub fn websocket_factory() -> TransportFactory {
    Arc::new(|url: &str| -> Arc<dyn Transport> { WebSocketTransport::new(url) })
}
