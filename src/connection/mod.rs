//! Layered connection abstraction.
//!
//! Every layer of the stack, from the raw socket adapter up to the
//! handshake/heartbeat layer, implements [`Connection`]. A layer that wraps
//! another one is a [`ComposedConnection`] parameterised by a [`Layer`].
//!
//! # Stack
//!
//! ```text
//! ┌──────────────────────────┐
//! │  DataConnection          │  handshake, heartbeat, JSON payloads
//! ├──────────────────────────┤
//! │  SectionConnection       │  Vec<Section> <-> byte buffer
//! ├──────────────────────────┤
//! │  Transport               │  raw binary frames (WebSocket)
//! └──────────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `lifecycle` | State machine and listener fan-out |
//! | `composed` | Generic wrapping layer |

// ============================================================================
// Submodules
// ============================================================================

/// Generic wrapping layer.
pub mod composed;

/// State machine and listener fan-out.
pub mod lifecycle;

// ============================================================================
// Re-exports
// ============================================================================

pub use composed::{ComposedConnection, InnerMessage, Layer, Mirror};
pub use lifecycle::{ConnectionEvent, ConnectionState, Lifecycle, Listener};

// ============================================================================
// Imports
// ============================================================================

use tracing::trace;

// ============================================================================
// Connection
// ============================================================================

/// One connection attempt.
///
/// Implementors provide the [`Lifecycle`] plus the two hooks
/// [`request_send`](Connection::request_send) and
/// [`request_close`](Connection::request_close). The provided
/// [`send`](Connection::send) and [`close`](Connection::close) enforce the
/// state rules before calling the hooks.
pub trait Connection: Send + Sync {
    /// Payload type carried by this layer.
    type Message: Send + Sync + 'static;

    /// Returns the lifecycle embedded in this connection.
    fn lifecycle(&self) -> &Lifecycle<Self::Message>;

    /// Delivers a payload. Only called while `opened`.
    fn request_send(&self, data: Self::Message);

    /// Starts shutting down. Only called once, right after entering `closing`.
    ///
    /// The implementation must eventually raise `on_close` or `on_error`.
    fn request_close(&self);

    /// Returns the current state.
    #[inline]
    fn state(&self) -> ConnectionState {
        self.lifecycle().state()
    }

    /// Sends a payload if the connection is `opened`, otherwise drops it.
    fn send(&self, data: Self::Message) {
        let state = self.state();
        if state == ConnectionState::Opened {
            self.request_send(data);
        } else {
            trace!(%state, "Send outside opened state dropped");
        }
    }

    /// Closes the connection if it is `opening` or `opened`.
    fn close(&self) {
        if self.lifecycle().begin_close() {
            self.request_close();
        }
    }

    /// Registers a listener for open, close, error and message notifications.
    fn subscribe(&self, listener: Listener<Self::Message>) {
        self.lifecycle().subscribe(listener);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    /// Connection that records hook invocations.
    #[derive(Default)]
    struct Probe {
        lifecycle: Lifecycle<u32>,
        sent: Mutex<Vec<u32>>,
        close_requests: Mutex<u32>,
    }

    impl Connection for Probe {
        type Message = u32;

        fn lifecycle(&self) -> &Lifecycle<u32> {
            &self.lifecycle
        }

        fn request_send(&self, data: u32) {
            self.sent.lock().push(data);
        }

        fn request_close(&self) {
            *self.close_requests.lock() += 1;
        }
    }

    #[test]
    fn test_send_before_open_never_requested() {
        let probe = Probe::default();
        probe.send(1);
        assert!(probe.sent.lock().is_empty());

        probe.lifecycle.on_open();
        probe.send(2);
        assert_eq!(*probe.sent.lock(), vec![2]);
    }

    #[test]
    fn test_send_while_closing_dropped() {
        let probe = Probe::default();
        probe.lifecycle.on_open();
        probe.close();
        probe.send(3);

        assert!(probe.sent.lock().is_empty());
        assert_eq!(probe.state(), ConnectionState::Closing);
    }

    #[test]
    fn test_close_requests_once() {
        let probe = Probe::default();
        probe.close();
        probe.close();
        assert_eq!(*probe.close_requests.lock(), 1);

        probe.lifecycle.on_close();
        probe.close();
        assert_eq!(*probe.close_requests.lock(), 1);
    }

    #[test]
    fn test_close_after_closed_is_noop() {
        let probe = Probe::default();
        probe.lifecycle.on_close();
        probe.close();

        assert_eq!(*probe.close_requests.lock(), 0);
        assert_eq!(probe.state(), ConnectionState::Closed);
    }
}
