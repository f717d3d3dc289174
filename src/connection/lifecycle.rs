//! Connection lifecycle state machine and notification fan-out.
//!
//! A [`Lifecycle`] is the state every connection layer embeds. It owns the
//! current [`ConnectionState`] and the ordered listener list, and exposes
//! the `on_*` notifications that are the only way to advance the state.
//!
//! # State Machine
//!
//! ```text
//! opening ──on_open──▶ opened ──close()──▶ closing
//!    │                   │                    │
//!    └──on_close/on_error┴────────────────────┴──▶ closed
//! ```
//!
//! Transitions never go backwards. Each notification checks the current
//! state under the lock, so a second `on_open` or a message before `opened`
//! is dropped instead of reaching listeners.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::Error;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Created, not yet usable.
    #[default]
    Opening,
    /// Ready to send and receive.
    Opened,
    /// Close requested, waiting for the layer below.
    Closing,
    /// Terminal.
    Closed,
}

impl ConnectionState {
    /// Returns `true` if `close()` has an effect in this state.
    #[inline]
    #[must_use]
    pub const fn is_closable(self) -> bool {
        matches!(self, Self::Opening | Self::Opened)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Opening => "opening",
            Self::Opened => "opened",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// ConnectionEvent
// ============================================================================

/// A notification raised by a connection.
///
/// Payloads are borrowed: listeners run synchronously inside the
/// notification and clone what they need to keep.
#[derive(Debug)]
pub enum ConnectionEvent<'a, T> {
    /// The connection reached `opened`.
    Open,
    /// The connection reached `closed`.
    Close,
    /// The connection failed. Always followed by [`ConnectionEvent::Close`].
    Error(&'a Error),
    /// A message arrived while `opened`.
    Message(&'a T),
}

impl<T> Clone for ConnectionEvent<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ConnectionEvent<'_, T> {}

/// Listener callback type.
///
/// Listeners are invoked in registration order.
pub type Listener<T> = Arc<dyn Fn(ConnectionEvent<'_, T>) + Send + Sync>;

// ============================================================================
// Lifecycle
// ============================================================================

/// State and listeners of a single connection.
pub struct Lifecycle<T> {
    /// Current state.
    state: Mutex<ConnectionState>,
    /// Registered listeners, in registration order.
    listeners: Mutex<Vec<Listener<T>>>,
}

impl<T> Default for Lifecycle<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Lifecycle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("state", &self.state())
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}

impl<T> Lifecycle<T> {
    /// Creates a lifecycle in the `opening` state.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Opening),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Appends a listener.
    pub fn subscribe(&self, listener: Listener<T>) {
        self.listeners.lock().push(listener);
    }

    /// Moves `opening`/`opened` to `closing`.
    ///
    /// Returns `true` if the caller should now request the close.
    pub fn begin_close(&self) -> bool {
        self.transition(ConnectionState::is_closable, ConnectionState::Closing)
            .is_some()
    }

    /// Moves `opening` to `opened` and notifies [`ConnectionEvent::Open`].
    pub fn on_open(&self) -> bool {
        let opened = self
            .transition(|s| s == ConnectionState::Opening, ConnectionState::Opened)
            .is_some();
        if opened {
            self.emit(ConnectionEvent::Open);
        }
        opened
    }

    /// Moves any non-closed state to `closed` and notifies
    /// [`ConnectionEvent::Close`].
    pub fn on_close(&self) -> bool {
        let closed = self
            .transition(|s| s != ConnectionState::Closed, ConnectionState::Closed)
            .is_some();
        if closed {
            self.emit(ConnectionEvent::Close);
        }
        closed
    }

    /// Finalizes the connection after a failure.
    ///
    /// From `opening`/`opened` this notifies the error and then the close.
    /// From `closing` the error is swallowed and only the close is raised.
    pub fn on_error(&self, error: &Error) -> bool {
        let previous =
            self.transition(|s| s != ConnectionState::Closed, ConnectionState::Closed);

        match previous {
            Some(ConnectionState::Closing) => {
                trace!(%error, "Error during shutdown swallowed");
                self.emit(ConnectionEvent::Close);
                true
            }
            Some(_) => {
                self.emit(ConnectionEvent::Error(error));
                self.emit(ConnectionEvent::Close);
                true
            }
            None => false,
        }
    }

    /// Notifies a message if the connection is `opened`.
    pub fn on_message(&self, message: &T) -> bool {
        if self.state() != ConnectionState::Opened {
            trace!(state = %self.state(), "Message outside opened state dropped");
            return false;
        }
        self.emit(ConnectionEvent::Message(message));
        true
    }

    /// Applies `next` if `allowed(current)`; returns the previous state.
    fn transition(
        &self,
        allowed: impl FnOnce(ConnectionState) -> bool,
        next: ConnectionState,
    ) -> Option<ConnectionState> {
        let mut state = self.state.lock();
        let previous = *state;
        if !allowed(previous) {
            return None;
        }
        *state = next;
        trace!(from = %previous, to = %next, "Connection state changed");
        Some(previous)
    }

    /// Calls every listener without holding any lock.
    fn emit(&self, event: ConnectionEvent<'_, T>) {
        let listeners: Vec<Listener<T>> = self.listeners.lock().clone();
        for listener in &listeners {
            listener(event);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
