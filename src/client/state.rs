//! Client states and host notifications.
//!
//! # State Machine
//!
//! ```text
//! idle ──start──► connecting ──open──► opened
//!                   ▲    │               │
//!                   │    └──close/error──┤
//!                   │                    ▼
//!                   └──── delay ──── reconnecting
//!
//! connecting | opened | reconnecting ──terminate──► terminating ──► terminated
//! ```
//!
//! With keep-alive disabled a close or error leads straight to
//! `terminated`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::event::LiveEvent;

// ============================================================================
// ClientState
// ============================================================================

/// Public lifecycle of a client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ClientState {
    /// Built, not started.
    #[default]
    Idle,
    /// A stack is being opened.
    Connecting,
    /// The current stack completed its handshake.
    Opened,
    /// Waiting to rebuild the stack.
    Reconnecting,
    /// Shutdown requested.
    Terminating,
    /// Shut down. Absorbing.
    Terminated,
}

impl ClientState {
    /// Returns `true` if `terminate` has an effect in this state.
    #[inline]
    #[must_use]
    pub const fn is_terminable(self) -> bool {
        matches!(self, Self::Connecting | Self::Opened | Self::Reconnecting)
    }

    /// Returns `true` for [`ClientState::Terminated`].
    #[inline]
    #[must_use]
    pub const fn is_terminated(self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Opened => "opened",
            Self::Reconnecting => "reconnecting",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

// ============================================================================
// ClientEvent
// ============================================================================

/// Notification delivered to client listeners.
#[derive(Debug, Clone, Copy)]
pub enum ClientEvent<'a> {
    /// A stack completed its handshake.
    Open,
    /// The client reached `terminated`.
    Close,
    /// The transport failed.
    Error(&'a Error),
    /// One application payload.
    Message(&'a LiveEvent),
}

/// Callback receiving client notifications.
pub type ClientListener = Arc<dyn Fn(ClientEvent<'_>) + Send + Sync>;

// ============================================================================
// Tests
// ============================================================================
