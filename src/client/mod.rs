//! Client orchestrator.
//!
//! The public entry point of the crate: builds a protocol stack per
//! connection attempt, reconnects on failure and fans events out to the
//! host.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Lifecycle owner for one room |
//! | [`ClientBuilder`] | Fluent configuration builder |
//! | [`ClientConfig`] | Serializable configuration |
//! | [`ClientState`] | Public lifecycle states |
//! | [`ClientEvent`] | Host notifications |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for client configuration.
pub mod builder;

/// Serializable client configuration.
pub mod config;

/// Core client implementation.
pub mod core;

/// Client states and host notifications.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use config::{ClientConfig, KeepAlive};
pub use core::Client;
pub use state::{ClientEvent, ClientListener, ClientState};
