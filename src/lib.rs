//! Danmaku Socket - live broadcast chat client.
//!
//! This library connects to a live-broadcast chat server over a persistent
//! WebSocket, joins one room and delivers the room's JSON events to the
//! host application.
//!
//! # Architecture
//!
//! The client builds a stack of layered connections for every attempt:
//!
//! - **Transport**: raw binary WebSocket frames
//! - **Section layer**: frames ↔ lists of typed sections (16-byte header each)
//! - **Data layer**: handshake, heartbeat, application JSON payloads
//! - **Client**: reconnects with a fixed delay and fans events out
//!
//! Key design principles:
//!
//! - Every layer implements [`Connection`] with the same four-state lifecycle
//! - Notifications flow up, sends and closes flow down
//! - Malformed input is logged and dropped, only transport failures surface
//! - Timers hold weak references and are aborted when their layer closes
//!
//! # Quick Start
//!
//! ```no_run
//! use danmaku_socket::{Client, ClientEvent, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder()
//!         .host("broadcastlv.chat.example.com")
//!         .room_id(21452505)
//!         .build()?;
//!
//!     client.subscribe(|event| match event {
//!         ClientEvent::Open => println!("joined"),
//!         ClientEvent::Message(event) => println!("{}", event.raw()),
//!         ClientEvent::Error(e) => eprintln!("{e}"),
//!         ClientEvent::Close => println!("closed"),
//!     });
//!
//!     client.start()?;
//!     tokio::signal::ctrl_c().await.ok();
//!     client.terminate();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Client orchestrator, configuration and builder |
//! | [`connection`] | Connection trait, lifecycle and composition |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`event`] | [`LiveEvent`] and the message mapping seam |
//! | [`layer`] | Section and data protocol layers |
//! | [`protocol`] | Sections, coders and binary framing |
//! | [`transport`] | WebSocket and in-memory transports |

// ============================================================================
// Modules
// ============================================================================

/// Client orchestrator.
///
/// Use [`Client::builder()`] to create a configured client.
pub mod client;

/// Layered connection abstraction.
pub mod connection;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Application events and message mapping.
pub mod event;

/// Protocol layers stacked on a transport.
pub mod layer;

/// Wire protocol: sections, coders and framing.
pub mod protocol;

/// Raw socket transport.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientBuilder, ClientConfig, ClientEvent, ClientState, KeepAlive};

// Connection types
pub use connection::{Connection, ConnectionEvent, ConnectionState};

// Error types
pub use error::{Error, Result};

// Event types
pub use event::{Extension, LiveEvent, MessageDefinition, MessageRegistry};

// Layer types
pub use layer::{DataConnection, DataTiming, SectionConnection};

// Protocol types
pub use protocol::{Payload, Section, SectionCoder};

// Transport types
pub use transport::{MemoryTransport, Transport, TransportFactory, WebSocketTransport};
