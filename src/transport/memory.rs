//! In-process transport driven by the caller.
//!
//! [`MemoryTransport`] performs no I/O. The owner plays the server: it opens
//! the transport, injects inbound frames and failures, and inspects the
//! frames the stack wrote. Closing completes synchronously.
//!
//! # Example
//!
//! ```ignore
//! let transport = MemoryTransport::new();
//! let sections = SectionCodec::connection(transport.clone());
//!
//! transport.open();
//! transport.receive(frame_bytes);
//! assert_eq!(transport.sent().len(), 1);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::connection::{Connection, Lifecycle};
use crate::error::Error;

use super::Transport;

// ============================================================================
// MemoryTransport
// ============================================================================

/// Transport whose remote end is the calling code.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    /// Lifecycle of this attempt.
    lifecycle: Lifecycle<Vec<u8>>,
    /// Frames written by the stack, oldest first.
    sent: Mutex<Vec<Vec<u8>>>,
    /// Number of `connect` calls.
    connects: AtomicUsize,
}

impl MemoryTransport {
    /// Creates an unopened transport.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Simulates the socket opening.
    pub fn open(&self) -> bool {
        self.lifecycle.on_open()
    }

    /// Simulates one inbound binary frame.
    pub fn receive(&self, frame: Vec<u8>) -> bool {
        self.lifecycle.on_message(&frame)
    }

    /// Simulates the remote end closing the socket cleanly.
    pub fn remote_close(&self) -> bool {
        self.lifecycle.on_close()
    }

    /// Simulates the socket breaking.
    pub fn fail(&self, error: Error) -> bool {
        self.lifecycle.on_error(&error)
    }

    /// Returns a copy of the frames written so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    /// Removes and returns the frames written so far.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Returns how many times `connect` was called.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Connection for MemoryTransport {
    type Message = Vec<u8>;

    fn lifecycle(&self) -> &Lifecycle<Vec<u8>> {
        &self.lifecycle
    }

    fn request_send(&self, data: Vec<u8>) {
        self.sent.lock().push(data);
    }

    fn request_close(&self) {
        self.lifecycle.on_close();
    }
}

impl Transport for MemoryTransport {
    fn connect(&self) {
        self.connects.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Tests
// ============================================================================
