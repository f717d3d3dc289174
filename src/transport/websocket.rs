//! WebSocket adapter and event loop.
//!
//! Adapts a `tokio-tungstenite` client socket to the [`Transport`] contract.
//!
//! # Event Loop
//!
//! [`Transport::connect`] spawns a tokio task that:
//!
//! - Opens the socket, racing against an early shutdown request
//! - Forwards binary frames as message notifications
//! - Writes outgoing frames queued by `send`
//! - Raises close (plus error when the socket broke) exactly once on exit

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

use crate::connection::{Connection, Lifecycle};
use crate::error::Error;

use super::Transport;

// ============================================================================
// TransportCommand
// ============================================================================

/// Internal commands for the event loop.
enum TransportCommand {
    /// Write one binary frame.
    Send(Vec<u8>),
    /// Close the socket.
    Shutdown,
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// WebSocket client socket exposed as a [`Transport`].
pub struct WebSocketTransport {
    /// Weak self reference moved into the event loop.
    me: Weak<Self>,
    /// Target URL.
    url: String,
    /// Lifecycle of this attempt.
    lifecycle: Lifecycle<Vec<u8>>,
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<TransportCommand>,
    /// Receiver handed to the event loop on `connect`.
    command_rx: Mutex<Option<mpsc::UnboundedReceiver<TransportCommand>>>,
}

impl fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("url", &self.url)
            .field("state", &self.lifecycle.state())
            .finish_non_exhaustive()
    }
}

impl WebSocketTransport {
    /// Creates an unconnected transport for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Arc<Self> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        Arc::new_cyclic(|me| Self {
            me: Weak::clone(me),
            url: url.into(),
            lifecycle: Lifecycle::new(),
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
        })
    }

    /// Returns the target URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Event loop that owns the socket.
    async fn run_event_loop(
        self: Arc<Self>,
        mut command_rx: mpsc::UnboundedReceiver<TransportCommand>,
    ) {
        let connecting = connect_async(self.url.as_str());

        let ws_stream = tokio::select! {
            result = connecting => match result {
                Ok((stream, _response)) => stream,
                Err(e) => {
                    error!(url = %self.url, error = %e, "WebSocket connect failed");
                    self.lifecycle.on_error(&Error::from(e));
                    return;
                }
            },

            _ = command_rx.recv() => {
                debug!(url = %self.url, "Shutdown before socket opened");
                self.lifecycle.on_close();
                return;
            }
        };

        info!(url = %self.url, "WebSocket connection established");
        self.lifecycle.on_open();

        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming frames from the server
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Binary(data))) => {
                            trace!(len = data.len(), "Binary frame received");
                            self.lifecycle.on_message(&data.to_vec());
                        }

                        Some(Ok(Message::Text(text))) => {
                            warn!(len = text.len(), "Ignoring text frame");
                        }

                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "WebSocket closed by remote");
                            self.lifecycle.on_close();
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            self.lifecycle.on_error(&Error::from(e));
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            self.lifecycle.on_error(&Error::ConnectionClosed);
                            break;
                        }

                        // Ping/Pong are answered by tungstenite
                        _ => {}
                    }
                }

                // Commands from the layers above
                command = command_rx.recv() => {
                    match command {
                        Some(TransportCommand::Send(data)) => {
                            let len = data.len();
                            if let Err(e) = ws_write.send(Message::Binary(data.into())).await {
                                error!(error = %e, "Failed to write frame");
                                self.lifecycle.on_error(&Error::from(e));
                                break;
                            }
                            trace!(len, "Binary frame sent");
                        }

                        Some(TransportCommand::Shutdown) | None => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        // No-op if an error or remote close already finalized the lifecycle
        self.lifecycle.on_close();

        debug!(url = %self.url, "Event loop terminated");
    }
}

impl Connection for WebSocketTransport {
    type Message = Vec<u8>;

    fn lifecycle(&self) -> &Lifecycle<Vec<u8>> {
        &self.lifecycle
    }

    fn request_send(&self, data: Vec<u8>) {
        if self.command_tx.send(TransportCommand::Send(data)).is_err() {
            debug!("Event loop gone, frame dropped");
        }
    }

    fn request_close(&self) {
        if self.command_tx.send(TransportCommand::Shutdown).is_err() {
            self.lifecycle.on_close();
            return;
        }

        // Never connected: nothing will drain the queue
        if self.command_rx.lock().take().is_some() {
            self.lifecycle.on_close();
        }
    }
}

impl Transport for WebSocketTransport {
    fn connect(&self) {
        let Some(command_rx) = self.command_rx.lock().take() else {
            debug!(url = %self.url, "Transport already connecting");
            return;
        };
        let Some(this) = self.me.upgrade() else {
            return;
        };

        debug!(url = %self.url, "Opening WebSocket");
        tokio::spawn(this.run_event_loop(command_rx));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::connection::{ConnectionEvent, ConnectionState};

    #[test]
    fn test_new_performs_no_io() {
        let transport = WebSocketTransport::new("wss://example.invalid/sub");
        assert_eq!(transport.url(), "wss://example.invalid/sub");
        assert_eq!(transport.state(), ConnectionState::Opening);
    }

    #[test]
    fn test_close_before_connect_finalizes() {
        let transport = WebSocketTransport::new("wss://example.invalid/sub");
        let closes = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&closes);
        transport.subscribe(Arc::new(move |event: ConnectionEvent<'_, Vec<u8>>| {
            if let ConnectionEvent::Close = event {
                *sink.lock() += 1;
            }
        }));

        transport.close();

        assert_eq!(transport.state(), ConnectionState::Closed);
        assert_eq!(*closes.lock(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_host_raises_error_then_close() {
        let transport = WebSocketTransport::new("ws://127.0.0.1:1/sub");
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        transport.subscribe(Arc::new(move |event: ConnectionEvent<'_, Vec<u8>>| {
            let name = match event {
                ConnectionEvent::Open => "open",
                ConnectionEvent::Close => "close",
                ConnectionEvent::Error(_) => "error",
                ConnectionEvent::Message(_) => "message",
            };
            sink.lock().push(name);
            if name == "close" {
                let _ = done_tx.send(());
            }
        }));

        transport.connect();
        done_rx.recv().await.expect("close notification");

        assert_eq!(*events.lock(), vec!["error", "close"]);
        assert_eq!(transport.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_round_trip_against_local_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream)
                .await
                .expect("handshake");
            ws.send(Message::Binary(vec![1, 2, 3].into()))
                .await
                .expect("send");
            let reply = ws.next().await.expect("frame").expect("read");
            ws.close(None).await.ok();
            reply
        });

        let transport = WebSocketTransport::new(format!("ws://{addr}/sub"));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let weak = Arc::downgrade(&transport);
        transport.subscribe(Arc::new(move |event: ConnectionEvent<'_, Vec<u8>>| {
            let entry = match event {
                ConnectionEvent::Open => "open".to_string(),
                ConnectionEvent::Close => "close".to_string(),
                ConnectionEvent::Error(e) => format!("error:{e}"),
                ConnectionEvent::Message(data) => format!("{data:?}"),
            };
            let _ = event_tx.send(entry);

            // answer the first frame
            if let (ConnectionEvent::Message(_), Some(transport)) = (event, weak.upgrade()) {
                transport.send(vec![9]);
            }
        }));

        transport.connect();

        assert_eq!(event_rx.recv().await.as_deref(), Some("open"));
        assert_eq!(event_rx.recv().await.as_deref(), Some("[1, 2, 3]"));
        assert_eq!(
            server.await.expect("server task"),
            Message::Binary(vec![9].into())
        );
        assert_eq!(event_rx.recv().await.as_deref(), Some("close"));
        assert_eq!(transport.state(), ConnectionState::Closed);
    }
}
