//! Client orchestrator.
//!
//! A [`Client`] owns at most one protocol stack at a time. It starts the
//! first one on [`Client::start`], rebuilds it after a fixed delay when the
//! stack closes and keep-alive is enabled, and tears everything down on
//! [`Client::terminate`].
//!
//! Every stack is tagged with an attempt number; notifications raised by a
//! stack that is no longer current are ignored. A terminate request is
//! recorded before the stack is closed and checked ahead of every
//! stack-driven transition, so it always wins.
//!
//! # Example
//!
//! ```ignore
//! let client = Client::builder()
//!     .url("wss://broadcastlv.chat.example.com/sub")
//!     .room_id(21452505)
//!     .build()?;
//!
//! client.subscribe(|event| {
//!     if let ClientEvent::Message(event) = event {
//!         println!("{:?}: {}", event.tag(), event.raw());
//!     }
//! });
//! client.start()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, info, trace, warn};

use crate::connection::{Connection, ConnectionEvent, ConnectionState};
use crate::error::{Error, Result};
use crate::event::MessageRegistry;
use crate::layer::{DataConnection, DataProtocol, build_stack};
use crate::transport::TransportFactory;

use super::builder::ClientBuilder;
use super::config::ClientConfig;
use super::state::{ClientEvent, ClientListener, ClientState};

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the client.
pub(crate) struct ClientInner {
    /// Validated configuration.
    config: ClientConfig,
    /// Handshake JSON sent by every stack.
    handshake: Value,
    /// Message definitions installed by extensions.
    registry: MessageRegistry,
    /// Creates one transport per attempt.
    transport_factory: TransportFactory,
    /// Current state, published to watchers.
    state: watch::Sender<ClientState>,
    /// Set once terminate was requested.
    terminate_pending: AtomicBool,
    /// Number of the current attempt.
    attempt: AtomicU64,
    /// Stack of the current attempt.
    stack: Mutex<Option<Arc<DataConnection>>>,
    /// Pending reconnect.
    reconnect_timer: Mutex<Option<AbortHandle>>,
    /// Host listeners in registration order.
    listeners: Mutex<Vec<ClientListener>>,
}

// ============================================================================
// Client
// ============================================================================

/// Live chat client for one room.
///
/// Cloning is cheap and every clone drives the same connection. The stack
/// is closed when the last clone is dropped.
///
/// [`start`](Client::start) spawns tokio tasks and must be called from
/// within a runtime.
#[derive(Clone)]
pub struct Client {
    /// Shared inner state.
    pub(crate) inner: Arc<ClientInner>,
}

// ============================================================================
// Client - Display
// ============================================================================

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.inner.config.url)
            .field("room_id", &self.inner.config.room_id)
            .field("state", &self.state())
            .field("attempt", &self.attempt())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Public API
// ============================================================================

impl Client {
    /// Creates a configuration builder for the client.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Opens the first stack.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless the client is `idle`.
    pub fn start(&self) -> Result<()> {
        let inner = &self.inner;
        if inner
            .transition(|state| state == ClientState::Idle, ClientState::Connecting)
            .is_none()
        {
            return Err(Error::invalid_state("start", inner.current()));
        }

        info!(
            url = %inner.config.url,
            room_id = inner.config.room_id,
            keep_alive = inner.config.keep_alive.enabled,
            "Starting client"
        );
        inner.connect();
        Ok(())
    }

    /// Shuts the client down.
    ///
    /// Has no effect when the client is idle or already shutting down.
    pub fn terminate(&self) {
        let inner = &self.inner;
        let Some(previous) = inner.transition(ClientState::is_terminable, ClientState::Terminating)
        else {
            trace!(state = %inner.current(), "Terminate ignored");
            return;
        };

        inner.terminate_pending.store(true, Ordering::SeqCst);
        info!(%previous, "Terminating client");

        let stack = inner.stack.lock().clone();
        match stack {
            Some(stack) => {
                stack.close();
                if stack.state() == ConnectionState::Closed {
                    inner.finish();
                }
            }
            None => inner.finish(),
        }
    }

    /// Sends an application payload over the current stack.
    ///
    /// Dropped unless the client is `opened`.
    pub fn send(&self, payload: Value) {
        let stack = self.inner.stack.lock().clone();
        match stack {
            Some(stack) => stack.send(payload),
            None => trace!("Send without a stack dropped"),
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.inner.current()
    }

    /// Returns a receiver observing every state change.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ClientState> {
        self.inner.state.subscribe()
    }

    /// Returns the number of stacks built so far.
    #[inline]
    #[must_use]
    pub fn attempt(&self) -> u64 {
        self.inner.attempt.load(Ordering::SeqCst)
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Returns the message definitions installed by extensions.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &MessageRegistry {
        &self.inner.registry
    }

    /// Registers a listener. Listeners run in registration order.
    pub fn subscribe(&self, listener: impl Fn(ClientEvent<'_>) + Send + Sync + 'static) {
        self.inner.listeners.lock().push(Arc::new(listener));
    }
}

// ============================================================================
// Client - Internal
// ============================================================================

impl Client {
    /// Creates a client from validated parts.
    pub(crate) fn new(
        config: ClientConfig,
        registry: MessageRegistry,
        transport_factory: TransportFactory,
    ) -> Result<Self> {
        let handshake = config.handshake_value()?;
        let (state, _) = watch::channel(ClientState::Idle);

        let inner = ClientInner {
            config,
            handshake,
            registry,
            transport_factory,
            state,
            terminate_pending: AtomicBool::new(false),
            attempt: AtomicU64::new(0),
            stack: Mutex::new(None),
            reconnect_timer: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }
}

impl ClientInner {
    /// Returns the current state.
    #[inline]
    fn current(&self) -> ClientState {
        *self.state.borrow()
    }

    /// Applies `next` if `allowed(current)`; returns the previous state.
    fn transition(
        &self,
        allowed: impl FnOnce(ClientState) -> bool,
        next: ClientState,
    ) -> Option<ClientState> {
        let mut previous = None;
        self.state.send_if_modified(|state| {
            if !allowed(*state) {
                return false;
            }
            previous = Some(*state);
            *state = next;
            true
        });

        if let Some(previous) = previous {
            debug!(%previous, %next, "Client state changed");
        }
        previous
    }

    /// Returns `true` once terminate was requested.
    #[inline]
    fn terminate_pending(&self) -> bool {
        self.terminate_pending.load(Ordering::SeqCst)
    }

    /// Builds a fresh stack, makes it current and starts its transport.
    fn connect(self: &Arc<Self>) {
        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;

        let transport = (self.transport_factory)(&self.config.url);
        let protocol = DataProtocol::new(self.handshake.clone(), self.config.timing());
        let stack = build_stack(Arc::clone(&transport), protocol);

        let weak = Arc::downgrade(self);
        stack.subscribe(Arc::new(move |event: ConnectionEvent<'_, Value>| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_stack_event(attempt, event);
            }
        }));

        let previous = self.stack.lock().replace(stack);
        if let Some(previous) = previous {
            previous.close();
        }

        // terminate may have run while the transport was being built
        if self.terminate_pending() {
            debug!(attempt, "Terminate requested while connecting");
            self.close_stack();
            self.finish();
            return;
        }

        debug!(attempt, url = %self.config.url, "Connecting");
        transport.connect();
    }

    /// Routes one notification of the stack built for `attempt`.
    fn handle_stack_event(self: &Arc<Self>, attempt: u64, event: ConnectionEvent<'_, Value>) {
        let current = self.attempt.load(Ordering::SeqCst);
        if attempt != current {
            trace!(attempt, current, "Ignoring event from stale attempt");
            return;
        }

        match event {
            ConnectionEvent::Open => self.on_stack_open(),
            ConnectionEvent::Close => self.on_stack_close(),
            ConnectionEvent::Error(error) => self.on_stack_error(error),
            ConnectionEvent::Message(payload) => self.on_stack_message(payload),
        }
    }

    fn on_stack_open(&self) {
        if self.terminate_pending() {
            self.close_stack();
            self.finish();
            return;
        }

        if self
            .transition(|state| state == ClientState::Connecting, ClientState::Opened)
            .is_some()
        {
            info!(room_id = self.config.room_id, "Joined room");
            self.emit(ClientEvent::Open);
        }
    }

    fn on_stack_error(&self, error: &Error) {
        if self.current().is_terminated() {
            return;
        }

        warn!(error = %error, "Connection failed");
        self.emit(ClientEvent::Error(error));
    }

    fn on_stack_close(self: &Arc<Self>) {
        if self.terminate_pending() || !self.config.keep_alive.enabled {
            self.finish();
            return;
        }

        if self
            .transition(
                |state| matches!(state, ClientState::Connecting | ClientState::Opened),
                ClientState::Reconnecting,
            )
            .is_none()
        {
            return;
        }

        self.stack.lock().take();
        self.schedule_reconnect();
    }

    fn on_stack_message(&self, payload: &Value) {
        if self.current() != ClientState::Opened {
            return;
        }

        let event = self.registry.map(payload.clone());
        self.emit(ClientEvent::Message(&event));
    }

    /// Arms the reconnect timer.
    fn schedule_reconnect(self: &Arc<Self>) {
        let delay = self.config.keep_alive.reconnect_interval();
        info!(?delay, "Connection lost, reconnecting");

        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            reconnect(&weak);
        });

        let previous = self.reconnect_timer.lock().replace(task.abort_handle());
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Moves to `terminated`, dropping the stack and notifying `Close` once.
    fn finish(&self) {
        let terminated = self.transition(|state| !state.is_terminated(), ClientState::Terminated);
        let Some(previous) = terminated else {
            return;
        };

        if let Some(timer) = self.reconnect_timer.lock().take() {
            timer.abort();
        }

        self.close_stack();

        info!(%previous, "Client terminated");
        self.emit(ClientEvent::Close);
    }

    /// Takes the current stack out and closes it.
    fn close_stack(&self) {
        let stack = self.stack.lock().take();
        if let Some(stack) = stack {
            stack.close();
        }
    }

    /// Calls every listener on a snapshot of the list.
    fn emit(&self, event: ClientEvent<'_>) {
        let listeners = self.listeners.lock().clone();
        for listener in &listeners {
            listener(event);
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(timer) = self.reconnect_timer.get_mut().take() {
            timer.abort();
        }
        if let Some(stack) = self.stack.get_mut().take() {
            stack.close();
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Rebuilds the stack once the reconnect delay elapsed.
fn reconnect(weak: &Weak<ClientInner>) {
    let Some(inner) = weak.upgrade() else {
        return;
    };

    if inner.terminate_pending() {
        inner.finish();
        return;
    }

    if inner
        .transition(|state| state == ClientState::Reconnecting, ClientState::Connecting)
        .is_some()
    {
        inner.connect();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde_json::json;
    use tokio::time::sleep;

    use crate::client::KeepAlive;
    use crate::protocol::{HANDSHAKE_ACK, Payload, Section, encode_sections};
    use crate::transport::{MemoryTransport, Transport};

    struct Harness {
        client: Client,
        transports: Arc<Mutex<Vec<Arc<MemoryTransport>>>>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Harness {
        fn new(keep_alive: KeepAlive) -> Self {
            let transports = Arc::new(Mutex::new(Vec::new()));
            let created = Arc::clone(&transports);
            let factory: TransportFactory = Arc::new(move |_: &str| -> Arc<dyn Transport> {
                let transport = MemoryTransport::new();
                created.lock().push(Arc::clone(&transport));
                transport
            });

            let mut config = ClientConfig::new("wss://host/sub", 1);
            config.keep_alive = keep_alive;
            let client = Client::new(config, MessageRegistry::new(), factory).expect("client");

            let log = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&log);
            client.subscribe(move |event| {
                let entry = match event {
                    ClientEvent::Open => "open".to_string(),
                    ClientEvent::Close => "close".to_string(),
                    ClientEvent::Error(_) => "error".to_string(),
                    ClientEvent::Message(event) => format!("message:{}", event.raw()),
                };
                sink.lock().push(entry);
            });

            Self {
                client,
                transports,
                log,
            }
        }

        fn transport(&self, index: usize) -> Arc<MemoryTransport> {
            Arc::clone(&self.transports.lock()[index])
        }

        fn open_attempt(&self, index: usize) {
            let transport = self.transport(index);
            transport.open();
            transport.receive(encode_sections(&[Section::new(
                HANDSHAKE_ACK,
                Payload::Bytes(Vec::new()),
            )]));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_only_from_idle() {
        let h = Harness::new(KeepAlive::default());
        h.client.start().expect("start");
        assert_eq!(h.client.state(), ClientState::Connecting);
        assert_eq!(h.transport(0).connect_count(), 1);

        let err = h.client.start().unwrap_err();
        assert!(matches!(err, Error::InvalidState { operation: "start", .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_after_handshake() {
        let h = Harness::new(KeepAlive::default());
        h.client.start().expect("start");

        h.transport(0).open();
        assert_eq!(h.client.state(), ClientState::Connecting);

        h.open_attempt(0);
        assert_eq!(h.client.state(), ClientState::Opened);
        assert_eq!(*h.log.lock(), vec!["open"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_reaches_transport_when_opened() {
        let h = Harness::new(KeepAlive::default());
        h.client.start().expect("start");
        h.open_attempt(0);
        h.transport(0).take_sent();

        h.client.send(json!({"cmd": "PING"}));
        assert_eq!(h.transport(0).sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_previous_transport_cannot_affect_new_attempt() {
        let h = Harness::new(KeepAlive::default());
        h.client.start().expect("start");
        h.open_attempt(0);
        h.transport(0).remote_close();

        sleep(Duration::from_millis(5_001)).await;
        assert_eq!(h.client.attempt(), 2);

        h.transport(0).receive(encode_sections(&[Section::data(json!({"cmd": "OLD"}))]));
        assert_eq!(h.client.state(), ClientState::Connecting);
        assert_eq!(*h.log.lock(), vec!["open"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_receiver_observes_changes() {
        let h = Harness::new(KeepAlive::DISABLED);
        let mut rx = h.client.state_receiver();

        h.client.start().expect("start");
        assert!(rx.has_changed().expect("sender alive"));
        assert_eq!(*rx.borrow_and_update(), ClientState::Connecting);

        h.client.terminate();
        assert_eq!(*rx.borrow_and_update(), ClientState::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_closes_stack() {
        let h = Harness::new(KeepAlive::default());
        h.client.start().expect("start");
        h.open_attempt(0);

        let transport = h.transport(0);
        drop(h);

        assert_eq!(transport.state(), ConnectionState::Closed);
    }
}
