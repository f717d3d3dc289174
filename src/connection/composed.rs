//! Generic wrapping layer.
//!
//! A [`ComposedConnection`] owns exactly one inner connection and mirrors
//! its lifecycle according to a [`Mirror`] value chosen at construction.
//! Payloads are converted on the way down by [`Layer::transform`] and on
//! the way up by [`Layer::detransform`].
//!
//! A layer that disables a mirrored notification drives that transition
//! itself through [`ComposedConnection::on_open`] and friends, typically
//! from [`Layer::on_inner_event`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::Error;

use super::Connection;
use super::lifecycle::{ConnectionEvent, Lifecycle, Listener};

// ============================================================================
// Mirror
// ============================================================================

/// Which inner notifications are mirrored onto the composed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mirror {
    /// Inner open opens this layer.
    pub open: bool,
    /// Inner close closes this layer.
    pub close: bool,
    /// Inner error fails this layer.
    pub error: bool,
    /// Inner messages are detransformed and re-emitted.
    pub message: bool,
}

impl Mirror {
    /// Mirror every notification.
    pub const ALL: Self = Self {
        open: true,
        close: true,
        error: true,
        message: true,
    };

    /// Stops mirroring inner open.
    #[inline]
    #[must_use]
    pub const fn without_open(mut self) -> Self {
        self.open = false;
        self
    }

    /// Stops mirroring inner messages.
    #[inline]
    #[must_use]
    pub const fn without_message(mut self) -> Self {
        self.message = false;
        self
    }
}

impl Default for Mirror {
    fn default() -> Self {
        Self::ALL
    }
}

// ============================================================================
// Layer
// ============================================================================

/// Payload type of a layer's inner connection.
pub type InnerMessage<L> = <<L as Layer>::Inner as Connection>::Message;

/// Behaviour plugged into a [`ComposedConnection`].
pub trait Layer: Send + Sync + Sized + 'static {
    /// Connection type wrapped by this layer.
    type Inner: Connection + ?Sized;

    /// Payload type exposed by this layer.
    type Message: Send + Sync + 'static;

    /// Converts an outgoing payload for the inner connection.
    fn transform(&self, data: Self::Message) -> InnerMessage<Self>;

    /// Converts an incoming inner payload. `None` suppresses the message.
    fn detransform(&self, data: &InnerMessage<Self>) -> Option<Self::Message>;

    /// Observes every inner notification before it is mirrored.
    fn on_inner_event(
        &self,
        _connection: &ComposedConnection<Self>,
        _event: ConnectionEvent<'_, InnerMessage<Self>>,
    ) {
    }

    /// Runs once when the composed connection reaches `closed`.
    fn on_closed(&self, _connection: &ComposedConnection<Self>) {}
}

// ============================================================================
// ComposedConnection
// ============================================================================

/// Connection layer wrapping one inner connection.
pub struct ComposedConnection<L: Layer> {
    /// Weak self reference handed to timers and subscriptions.
    me: Weak<Self>,
    /// This layer's own lifecycle.
    lifecycle: Lifecycle<L::Message>,
    /// The wrapped connection.
    inner: Arc<L::Inner>,
    /// Layer hooks.
    layer: L,
    /// Mirrored notifications.
    mirror: Mirror,
}

impl<L: Layer> fmt::Debug for ComposedConnection<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComposedConnection")
            .field("state", &self.lifecycle.state())
            .field("inner_state", &self.inner.state())
            .field("mirror", &self.mirror)
            .finish_non_exhaustive()
    }
}

impl<L: Layer> ComposedConnection<L> {
    /// Wraps `inner` and subscribes to its notifications.
    ///
    /// The inner connection should have been created immediately before;
    /// notifications it raised earlier are not replayed.
    pub fn new(inner: Arc<L::Inner>, layer: L, mirror: Mirror) -> Arc<Self> {
        let connection = Arc::new_cyclic(|me| Self {
            me: Weak::clone(me),
            lifecycle: Lifecycle::new(),
            inner,
            layer,
            mirror,
        });

        let weak = Weak::clone(&connection.me);
        let listener: Listener<InnerMessage<L>> =
            Arc::new(move |event: ConnectionEvent<'_, InnerMessage<L>>| {
                if let Some(connection) = weak.upgrade() {
                    connection.handle_inner(event);
                }
            });
        connection.inner.subscribe(listener);

        connection
    }

    /// Returns the wrapped connection.
    #[inline]
    #[must_use]
    pub fn inner(&self) -> &Arc<L::Inner> {
        &self.inner
    }

    /// Returns the layer hooks.
    #[inline]
    #[must_use]
    pub fn layer(&self) -> &L {
        &self.layer
    }

    /// Returns the mirroring configuration.
    #[inline]
    #[must_use]
    pub fn mirror(&self) -> Mirror {
        self.mirror
    }

    /// Returns a weak reference to this connection.
    #[inline]
    #[must_use]
    pub fn downgrade(&self) -> Weak<Self> {
        Weak::clone(&self.me)
    }

    /// Opens this layer. See [`Lifecycle::on_open`].
    pub fn on_open(&self) -> bool {
        self.lifecycle.on_open()
    }

    /// Closes this layer. See [`Lifecycle::on_close`].
    pub fn on_close(&self) -> bool {
        let closed = self.lifecycle.on_close();
        if closed {
            self.layer.on_closed(self);
        }
        closed
    }

    /// Fails this layer. See [`Lifecycle::on_error`].
    pub fn on_error(&self, error: &Error) -> bool {
        let closed = self.lifecycle.on_error(error);
        if closed {
            self.layer.on_closed(self);
        }
        closed
    }

    /// Emits a message. See [`Lifecycle::on_message`].
    pub fn on_message(&self, message: &L::Message) -> bool {
        self.lifecycle.on_message(message)
    }

    /// Routes one inner notification.
    fn handle_inner(&self, event: ConnectionEvent<'_, InnerMessage<L>>) {
        self.layer.on_inner_event(self, event);

        match event {
            ConnectionEvent::Open if self.mirror.open => {
                self.on_open();
            }
            ConnectionEvent::Close if self.mirror.close => {
                self.on_close();
            }
            ConnectionEvent::Error(error) if self.mirror.error => {
                self.on_error(error);
            }
            ConnectionEvent::Message(data) if self.mirror.message => {
                if let Some(message) = self.layer.detransform(data) {
                    self.on_message(&message);
                }
            }
            _ => {}
        }
    }
}

impl<L: Layer> Connection for ComposedConnection<L> {
    type Message = L::Message;

    fn lifecycle(&self) -> &Lifecycle<L::Message> {
        &self.lifecycle
    }

    fn request_send(&self, data: L::Message) {
        self.inner.send(self.layer.transform(data));
    }

    fn request_close(&self) {
        self.inner.close();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    use crate::connection::ConnectionState;

    /// Inner connection carrying raw bytes.
    #[derive(Default)]
    struct Wire {
        lifecycle: Lifecycle<Vec<u8>>,
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl Connection for Wire {
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

    /// UTF-8 text over bytes; empty frames are suppressed.
    #[derive(Default)]
    struct Text {
        closed_hooks: Mutex<u32>,
        inner_events: Mutex<u32>,
    }

    impl Layer for Text {
        type Inner = Wire;
        type Message = String;

        fn transform(&self, data: String) -> Vec<u8> {
            data.into_bytes()
        }

        fn detransform(&self, data: &Vec<u8>) -> Option<String> {
            if data.is_empty() {
                return None;
            }
            String::from_utf8(data.clone()).ok()
        }

        fn on_inner_event(&self, _: &ComposedConnection<Self>, _: ConnectionEvent<'_, Vec<u8>>) {
            *self.inner_events.lock() += 1;
        }

        fn on_closed(&self, _: &ComposedConnection<Self>) {
            *self.closed_hooks.lock() += 1;
        }
    }

    fn collect(connection: &ComposedConnection<Text>) -> Arc<Mutex<Vec<String>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        connection.subscribe(Arc::new(move |event: ConnectionEvent<'_, String>| {
            let entry = match event {
                ConnectionEvent::Open => "open".to_string(),
                ConnectionEvent::Close => "close".to_string(),
                ConnectionEvent::Error(_) => "error".to_string(),
                ConnectionEvent::Message(text) => format!("message:{text}"),
            };
            sink.lock().push(entry);
        }));
        log
    }

    #[test]
    fn test_mirrors_lifecycle_and_transforms() {
        let wire = Arc::new(Wire::default());
        let text = ComposedConnection::new(Arc::clone(&wire), Text::default(), Mirror::ALL);
        let log = collect(&text);

        wire.lifecycle.on_open();
        assert_eq!(text.state(), ConnectionState::Opened);

        text.send("hi".to_string());
        assert_eq!(*wire.sent.lock(), vec![b"hi".to_vec()]);

        wire.lifecycle.on_message(&b"yo".to_vec());
        wire.lifecycle.on_message(&Vec::new());

        assert_eq!(*log.lock(), vec!["open", "message:yo"]);
    }

    #[test]
    fn test_disabled_open_is_not_mirrored() {
        let wire = Arc::new(Wire::default());
        let text = ComposedConnection::new(
            Arc::clone(&wire),
            Text::default(),
            Mirror::ALL.without_open(),
        );

        wire.lifecycle.on_open();
        assert_eq!(text.state(), ConnectionState::Opening);
        assert_eq!(*text.layer().inner_events.lock(), 1);

        assert!(text.on_open());
        assert_eq!(text.state(), ConnectionState::Opened);
    }

    #[test]
    fn test_close_propagates_down_and_back_up() {
        let wire = Arc::new(Wire::default());
        let text = ComposedConnection::new(Arc::clone(&wire), Text::default(), Mirror::ALL);
        let log = collect(&text);

        wire.lifecycle.on_open();
        text.close();

        assert_eq!(wire.state(), ConnectionState::Closed);
        assert_eq!(text.state(), ConnectionState::Closed);
        assert_eq!(*text.layer().closed_hooks.lock(), 1);
        assert_eq!(*log.lock(), vec!["open", "close"]);
    }

    #[test]
    fn test_inner_error_mirrored_once() {
        let wire = Arc::new(Wire::default());
        let text = ComposedConnection::new(Arc::clone(&wire), Text::default(), Mirror::ALL);
        let log = collect(&text);

        wire.lifecycle.on_open();
        wire.lifecycle.on_error(&Error::connection("reset"));

        assert_eq!(*log.lock(), vec!["open", "error", "close"]);
        assert_eq!(*text.layer().closed_hooks.lock(), 1);
    }

    #[test]
    fn test_dropped_layer_ignores_inner_events() {
        let wire = Arc::new(Wire::default());
        let text = ComposedConnection::new(Arc::clone(&wire), Text::default(), Mirror::ALL);
        drop(text);

        assert!(wire.lifecycle.on_open());
    }
}
