//! Handshake and heartbeat layer.
//!
//! Wraps a [`SectionConnection`] and exposes the application JSON payloads
//! carried by `data` sections. This layer only counts as opened once the
//! server acknowledged the handshake.
//!
//! # Lifecycle
//!
//! | Inner notification | Own state | Action |
//! |--------------------|-----------|--------|
//! | open | `opening` | send handshake, arm handshake timeout |
//! | `handshake-ack` | `opening` | open, start heartbeats |
//! | `data` | `opened` | emit the JSON payload |
//! | `heartbeat-ack` | `opened` | log popularity |
//! | close / error | any | mirrored, timers cancelled |
//!
//! A handshake timeout closes the layer without raising an error.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, trace, warn};

use crate::connection::{
    ComposedConnection, Connection, ConnectionEvent, ConnectionState, Layer, Mirror,
};
use crate::protocol::{DATA, HANDSHAKE_ACK, HEARTBEAT_ACK, Section};

use super::section::SectionConnection;

// ============================================================================
// Constants
// ============================================================================

/// Default time allowed between sending the handshake and its ack.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default period between heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default delay before the first heartbeat.
pub const DEFAULT_HEARTBEAT_DELAY: Duration = Duration::from_secs(1);

/// Notifications mirrored from the section layer.
///
/// Open is driven by the handshake ack and messages by `data` sections.
pub const DATA_MIRROR: Mirror = Mirror::ALL.without_open().without_message();

// ============================================================================
// Types
// ============================================================================

/// Connection exchanging application JSON payloads.
pub type DataConnection = ComposedConnection<DataProtocol>;

/// One timer slot holding at most one scheduled task.
type TimerSlot = Mutex<Option<AbortHandle>>;

// ============================================================================
// DataTiming
// ============================================================================

/// Timer settings of the data layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataTiming {
    /// Time allowed between sending the handshake and receiving its ack.
    pub handshake_timeout: Duration,
    /// Period between heartbeats.
    pub heartbeat_interval: Duration,
    /// Delay between the handshake ack and the first heartbeat.
    pub heartbeat_delay: Duration,
}

impl Default for DataTiming {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_delay: DEFAULT_HEARTBEAT_DELAY,
        }
    }
}

// ============================================================================
// DataProtocol
// ============================================================================

/// Layer hooks implementing the handshake and heartbeat protocol.
pub struct DataProtocol {
    /// JSON body of the handshake section.
    handshake: Value,
    /// Timer settings.
    timing: DataTiming,
    /// Pending handshake timeout.
    handshake_timer: TimerSlot,
    /// Running heartbeat task.
    heartbeat_timer: TimerSlot,
}

impl fmt::Debug for DataProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataProtocol")
            .field("handshake", &self.handshake)
            .field("timing", &self.timing)
            .field("handshake_armed", &self.handshake_timer.lock().is_some())
            .field("heartbeat_armed", &self.heartbeat_timer.lock().is_some())
            .finish()
    }
}

impl DataProtocol {
    /// Creates the layer hooks.
    #[must_use]
    pub fn new(handshake: Value, timing: DataTiming) -> Self {
        Self {
            handshake,
            timing,
            handshake_timer: Mutex::new(None),
            heartbeat_timer: Mutex::new(None),
        }
    }

    /// Returns the handshake payload.
    #[inline]
    #[must_use]
    pub fn handshake(&self) -> &Value {
        &self.handshake
    }

    /// Returns the timer settings.
    #[inline]
    #[must_use]
    pub fn timing(&self) -> DataTiming {
        self.timing
    }

    /// Wraps `sections` with this protocol.
    #[must_use]
    pub fn wrap(self, sections: Arc<SectionConnection>) -> Arc<DataConnection> {
        ComposedConnection::new(sections, self, DATA_MIRROR)
    }

    // ------------------------------------------------------------------------
    // Inner events
    // ------------------------------------------------------------------------

    /// Sends the handshake and arms its timeout.
    fn begin_handshake(&self, connection: &DataConnection) {
        if connection.state() != ConnectionState::Opening {
            return;
        }

        debug!("Sending handshake");
        connection
            .inner()
            .send(vec![Section::handshake(self.handshake.clone())]);

        let weak = connection.downgrade();
        let timeout = self.timing.handshake_timeout;
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            expire_handshake(&weak, timeout);
        });
        arm(&self.handshake_timer, &task);
    }

    /// Processes one inbound section in the current state.
    fn handle_section(&self, connection: &DataConnection, section: &Section) {
        match connection.state() {
            ConnectionState::Opening if section.is(&HANDSHAKE_ACK) => {
                if connection.on_open() {
                    debug!("Handshake acknowledged");
                    disarm(&self.handshake_timer);

                    // an open listener may already have closed the layer
                    if connection.state() == ConnectionState::Opened {
                        self.start_heartbeat(connection);
                    }
                }
            }
            ConnectionState::Opened if section.is(&DATA) => {
                if let Some(value) = section.payload().as_json() {
                    connection.on_message(value);
                }
            }
            ConnectionState::Opened if section.is(&HEARTBEAT_ACK) => {
                log_heartbeat_ack(section);
            }
            state => {
                trace!(
                    %state,
                    section = section.coder().name,
                    "Ignoring section"
                );
            }
        }
    }

    /// Starts the heartbeat task.
    fn start_heartbeat(&self, connection: &DataConnection) {
        let DataTiming {
            heartbeat_interval,
            heartbeat_delay,
            ..
        } = self.timing;

        if heartbeat_interval.is_zero() {
            warn!("Heartbeat interval is zero, heartbeats disabled");
            return;
        }

        let weak = connection.downgrade();
        let task = tokio::spawn(async move {
            tokio::time::sleep(heartbeat_delay).await;

            let mut ticker = tokio::time::interval(heartbeat_interval);
            loop {
                ticker.tick().await;

                let Some(connection) = weak.upgrade() else {
                    break;
                };
                if connection.state() != ConnectionState::Opened {
                    break;
                }

                trace!("Sending heartbeat");
                connection.inner().send(vec![Section::heartbeat()]);
            }
        });
        arm(&self.heartbeat_timer, &task);
    }
}

impl Layer for DataProtocol {
    type Inner = SectionConnection;
    type Message = Value;

    fn transform(&self, data: Value) -> Vec<Section> {
        vec![Section::data(data)]
    }

    fn detransform(&self, _data: &Vec<Section>) -> Option<Value> {
        None
    }

    fn on_inner_event(
        &self,
        connection: &DataConnection,
        event: ConnectionEvent<'_, Vec<Section>>,
    ) {
        match event {
            ConnectionEvent::Open => self.begin_handshake(connection),
            ConnectionEvent::Message(sections) => {
                for section in sections {
                    self.handle_section(connection, section);
                }
            }
            ConnectionEvent::Close | ConnectionEvent::Error(_) => {}
        }
    }

    fn on_closed(&self, _connection: &DataConnection) {
        disarm(&self.handshake_timer);
        disarm(&self.heartbeat_timer);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Closes the layer if the handshake is still unacknowledged.
fn expire_handshake(weak: &Weak<DataConnection>, timeout: Duration) {
    let Some(connection) = weak.upgrade() else {
        return;
    };

    if connection.state() == ConnectionState::Opening {
        warn!(?timeout, "Handshake timed out");
        connection.close();
    }
}

/// Logs the popularity counter carried by a heartbeat ack.
fn log_heartbeat_ack(section: &Section) {
    match section.payload().as_bytes() {
        Some([a, b, c, d, ..]) => {
            let popularity = u32::from_be_bytes([*a, *b, *c, *d]);
            debug!(popularity, "Heartbeat acknowledged");
        }
        _ => debug!("Heartbeat acknowledged"),
    }
}

/// Stores `task` in `slot`, aborting the task it replaces.
fn arm(slot: &TimerSlot, task: &JoinHandle<()>) {
    if let Some(previous) = slot.lock().replace(task.abort_handle()) {
        previous.abort();
    }
}

/// Aborts the task held by `slot`, if any.
fn disarm(slot: &TimerSlot) {
    if let Some(handle) = slot.lock().take() {
        handle.abort();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio::time::sleep;

    use crate::error::Error;
    use crate::layer::section::SectionCodec;
    use crate::protocol::{
        DEFAULT_CODERS, HANDSHAKE, HEARTBEAT, Payload, decode_sections, encode_sections,
    };
    use crate::transport::MemoryTransport;

    struct Fixture {
        transport: Arc<MemoryTransport>,
        data: Arc<DataConnection>,
        log: Arc<Mutex<Vec<String>>>,
    }

    fn fixture() -> Fixture {
        let transport = MemoryTransport::new();
        let sections = SectionCodec::connection(transport.clone());
        let data = DataProtocol::new(json!({"roomId": 1}), DataTiming::default()).wrap(sections);

        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        data.subscribe(Arc::new(move |event: ConnectionEvent<'_, Value>| {
            let entry = match event {
                ConnectionEvent::Open => "open".to_string(),
                ConnectionEvent::Close => "close".to_string(),
                ConnectionEvent::Error(_) => "error".to_string(),
                ConnectionEvent::Message(value) => format!("message:{value}"),
            };
            sink.lock().push(entry);
        }));

        Fixture {
            transport,
            data,
            log,
        }
    }

    fn ack() -> Section {
        Section::new(HANDSHAKE_ACK, Payload::Bytes(br#"{"code":0}"#.to_vec()))
    }

    fn sent_sections(transport: &MemoryTransport) -> Vec<Section> {
        transport
            .sent()
            .iter()
            .flat_map(|frame| decode_sections(&DEFAULT_CODERS, frame))
            .collect()
    }

    fn heartbeats(transport: &MemoryTransport) -> usize {
        sent_sections(transport)
            .iter()
            .filter(|s| s.is(&HEARTBEAT))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_sent_when_transport_opens() {
        let f = fixture();
        f.transport.open();

        let sent = sent_sections(&f.transport);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].is(&HANDSHAKE));
        assert_eq!(sent[0].payload().as_json(), Some(&json!({"roomId": 1})));

        assert_eq!(f.data.state(), ConnectionState::Opening);
        assert!(f.log.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_opens_and_data_follows_in_order() {
        let f = fixture();
        f.transport.open();
        f.transport.receive(encode_sections(&[
            ack(),
            Section::data(json!({"cmd": "A"})),
            Section::data(json!({"cmd": "B"})),
        ]));

        assert_eq!(f.data.state(), ConnectionState::Opened);
        assert_eq!(
            *f.log.lock(),
            vec![
                "open",
                r#"message:{"cmd":"A"}"#,
                r#"message:{"cmd":"B"}"#
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_before_ack_is_dropped() {
        let f = fixture();
        f.transport.open();
        f.transport
            .receive(encode_sections(&[Section::data(json!({"cmd": "early"}))]));
        f.transport.receive(encode_sections(&[ack()]));

        assert_eq!(*f.log.lock(), vec!["open"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout_closes_without_error() {
        let f = fixture();
        f.transport.open();

        sleep(Duration::from_millis(4_999)).await;
        assert_eq!(f.data.state(), ConnectionState::Opening);

        sleep(Duration::from_millis(2)).await;
        assert_eq!(f.data.state(), ConnectionState::Closed);
        assert_eq!(f.transport.state(), ConnectionState::Closed);
        assert_eq!(*f.log.lock(), vec!["close"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_cancels_handshake_timeout() {
        let f = fixture();
        f.transport.open();

        sleep(Duration::from_secs(4)).await;
        f.transport.receive(encode_sections(&[ack()]));
        sleep(Duration::from_secs(10)).await;

        assert_eq!(f.data.state(), ConnectionState::Opened);
        assert_eq!(*f.log.lock(), vec!["open"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_cadence_and_stop_on_close() {
        let f = fixture();
        f.transport.open();
        f.transport.receive(encode_sections(&[ack()]));
        f.transport.take_sent();

        sleep(Duration::from_millis(999)).await;
        assert_eq!(heartbeats(&f.transport), 0);

        sleep(Duration::from_millis(2)).await;
        assert_eq!(heartbeats(&f.transport), 1);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(heartbeats(&f.transport), 2);

        f.data.close();
        assert_eq!(f.data.state(), ConnectionState::Closed);

        sleep(Duration::from_secs(120)).await;
        assert_eq!(heartbeats(&f.transport), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_wraps_payload_in_data_section() {
        let f = fixture();
        f.transport.open();
        f.data.send(json!({"dropped": true}));
        f.transport.receive(encode_sections(&[ack()]));
        f.transport.take_sent();

        f.data.send(json!({"cmd": "SEND"}));

        assert_eq!(
            sent_sections(&f.transport),
            vec![Section::data(json!({"cmd": "SEND"}))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_ack_keeps_state() {
        let f = fixture();
        f.transport.open();
        f.transport.receive(encode_sections(&[
            ack(),
            Section::new(HEARTBEAT_ACK, Payload::Bytes(vec![0, 0, 1, 0])),
            Section::new(HEARTBEAT_ACK, Payload::Bytes(vec![7])),
        ]));

        assert_eq!(f.data.state(), ConnectionState::Opened);
        assert_eq!(*f.log.lock(), vec!["open"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_mirrored() {
        let f = fixture();
        f.transport.open();
        f.transport.receive(encode_sections(&[ack()]));
        f.transport.fail(Error::connection("reset"));

        assert_eq!(f.data.state(), ConnectionState::Closed);
        assert_eq!(*f.log.lock(), vec!["open", "error", "close"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_close_before_ack() {
        let f = fixture();
        f.transport.open();
        f.transport.remote_close();

        assert_eq!(f.data.state(), ConnectionState::Closed);
        assert_eq!(*f.log.lock(), vec!["close"]);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(*f.log.lock(), vec!["close"]);
    }
}
