//! Connection manager for the shared live update socket.
//!
//! One manager owns at most one transport socket at a time. It runs the
//! reconnect state machine, fans parsed frames out to registered listeners and
//! publishes its status on a watch channel so subscribers can react to the
//! connection going live.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected (reconnect armed) -> Connecting ...
//!                                          \-> GivenUp (retry budget spent)
//! ```
//!
//! The manager is a cheap `Clone` handle; every clone drives the same
//! connection. `connect()` and the other operations need a tokio runtime
//! (socket pumps and reconnect timers are spawned tasks) but never block.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::backoff::RetryState;
use crate::client::messages::{ClientMessage, ServerMessage, UpdateKind};
use crate::client::metrics::{ConnectionMetrics, MetricsSnapshot};
use crate::client::registry::{ListenerHandle, ListenerRegistry};
use crate::client::transport::{Connector, TransportCommand, TransportEvent, WebSocketConnector};
use crate::config::LiveConfig;

/// Longest slice of a rejected frame echoed into the logs
const MAX_LOGGED_FRAME_CHARS: usize = 200;

/// Lifecycle state of the shared connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Retry budget spent; only an explicit `connect()` recovers
    GivenUp,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::GivenUp => "given up",
        };
        f.write_str(name)
    }
}

/// User-facing connection indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusIndicator {
    /// Live
    Connected,
    /// Not live after an error or a dropped connection, or retries exhausted
    ConnectionLost,
    /// Not live, nothing went wrong yet
    Idle,
}

impl fmt::Display for StatusIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StatusIndicator::Connected => "Connected",
            StatusIndicator::ConnectionLost => "Connection lost",
            StatusIndicator::Idle => "Idle",
        };
        f.write_str(label)
    }
}

/// Snapshot of the connection published on every transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    /// Current state
    pub state: ConnectionState,
    /// Number of successful opens so far; changes on every (re)connect
    pub epoch: u64,
    /// Reconnects scheduled since the last successful open
    pub attempts: u32,
    /// Last transport error, cleared on a successful open
    pub last_error: Option<String>,
    /// When the current connection opened
    pub connected_at: Option<DateTime<Utc>>,
}

impl ConnectionStatus {
    fn initial() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            epoch: 0,
            attempts: 0,
            last_error: None,
            connected_at: None,
        }
    }

    /// Check if the connection is live
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Indicator shown to the user for this status
    pub fn indicator(&self) -> StatusIndicator {
        match self.state {
            ConnectionState::Connected => StatusIndicator::Connected,
            ConnectionState::GivenUp => StatusIndicator::ConnectionLost,
            _ if self.attempts > 0 || self.last_error.is_some() => {
                StatusIndicator::ConnectionLost
            }
            _ => StatusIndicator::Idle,
        }
    }
}

/// Mutable connection state, guarded by the manager's lock
struct Connection {
    state: ConnectionState,
    retry: RetryState,
    epoch: u64,
    /// Identifies the current socket; events tagged with an older value are stale
    generation: u64,
    connected_at: Option<DateTime<Utc>>,
    writer: Option<mpsc::UnboundedSender<TransportCommand>>,
    pump: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

impl Connection {
    fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            retry: RetryState::new(),
            epoch: 0,
            generation: 0,
            connected_at: None,
            writer: None,
            pump: None,
            reconnect: None,
        }
    }

    fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            epoch: self.epoch,
            attempts: self.retry.attempts,
            last_error: self.retry.last_error.clone(),
            connected_at: self.connected_at,
        }
    }

    /// Ask the current socket to close and stop pumping its events
    fn release_transport(&mut self) -> bool {
        let had_transport = self.writer.is_some() || self.pump.is_some();
        if let Some(writer) = self.writer.take() {
            let _ = writer.send(TransportCommand::Close);
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        had_transport
    }

    fn cancel_reconnect(&mut self) -> bool {
        match self.reconnect.take() {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }
}

struct Shared {
    config: LiveConfig,
    connector: Box<dyn Connector>,
    connection: Mutex<Connection>,
    listeners: Arc<ListenerRegistry>,
    metrics: ConnectionMetrics,
    status: watch::Sender<ConnectionStatus>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let connection = self.connection.get_mut();
        connection.cancel_reconnect();
        connection.release_transport();
    }
}

/// Owner of the single shared live update connection
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

/// Non-owning reference to a [`ConnectionManager`]
#[derive(Clone)]
pub struct WeakConnectionManager {
    shared: Weak<Shared>,
}

impl WeakConnectionManager {
    /// Get the manager back if it is still alive
    pub fn upgrade(&self) -> Option<ConnectionManager> {
        self.shared.upgrade().map(|shared| ConnectionManager { shared })
    }
}

impl ConnectionManager {
    /// Create a manager that opens sockets through `connector`
    pub fn new<C: Connector>(config: LiveConfig, connector: C) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::initial());

        Self {
            shared: Arc::new(Shared {
                config,
                connector: Box::new(connector),
                connection: Mutex::new(Connection::new()),
                listeners: Arc::new(ListenerRegistry::new()),
                metrics: ConnectionMetrics::new(),
                status,
            }),
        }
    }

    /// Create a manager backed by a real WebSocket
    pub fn websocket(config: LiveConfig) -> Self {
        Self::new(config, WebSocketConnector)
    }

    /// Get the configuration
    pub fn config(&self) -> &LiveConfig {
        &self.shared.config
    }

    /// Non-owning handle, for tasks that must not keep the manager alive
    pub fn downgrade(&self) -> WeakConnectionManager {
        WeakConnectionManager {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Start connecting
    ///
    /// No-op while connecting or connected. From `GivenUp` this starts a fresh
    /// retry budget.
    pub fn connect(&self) {
        let mut conn = self.shared.connection.lock();

        match conn.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                debug!("connect() ignored, connection is {}", conn.state);
                return;
            }
            ConnectionState::GivenUp => {
                info!("Reconnecting after giving up");
                conn.retry.attempts = 0;
            }
            ConnectionState::Disconnected => {}
        }

        conn.cancel_reconnect();
        self.open_transport(&mut conn);
    }

    /// Close the connection and cancel any pending reconnect
    ///
    /// Safe to call from any state and any number of times.
    pub fn disconnect(&self) {
        let mut conn = self.shared.connection.lock();

        let cancelled = conn.cancel_reconnect();
        let closed = conn.release_transport();
        let was = conn.state;

        conn.retry.attempts = 0;
        conn.generation += 1;
        conn.connected_at = None;
        conn.state = ConnectionState::Disconnected;

        if cancelled || closed || was != ConnectionState::Disconnected {
            info!("Disconnected from {}", self.shared.config.ws_url);
        }

        self.publish(&conn);
    }

    /// Tear the manager down: disconnect and drop every listener
    ///
    /// The manager can still be reconnected afterwards; previously returned
    /// listener handles no longer remove anything.
    pub fn shutdown(&self) {
        self.disconnect();
        let dropped = self.shared.listeners.len();
        self.shared.listeners.clear();
        debug!("Shut down, dropped {} listeners", dropped);
    }

    /// Write a frame if connected; otherwise drop it with a warning
    ///
    /// Returns whether the frame was written. Nothing is queued for later.
    pub fn send(&self, message: &ClientMessage) -> bool {
        self.send_tracked(message).is_some()
    }

    /// Like `send`, returning the epoch the frame was written in
    pub(crate) fn send_tracked(&self, message: &ClientMessage) -> Option<u64> {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode {:?}: {}", message, e);
                return None;
            }
        };

        {
            let conn = self.shared.connection.lock();
            if conn.state == ConnectionState::Connected {
                if let Some(writer) = &conn.writer {
                    if writer.send(TransportCommand::Send(text)).is_ok() {
                        self.shared.metrics.record_frame_sent();
                        debug!("Sent {:?}", message);
                        return Some(conn.epoch);
                    }
                }
            }
        }

        warn!("WebSocket is not connected, message not sent: {:?}", message);
        self.shared.metrics.record_send_dropped();
        None
    }

    /// Subscribe to updates for one game
    pub fn subscribe(&self, game_id: &str) -> bool {
        self.send(&ClientMessage::subscribe(game_id))
    }

    /// Subscribe to updates for every game
    pub fn subscribe_all(&self) -> bool {
        self.send(&ClientMessage::subscribe_all())
    }

    /// Unsubscribe from one game
    pub fn unsubscribe(&self, game_id: &str) -> bool {
        self.send(&ClientMessage::unsubscribe(game_id))
    }

    /// Unsubscribe from every game
    pub fn unsubscribe_all(&self) -> bool {
        self.send(&ClientMessage::unsubscribe_all())
    }

    /// Register a listener for every parsed inbound frame
    ///
    /// Listeners run synchronously on the socket's event task, in arrival
    /// order. The registration lasts until the handle is removed or dropped.
    pub fn add_message_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&ServerMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.listeners.add(listener)
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.len()
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.shared.status.borrow().state
    }

    /// Check if the connection is live
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Last transport error, if any since the last successful open
    pub fn last_error(&self) -> Option<String> {
        self.shared.status.borrow().last_error.clone()
    }

    /// Current status snapshot
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.borrow().clone()
    }

    /// Receiver that observes every status change
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Counter snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    fn open_transport(&self, conn: &mut Connection) {
        conn.release_transport();
        conn.generation += 1;
        conn.state = ConnectionState::Connecting;

        let generation = conn.generation;
        info!("Connecting to {}", self.shared.config.ws_url);

        let (writer, events) = self
            .shared
            .connector
            .open(&self.shared.config.ws_url)
            .into_parts();
        conn.writer = Some(writer);
        conn.pump = Some(tokio::spawn(pump_events(
            self.downgrade(),
            generation,
            events,
        )));

        self.publish(conn);
    }

    fn handle_event(&self, generation: u64, event: TransportEvent) {
        match event {
            TransportEvent::Open => {
                let mut conn = self.shared.connection.lock();
                if conn.generation != generation {
                    return;
                }

                conn.state = ConnectionState::Connected;
                conn.retry.reset();
                conn.epoch += 1;
                conn.connected_at = Some(Utc::now());
                self.shared.metrics.record_connection();
                info!(
                    "Connected to {} (connection #{})",
                    self.shared.config.ws_url, conn.epoch
                );

                self.publish(&conn);
            }
            TransportEvent::Message(text) => {
                if self.shared.connection.lock().generation != generation {
                    return;
                }
                self.shared.metrics.record_frame_received();
                self.dispatch(generation, &text);
            }
            TransportEvent::Error(description) => {
                let mut conn = self.shared.connection.lock();
                if conn.generation != generation {
                    return;
                }

                warn!("WebSocket connection error: {}", description);
                conn.retry.record_error(description);
                self.publish(&conn);
            }
            TransportEvent::Closed => self.handle_close(generation),
        }
    }

    fn handle_close(&self, generation: u64) {
        let mut conn = self.shared.connection.lock();
        if conn.generation != generation {
            return;
        }

        // Called from the pump task itself, so detach rather than abort
        conn.writer = None;
        conn.pump = None;
        conn.connected_at = None;

        let policy = &self.shared.config.reconnect;
        if policy.should_retry(conn.retry.attempts) {
            let delay = policy.backoff_delay(conn.retry.attempts);
            conn.retry.record_attempt();
            conn.state = ConnectionState::Disconnected;
            conn.cancel_reconnect();

            let manager = self.downgrade();
            conn.reconnect = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(manager) = manager.upgrade() {
                    manager.fire_reconnect(generation);
                }
            }));

            self.shared.metrics.record_reconnect_scheduled();
            info!(
                "Connection closed, reconnect {}/{} in {:?}",
                conn.retry.attempts, policy.max_attempts, delay
            );
        } else {
            conn.state = ConnectionState::GivenUp;
            warn!(
                "Connection closed, giving up after {} reconnect attempts",
                conn.retry.attempts
            );
        }

        self.publish(&conn);
    }

    fn fire_reconnect(&self, generation: u64) {
        let mut conn = self.shared.connection.lock();

        // Superseded by connect() or cancelled by disconnect()
        if conn.generation != generation || conn.state != ConnectionState::Disconnected {
            return;
        }

        conn.reconnect = None;
        self.open_transport(&mut conn);
    }

    /// Deliver one frame from the socket tagged `generation`
    ///
    /// Delivery stops between listeners once that socket is no longer
    /// current, so a `disconnect()` racing an in-flight frame cuts it short.
    fn dispatch(&self, generation: u64, text: &str) {
        let message = match ServerMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                let excerpt: String = text.chars().take(MAX_LOGGED_FRAME_CHARS).collect();
                error!("Failed to parse WebSocket message: {} ({})", e, excerpt);
                self.shared.metrics.record_parse_error();
                return;
            }
        };

        match &message {
            ServerMessage::Error { error } => warn!("Server reported error: {}", error),
            ServerMessage::GameUpdate(update) if update.event_type == UpdateKind::Unknown => {
                debug!("Update for {} has an unrecognized event type", update.game_id)
            }
            _ => {}
        }

        let failures = self
            .shared
            .listeners
            .dispatch_while(&message, || self.is_current(generation));
        self.shared.metrics.record_listener_failures(failures);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.shared.connection.lock().generation == generation
    }

    fn publish(&self, conn: &Connection) {
        let next = conn.status();
        self.shared.status.send_if_modified(|current| {
            if *current != next {
                *current = next;
                true
            } else {
                false
            }
        });
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.shared.config.ws_url)
            .field("status", &*self.shared.status.borrow())
            .field("listeners", &self.shared.listeners.len())
            .finish()
    }
}

/// Feed one socket's events into the manager until it closes
async fn pump_events(
    manager: WeakConnectionManager,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    loop {
        // A connector that drops its sender has closed the socket
        let event = events.recv().await.unwrap_or(TransportEvent::Closed);
        let closed = event == TransportEvent::Closed;

        match manager.upgrade() {
            Some(manager) => manager.handle_event(generation, event),
            None => break,
        }

        if closed {
            break;
        }
    }
}
