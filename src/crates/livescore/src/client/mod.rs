//! Live update client: transport, connection manager and subscription facade.

pub mod backoff;
pub mod manager;
pub mod messages;
pub mod metrics;
pub mod registry;
pub mod transport;
pub mod updates;

pub use backoff::{ReconnectPolicy, RetryState};
pub use manager::{
    ConnectionManager, ConnectionState, ConnectionStatus, StatusIndicator, WeakConnectionManager,
};
pub use messages::{ClientMessage, GameUpdate, ServerMessage, SubscriptionTarget, UpdateKind};
pub use metrics::{ConnectionMetrics, MetricsSnapshot};
pub use registry::{ListenerHandle, ListenerId, ListenerRegistry};
pub use transport::{
    Connector, TransportCommand, TransportEvent, TransportPeer, TransportSocket,
    WebSocketConnector,
};
pub use updates::{GameUpdates, Interest, UpdateCallback};
