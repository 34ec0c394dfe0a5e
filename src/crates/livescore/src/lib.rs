//! Real-time game update client.
//!
//! One [`ConnectionManager`] owns a single WebSocket to the live update server
//! and multiplexes any number of per-game or all-games subscriptions over it.
//! Each consumer talks to the manager through its own [`GameUpdates`] facade,
//! which replays its subscription after every reconnect.
//!
//! ```no_run
//! use livescore::{ConnectionManager, GameUpdates, Interest, LiveConfig};
//!
//! # async fn run() -> livescore::Result<()> {
//! let manager = ConnectionManager::websocket(LiveConfig::from_env()?);
//! manager.connect();
//!
//! let (mut updates, mut rx) = GameUpdates::channel(manager.clone());
//! updates.activate(Interest::game("401585601"));
//!
//! while let Some(update) = rx.recv().await {
//!     println!("{} {}", update.game_id, update.event_type);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;

pub use client::{
    ClientMessage, ConnectionManager, ConnectionState, ConnectionStatus, Connector, GameUpdate,
    GameUpdates, Interest, ListenerHandle, MetricsSnapshot, ReconnectPolicy, ServerMessage,
    StatusIndicator, UpdateKind, WebSocketConnector,
};
pub use config::LiveConfig;
pub use error::{LiveError, Result};
