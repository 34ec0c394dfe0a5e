//! Per-consumer subscription facade.
//!
//! A [`GameUpdates`] holds one consumer's interest (a single game or every
//! game), keeps the server subscription for it alive across reconnects and
//! narrows the broadcast frames down to the updates that consumer asked for.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::client::manager::{ConnectionManager, ConnectionStatus, WeakConnectionManager};
use crate::client::messages::{ClientMessage, GameUpdate, ServerMessage, UpdateKind};
use crate::client::registry::ListenerHandle;

/// What a consumer wants updates for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Interest {
    Game(String),
    All,
}

impl Interest {
    /// Interest in one game
    pub fn game(game_id: impl Into<String>) -> Self {
        Interest::Game(game_id.into())
    }

    /// Check if an update falls under this interest
    pub fn matches(&self, update: &GameUpdate) -> bool {
        match self {
            Interest::Game(game_id) => update.game_id == *game_id,
            Interest::All => true,
        }
    }

    fn subscribe_message(&self) -> ClientMessage {
        match self {
            Interest::Game(game_id) => ClientMessage::subscribe(game_id.clone()),
            Interest::All => ClientMessage::subscribe_all(),
        }
    }

    fn unsubscribe_message(&self) -> ClientMessage {
        match self {
            Interest::Game(game_id) => ClientMessage::unsubscribe(game_id.clone()),
            Interest::All => ClientMessage::unsubscribe_all(),
        }
    }
}

impl fmt::Display for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interest::Game(game_id) => write!(f, "game {}", game_id),
            Interest::All => f.write_str("all games"),
        }
    }
}

/// Consumer callback for matching updates
pub type UpdateCallback = Arc<dyn Fn(GameUpdate) + Send + Sync>;

struct Activation {
    interest: Interest,
    active: bool,
    /// Epoch of the connection the subscribe frame went out on
    subscribed_epoch: Option<u64>,
}

struct ActiveInterest {
    state: Arc<Mutex<Activation>>,
    listener: ListenerHandle,
    watcher: JoinHandle<()>,
}

/// Subscription facade for one consumer
///
/// Dropping the facade deactivates it.
pub struct GameUpdates {
    manager: ConnectionManager,
    on_update: UpdateCallback,
    kinds: Vec<UpdateKind>,
    current: Option<ActiveInterest>,
}

impl GameUpdates {
    /// Create an inactive facade delivering to `on_update`
    pub fn new<F>(manager: ConnectionManager, on_update: F) -> Self
    where
        F: Fn(GameUpdate) + Send + Sync + 'static,
    {
        Self {
            manager,
            on_update: Arc::new(on_update),
            kinds: UpdateKind::ALL.to_vec(),
            current: None,
        }
    }

    /// Create an inactive facade delivering into a channel
    pub fn channel(manager: ConnectionManager) -> (Self, mpsc::UnboundedReceiver<GameUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let updates = Self::new(manager, move |update| {
            let _ = tx.send(update);
        });
        (updates, rx)
    }

    /// Only forward the given update kinds from the next activation on
    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = UpdateKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    /// Current interest, if active
    pub fn interest(&self) -> Option<Interest> {
        self.current
            .as_ref()
            .map(|current| current.state.lock().interest.clone())
    }

    /// Check if an interest is active
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Start receiving updates for `interest`
    ///
    /// Subscribes now if the connection is live, otherwise as soon as it goes
    /// live, and again after every reconnect. Activating the interest that is
    /// already active does nothing; a different interest replaces it.
    pub fn activate(&mut self, interest: Interest) {
        if self.interest().as_ref() == Some(&interest) {
            return;
        }
        self.deactivate();

        debug!("Activating interest in {}", interest);

        let state = Arc::new(Mutex::new(Activation {
            interest: interest.clone(),
            active: true,
            subscribed_epoch: None,
        }));

        let kinds = self.kinds.clone();
        let on_update = self.on_update.clone();
        let listener = self.manager.add_message_listener(move |message| {
            if let ServerMessage::GameUpdate(update) = message {
                if kinds.contains(&update.event_type) && interest.matches(update) {
                    on_update(update.clone());
                }
            }
            Ok(())
        });

        if self.manager.is_connected() {
            subscribe_once(&self.manager, &state);
        }

        let watcher = tokio::spawn(replay_on_connect(
            self.manager.downgrade(),
            self.manager.watch_status(),
            state.clone(),
        ));

        self.current = Some(ActiveInterest {
            state,
            listener,
            watcher,
        });
    }

    /// Switch to a different interest
    pub fn set_interest(&mut self, interest: Interest) {
        self.activate(interest);
    }

    /// Stop receiving updates
    ///
    /// Sends the unsubscribe only when the connection is live and the
    /// subscribe went out on this same connection. Idempotent.
    pub fn deactivate(&mut self) {
        let Some(current) = self.current.take() else {
            return;
        };
        current.watcher.abort();

        {
            let mut activation = current.state.lock();
            activation.active = false;

            if let Some(epoch) = activation.subscribed_epoch.take() {
                let status = self.manager.status();
                if status.is_connected() && status.epoch == epoch {
                    self.manager.send(&activation.interest.unsubscribe_message());
                }
            }
            debug!("Deactivated interest in {}", activation.interest);
        }

        current.listener.remove();
    }
}

impl Drop for GameUpdates {
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl fmt::Debug for GameUpdates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameUpdates")
            .field("interest", &self.interest())
            .field("kinds", &self.kinds)
            .finish()
    }
}

/// Send the subscribe frame unless it already went out on the current connection
fn subscribe_once(manager: &ConnectionManager, state: &Mutex<Activation>) {
    let mut activation = state.lock();
    if !activation.active {
        return;
    }

    let epoch = manager.status().epoch;
    if activation.subscribed_epoch == Some(epoch) {
        return;
    }

    if let Some(sent_in) = manager.send_tracked(&activation.interest.subscribe_message()) {
        activation.subscribed_epoch = Some(sent_in);
    }
}

async fn replay_on_connect(
    manager: WeakConnectionManager,
    mut status: watch::Receiver<ConnectionStatus>,
    state: Arc<Mutex<Activation>>,
) {
    loop {
        let connected = status.borrow_and_update().is_connected();
        if connected {
            match manager.upgrade() {
                Some(manager) => subscribe_once(&manager, &state),
                None => break,
            }
        }

        if status.changed().await.is_err() {
            break;
        }
    }
}
