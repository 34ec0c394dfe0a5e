//! Message listener registry
//!
//! Listeners are keyed by a registration id, so registering the same callback
//! twice yields two independent registrations. Delivery works on a snapshot of
//! the registry: listeners may add or remove registrations (including their
//! own) while a frame is being delivered, and one listener failing or
//! panicking never stops delivery to the rest.

use dashmap::DashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::error;
use uuid::Uuid;

use crate::client::messages::ServerMessage;

/// Callback invoked for every parsed inbound frame
pub type Listener = Arc<dyn Fn(&ServerMessage) -> anyhow::Result<()> + Send + Sync>;

/// Unique id of one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Set of registered listeners
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: DashMap<ListenerId, Listener>,
}

impl ListenerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; the returned handle removes it
    pub fn add<F>(self: &Arc<Self>, listener: F) -> ListenerHandle
    where
        F: Fn(&ServerMessage) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = ListenerId::new();
        self.listeners.insert(id, Arc::new(listener));

        ListenerHandle {
            id,
            registry: Some(Arc::downgrade(self)),
        }
    }

    /// Remove a registration, returning whether it was present
    pub fn remove(&self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Check if a registration is present
    pub fn contains(&self, id: ListenerId) -> bool {
        self.listeners.contains_key(&id)
    }

    /// Number of registrations
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Check if there are no registrations
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Drop every registration; outstanding handles become no-ops
    pub fn clear(&self) {
        self.listeners.clear();
    }

    /// Deliver a message to every listener, returning how many failed
    pub fn dispatch(&self, message: &ServerMessage) -> usize {
        self.dispatch_while(message, || true)
    }

    /// Like `dispatch`, but stop as soon as `live` returns false
    ///
    /// `live` is checked before each listener runs.
    pub fn dispatch_while<F>(&self, message: &ServerMessage, mut live: F) -> usize
    where
        F: FnMut() -> bool,
    {
        let snapshot: Vec<(ListenerId, Listener)> = self
            .listeners
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut failures = 0;
        for (id, listener) in snapshot {
            if !live() {
                break;
            }

            // Removed by an earlier listener during this delivery
            if !self.contains(id) {
                continue;
            }

            match catch_unwind(AssertUnwindSafe(|| listener(message))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    error!(listener = %id, "Message listener failed on {}: {:#}", message.message_type(), e);
                }
                Err(panic) => {
                    failures += 1;
                    error!(
                        listener = %id,
                        "Message listener panicked on {}: {}",
                        message.message_type(),
                        panic_message(panic.as_ref())
                    );
                }
            }
        }

        failures
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// De-registration capability for one listener
///
/// Dropping the handle removes the registration.
#[must_use = "dropping the handle immediately removes the listener"]
pub struct ListenerHandle {
    id: ListenerId,
    registry: Option<Weak<ListenerRegistry>>,
}

impl ListenerHandle {
    /// Registration id
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Remove the registration now, returning whether it was still present
    pub fn remove(mut self) -> bool {
        self.release()
    }

    fn release(&mut self) -> bool {
        match self.registry.take().and_then(|registry| registry.upgrade()) {
            Some(registry) => registry.remove(self.id),
            None => false,
        }
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle").field("id", &self.id).finish()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.release();
    }
}
