//! Common test utilities: a connector whose sockets are driven by hand

#![allow(dead_code)]

use livescore::client::{Connector, TransportCommand, TransportEvent, TransportPeer, TransportSocket};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

struct ScriptedSocket {
    url: String,
    peer: TransportPeer,
    commands: Vec<TransportCommand>,
    closed_by_server: bool,
}

impl ScriptedSocket {
    fn drain(&mut self) {
        while let Ok(command) = self.peer.commands.try_recv() {
            self.commands.push(command);
        }
    }

    fn close_requested(&mut self) -> bool {
        self.drain();
        self.commands.contains(&TransportCommand::Close)
    }
}

/// Records every socket the manager opens; tests play the server side
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    sockets: Arc<Mutex<Vec<ScriptedSocket>>>,
}

impl Connector for ScriptedConnector {
    fn open(&self, url: &str) -> TransportSocket {
        let (socket, peer) = TransportSocket::pair();
        self.sockets.lock().push(ScriptedSocket {
            url: url.to_string(),
            peer,
            commands: Vec::new(),
            closed_by_server: false,
        });
        socket
    }
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sockets opened so far
    pub fn opened(&self) -> usize {
        self.sockets.lock().len()
    }

    pub fn url(&self, index: usize) -> String {
        self.sockets.lock()[index].url.clone()
    }

    fn emit(&self, index: usize, event: TransportEvent) {
        // The manager may already have stopped listening to a replaced socket
        let _ = self.sockets.lock()[index].peer.events.send(event);
    }

    pub fn open(&self, index: usize) {
        self.emit(index, TransportEvent::Open);
    }

    pub fn message(&self, index: usize, text: &str) {
        self.emit(index, TransportEvent::Message(text.to_string()));
    }

    pub fn message_json(&self, index: usize, frame: Value) {
        self.message(index, &frame.to_string());
    }

    pub fn error(&self, index: usize, description: &str) {
        self.emit(index, TransportEvent::Error(description.to_string()));
    }

    pub fn close(&self, index: usize) {
        self.sockets.lock()[index].closed_by_server = true;
        self.emit(index, TransportEvent::Closed);
    }

    /// Frames written to one socket, decoded as JSON
    pub fn frames(&self, index: usize) -> Vec<Value> {
        let mut sockets = self.sockets.lock();
        let socket = &mut sockets[index];
        socket.drain();
        socket
            .commands
            .iter()
            .filter_map(|command| match command {
                TransportCommand::Send(text) => {
                    Some(serde_json::from_str(text).expect("client wrote invalid JSON"))
                }
                TransportCommand::Close => None,
            })
            .collect()
    }

    /// Frames written to every socket, in socket order
    pub fn all_frames(&self) -> Vec<Value> {
        (0..self.opened()).flat_map(|index| self.frames(index)).collect()
    }

    pub fn close_requested(&self, index: usize) -> bool {
        self.sockets.lock()[index].close_requested()
    }

    /// Sockets neither closed by the server nor asked to close by the client
    pub fn live_sockets(&self) -> usize {
        let mut sockets = self.sockets.lock();
        let mut live = 0;
        for socket in sockets.iter_mut() {
            if !socket.closed_by_server && !socket.close_requested() {
                live += 1;
            }
        }
        live
    }
}

/// Let spawned pump, watcher and timer tasks run
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
