//! Transport socket: one raw bidirectional text connection.
//!
//! A socket is opened synchronously and reports its lifecycle through
//! [`TransportEvent`]s, the way a browser WebSocket reports open, message,
//! error and close. Outbound frames and the close request travel the other way
//! as [`TransportCommand`]s. [`WebSocketConnector`] backs this with
//! `tokio-tungstenite`; tests plug in their own [`Connector`].

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::error::LiveError;

/// Lifecycle and data events reported by a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection established
    Open,
    /// Text frame received
    Message(String),
    /// Transport failure; a `Closed` event follows when the socket goes down
    Error(String),
    /// Socket closed, by either side
    Closed,
}

/// Requests sent to a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Write a text frame
    Send(String),
    /// Close the connection
    Close,
}

/// Client half of an opened socket
#[derive(Debug)]
pub struct TransportSocket {
    commands: mpsc::UnboundedSender<TransportCommand>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Connector half of an opened socket: drives events, consumes commands
#[derive(Debug)]
pub struct TransportPeer {
    /// Commands written by the client
    pub commands: mpsc::UnboundedReceiver<TransportCommand>,
    /// Events delivered to the client
    pub events: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportSocket {
    /// Create a connected socket/peer pair
    pub fn pair() -> (TransportSocket, TransportPeer) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        (
            TransportSocket {
                commands: command_tx,
                events: event_rx,
            },
            TransportPeer {
                commands: command_rx,
                events: event_tx,
            },
        )
    }

    /// Split into the command writer and the event stream
    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<TransportCommand>,
        mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        (self.commands, self.events)
    }
}

/// Opens transport sockets
///
/// `open` must not block: connection establishment happens in the background
/// and is reported with `Open` or `Error` + `Closed`.
pub trait Connector: Send + Sync + 'static {
    /// Start opening a socket to `url`
    fn open(&self, url: &str) -> TransportSocket;
}

/// WebSocket connector backed by tokio-tungstenite
///
/// Requires a running tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn open(&self, url: &str) -> TransportSocket {
        let (socket, peer) = TransportSocket::pair();
        tokio::spawn(run_websocket(url.to_string(), peer));
        socket
    }
}

/// Drive one WebSocket connection until either side closes it
async fn run_websocket(url: String, mut peer: TransportPeer) {
    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            let err = LiveError::Transport(format!("Failed to connect to {}: {}", url, e));
            let _ = peer.events.send(TransportEvent::Error(err.to_string()));
            let _ = peer.events.send(TransportEvent::Closed);
            return;
        }
    };

    info!("WebSocket connected to {}", url);
    if peer.events.send(TransportEvent::Open).is_err() {
        return;
    }

    let (mut sink, mut stream) = stream.split();

    loop {
        tokio::select! {
            command = peer.commands.recv() => match command {
                Some(TransportCommand::Send(text)) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        let _ = peer.events.send(TransportEvent::Error(
                            LiveError::Transport(format!("Failed to send frame: {}", e)).to_string(),
                        ));
                        break;
                    }
                }
                Some(TransportCommand::Close) | None => {
                    debug!("Closing WebSocket to {}", url);
                    let _ = sink.close().await;
                    break;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if peer.events.send(TransportEvent::Message(text)).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => {
                        if peer.events.send(TransportEvent::Message(text)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Dropping non-UTF-8 binary frame: {}", e);
                        let _ = peer.events.send(TransportEvent::Error(
                            LiveError::Protocol(format!("binary frame is not UTF-8: {}", e)).to_string(),
                        ));
                    }
                },
                Some(Ok(Message::Ping(data))) => {
                    let _ = sink.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!("WebSocket closed by server: {:?}", frame);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = peer.events.send(TransportEvent::Error(
                        LiveError::Transport(e.to_string()).to_string(),
                    ));
                    break;
                }
                None => break,
            },
        }
    }

    let _ = peer.events.send(TransportEvent::Closed);
}
