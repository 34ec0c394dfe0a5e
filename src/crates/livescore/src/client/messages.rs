//! Wire frames exchanged with the live update server.
//!
//! Every frame is a JSON object tagged by `type`. Subscription frames name
//! either one game (`gameId`) or every game (`all: true`).

use crate::error::{LiveError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a subscription frame refers to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTarget", into = "RawTarget")]
pub enum SubscriptionTarget {
    /// One game
    Game(String),
    /// Every game
    All,
}

/// Flat wire shape of a target: `{"gameId": "..."}` or `{"all": true}`
#[derive(Clone, Serialize, Deserialize)]
struct RawTarget {
    #[serde(rename = "gameId", default, skip_serializing_if = "Option::is_none")]
    game_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    all: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl TryFrom<RawTarget> for SubscriptionTarget {
    type Error = LiveError;

    fn try_from(raw: RawTarget) -> Result<Self> {
        match (raw.all, raw.game_id) {
            (true, _) => Ok(SubscriptionTarget::All),
            (false, Some(game_id)) => Ok(SubscriptionTarget::Game(game_id)),
            (false, None) => Err(LiveError::Protocol(
                "subscription frame names neither gameId nor all".to_string(),
            )),
        }
    }
}

impl From<SubscriptionTarget> for RawTarget {
    fn from(target: SubscriptionTarget) -> Self {
        match target {
            SubscriptionTarget::Game(game_id) => RawTarget {
                game_id: Some(game_id),
                all: false,
            },
            SubscriptionTarget::All => RawTarget {
                game_id: None,
                all: true,
            },
        }
    }
}

/// Client -> server frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Start receiving updates for a target
    Subscribe(SubscriptionTarget),
    /// Stop receiving updates for a target
    Unsubscribe(SubscriptionTarget),
}

impl ClientMessage {
    /// Subscribe to one game
    pub fn subscribe(game_id: impl Into<String>) -> Self {
        ClientMessage::Subscribe(SubscriptionTarget::Game(game_id.into()))
    }

    /// Subscribe to every game
    pub fn subscribe_all() -> Self {
        ClientMessage::Subscribe(SubscriptionTarget::All)
    }

    /// Unsubscribe from one game
    pub fn unsubscribe(game_id: impl Into<String>) -> Self {
        ClientMessage::Unsubscribe(SubscriptionTarget::Game(game_id.into()))
    }

    /// Unsubscribe from every game
    pub fn unsubscribe_all() -> Self {
        ClientMessage::Unsubscribe(SubscriptionTarget::All)
    }

    /// Encode as a text frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Kind of game update carried by a `gameUpdate` frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    /// Box-score summary
    Summary,
    /// Play-by-play
    Pbp,
    /// Any kind this client does not know; never forwarded to consumers
    #[serde(other)]
    Unknown,
}

impl UpdateKind {
    /// Every kind the server sends
    pub const ALL: [UpdateKind; 2] = [UpdateKind::Summary, UpdateKind::Pbp];

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateKind::Summary => "summary",
            UpdateKind::Pbp => "pbp",
            UpdateKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateKind {
    type Err = LiveError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "summary" => Ok(UpdateKind::Summary),
            "pbp" => Ok(UpdateKind::Pbp),
            other => Err(LiveError::Protocol(format!(
                "unknown update kind '{}' (expected summary or pbp)",
                other
            ))),
        }
    }
}

/// Real-time update for one game
///
/// `payload` is forwarded exactly as the server sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameUpdate {
    /// Game the update belongs to
    pub game_id: String,
    /// Summary or play-by-play
    pub event_type: UpdateKind,
    /// Opaque update body
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Server timestamp, passed through untouched
    pub timestamp: String,
}

/// Server -> client frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Subscription acknowledged
    Subscribed(SubscriptionTarget),
    /// Unsubscription acknowledged
    Unsubscribed(SubscriptionTarget),
    /// Server-side error report
    Error {
        /// Error description
        error: String,
    },
    /// Game update
    GameUpdate(GameUpdate),
}

impl ServerMessage {
    /// Decode a text frame
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Frame tag as it appears on the wire
    pub fn message_type(&self) -> &'static str {
        match self {
            ServerMessage::Subscribed(_) => "subscribed",
            ServerMessage::Unsubscribed(_) => "unsubscribed",
            ServerMessage::Error { .. } => "error",
            ServerMessage::GameUpdate(_) => "gameUpdate",
        }
    }
}
