//! Integration tests for the per-consumer subscription facade

mod common;

use common::{settle, ScriptedConnector};
use livescore::client::UpdateKind;
use livescore::{ConnectionManager, GameUpdate, GameUpdates, Interest, LiveConfig};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

fn manager() -> (ConnectionManager, ScriptedConnector) {
    let connector = ScriptedConnector::new();
    (
        ConnectionManager::new(LiveConfig::default(), connector.clone()),
        connector,
    )
}

/// Manager with socket 0 already open
async fn live_manager() -> (ConnectionManager, ScriptedConnector) {
    let (manager, connector) = manager();
    manager.connect();
    connector.open(0);
    settle().await;
    assert!(manager.is_connected());
    (manager, connector)
}

fn update_frame(game_id: &str, kind: &str) -> Value {
    json!({
        "type": "gameUpdate",
        "gameId": game_id,
        "eventType": kind,
        "payload": { "period": 2, "clock": "04:12" },
        "timestamp": "t"
    })
}

fn drain(rx: &mut UnboundedReceiver<GameUpdate>) -> Vec<GameUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    updates
}

#[tokio::test]
async fn test_subscribe_deferred_until_live_then_unsubscribe_once() {
    let (manager, connector) = manager();
    let (mut updates, _rx) = GameUpdates::channel(manager.clone());

    updates.activate(Interest::game("G1"));
    settle().await;
    assert_eq!(manager.metrics().sends_dropped, 0);

    manager.connect();
    settle().await;
    assert!(connector.frames(0).is_empty());

    connector.open(0);
    settle().await;
    settle().await;
    assert_eq!(
        connector.frames(0),
        vec![json!({ "type": "subscribe", "gameId": "G1" })]
    );

    updates.deactivate();
    updates.deactivate();
    assert_eq!(
        connector.frames(0),
        vec![
            json!({ "type": "subscribe", "gameId": "G1" }),
            json!({ "type": "unsubscribe", "gameId": "G1" }),
        ]
    );
    assert_eq!(manager.listener_count(), 0);
}

#[tokio::test]
async fn test_deactivate_before_live_sends_nothing() {
    let (manager, connector) = manager();
    let (mut updates, _rx) = GameUpdates::channel(manager.clone());

    updates.activate(Interest::game("G1"));
    manager.connect();
    updates.deactivate();

    connector.open(0);
    settle().await;

    assert!(connector.frames(0).is_empty());
    assert_eq!(manager.listener_count(), 0);
    assert_eq!(manager.metrics().sends_dropped, 0);
}

#[tokio::test]
async fn test_activate_while_live_subscribes_immediately() {
    let (manager, connector) = live_manager().await;
    let (mut updates, _rx) = GameUpdates::channel(manager.clone());

    updates.activate(Interest::game("G3"));
    assert_eq!(
        connector.frames(0),
        vec![json!({ "type": "subscribe", "gameId": "G3" })]
    );

    settle().await;
    assert_eq!(connector.frames(0).len(), 1);
    assert_eq!(updates.interest(), Some(Interest::game("G3")));
}

#[tokio::test(start_paused = true)]
async fn test_resubscribes_after_reconnect() {
    let (manager, connector) = live_manager().await;
    let (mut updates, _rx) = GameUpdates::channel(manager.clone());
    updates.activate(Interest::game("G1"));

    connector.close(0);
    settle().await;
    tokio::time::advance(Duration::from_secs(1)).await;
    settle().await;
    assert_eq!(connector.opened(), 2);
    assert!(connector.frames(1).is_empty());

    connector.open(1);
    settle().await;
    assert_eq!(
        connector.frames(1),
        vec![json!({ "type": "subscribe", "gameId": "G1" })]
    );
}

#[tokio::test]
async fn test_no_unsubscribe_after_connection_dropped() {
    let (manager, connector) = live_manager().await;
    let (mut updates, _rx) = GameUpdates::channel(manager.clone());
    updates.activate(Interest::All);

    connector.close(0);
    settle().await;
    updates.deactivate();

    assert_eq!(
        connector.frames(0),
        vec![json!({ "type": "subscribe", "all": true })]
    );
    assert_eq!(manager.metrics().sends_dropped, 0);
}

#[tokio::test]
async fn test_all_games_round_trip() {
    let (manager, connector) = live_manager().await;
    let (mut updates, mut rx) = GameUpdates::channel(manager.clone());
    updates.activate(Interest::All);

    connector.message_json(0, update_frame("G9", "pbp"));
    settle().await;

    let expected = GameUpdate {
        game_id: "G9".to_string(),
        event_type: UpdateKind::Pbp,
        payload: json!({ "clock": "04:12", "period": 2 }),
        timestamp: "t".to_string(),
    };
    assert_eq!(drain(&mut rx), vec![expected]);
    assert_eq!(
        connector.frames(0),
        vec![json!({ "type": "subscribe", "all": true })]
    );
}

#[tokio::test]
async fn test_filters_by_game_and_kind() {
    let (manager, connector) = live_manager().await;
    let (mut single, mut single_rx) = GameUpdates::channel(manager.clone());
    single.activate(Interest::game("G1"));

    let (summaries, mut summaries_rx) = GameUpdates::channel(manager.clone());
    let mut summaries = summaries.with_kinds([UpdateKind::Summary]);
    summaries.activate(Interest::All);

    connector.message_json(0, update_frame("G2", "summary"));
    connector.message_json(0, update_frame("G1", "summary"));
    connector.message_json(0, json!({ "type": "subscribed", "gameId": "G1" }));
    connector.message_json(0, update_frame("G1", "pbp"));
    settle().await;

    let single_seen: Vec<(String, UpdateKind)> = drain(&mut single_rx)
        .into_iter()
        .map(|u| (u.game_id, u.event_type))
        .collect();
    assert_eq!(
        single_seen,
        vec![
            ("G1".to_string(), UpdateKind::Summary),
            ("G1".to_string(), UpdateKind::Pbp),
        ]
    );

    let summary_games: Vec<String> = drain(&mut summaries_rx)
        .into_iter()
        .map(|u| u.game_id)
        .collect();
    assert_eq!(summary_games, vec!["G2", "G1"]);
}

#[tokio::test]
async fn test_switching_interest_replaces_listener() {
    let (manager, connector) = live_manager().await;
    let (mut updates, mut rx) = GameUpdates::channel(manager.clone());

    updates.activate(Interest::game("G1"));
    updates.set_interest(Interest::game("G2"));
    assert_eq!(manager.listener_count(), 1);

    updates.set_interest(Interest::All);
    updates.set_interest(Interest::All);
    assert_eq!(manager.listener_count(), 1);

    assert_eq!(
        connector.frames(0),
        vec![
            json!({ "type": "subscribe", "gameId": "G1" }),
            json!({ "type": "unsubscribe", "gameId": "G1" }),
            json!({ "type": "subscribe", "gameId": "G2" }),
            json!({ "type": "unsubscribe", "gameId": "G2" }),
            json!({ "type": "subscribe", "all": true }),
        ]
    );

    connector.message_json(0, update_frame("G1", "summary"));
    settle().await;
    assert_eq!(drain(&mut rx).len(), 1, "delivered once, by the current listener");
}

#[tokio::test]
async fn test_drop_deactivates() {
    let (manager, connector) = live_manager().await;
    let (mut updates, mut rx) = GameUpdates::channel(manager.clone());
    updates.activate(Interest::game("G5"));
    settle().await;

    drop(updates);

    assert_eq!(manager.listener_count(), 0);
    assert_eq!(
        connector.frames(0).last(),
        Some(&json!({ "type": "unsubscribe", "gameId": "G5" }))
    );

    connector.message_json(0, update_frame("G5", "summary"));
    settle().await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_callback_receives_updates_in_order() {
    let (manager, connector) = live_manager().await;
    let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));

    let sink = seen.clone();
    let mut updates = GameUpdates::new(manager.clone(), move |update: GameUpdate| {
        sink.lock().push(update.payload["seq"].as_u64().unwrap_or_default());
    });
    updates.activate(Interest::game("G8"));

    for seq in 1..=5u64 {
        connector.message_json(
            0,
            json!({
                "type": "gameUpdate",
                "gameId": "G8",
                "eventType": "pbp",
                "payload": { "seq": seq },
                "timestamp": format!("t{}", seq)
            }),
        );
    }
    settle().await;

    assert_eq!(*seen.lock(), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_unknown_event_type_is_filtered_not_a_parse_error() {
    let (manager, connector) = live_manager().await;
    let (mut updates, mut rx) = GameUpdates::channel(manager.clone());
    updates.activate(Interest::All);

    connector.message_json(0, update_frame("G4", "boxscore"));
    connector.message_json(0, update_frame("G4", "summary"));
    settle().await;

    let kinds: Vec<UpdateKind> = drain(&mut rx).into_iter().map(|u| u.event_type).collect();
    assert_eq!(kinds, vec![UpdateKind::Summary]);
    assert_eq!(manager.metrics().parse_errors, 0);
    assert_eq!(manager.metrics().frames_received, 2);
}
