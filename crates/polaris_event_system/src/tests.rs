use crate::*;
use polaris_protocol::PacketLayer;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct ScoreChanged {
    player: String,
    score: u32,
}

fn sample_custom_packet() -> CustomPacketEvent {
    CustomPacketEvent {
        layer: PacketLayer::GameData,
        opcode: 0x50,
        packet_type: "TestGameDataPacket".to_string(),
        connection_id: 7,
        lobby_code: Some(0x1234),
        net_id: None,
        payload: vec![0x05, b'w', b'o', b'r', b'l', b'd'],
        timestamp: current_timestamp(),
    }
}

#[tokio::test]
async fn test_core_event_reaches_every_handler() {
    let events = EventSystem::new();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for tag in ["first", "second"] {
        let seen = seen.clone();
        events
            .on_core("custom_packet", move |event: CustomPacketEvent| {
                seen.lock().unwrap().push((tag, event.opcode, event.lobby_code));
                Ok(())
            })
            .await
            .unwrap();
    }

    events.emit_core("custom_packet", &sample_custom_packet()).await.unwrap();

    let mut seen = seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec![("first", 0x50, Some(0x1234)), ("second", 0x50, Some(0x1234))]);
    assert_eq!(events.handler_count("core:custom_packet"), 2);
}

#[tokio::test]
async fn test_plugin_events_are_namespaced() {
    let events = EventSystem::new();
    let received = Arc::new(Mutex::new(None));

    let received_clone = received.clone();
    events
        .on_plugin("scoreboard", "score_changed", move |event: ScoreChanged| {
            *received_clone.lock().unwrap() = Some(event);
            Ok(())
        })
        .await
        .unwrap();

    let event = ScoreChanged {
        player: "Rose".into(),
        score: 3,
    };
    events.emit_plugin("other", "score_changed", &event).await.unwrap();
    assert!(received.lock().unwrap().is_none());

    events.emit_plugin("scoreboard", "score_changed", &event).await.unwrap();
    assert_eq!(received.lock().unwrap().clone(), Some(event));
}

#[tokio::test]
async fn test_failing_handler_does_not_stop_others() {
    let events = EventSystem::new();
    let ran = Arc::new(Mutex::new(false));

    events
        .on_core("server_ready", |_: ServerReadyEvent| {
            Err(EventError::HandlerExecution("boom".into()))
        })
        .await
        .unwrap();

    let ran_clone = ran.clone();
    events
        .on_core("server_ready", move |_: ServerReadyEvent| {
            *ran_clone.lock().unwrap() = true;
            Ok(())
        })
        .await
        .unwrap();

    let result = events
        .emit_core(
            "server_ready",
            &ServerReadyEvent {
                bind_address: "127.0.0.1:22023".into(),
                plugin_count: 1,
                timestamp: current_timestamp(),
            },
        )
        .await;

    assert!(result.is_ok());
    assert!(*ran.lock().unwrap());

    let stats = events.get_stats().await;
    assert_eq!(stats.total_handlers, 2);
    assert_eq!(stats.events_emitted, 1);
    assert_eq!(stats.handler_failures, 1);
}

#[tokio::test]
async fn test_mismatched_handler_type_is_skipped() {
    let events = EventSystem::new();
    let ran = Arc::new(Mutex::new(false));

    let ran_clone = ran.clone();
    events
        .on_core("plugin_loaded", move |_: ScoreChanged| {
            *ran_clone.lock().unwrap() = true;
            Ok(())
        })
        .await
        .unwrap();

    events
        .emit_core(
            "plugin_loaded",
            &PluginLoadedEvent {
                name: "example".into(),
                version: PluginVersion::new(1, 0, 0).to_string(),
                source: "plugins/example.npplugin".into(),
                timestamp: current_timestamp(),
            },
        )
        .await
        .unwrap();

    assert!(!*ran.lock().unwrap());
    assert_eq!(events.get_stats().await.handler_failures, 0);
}

#[tokio::test]
async fn test_emit_without_handlers_is_counted() {
    let events = EventSystem::new();
    events.emit_core("custom_packet", &sample_custom_packet()).await.unwrap();

    let stats = events.get_stats().await;
    assert_eq!(stats.events_emitted, 0);
    assert_eq!(stats.events_without_handlers, 1);
}

#[tokio::test]
async fn test_restore_handlers_drops_later_registrations() {
    let events = EventSystem::new();
    events
        .on_core("custom_packet", |_: CustomPacketEvent| Ok(()))
        .await
        .unwrap();
    let snapshot = events.handler_snapshot();

    events
        .on_core("custom_packet", |_: CustomPacketEvent| Ok(()))
        .await
        .unwrap();
    events
        .on_plugin("scoreboard", "score_changed", |_: ScoreChanged| Ok(()))
        .await
        .unwrap();
    assert_eq!(events.get_stats().await.total_handlers, 3);

    events.restore_handlers(&snapshot).await;

    assert_eq!(events.handler_count("core:custom_packet"), 1);
    assert_eq!(events.handler_count("plugin:scoreboard:score_changed"), 0);
    assert_eq!(events.get_stats().await.total_handlers, 1);
}
