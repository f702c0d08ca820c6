use chrono::Utc;
use collabspace_common::{
    protocol::ws::{ClientEvent, OperationRecord, ServerEvent},
    types::{MediaType, RoomKey, RoomKind},
};
use serde_json::{json, Value};
use uuid::Uuid;

const HUB_WS_SOURCE: &str = include_str!("../src/ws/mod.rs");
const HUB_CONFIG_SOURCE: &str = include_str!("../src/config.rs");

#[test]
fn websocket_contract_frame_limit_matches_spec() {
    let max_frame_bytes = parse_u64_const(HUB_WS_SOURCE, "MAX_FRAME_BYTES");
    assert_eq!(max_frame_bytes, 262_144);
}

#[test]
fn websocket_contract_default_tuning_matches_spec() {
    assert!(HUB_CONFIG_SOURCE.contains("unwrap_or(300)"), "presence TTL default must be 300 s");
    assert!(HUB_CONFIG_SOURCE.contains("unwrap_or(100)"), "operation log cap default must be 100");
    assert!(
        HUB_CONFIG_SOURCE.contains("unwrap_or(15_000)"),
        "heartbeat interval default must be 15 s",
    );
    assert!(
        HUB_CONFIG_SOURCE.contains("unwrap_or(60_000)"),
        "idle timeout default must be 60 s",
    );
}

#[test]
fn client_event_wire_names_match_contract() {
    let user_id = Uuid::new_v4();
    let samples: Vec<(ClientEvent, &str)> = vec![
        (
            ClientEvent::RoomJoin { room_kind: RoomKind::Document, room_id: "doc-1".into() },
            "room.join",
        ),
        (
            ClientEvent::RoomLeave { room_kind: RoomKind::Meeting, room_id: "standup".into() },
            "room.leave",
        ),
        (
            ClientEvent::DocumentOperation {
                room_id: "doc-1".into(),
                operation: json!({"op": "insert"}),
                version: Some(1),
            },
            "document.operation",
        ),
        (
            ClientEvent::DocumentCursor { room_id: "doc-1".into(), cursor: json!({"pos": 3}) },
            "document.cursor",
        ),
        (
            ClientEvent::DocumentSelection {
                room_id: "doc-1".into(),
                selection: json!({"anchor": 1, "head": 4}),
            },
            "document.selection",
        ),
        (ClientEvent::TypingStart { room_id: "doc-1".into() }, "typing.start"),
        (ClientEvent::TypingStop { room_id: "doc-1".into() }, "typing.stop"),
        (
            ClientEvent::MediaToggle {
                room_id: "standup".into(),
                media_type: MediaType::Audio,
                enabled: false,
            },
            "meeting.media-toggle",
        ),
        (
            ClientEvent::ChatMessage { room_id: "standup".into(), text: "hi".into() },
            "meeting.chat-message",
        ),
        (
            ClientEvent::WebrtcOffer {
                target_user_id: user_id,
                payload: json!({"sdp": "v=0"}),
                room_id: "standup".into(),
            },
            "webrtc.offer",
        ),
        (
            ClientEvent::WebrtcAnswer {
                target_user_id: user_id,
                payload: json!({"sdp": "v=0"}),
                room_id: "standup".into(),
            },
            "webrtc.answer",
        ),
        (
            ClientEvent::WebrtcIceCandidate {
                target_user_id: user_id,
                payload: json!({"candidate": ""}),
                room_id: "standup".into(),
            },
            "webrtc.ice-candidate",
        ),
        (ClientEvent::DocumentCatchUp { room_id: "doc-1".into() }, "document.catch-up"),
        (ClientEvent::Heartbeat, "heartbeat"),
    ];

    for (event, expected_type) in samples {
        let value = serde_json::to_value(&event).expect("client event should serialize");
        assert_eq!(value["type"], expected_type);
        let parsed: ClientEvent =
            serde_json::from_value(value).expect("client event should deserialize");
        assert_eq!(parsed, event);
    }
}

#[test]
fn server_events_are_enriched_with_sender_identity() {
    let from_user_id = Uuid::new_v4();
    let samples: Vec<ServerEvent> = vec![
        ServerEvent::DocumentOperation {
            room_id: "doc-1".into(),
            operation: json!({"op": "insert"}),
            version: Some(1),
            from_user_id,
            from_display_name: "Alice".into(),
            timestamp: Utc::now(),
        },
        ServerEvent::CollaboratorCursor {
            room_id: "doc-1".into(),
            cursor: json!({"pos": 5}),
            from_user_id,
            from_display_name: "Alice".into(),
            timestamp: Utc::now(),
        },
        ServerEvent::MediaToggle {
            room_id: "standup".into(),
            media_type: MediaType::Video,
            enabled: true,
            from_user_id,
            from_display_name: "Alice".into(),
            timestamp: Utc::now(),
        },
        ServerEvent::WebrtcOffer {
            room_id: "standup".into(),
            payload: json!({"sdp": "v=0"}),
            from_user_id,
            from_display_name: "Alice".into(),
        },
    ];

    for event in samples {
        let value = serde_json::to_value(&event).expect("server event should serialize");
        assert!(value.get("from_user_id").is_some(), "`{}` must carry from_user_id", value["type"]);
        assert!(
            value.get("from_display_name").is_some(),
            "`{}` must carry from_display_name",
            value["type"],
        );
    }
}

#[test]
fn chat_message_carries_a_server_assigned_id() {
    let event = ServerEvent::ChatMessage {
        id: Uuid::new_v4(),
        room_id: "standup".into(),
        text: "hello".into(),
        from_user_id: Uuid::new_v4(),
        from_display_name: "Alice".into(),
        timestamp: Utc::now(),
    };

    let value = serde_json::to_value(&event).expect("chat event should serialize");
    assert_eq!(value["type"], "meeting.chat-message");
    assert!(value.get("id").is_some());
}

#[test]
fn membership_snapshot_embeds_the_room_key() {
    let event = ServerEvent::RoomMembers {
        room: RoomKey::document("doc-1"),
        members: Vec::new(),
    };

    let value = serde_json::to_value(&event).expect("snapshot should serialize");
    assert_eq!(value["type"], "room.members");
    assert_eq!(value["room"]["kind"], "document");
    assert_eq!(value["room"]["id"], "doc-1");
}

#[test]
fn history_reply_round_trips_operation_records() {
    let record = OperationRecord {
        room_id: "doc-1".into(),
        operation: json!({"op": "insert", "pos": 5, "text": "hi"}),
        version: Some(7),
        submitted_by: Uuid::new_v4(),
        timestamp: Utc::now(),
    };
    let event =
        ServerEvent::DocumentHistory { room_id: "doc-1".into(), operations: vec![record.clone()] };

    let value = serde_json::to_value(&event).expect("history should serialize");
    assert_eq!(value["type"], "document.history");
    let parsed: ServerEvent =
        serde_json::from_value(value).expect("history should deserialize");
    let ServerEvent::DocumentHistory { operations, .. } = parsed else {
        panic!("round trip should preserve the variant");
    };
    assert_eq!(operations, vec![record]);
}

#[test]
fn raw_browser_frames_decode_into_typed_events() {
    let raw = json!({
        "type": "room.join",
        "room_kind": "document",
        "room_id": "doc-1",
    });
    let event: ClientEvent =
        serde_json::from_value(raw).expect("raw join frame should decode");
    assert_eq!(
        event,
        ClientEvent::RoomJoin { room_kind: RoomKind::Document, room_id: "doc-1".into() },
    );

    let raw = json!({"type": "heartbeat"});
    let event: ClientEvent =
        serde_json::from_value(raw).expect("raw heartbeat frame should decode");
    assert_eq!(event, ClientEvent::Heartbeat);
}

fn object_keys(value: &Value) -> Vec<String> {
    let mut keys =
        value.as_object().expect("value should be an object").keys().cloned().collect::<Vec<_>>();
    keys.sort();
    keys
}

#[test]
fn optional_fields_are_omitted_when_absent() {
    let operation = ClientEvent::DocumentOperation {
        room_id: "doc-1".into(),
        operation: json!({"op": "del"}),
        version: None,
    };
    let value = serde_json::to_value(operation).expect("operation should serialize");
    assert!(!object_keys(&value).contains(&"version".to_string()));
}

fn parse_u64_const(source: &str, name: &str) -> u64 {
    let needle = format!("const {name}:");
    let index = source.find(&needle).expect("constant must be declared");
    let line = source[index..].lines().next().expect("constant declaration line must exist");
    let value = line
        .split('=')
        .nth(1)
        .expect("constant declaration must have a value")
        .trim()
        .trim_end_matches(';');
    value.replace('_', "").parse().expect("constant must be a u64")
}
