// WebSocket event types for the collabspace-hub.v1 protocol.
//
// Every frame is a JSON object tagged by `type`. Client events carry no
// identity fields — the hub stamps `from_user_id`/`from_display_name` from
// the verified connection identity on the way out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::{MediaType, RoomKey, RoomKind};

/// Events a client may send to the hub.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Join a room, creating it if this is the first member.
    #[serde(rename = "room.join")]
    RoomJoin { room_kind: RoomKind, room_id: String },

    /// Leave a room. Safe to send for a room the connection never joined.
    #[serde(rename = "room.leave")]
    RoomLeave { room_kind: RoomKind, room_id: String },

    /// A document edit, relayed to the other collaborators and appended to
    /// the bounded catch-up log. The payload is opaque to the hub.
    #[serde(rename = "document.operation")]
    DocumentOperation {
        room_id: String,
        operation: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<i64>,
    },

    /// Cursor position update.
    #[serde(rename = "document.cursor")]
    DocumentCursor { room_id: String, cursor: Value },

    /// Selection range update.
    #[serde(rename = "document.selection")]
    DocumentSelection { room_id: String, selection: Value },

    #[serde(rename = "typing.start")]
    TypingStart { room_id: String },

    #[serde(rename = "typing.stop")]
    TypingStop { room_id: String },

    /// Toggle a meeting media track on or off.
    #[serde(rename = "meeting.media-toggle")]
    MediaToggle { room_id: String, media_type: MediaType, enabled: bool },

    /// Meeting chat message; delivered to the full room including the sender.
    #[serde(rename = "meeting.chat-message")]
    ChatMessage { room_id: String, text: String },

    /// WebRTC offer, relayed opaquely to one specific user.
    #[serde(rename = "webrtc.offer")]
    WebrtcOffer { target_user_id: Uuid, payload: Value, room_id: String },

    /// WebRTC answer, relayed opaquely to one specific user.
    #[serde(rename = "webrtc.answer")]
    WebrtcAnswer { target_user_id: Uuid, payload: Value, room_id: String },

    /// ICE candidate, relayed opaquely to one specific user.
    #[serde(rename = "webrtc.ice-candidate")]
    WebrtcIceCandidate { target_user_id: Uuid, payload: Value, room_id: String },

    /// Request the recent-operations log for a document after a reconnect.
    #[serde(rename = "document.catch-up")]
    DocumentCatchUp { room_id: String },

    /// Keepalive; refreshes the connection's activity clock.
    #[serde(rename = "heartbeat")]
    Heartbeat,
}

/// Events the hub sends to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Full membership snapshot, sent to a joiner so it can render existing
    /// collaborators without waiting for individual join notices.
    #[serde(rename = "room.members")]
    RoomMembers { room: RoomKey, members: Vec<MemberInfo> },

    #[serde(rename = "collaborator.joined")]
    CollaboratorJoined {
        room: RoomKey,
        user_id: Uuid,
        display_name: String,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "collaborator.left")]
    CollaboratorLeft {
        room: RoomKey,
        user_id: Uuid,
        display_name: String,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "document.operation")]
    DocumentOperation {
        room_id: String,
        operation: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<i64>,
        from_user_id: Uuid,
        from_display_name: String,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "collaborator.cursor")]
    CollaboratorCursor {
        room_id: String,
        cursor: Value,
        from_user_id: Uuid,
        from_display_name: String,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "collaborator.selection")]
    CollaboratorSelection {
        room_id: String,
        selection: Value,
        from_user_id: Uuid,
        from_display_name: String,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "collaborator.typing")]
    CollaboratorTyping {
        room_id: String,
        typing: bool,
        from_user_id: Uuid,
        from_display_name: String,
    },

    #[serde(rename = "participant.media-toggle")]
    MediaToggle {
        room_id: String,
        media_type: MediaType,
        enabled: bool,
        from_user_id: Uuid,
        from_display_name: String,
        timestamp: DateTime<Utc>,
    },

    /// Chat message with a hub-assigned id; the sender receives its own copy.
    #[serde(rename = "meeting.chat-message")]
    ChatMessage {
        id: Uuid,
        room_id: String,
        text: String,
        from_user_id: Uuid,
        from_display_name: String,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "webrtc.offer")]
    WebrtcOffer {
        room_id: String,
        payload: Value,
        from_user_id: Uuid,
        from_display_name: String,
    },

    #[serde(rename = "webrtc.answer")]
    WebrtcAnswer {
        room_id: String,
        payload: Value,
        from_user_id: Uuid,
        from_display_name: String,
    },

    #[serde(rename = "webrtc.ice-candidate")]
    WebrtcIceCandidate {
        room_id: String,
        payload: Value,
        from_user_id: Uuid,
        from_display_name: String,
    },

    /// Recent-operations reply to a `document.catch-up` request. Best effort:
    /// an empty list when the shared store has no history.
    #[serde(rename = "document.history")]
    DocumentHistory { room_id: String, operations: Vec<OperationRecord> },

    /// Sender-only error reply; the connection stays open.
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

/// One room member as exposed in snapshots and the REST members endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberInfo {
    pub connection_id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
    /// Room-kind-specific mutable attributes (cursor, media flags); open
    /// schema, merged per field last-write-wins.
    #[serde(default)]
    pub attributes: serde_json::Map<String, Value>,
}

/// One entry of the bounded per-document catch-up log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationRecord {
    pub room_id: String,
    pub operation: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    pub submitted_by: Uuid,
    pub timestamp: DateTime<Utc>,
}
