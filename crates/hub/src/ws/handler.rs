use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use chrono::Utc;
use collabspace_common::{
    protocol::ws::{ClientEvent, OperationRecord, ServerEvent},
    types::{Identity, MediaType, RoomKey, RoomKind},
};
use serde_json::Value;
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{protocol as ws_protocol, MAX_FRAME_BYTES};
use crate::{error::ErrorCode, metrics, state::HubState};

/// One logical task per connection: drains the outbound channel, pings on
/// the heartbeat cadence, sweeps idle connections, and dispatches inbound
/// events. Every exit path funnels through the Lifecycle Supervisor.
pub(crate) async fn handle_socket(state: HubState, identity: Identity, mut socket: WebSocket) {
    let (outbound_sender, mut outbound_receiver) = mpsc::unbounded_channel::<ServerEvent>();
    let connection_id = state.registry.register(identity.clone(), outbound_sender).await;
    state.presence.mark_online(identity.user_id).await;
    metrics::set_connection_count(state.registry.len().await as u64);
    info!(
        connection_id = %connection_id,
        user_id = %identity.user_id,
        display_name = %identity.display_name,
        "connection established"
    );

    let mut heartbeat_interval =
        tokio::time::interval(Duration::from_millis(state.config.heartbeat_interval_ms));
    heartbeat_interval.reset(); // skip immediate first tick
    let refresh_secs = (state.config.presence_ttl_secs / 3).max(1);
    let mut presence_refresh = tokio::time::interval(Duration::from_secs(refresh_secs));
    presence_refresh.reset();
    let idle_timeout = Duration::from_millis(state.config.idle_timeout_ms);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            _ = heartbeat_interval.tick() => {
                if last_activity.elapsed() > idle_timeout {
                    warn!(connection_id = %connection_id, "idle timeout, disconnecting");
                    break;
                }
                if socket.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
            _ = presence_refresh.tick() => {
                state.presence.mark_online(identity.user_id).await;
            }
            maybe_outbound = outbound_receiver.recv() => {
                match maybe_outbound {
                    Some(event) => {
                        if ws_protocol::send_server_event(&mut socket, &event).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };

                match message {
                    Ok(Message::Text(raw)) => {
                        last_activity = Instant::now();
                        if raw.len() > MAX_FRAME_BYTES as usize {
                            close_frame_too_large(&mut socket).await;
                            break;
                        }

                        let event = match ws_protocol::decode_client_event(&raw) {
                            Ok(event) => event,
                            Err(error) => {
                                debug!(
                                    connection_id = %connection_id,
                                    error = %error,
                                    "undecodable event frame"
                                );
                                metrics::record_ws_event("invalid", true, 0);
                                let reply = ServerEvent::Error {
                                    code: ErrorCode::ValidationFailed.as_str().to_string(),
                                    message: "invalid event frame".to_string(),
                                };
                                if ws_protocol::send_server_event(&mut socket, &reply)
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                                continue;
                            }
                        };

                        let label = event_label(&event);
                        let started_at = Instant::now();
                        let replies =
                            handle_client_event(&state, connection_id, &identity, event).await;
                        let is_error =
                            replies.iter().any(|reply| matches!(reply, ServerEvent::Error { .. }));
                        metrics::record_ws_event(
                            label,
                            is_error,
                            started_at.elapsed().as_millis() as u64,
                        );

                        let mut send_failed = false;
                        for reply in replies {
                            if ws_protocol::send_server_event(&mut socket, &reply).await.is_err() {
                                send_failed = true;
                                break;
                            }
                        }
                        if send_failed {
                            break;
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        last_activity = Instant::now();
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Pong(_)) => {
                        last_activity = Instant::now();
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }
    }

    state.lifecycle.on_disconnect(connection_id).await;
    metrics::set_connection_count(state.registry.len().await as u64);
    metrics::set_room_count(state.rooms.room_count().await as u64);
}

fn frame_size_exceeded_reason() -> String {
    format!("websocket frame exceeds maximum size of {MAX_FRAME_BYTES} bytes")
}

async fn close_frame_too_large(socket: &mut WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::SIZE,
            reason: frame_size_exceeded_reason().into(),
        })))
        .await;
}

/// Dispatch one decoded event. Side effects (room mutations, fan-out, log
/// appends) happen here; the returned events are sender-only replies for
/// the connection task to write. A malformed event maps to an error reply,
/// never a dropped connection.
pub(crate) async fn handle_client_event(
    state: &HubState,
    connection_id: Uuid,
    identity: &Identity,
    event: ClientEvent,
) -> Vec<ServerEvent> {
    match event {
        ClientEvent::RoomJoin { room_kind, room_id } => {
            handle_room_join(state, connection_id, identity, room_kind, room_id).await
        }
        ClientEvent::RoomLeave { room_kind, room_id } => {
            handle_room_leave(state, connection_id, room_kind, room_id).await
        }
        ClientEvent::DocumentOperation { room_id, operation, version } => {
            handle_document_operation(state, connection_id, identity, room_id, operation, version)
                .await
        }
        ClientEvent::DocumentCursor { room_id, cursor } => {
            handle_document_cursor(state, connection_id, identity, room_id, cursor).await
        }
        ClientEvent::DocumentSelection { room_id, selection } => {
            handle_document_selection(state, connection_id, identity, room_id, selection).await
        }
        ClientEvent::TypingStart { room_id } => {
            handle_typing(state, connection_id, identity, room_id, true).await
        }
        ClientEvent::TypingStop { room_id } => {
            handle_typing(state, connection_id, identity, room_id, false).await
        }
        ClientEvent::MediaToggle { room_id, media_type, enabled } => {
            handle_media_toggle(state, connection_id, identity, room_id, media_type, enabled).await
        }
        ClientEvent::ChatMessage { room_id, text } => {
            handle_chat_message(state, identity, room_id, text).await
        }
        ClientEvent::WebrtcOffer { target_user_id, payload, room_id } => {
            let event = ServerEvent::WebrtcOffer {
                room_id,
                payload,
                from_user_id: identity.user_id,
                from_display_name: identity.display_name.clone(),
            };
            state.broadcast.direct_to_user(target_user_id, event).await;
            Vec::new()
        }
        ClientEvent::WebrtcAnswer { target_user_id, payload, room_id } => {
            let event = ServerEvent::WebrtcAnswer {
                room_id,
                payload,
                from_user_id: identity.user_id,
                from_display_name: identity.display_name.clone(),
            };
            state.broadcast.direct_to_user(target_user_id, event).await;
            Vec::new()
        }
        ClientEvent::WebrtcIceCandidate { target_user_id, payload, room_id } => {
            let event = ServerEvent::WebrtcIceCandidate {
                room_id,
                payload,
                from_user_id: identity.user_id,
                from_display_name: identity.display_name.clone(),
            };
            state.broadcast.direct_to_user(target_user_id, event).await;
            Vec::new()
        }
        ClientEvent::DocumentCatchUp { room_id } => {
            if let Err(reply) = require_room_id(&room_id) {
                return vec![reply];
            }
            let operations = state.oplog.recent(&room_id).await;
            vec![ServerEvent::DocumentHistory { room_id, operations }]
        }
        ClientEvent::Heartbeat => {
            state.registry.touch(connection_id).await;
            Vec::new()
        }
    }
}

async fn handle_room_join(
    state: &HubState,
    connection_id: Uuid,
    identity: &Identity,
    room_kind: RoomKind,
    room_id: String,
) -> Vec<ServerEvent> {
    if let Err(reply) = require_room_id(&room_id) {
        return vec![reply];
    }
    let room = RoomKey::new(room_kind, room_id);
    let outcome = state.rooms.join(&room, connection_id, identity.clone()).await;

    if outcome.newly_joined {
        let notice = ServerEvent::CollaboratorJoined {
            room: room.clone(),
            user_id: identity.user_id,
            display_name: identity.display_name.clone(),
            timestamp: Utc::now(),
        };
        state.broadcast.room_except_sender(&room, connection_id, notice).await;
        metrics::set_room_count(state.rooms.room_count().await as u64);
        info!(connection_id = %connection_id, room = %room, "joined room");
    }

    vec![ServerEvent::RoomMembers { room, members: outcome.members }]
}

async fn handle_room_leave(
    state: &HubState,
    connection_id: Uuid,
    room_kind: RoomKind,
    room_id: String,
) -> Vec<ServerEvent> {
    if let Err(reply) = require_room_id(&room_id) {
        return vec![reply];
    }
    let room = RoomKey::new(room_kind, room_id);

    if let Some(membership) = state.rooms.leave(&room, connection_id).await {
        let notice = ServerEvent::CollaboratorLeft {
            room: room.clone(),
            user_id: membership.identity.user_id,
            display_name: membership.identity.display_name.clone(),
            timestamp: Utc::now(),
        };
        state.broadcast.room_all(&room, notice).await;
        metrics::set_room_count(state.rooms.room_count().await as u64);
        info!(connection_id = %connection_id, room = %room, "left room");
    }

    Vec::new()
}

async fn handle_document_operation(
    state: &HubState,
    connection_id: Uuid,
    identity: &Identity,
    room_id: String,
    operation: Value,
    version: Option<i64>,
) -> Vec<ServerEvent> {
    if let Err(reply) = require_room_id(&room_id) {
        return vec![reply];
    }
    if operation.is_null() {
        return vec![validation_error("operation is required")];
    }

    let room = RoomKey::document(room_id.clone());
    let record = OperationRecord {
        room_id: room_id.clone(),
        operation: operation.clone(),
        version,
        submitted_by: identity.user_id,
        timestamp: Utc::now(),
    };
    state.oplog.append(&record).await;

    let event = ServerEvent::DocumentOperation {
        room_id,
        operation,
        version,
        from_user_id: identity.user_id,
        from_display_name: identity.display_name.clone(),
        timestamp: record.timestamp,
    };
    state.broadcast.room_except_sender(&room, connection_id, event).await;
    Vec::new()
}

async fn handle_document_cursor(
    state: &HubState,
    connection_id: Uuid,
    identity: &Identity,
    room_id: String,
    cursor: Value,
) -> Vec<ServerEvent> {
    if let Err(reply) = require_room_id(&room_id) {
        return vec![reply];
    }
    let room = RoomKey::document(room_id.clone());
    state
        .rooms
        .update_attributes(&room, connection_id, single_attribute("cursor", cursor.clone()))
        .await;

    let event = ServerEvent::CollaboratorCursor {
        room_id,
        cursor,
        from_user_id: identity.user_id,
        from_display_name: identity.display_name.clone(),
        timestamp: Utc::now(),
    };
    state.broadcast.room_except_sender(&room, connection_id, event).await;
    Vec::new()
}

async fn handle_document_selection(
    state: &HubState,
    connection_id: Uuid,
    identity: &Identity,
    room_id: String,
    selection: Value,
) -> Vec<ServerEvent> {
    if let Err(reply) = require_room_id(&room_id) {
        return vec![reply];
    }
    let room = RoomKey::document(room_id.clone());
    state
        .rooms
        .update_attributes(&room, connection_id, single_attribute("selection", selection.clone()))
        .await;

    let event = ServerEvent::CollaboratorSelection {
        room_id,
        selection,
        from_user_id: identity.user_id,
        from_display_name: identity.display_name.clone(),
        timestamp: Utc::now(),
    };
    state.broadcast.room_except_sender(&room, connection_id, event).await;
    Vec::new()
}

async fn handle_typing(
    state: &HubState,
    connection_id: Uuid,
    identity: &Identity,
    room_id: String,
    typing: bool,
) -> Vec<ServerEvent> {
    if let Err(reply) = require_room_id(&room_id) {
        return vec![reply];
    }
    let room = RoomKey::document(room_id.clone());

    let event = ServerEvent::CollaboratorTyping {
        room_id,
        typing,
        from_user_id: identity.user_id,
        from_display_name: identity.display_name.clone(),
    };
    state.broadcast.room_except_sender(&room, connection_id, event).await;
    Vec::new()
}

async fn handle_media_toggle(
    state: &HubState,
    connection_id: Uuid,
    identity: &Identity,
    room_id: String,
    media_type: MediaType,
    enabled: bool,
) -> Vec<ServerEvent> {
    if let Err(reply) = require_room_id(&room_id) {
        return vec![reply];
    }
    let room = RoomKey::meeting(room_id.clone());
    state
        .rooms
        .update_attributes(
            &room,
            connection_id,
            single_attribute(media_type.attribute_field(), Value::Bool(enabled)),
        )
        .await;

    let event = ServerEvent::MediaToggle {
        room_id,
        media_type,
        enabled,
        from_user_id: identity.user_id,
        from_display_name: identity.display_name.clone(),
        timestamp: Utc::now(),
    };
    state.broadcast.room_except_sender(&room, connection_id, event).await;
    Vec::new()
}

async fn handle_chat_message(
    state: &HubState,
    identity: &Identity,
    room_id: String,
    text: String,
) -> Vec<ServerEvent> {
    if let Err(reply) = require_room_id(&room_id) {
        return vec![reply];
    }
    if text.trim().is_empty() {
        return vec![validation_error("message text is required")];
    }

    let room = RoomKey::meeting(room_id.clone());
    let event = ServerEvent::ChatMessage {
        id: Uuid::new_v4(),
        room_id,
        text,
        from_user_id: identity.user_id,
        from_display_name: identity.display_name.clone(),
        timestamp: Utc::now(),
    };
    // Chat goes to the full room, sender included, so the sender's own view
    // is ordered consistently with everyone else's.
    state.broadcast.room_all(&room, event).await;
    Vec::new()
}

fn require_room_id(room_id: &str) -> Result<(), ServerEvent> {
    if room_id.trim().is_empty() {
        Err(validation_error("room id is required"))
    } else {
        Ok(())
    }
}

fn validation_error(message: &str) -> ServerEvent {
    ServerEvent::Error {
        code: ErrorCode::ValidationFailed.as_str().to_string(),
        message: message.to_string(),
    }
}

fn single_attribute(field: &str, value: Value) -> serde_json::Map<String, Value> {
    let mut map = serde_json::Map::new();
    map.insert(field.to_string(), value);
    map
}

pub(crate) fn event_label(event: &ClientEvent) -> &'static str {
    match event {
        ClientEvent::RoomJoin { .. } => "room.join",
        ClientEvent::RoomLeave { .. } => "room.leave",
        ClientEvent::DocumentOperation { .. } => "document.operation",
        ClientEvent::DocumentCursor { .. } => "document.cursor",
        ClientEvent::DocumentSelection { .. } => "document.selection",
        ClientEvent::TypingStart { .. } => "typing.start",
        ClientEvent::TypingStop { .. } => "typing.stop",
        ClientEvent::MediaToggle { .. } => "meeting.media-toggle",
        ClientEvent::ChatMessage { .. } => "meeting.chat-message",
        ClientEvent::WebrtcOffer { .. } => "webrtc.offer",
        ClientEvent::WebrtcAnswer { .. } => "webrtc.answer",
        ClientEvent::WebrtcIceCandidate { .. } => "webrtc.ice-candidate",
        ClientEvent::DocumentCatchUp { .. } => "document.catch-up",
        ClientEvent::Heartbeat => "heartbeat",
    }
}
