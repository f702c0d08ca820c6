// Administrative REST surface: health, room snapshots, metrics. These are
// operational endpoints, not part of the real-time contract.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use collabspace_common::types::{ParseRoomKindError, RoomKey, RoomKind};
use serde_json::json;

use crate::{
    error::{ErrorCode, HubError},
    metrics,
    state::HubState,
};

pub fn router(state: HubState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/room/{kind}/{room_id}/members", get(room_members))
        .route("/metrics", get(metrics_text))
        .with_state(state)
}

async fn health(State(state): State<HubState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "collabspace-hub",
        "timestamp": Utc::now().to_rfc3339(),
        "connections": state.registry.len().await,
        "rooms": state.rooms.room_count().await,
        "documents": state.rooms.room_count_of_kind(RoomKind::Document).await,
        "meetings": state.rooms.room_count_of_kind(RoomKind::Meeting).await,
    }))
}

/// Read-only membership snapshot. An unknown room is an empty list, not a
/// 404: rooms exist only while they have members.
async fn room_members(
    State(state): State<HubState>,
    Path((kind, room_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, HubError> {
    let kind: RoomKind = kind.parse().map_err(|error: ParseRoomKindError| {
        HubError::new(ErrorCode::ValidationFailed, error.to_string())
    })?;

    let members = state.rooms.members(&RoomKey::new(kind, room_id)).await;
    Ok(Json(json!({ "members": members })))
}

async fn metrics_text() -> impl IntoResponse {
    let body = metrics::global_metrics()
        .map(|metrics| metrics.render_prometheus())
        .unwrap_or_default();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
