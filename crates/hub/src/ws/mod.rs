// WebSocket surface: credential check at upgrade time, then one task per
// connection.

pub(crate) mod handler;
pub(crate) mod protocol;

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::{header::AUTHORIZATION, HeaderMap},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::warn;

use crate::{
    error::{ErrorCode, HubError},
    state::HubState,
};

pub(crate) const MAX_FRAME_BYTES: u32 = 262_144;

pub fn router(state: HubState) -> Router {
    Router::new().route("/v1/ws", get(ws_upgrade)).with_state(state)
}

#[derive(Debug, Deserialize)]
struct ConnectQuery {
    #[serde(default)]
    token: Option<String>,
}

/// Authenticates and upgrades a connection. The credential is verified
/// before the upgrade completes, so a rejected token never creates
/// registry, room, or presence state. Browsers cannot set WebSocket
/// headers, so the token is also accepted as a query parameter.
async fn ws_upgrade(
    State(state): State<HubState>,
    Query(query): Query<ConnectQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = bearer_token(&headers).map(ToOwned::to_owned).or(query.token);
    let Some(token) = token else {
        return HubError::new(ErrorCode::AuthInvalidToken, "missing bearer token").into_response();
    };

    let identity = match state.verifier.verify(&token) {
        Ok(identity) => identity,
        Err(error) => {
            warn!(error = %error, "connection credential rejected");
            return HubError::new(ErrorCode::AuthInvalidToken, "invalid bearer token")
                .into_response();
        }
    };

    ws.max_frame_size(MAX_FRAME_BYTES as usize)
        .on_upgrade(move |socket| handler::handle_socket(state, identity, socket))
        .into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("Bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        return None;
    }

    Some(token)
}
