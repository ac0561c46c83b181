use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;

use crate::{
    error::AppError,
    routes::extract::{ApiPath, ApiQuery},
    services::{auth_service, websocket_service},
    state::{SharedState, matches::MatchId},
};

#[derive(Debug, Deserialize)]
pub struct RoomSocketParams {
    /// Session token; spectators connect without one and can only listen.
    pub token: Option<String>,
}

#[utoipa::path(
    get,
    path = "/ws/matches/{id}",
    tag = "rooms",
    params(
        ("id" = u64, Path, description = "Match identifier"),
        ("token" = Option<String>, Query, description = "Session token required to send veto actions or chat")
    ),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 401, description = "Unknown session token", body = crate::error::ErrorBody)
    )
)]
/// Upgrade the HTTP connection into a match room session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<MatchId>,
    ApiQuery(params): ApiQuery<RoomSocketParams>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    if let Some(token) = params.token.as_deref() {
        auth_service::resolve_actor(&state, token).await?;
    }

    let token = params.token;
    Ok(ws.on_upgrade(move |socket| websocket_service::handle_socket(state, socket, id, token)))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws/matches/{id}", get(ws_handler))
}
