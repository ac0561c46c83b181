use std::convert::Infallible;

use axum::{
    Router,
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{
    error::AppError,
    routes::extract::ApiPath,
    services::sse_service,
    state::{SharedState, matches::MatchId},
};

#[utoipa::path(
    get,
    path = "/sse/lobby",
    tag = "sse",
    responses((status = 200, description = "Lobby SSE stream", content_type = "text/event-stream", body = String))
)]
/// Stream match creations, every room event and system status changes.
pub async fn lobby_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (receiver, handshake) = sse_service::subscribe_lobby(&state).await;
    info!("new lobby SSE connection");
    sse_service::to_sse_stream(receiver, handshake)
}

#[utoipa::path(
    get,
    path = "/sse/matches/{id}",
    tag = "sse",
    params(("id" = u64, Path, description = "Match identifier")),
    responses((status = 200, description = "Room SSE stream", content_type = "text/event-stream", body = String))
)]
/// Stream the events of one match room.
pub async fn room_stream(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<MatchId>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let (receiver, handshake) = sse_service::subscribe_room(&state, id).await?;
    info!(match_id = id, "new room SSE connection");
    Ok(sse_service::to_sse_stream(receiver, handshake))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/lobby", get(lobby_stream))
        .route("/sse/matches/{id}", get(room_stream))
}
