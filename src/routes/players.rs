use axum::{
    Json, Router,
    extract::State,
    routing::post,
};

use crate::{
    dto::auth::PlayerView,
    error::AppError,
    routes::{CurrentSession, extract::ApiPath},
    services::auth_service,
    state::{SharedState, matches::PlayerId},
};

/// Admin moderation endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/players/{id}/ban", post(ban_player))
        .route("/players/{id}/unban", post(unban_player))
}

#[utoipa::path(
    post,
    path = "/players/{id}/ban",
    tag = "players",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "Player to ban")),
    responses((status = 200, description = "Player banned", body = PlayerView))
)]
pub async fn ban_player(
    State(state): State<SharedState>,
    CurrentSession(session): CurrentSession,
    ApiPath(id): ApiPath<PlayerId>,
) -> Result<Json<PlayerView>, AppError> {
    Ok(Json(
        auth_service::set_banned(&state, &session.actor, id, true).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/players/{id}/unban",
    tag = "players",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "Player to unban")),
    responses((status = 200, description = "Player unbanned", body = PlayerView))
)]
pub async fn unban_player(
    State(state): State<SharedState>,
    CurrentSession(session): CurrentSession,
    ApiPath(id): ApiPath<PlayerId>,
) -> Result<Json<PlayerView>, AppError> {
    Ok(Json(
        auth_service::set_banned(&state, &session.actor, id, false).await?,
    ))
}
