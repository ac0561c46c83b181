use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};

use crate::{
    dto::auth::{LoginRequest, LoginResponse, PlayerView},
    error::AppError,
    routes::{CurrentSession, extract::ApiJson},
    services::auth_service,
    state::SharedState,
};

/// Login, logout and current-player endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
}

/// Exchange an identity-provider callback payload for a session token.
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    params(("x-gateway-key" = String, Header, description = "Shared secret of the login gateway")),
    responses(
        (status = 200, description = "Session opened", body = LoginResponse),
        (status = 401, description = "Identity rejected", body = crate::error::ErrorBody),
        (status = 403, description = "Player is banned", body = crate::error::ErrorBody)
    )
)]
pub async fn login(
    State(state): State<SharedState>,
    headers: HeaderMap,
    ApiJson(LoginRequest(payload)): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let gateway_key = headers
        .get(auth_service::GATEWAY_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    Ok(Json(auth_service::login(&state, gateway_key, payload).await?))
}

/// Revoke the session token of the caller.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    security(("bearer" = [])),
    responses((status = 204, description = "Session revoked"))
)]
pub async fn logout(
    State(state): State<SharedState>,
    CurrentSession(session): CurrentSession,
) -> Result<StatusCode, AppError> {
    auth_service::logout(&state, &session.token)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    security(("bearer" = [])),
    responses((status = 200, description = "Current player", body = PlayerView))
)]
pub async fn me(
    State(state): State<SharedState>,
    CurrentSession(session): CurrentSession,
) -> Result<Json<PlayerView>, AppError> {
    Ok(Json(auth_service::me(&state, &session.actor).await?))
}
