use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use validator::Validate;

use crate::{
    dto::{
        chat::{ChatMessageView, ChatRequest},
        handoff::HandoffResponse,
        matches::{
            AssignCaptainRequest, CreateMatchRequest, JoinRequest, MatchListItem, MatchSnapshot,
            ReadyRequest, VetoRequest,
        },
    },
    error::AppError,
    routes::{
        CurrentSession,
        extract::{ApiJson, ApiPath},
    },
    services::{chat_service, handoff_service, lifecycle_service, veto_service},
    state::{SharedState, matches::MatchId},
};

/// Match lifecycle, veto, handoff and chat endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/matches", get(list_matches).post(create_match))
        .route("/matches/{id}", get(get_match))
        .route("/matches/{id}/join", post(join_team))
        .route("/matches/{id}/leave", post(leave_team))
        .route("/matches/{id}/ready", post(set_ready))
        .route("/matches/{id}/start", post(start_match))
        .route("/matches/{id}/veto", post(perform_veto))
        .route("/matches/{id}/captain", post(assign_captain))
        .route("/matches/{id}/live", post(mark_live))
        .route("/matches/{id}/finish", post(finish_match))
        .route("/matches/{id}/abandon", post(abandon_match))
        .route(
            "/matches/{id}/handoff",
            get(handoff_status).post(retry_handoff),
        )
        .route("/matches/{id}/chat", get(chat_history).post(post_chat))
}

/// Latest matches, newest first.
#[utoipa::path(
    get,
    path = "/matches",
    tag = "matches",
    responses((status = 200, description = "Recent matches", body = [MatchListItem]))
)]
pub async fn list_matches(
    State(state): State<SharedState>,
) -> Result<Json<Vec<MatchListItem>>, AppError> {
    Ok(Json(lifecycle_service::list_matches(&state).await?))
}

/// Open a new match (admin only).
#[utoipa::path(
    post,
    path = "/matches",
    tag = "matches",
    security(("bearer" = [])),
    request_body = CreateMatchRequest,
    responses(
        (status = 200, description = "Match created", body = MatchSnapshot),
        (status = 400, description = "Invalid payload or map pool", body = crate::error::ErrorBody),
        (status = 403, description = "Caller is not an admin", body = crate::error::ErrorBody)
    )
)]
pub async fn create_match(
    State(state): State<SharedState>,
    CurrentSession(session): CurrentSession,
    ApiJson(payload): ApiJson<CreateMatchRequest>,
) -> Result<Json<MatchSnapshot>, AppError> {
    payload.validate()?;
    Ok(Json(
        lifecycle_service::create_match(&state, &session.actor, payload).await?,
    ))
}

/// Full snapshot of one match, enough to rebuild any client view.
#[utoipa::path(
    get,
    path = "/matches/{id}",
    tag = "matches",
    params(("id" = u64, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Match snapshot", body = MatchSnapshot),
        (status = 404, description = "Unknown match", body = crate::error::ErrorBody)
    )
)]
pub async fn get_match(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<MatchId>,
) -> Result<Json<MatchSnapshot>, AppError> {
    Ok(Json(lifecycle_service::get_match(&state, id).await?))
}

#[utoipa::path(
    post,
    path = "/matches/{id}/join",
    tag = "matches",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "Match identifier")),
    request_body = JoinRequest,
    responses(
        (status = 200, description = "Caller is on the team", body = MatchSnapshot),
        (status = 409, description = "Slot full, already joined elsewhere, or match not waiting", body = crate::error::ErrorBody)
    )
)]
pub async fn join_team(
    State(state): State<SharedState>,
    CurrentSession(session): CurrentSession,
    ApiPath(id): ApiPath<MatchId>,
    ApiJson(payload): ApiJson<JoinRequest>,
) -> Result<Json<MatchSnapshot>, AppError> {
    Ok(Json(
        lifecycle_service::join_team(&state, &session.actor, id, payload.slot).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/matches/{id}/leave",
    tag = "matches",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "Match identifier")),
    responses((status = 200, description = "Caller left the team", body = MatchSnapshot))
)]
pub async fn leave_team(
    State(state): State<SharedState>,
    CurrentSession(session): CurrentSession,
    ApiPath(id): ApiPath<MatchId>,
) -> Result<Json<MatchSnapshot>, AppError> {
    Ok(Json(
        lifecycle_service::leave_team(&state, &session.actor, id).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/matches/{id}/ready",
    tag = "matches",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "Match identifier")),
    request_body = ReadyRequest,
    responses((status = 200, description = "Readiness recorded", body = MatchSnapshot))
)]
pub async fn set_ready(
    State(state): State<SharedState>,
    CurrentSession(session): CurrentSession,
    ApiPath(id): ApiPath<MatchId>,
    ApiJson(payload): ApiJson<ReadyRequest>,
) -> Result<Json<MatchSnapshot>, AppError> {
    Ok(Json(
        lifecycle_service::set_ready(&state, &session.actor, id, payload.ready).await?,
    ))
}

/// Move a full, ready lobby into the map veto (admin only).
#[utoipa::path(
    post,
    path = "/matches/{id}/start",
    tag = "matches",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Veto started", body = MatchSnapshot),
        (status = 409, description = "Roster, captains or readiness incomplete", body = crate::error::ErrorBody)
    )
)]
pub async fn start_match(
    State(state): State<SharedState>,
    CurrentSession(session): CurrentSession,
    ApiPath(id): ApiPath<MatchId>,
) -> Result<Json<MatchSnapshot>, AppError> {
    Ok(Json(
        lifecycle_service::start_match(&state, &session.actor, id).await?,
    ))
}

/// Ban or pick a map as the captain whose turn it is.
#[utoipa::path(
    post,
    path = "/matches/{id}/veto",
    tag = "veto",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "Match identifier")),
    request_body = VetoRequest,
    responses(
        (status = 200, description = "Action appended to the veto log", body = MatchSnapshot),
        (status = 403, description = "Not the acting captain", body = crate::error::ErrorBody),
        (status = 409, description = "Map already vetoed or match not in veto", body = crate::error::ErrorBody)
    )
)]
pub async fn perform_veto(
    State(state): State<SharedState>,
    CurrentSession(session): CurrentSession,
    ApiPath(id): ApiPath<MatchId>,
    ApiJson(payload): ApiJson<VetoRequest>,
) -> Result<Json<MatchSnapshot>, AppError> {
    payload.validate()?;
    Ok(Json(
        veto_service::perform_veto_action(
            &state,
            &session.actor,
            id,
            &payload.map_name,
            payload.action,
        )
        .await?,
    ))
}

#[utoipa::path(
    post,
    path = "/matches/{id}/captain",
    tag = "matches",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "Match identifier")),
    request_body = AssignCaptainRequest,
    responses((status = 200, description = "Captain assigned", body = MatchSnapshot))
)]
pub async fn assign_captain(
    State(state): State<SharedState>,
    CurrentSession(session): CurrentSession,
    ApiPath(id): ApiPath<MatchId>,
    ApiJson(payload): ApiJson<AssignCaptainRequest>,
) -> Result<Json<MatchSnapshot>, AppError> {
    Ok(Json(
        lifecycle_service::assign_captain(
            &state,
            &session.actor,
            id,
            payload.slot,
            payload.player_id,
        )
        .await?,
    ))
}

#[utoipa::path(
    post,
    path = "/matches/{id}/live",
    tag = "matches",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "Match identifier")),
    responses((status = 200, description = "Match is live", body = MatchSnapshot))
)]
pub async fn mark_live(
    State(state): State<SharedState>,
    CurrentSession(session): CurrentSession,
    ApiPath(id): ApiPath<MatchId>,
) -> Result<Json<MatchSnapshot>, AppError> {
    Ok(Json(
        lifecycle_service::mark_live(&state, &session.actor, id).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/matches/{id}/finish",
    tag = "matches",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "Match identifier")),
    responses((status = 200, description = "Match completed", body = MatchSnapshot))
)]
pub async fn finish_match(
    State(state): State<SharedState>,
    CurrentSession(session): CurrentSession,
    ApiPath(id): ApiPath<MatchId>,
) -> Result<Json<MatchSnapshot>, AppError> {
    Ok(Json(
        lifecycle_service::finish_match(&state, &session.actor, id).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/matches/{id}/abandon",
    tag = "matches",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "Match identifier")),
    responses((status = 200, description = "Match abandoned", body = MatchSnapshot))
)]
pub async fn abandon_match(
    State(state): State<SharedState>,
    CurrentSession(session): CurrentSession,
    ApiPath(id): ApiPath<MatchId>,
) -> Result<Json<MatchSnapshot>, AppError> {
    Ok(Json(
        lifecycle_service::abandon_match(&state, &session.actor, id).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/matches/{id}/handoff",
    tag = "handoff",
    params(("id" = u64, Path, description = "Match identifier")),
    responses((status = 200, description = "Handoff progress", body = HandoffResponse))
)]
pub async fn handoff_status(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<MatchId>,
) -> Result<Json<HandoffResponse>, AppError> {
    Ok(Json(handoff_service::status(&state, id).await?))
}

/// Re-run the server handoff of a ready or live match (admin only).
#[utoipa::path(
    post,
    path = "/matches/{id}/handoff",
    tag = "handoff",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Handoff dispatched", body = HandoffResponse),
        (status = 409, description = "Match not ready or handoff already running", body = crate::error::ErrorBody)
    )
)]
pub async fn retry_handoff(
    State(state): State<SharedState>,
    CurrentSession(session): CurrentSession,
    ApiPath(id): ApiPath<MatchId>,
) -> Result<Json<HandoffResponse>, AppError> {
    Ok(Json(
        handoff_service::retry(&state, &session.actor, id).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/matches/{id}/chat",
    tag = "chat",
    params(("id" = u64, Path, description = "Match identifier")),
    responses((status = 200, description = "Latest messages, oldest first", body = [ChatMessageView]))
)]
pub async fn chat_history(
    State(state): State<SharedState>,
    ApiPath(id): ApiPath<MatchId>,
) -> Result<Json<Vec<ChatMessageView>>, AppError> {
    Ok(Json(chat_service::history(&state, id).await?))
}

#[utoipa::path(
    post,
    path = "/matches/{id}/chat",
    tag = "chat",
    security(("bearer" = [])),
    params(("id" = u64, Path, description = "Match identifier")),
    request_body = ChatRequest,
    responses((status = 200, description = "Message stored and relayed", body = ChatMessageView))
)]
pub async fn post_chat(
    State(state): State<SharedState>,
    CurrentSession(session): CurrentSession,
    ApiPath(id): ApiPath<MatchId>,
    ApiJson(payload): ApiJson<ChatRequest>,
) -> Result<Json<ChatMessageView>, AppError> {
    payload.validate()?;
    Ok(Json(
        chat_service::post_message(&state, &session.actor, id, &payload.text).await?,
    ))
}
