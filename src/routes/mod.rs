use axum::{
    Router,
    body::Body,
    extract::{FromRequestParts, State},
    http::{HeaderMap, Request, header::AUTHORIZATION, request::Parts},
    middleware::{self, Next},
    response::Response,
};
use tower_http::services::ServeDir;

use crate::{
    error::{AppError, ServiceError},
    services::auth_service,
    state::{SharedState, matches::Actor},
};

pub mod auth;
pub mod docs;
pub mod extract;
pub mod health;
pub mod matches;
pub mod players;
pub mod sse;
pub mod websocket;

/// Compose all route trees, wiring in shared state, sessions and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(auth::router())
        .merge(matches::router())
        .merge(players::router())
        .merge(sse::router())
        .merge(websocket::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), resolve_session));

    let artifacts = ServeDir::new(state.config().configs_dir.clone());

    api_router
        .merge(docs::router())
        .nest_service("/configs", artifacts)
        .with_state(state)
}

/// Caller resolved from the bearer token of the current request.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub actor: Actor,
}

/// Resolve `Authorization: Bearer <token>` into a [`Session`] extension.
///
/// Requests without the header pass through anonymously; an unknown or banned token is
/// rejected outright.
async fn resolve_session(
    State(state): State<SharedState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(token) = bearer_token(req.headers()) {
        let actor = auth_service::resolve_actor(&state, &token).await?;
        req.extensions_mut().insert(Session { token, actor });
    }
    Ok(next.run(req).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_owned())
}

/// Extractor for handlers that require a logged-in caller.
pub struct CurrentSession(pub Session);

impl<S: Send + Sync> FromRequestParts<S> for CurrentSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .map(CurrentSession)
            .ok_or_else(|| {
                ServiceError::Unauthenticated("missing `Authorization: Bearer` header".into())
                    .into()
            })
    }
}
