use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the PUG backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::auth::login,
        crate::routes::auth::logout,
        crate::routes::auth::me,
        crate::routes::players::ban_player,
        crate::routes::players::unban_player,
        crate::routes::matches::list_matches,
        crate::routes::matches::create_match,
        crate::routes::matches::get_match,
        crate::routes::matches::join_team,
        crate::routes::matches::leave_team,
        crate::routes::matches::set_ready,
        crate::routes::matches::start_match,
        crate::routes::matches::perform_veto,
        crate::routes::matches::assign_captain,
        crate::routes::matches::mark_live,
        crate::routes::matches::finish_match,
        crate::routes::matches::abandon_match,
        crate::routes::matches::handoff_status,
        crate::routes::matches::retry_handoff,
        crate::routes::matches::chat_history,
        crate::routes::matches::post_chat,
        crate::routes::sse::lobby_stream,
        crate::routes::sse::room_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::error::ErrorKind,
            crate::dto::health::HealthResponse,
            crate::dto::auth::LoginRequest,
            crate::dto::auth::LoginResponse,
            crate::dto::auth::PlayerView,
            crate::dto::matches::CreateMatchRequest,
            crate::dto::matches::ServerDescriptorInput,
            crate::dto::matches::JoinRequest,
            crate::dto::matches::ReadyRequest,
            crate::dto::matches::VetoRequest,
            crate::dto::matches::AssignCaptainRequest,
            crate::dto::matches::MatchSnapshot,
            crate::dto::matches::MatchListItem,
            crate::dto::handoff::HandoffResponse,
            crate::dto::handoff::HandoffStatus,
            crate::dto::chat::ChatRequest,
            crate::dto::chat::ChatMessageView,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::MatchCreatedEvent,
            crate::dto::sse::PlayerJoinedEvent,
            crate::dto::sse::PlayerLeftEvent,
            crate::dto::sse::PlayerReadyChangedEvent,
            crate::dto::sse::CaptainChangedEvent,
            crate::dto::sse::VetoStartedEvent,
            crate::dto::sse::VetoActionPerformedEvent,
            crate::dto::sse::VetoCompleteEvent,
            crate::dto::sse::MatchStatusEvent,
            crate::dto::sse::HandoffEvent,
            crate::dto::ws::RoomInboundMessage,
            crate::dto::ws::RoomOutboundMessage,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Sessions and identity"),
        (name = "players", description = "Player moderation"),
        (name = "matches", description = "Match lifecycle"),
        (name = "veto", description = "Map veto"),
        (name = "handoff", description = "Game server handoff"),
        (name = "chat", description = "Match room chat"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "rooms", description = "WebSocket match rooms"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` scheme referenced by authenticated routes.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route_and_the_bearer_scheme() {
        let doc = ApiDoc::openapi();
        for path in ["/matches/{id}/veto", "/ws/matches/{id}", "/auth/login", "/sse/lobby"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer"));
    }
}
