/// Login, sessions and the identity adapter seam.
pub mod auth_service;
/// Persisted match chat.
pub mod chat_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Artifact publication and game server handoff.
pub mod handoff_service;
/// Health check service.
pub mod health_service;
/// Match lifecycle operations.
pub mod lifecycle_service;
/// Source RCON remote-command channel.
pub mod rcon;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events streaming service.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Map veto coordinator.
pub mod veto_service;
/// Match room WebSocket sessions.
pub mod websocket_service;
