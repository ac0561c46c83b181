use serde::Serialize;
use utoipa::ToSchema;

/// Body of `/healthcheck`.
#[derive(Debug, Serialize, ToSchema, PartialEq, Eq)]
pub struct HealthResponse {
    /// `ok` when the store is installed and answered its ping, `degraded` otherwise.
    pub status: String,
    /// Whether a match store is currently installed.
    pub store_connected: bool,
    /// Whether the installed store answered the ping made for this request.
    pub store_reachable: bool,
    /// Handoffs still talking to a game server.
    pub pending_handoffs: usize,
}

impl HealthResponse {
    pub fn new(store_connected: bool, store_reachable: bool, pending_handoffs: usize) -> Self {
        let healthy = store_connected && store_reachable;
        Self {
            status: if healthy { "ok" } else { "degraded" }.to_owned(),
            store_connected,
            store_reachable,
            pending_handoffs,
        }
    }
}
