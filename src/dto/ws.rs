use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dto::matches::MatchSnapshot,
    error::ErrorKind,
    state::matches::VetoAction,
};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from room WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomInboundMessage {
    VetoAction {
        map_name: String,
        action: VetoAction,
    },
    Chat {
        text: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize, ToSchema)]
/// Messages pushed to room WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomOutboundMessage {
    /// Sent first on every connection; the authoritative state to rebuild from.
    Snapshot { snapshot: Box<MatchSnapshot> },
    /// A room event, with the same name and payload as on the SSE stream.
    Event {
        event: String,
        #[schema(value_type = Object)]
        data: serde_json::Value,
    },
    /// Rejection of an inbound message.
    Error { kind: ErrorKind, message: String },
}
