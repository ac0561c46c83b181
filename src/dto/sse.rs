use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dto::{handoff::HandoffStatus, matches::MatchListItem},
    state::{
        match_status::MatchStatus,
        matches::{MatchId, PlayerId, TeamSlot, VetoAction},
    },
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across room channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Room name (`lobby` or `match_<id>`).
    pub room: String,
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast to the lobby when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MatchCreatedEvent {
    pub summary: MatchListItem,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerJoinedEvent {
    pub match_id: MatchId,
    pub slot: TeamSlot,
    pub player_id: PlayerId,
    pub display_name: String,
    pub is_captain: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerLeftEvent {
    pub match_id: MatchId,
    pub slot: TeamSlot,
    pub player_id: PlayerId,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PlayerReadyChangedEvent {
    pub match_id: MatchId,
    pub player_id: PlayerId,
    pub ready: bool,
    pub ready_count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CaptainChangedEvent {
    pub match_id: MatchId,
    pub slot: TeamSlot,
    pub player_id: PlayerId,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VetoStartedEvent {
    pub match_id: MatchId,
    pub map_pool: Vec<String>,
    pub next_team: TeamSlot,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VetoActionPerformedEvent {
    pub match_id: MatchId,
    pub order_index: usize,
    pub team: TeamSlot,
    pub map_name: String,
    pub action: VetoAction,
    pub remaining_maps: Vec<String>,
    /// Absent once the veto is complete.
    pub next_team: Option<TeamSlot>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VetoCompleteEvent {
    pub match_id: MatchId,
    pub selected_map: String,
}

/// Payload of `match_live` and `match_finished`.
#[derive(Debug, Serialize, ToSchema)]
pub struct MatchStatusEvent {
    pub match_id: MatchId,
    pub status: MatchStatus,
}

/// Payload of `handoff_succeeded` and `handoff_failed`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HandoffEvent {
    pub match_id: MatchId,
    pub status: HandoffStatus,
}
