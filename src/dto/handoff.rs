use serde::Serialize;
use utoipa::ToSchema;

use crate::state::matches::MatchId;

/// Progress of pushing a match configuration to its game server.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HandoffStatus {
    NotStarted,
    Pending {
        attempt: u32,
        started_at: String,
    },
    Succeeded {
        attempts: u32,
        config_url: String,
        completed_at: String,
    },
    Failed {
        attempts: u32,
        error: String,
        completed_at: String,
    },
}

impl HandoffStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, HandoffStatus::Pending { .. })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HandoffResponse {
    pub match_id: MatchId,
    pub status: HandoffStatus,
}
