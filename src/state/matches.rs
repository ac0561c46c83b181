use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Identifier of a match; allocated monotonically by the store.
pub type MatchId = u64;
/// Stable identifier issued by the identity provider (e.g. a SteamID64).
pub type PlayerId = u64;

/// Maximum number of members in a single team slot.
pub const TEAM_CAPACITY: usize = 5;
/// Number of members required across both slots before a match can start.
pub const MATCH_SIZE: usize = TEAM_CAPACITY * 2;
/// Smallest map pool a match can be created with.
pub const MIN_MAP_POOL: usize = 3;

/// One of the two team slots every match owns for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TeamSlot {
    Team1,
    Team2,
}

impl TeamSlot {
    /// Both slots in their canonical order.
    pub const ALL: [TeamSlot; 2] = [TeamSlot::Team1, TeamSlot::Team2];

    /// The opposing slot.
    pub fn other(self) -> Self {
        match self {
            TeamSlot::Team1 => TeamSlot::Team2,
            TeamSlot::Team2 => TeamSlot::Team1,
        }
    }

    /// Team identifier derived from the match id (`2i - 1` and `2i`), never allocated separately.
    pub fn team_id(self, match_id: MatchId) -> u64 {
        match self {
            TeamSlot::Team1 => 2 * match_id - 1,
            TeamSlot::Team2 => 2 * match_id,
        }
    }

    /// Team acting at `order_index` in the veto log: team1 on even indices, team2 on odd ones.
    pub fn for_order_index(order_index: usize) -> Self {
        if order_index % 2 == 0 {
            TeamSlot::Team1
        } else {
            TeamSlot::Team2
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TeamSlot::Team1 => "team1",
            TeamSlot::Team2 => "team2",
        }
    }
}

impl fmt::Display for TeamSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action a captain takes on a map during the veto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VetoAction {
    Ban,
    Pick,
}

impl VetoAction {
    pub fn as_str(self) -> &'static str {
        match self {
            VetoAction::Ban => "ban",
            VetoAction::Pick => "pick",
        }
    }
}

impl fmt::Display for VetoAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticated caller on whose behalf an operation runs.
///
/// Built per request from the session token and the current player record, then passed
/// explicitly into every service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub player_id: PlayerId,
    pub display_name: String,
    pub is_admin: bool,
}
