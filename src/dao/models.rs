use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::{
    match_status::MatchStatus,
    matches::{MatchId, PlayerId, TeamSlot, VetoAction},
};

/// Player record created or refreshed on every successful authentication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Identity issued by the external provider.
    pub id: PlayerId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub is_admin: bool,
    /// Players are never deleted, only flagged.
    pub is_banned: bool,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Connection details of the game server a match is handed to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerDescriptorEntity {
    pub host: String,
    pub port: u16,
    /// Shared secret of the remote-command channel.
    pub secret: String,
}

/// Membership of a player inside one team slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberEntity {
    pub player_id: PlayerId,
    pub display_name: String,
    pub is_captain: bool,
    pub is_ready: bool,
    pub joined_at: SystemTime,
}

/// One of the two team slots owned by a match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamSlotEntity {
    /// Derived from the match id, see [`TeamSlot::team_id`].
    pub id: u64,
    pub name: String,
    /// Members in join order.
    pub members: Vec<MemberEntity>,
}

impl TeamSlotEntity {
    pub fn new(id: u64, name: String) -> Self {
        Self {
            id,
            name,
            members: Vec::new(),
        }
    }

    pub fn member(&self, player_id: PlayerId) -> Option<&MemberEntity> {
        self.members.iter().find(|m| m.player_id == player_id)
    }

    pub fn member_mut(&mut self, player_id: PlayerId) -> Option<&mut MemberEntity> {
        self.members.iter_mut().find(|m| m.player_id == player_id)
    }

    pub fn captain(&self) -> Option<&MemberEntity> {
        self.members.iter().find(|m| m.is_captain)
    }
}

/// Append-only veto log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VetoEntryEntity {
    /// Position in the log; contiguous from zero for each match.
    pub order_index: usize,
    pub team: TeamSlot,
    pub map_name: String,
    pub action: VetoAction,
    /// Captain who performed the action.
    pub actor_id: PlayerId,
    pub performed_at: SystemTime,
}

/// Aggregate match record; the store is the only durable writer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchEntity {
    pub id: MatchId,
    pub title: String,
    pub team1: TeamSlotEntity,
    pub team2: TeamSlotEntity,
    /// Ordered candidate maps.
    pub map_pool: Vec<String>,
    /// Empty until the veto completes.
    pub selected_map: Option<String>,
    pub status: MatchStatus,
    pub veto: Vec<VetoEntryEntity>,
    pub server: ServerDescriptorEntity,
    pub created_by: PlayerId,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
    /// Incremented on every committed write; used for conditional replacement.
    pub revision: u64,
}

impl MatchEntity {
    /// Build the initial record for a freshly allocated id, with both team slots in place.
    pub fn from_draft(id: MatchId, draft: NewMatchEntity, now: SystemTime) -> Self {
        Self {
            id,
            title: draft.title,
            team1: TeamSlotEntity::new(TeamSlot::Team1.team_id(id), draft.team1_name),
            team2: TeamSlotEntity::new(TeamSlot::Team2.team_id(id), draft.team2_name),
            map_pool: draft.map_pool,
            selected_map: None,
            status: MatchStatus::Waiting,
            veto: Vec::new(),
            server: draft.server,
            created_by: draft.created_by,
            created_at: now,
            updated_at: now,
            revision: 0,
        }
    }

    pub fn team(&self, slot: TeamSlot) -> &TeamSlotEntity {
        match slot {
            TeamSlot::Team1 => &self.team1,
            TeamSlot::Team2 => &self.team2,
        }
    }

    pub fn team_mut(&mut self, slot: TeamSlot) -> &mut TeamSlotEntity {
        match slot {
            TeamSlot::Team1 => &mut self.team1,
            TeamSlot::Team2 => &mut self.team2,
        }
    }

    /// Slot currently occupied by `player_id`, if any.
    pub fn slot_of(&self, player_id: PlayerId) -> Option<TeamSlot> {
        TeamSlot::ALL
            .into_iter()
            .find(|slot| self.team(*slot).member(player_id).is_some())
    }

    pub fn member_count(&self) -> usize {
        self.team1.members.len() + self.team2.members.len()
    }

    pub fn ready_count(&self) -> usize {
        self.team1
            .members
            .iter()
            .chain(self.team2.members.iter())
            .filter(|m| m.is_ready)
            .count()
    }

    /// Apply a veto append exactly as the store commits it.
    pub fn apply_veto_append(&mut self, entry: VetoEntryEntity, selected_map: Option<String>) {
        self.updated_at = entry.performed_at;
        self.veto.push(entry);
        if let Some(map) = selected_map {
            self.selected_map = Some(map);
            self.status = MatchStatus::Ready;
        }
        self.revision += 1;
    }
}

/// Fields supplied when creating a match; ids are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMatchEntity {
    pub title: String,
    pub team1_name: String,
    pub team2_name: String,
    pub map_pool: Vec<String>,
    pub server: ServerDescriptorEntity,
    pub created_by: PlayerId,
}

/// Author of a chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatAuthorEntity {
    Player {
        player_id: PlayerId,
        display_name: String,
    },
    System,
}

/// Persisted chat line relayed to a match room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessageEntity {
    pub id: Uuid,
    pub match_id: MatchId,
    pub author: ChatAuthorEntity,
    pub text: String,
    pub sent_at: SystemTime,
}
