//! Request and response shapes of the match endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{MatchEntity, MemberEntity, TeamSlotEntity, VetoEntryEntity},
    dto::{
        format_system_time,
        validation::{validate_host, validate_map_name, validate_map_pool},
    },
    state::{
        match_status::MatchStatus,
        matches::{MatchId, PlayerId, TeamSlot, VetoAction},
        veto,
    },
};

/// Connection details of the game server the match will be handed to.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ServerDescriptorInput {
    #[validate(length(max = 253), custom(function = "validate_host"))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    #[validate(length(min = 1, max = 128))]
    pub secret: String,
}

/// Payload used by admins to open a new match.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateMatchRequest {
    #[validate(length(max = 64))]
    pub title: String,
    #[validate(length(min = 1, max = 32))]
    pub team1_name: Option<String>,
    #[validate(length(min = 1, max = 32))]
    pub team2_name: Option<String>,
    /// Ordered candidate maps; the configured default pool is used when omitted.
    #[validate(custom(function = "validate_pool_entries"))]
    pub map_pool: Option<Vec<String>>,
    #[validate(nested)]
    pub server: ServerDescriptorInput,
}

fn validate_pool_entries(pool: &Vec<String>) -> Result<(), validator::ValidationError> {
    validate_map_pool(pool)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct JoinRequest {
    pub slot: TeamSlot,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReadyRequest {
    pub ready: bool,
}

/// One ban or pick submitted by a captain.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct VetoRequest {
    #[validate(custom(function = "validate_map_name"))]
    pub map_name: String,
    pub action: VetoAction,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignCaptainRequest {
    pub slot: TeamSlot,
    pub player_id: PlayerId,
}

#[derive(Debug, Serialize, ToSchema, PartialEq, Eq)]
pub struct MemberView {
    pub player_id: PlayerId,
    pub display_name: String,
    pub is_captain: bool,
    pub is_ready: bool,
    pub joined_at: String,
}

#[derive(Debug, Serialize, ToSchema, PartialEq, Eq)]
pub struct TeamView {
    pub slot: TeamSlot,
    pub id: u64,
    pub name: String,
    pub captain_id: Option<PlayerId>,
    pub members: Vec<MemberView>,
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct VetoEntryView {
    pub order_index: usize,
    pub team: TeamSlot,
    pub map_name: String,
    pub action: VetoAction,
    pub actor_id: PlayerId,
    pub performed_at: String,
}

/// Public part of the server descriptor; the secret never leaves the backend.
#[derive(Debug, Serialize, ToSchema, PartialEq, Eq)]
pub struct ServerView {
    pub host: String,
    pub port: u16,
}

/// Authoritative state of one match, enough for a client to rebuild its whole view.
#[derive(Debug, Serialize, ToSchema, PartialEq, Eq)]
pub struct MatchSnapshot {
    pub id: MatchId,
    pub title: String,
    pub status: MatchStatus,
    pub team1: TeamView,
    pub team2: TeamView,
    pub map_pool: Vec<String>,
    pub selected_map: Option<String>,
    pub veto_history: Vec<VetoEntryView>,
    /// Pool minus banned maps, in pool order.
    pub remaining_maps: Vec<String>,
    /// Team whose captain acts next; only set during the veto.
    pub next_team: Option<TeamSlot>,
    pub server: ServerView,
    pub created_by: PlayerId,
    pub created_at: String,
    pub updated_at: String,
    pub revision: u64,
}

/// Row of the match list.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct MatchListItem {
    pub id: MatchId,
    pub title: String,
    pub status: MatchStatus,
    pub member_count: usize,
    pub ready_count: usize,
    pub selected_map: Option<String>,
    pub created_at: String,
}

impl From<&MemberEntity> for MemberView {
    fn from(value: &MemberEntity) -> Self {
        Self {
            player_id: value.player_id,
            display_name: value.display_name.clone(),
            is_captain: value.is_captain,
            is_ready: value.is_ready,
            joined_at: format_system_time(value.joined_at),
        }
    }
}

impl TeamView {
    fn new(slot: TeamSlot, team: &TeamSlotEntity) -> Self {
        Self {
            slot,
            id: team.id,
            name: team.name.clone(),
            captain_id: team.captain().map(|m| m.player_id),
            members: team.members.iter().map(Into::into).collect(),
        }
    }
}

impl From<&VetoEntryEntity> for VetoEntryView {
    fn from(value: &VetoEntryEntity) -> Self {
        Self {
            order_index: value.order_index,
            team: value.team,
            map_name: value.map_name.clone(),
            action: value.action,
            actor_id: value.actor_id,
            performed_at: format_system_time(value.performed_at),
        }
    }
}

impl From<&MatchEntity> for MatchSnapshot {
    fn from(value: &MatchEntity) -> Self {
        let next_team =
            (value.status == MatchStatus::Veto).then(|| veto::acting_team(&value.veto));

        Self {
            id: value.id,
            title: value.title.clone(),
            status: value.status,
            team1: TeamView::new(TeamSlot::Team1, &value.team1),
            team2: TeamView::new(TeamSlot::Team2, &value.team2),
            map_pool: value.map_pool.clone(),
            selected_map: value.selected_map.clone(),
            veto_history: value.veto.iter().map(Into::into).collect(),
            remaining_maps: veto::remaining_maps(&value.map_pool, &value.veto),
            next_team,
            server: ServerView {
                host: value.server.host.clone(),
                port: value.server.port,
            },
            created_by: value.created_by,
            created_at: format_system_time(value.created_at),
            updated_at: format_system_time(value.updated_at),
            revision: value.revision,
        }
    }
}

impl From<&MatchEntity> for MatchListItem {
    fn from(value: &MatchEntity) -> Self {
        Self {
            id: value.id,
            title: value.title.clone(),
            status: value.status,
            member_count: value.member_count(),
            ready_count: value.ready_count(),
            selected_map: value.selected_map.clone(),
            created_at: format_system_time(value.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use validator::Validate;

    use super::*;
    use crate::dao::models::{NewMatchEntity, ServerDescriptorEntity};

    #[test]
    fn snapshot_hides_secret_and_derives_turn() {
        let mut entity = MatchEntity::from_draft(
            2,
            NewMatchEntity {
                title: "t".into(),
                team1_name: "A".into(),
                team2_name: "B".into(),
                map_pool: vec!["a".into(), "b".into(), "c".into()],
                server: ServerDescriptorEntity {
                    host: "h".into(),
                    port: 27015,
                    secret: "do-not-leak".into(),
                },
                created_by: 9,
            },
            SystemTime::now(),
        );
        entity.status = MatchStatus::Veto;
        entity.veto.push(VetoEntryEntity {
            order_index: 0,
            team: TeamSlot::Team1,
            map_name: "b".into(),
            action: VetoAction::Ban,
            actor_id: 9,
            performed_at: SystemTime::now(),
        });

        let snapshot = MatchSnapshot::from(&entity);
        assert_eq!(snapshot.team1.id, 3);
        assert_eq!(snapshot.team2.id, 4);
        assert_eq!(snapshot.next_team, Some(TeamSlot::Team2));
        assert_eq!(snapshot.remaining_maps, vec!["a", "c"]);

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("do-not-leak"));
    }

    #[test]
    fn create_request_rejects_malformed_fields() {
        let request: CreateMatchRequest = serde_json::from_value(serde_json::json!({
            "title": "Friday",
            "map_pool": ["de_dust2", "De Nuke", "de_inferno"],
            "server": { "host": "10.0.0.5", "port": 0, "secret": "" }
        }))
        .unwrap();

        let errors = request.validate().unwrap_err();
        let fields = errors.errors();
        assert!(fields.contains_key("map_pool"));
        assert!(fields.contains_key("server"));
    }
}
