use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::{
    dao::models::{
        ChatAuthorEntity, ChatMessageEntity, MatchEntity, MemberEntity, PlayerEntity,
        ServerDescriptorEntity, TeamSlotEntity, VetoEntryEntity,
    },
    state::{
        match_status::MatchStatus,
        matches::{TeamSlot, VetoAction},
    },
};

// BSON has no unsigned 64-bit integer; ids are stored as i64 and checked on the way back.
fn to_i64(value: u64) -> i64 {
    value as i64
}

fn to_u64(entity: &'static str, id: &str, field: &str, value: i64) -> MongoResult<u64> {
    u64::try_from(value).map_err(|_| MongoDaoError::Corrupted {
        entity,
        id: id.to_owned(),
        reason: format!("negative `{field}`: {value}"),
    })
}

pub fn match_filter(id: u64) -> Document {
    doc! { "_id": to_i64(id) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoCounterDocument {
    #[serde(rename = "_id")]
    pub name: String,
    pub seq: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMemberDocument {
    player_id: i64,
    display_name: String,
    is_captain: bool,
    is_ready: bool,
    joined_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTeamDocument {
    id: i64,
    name: String,
    members: Vec<MongoMemberDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoVetoDocument {
    order_index: i64,
    team: TeamSlot,
    map_name: String,
    action: VetoAction,
    actor_id: i64,
    performed_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoServerDocument {
    host: String,
    port: i32,
    secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMatchDocument {
    #[serde(rename = "_id")]
    id: i64,
    title: String,
    team1: MongoTeamDocument,
    team2: MongoTeamDocument,
    map_pool: Vec<String>,
    selected_map: Option<String>,
    status: MatchStatus,
    #[serde(default)]
    veto: Vec<MongoVetoDocument>,
    server: MongoServerDocument,
    created_by: i64,
    created_at: DateTime,
    updated_at: DateTime,
    revision: i64,
}

/// Raw BSON for one veto entry, used by the `$push` of a conditional append.
pub fn veto_entry_document(entry: &VetoEntryEntity) -> Document {
    doc! {
        "order_index": entry.order_index as i64,
        "team": entry.team.as_str(),
        "map_name": entry.map_name.as_str(),
        "action": entry.action.as_str(),
        "actor_id": to_i64(entry.actor_id),
        "performed_at": DateTime::from_system_time(entry.performed_at),
    }
}

impl From<MemberEntity> for MongoMemberDocument {
    fn from(value: MemberEntity) -> Self {
        Self {
            player_id: to_i64(value.player_id),
            display_name: value.display_name,
            is_captain: value.is_captain,
            is_ready: value.is_ready,
            joined_at: DateTime::from_system_time(value.joined_at),
        }
    }
}

impl From<TeamSlotEntity> for MongoTeamDocument {
    fn from(value: TeamSlotEntity) -> Self {
        Self {
            id: to_i64(value.id),
            name: value.name,
            members: value.members.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<MatchEntity> for MongoMatchDocument {
    fn from(value: MatchEntity) -> Self {
        Self {
            id: to_i64(value.id),
            title: value.title,
            team1: value.team1.into(),
            team2: value.team2.into(),
            map_pool: value.map_pool,
            selected_map: value.selected_map,
            status: value.status,
            veto: value
                .veto
                .into_iter()
                .map(|entry| MongoVetoDocument {
                    order_index: entry.order_index as i64,
                    team: entry.team,
                    map_name: entry.map_name,
                    action: entry.action,
                    actor_id: to_i64(entry.actor_id),
                    performed_at: DateTime::from_system_time(entry.performed_at),
                })
                .collect(),
            server: MongoServerDocument {
                host: value.server.host,
                port: i32::from(value.server.port),
                secret: value.server.secret,
            },
            created_by: to_i64(value.created_by),
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
            revision: to_i64(value.revision),
        }
    }
}

impl MongoTeamDocument {
    fn into_entity(self, match_id: &str) -> MongoResult<TeamSlotEntity> {
        let members = self
            .members
            .into_iter()
            .map(|member| {
                Ok(MemberEntity {
                    player_id: to_u64("match", match_id, "player_id", member.player_id)?,
                    display_name: member.display_name,
                    is_captain: member.is_captain,
                    is_ready: member.is_ready,
                    joined_at: member.joined_at.to_system_time(),
                })
            })
            .collect::<MongoResult<Vec<_>>>()?;

        Ok(TeamSlotEntity {
            id: to_u64("match", match_id, "team.id", self.id)?,
            name: self.name,
            members,
        })
    }
}

impl TryFrom<MongoMatchDocument> for MatchEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoMatchDocument) -> MongoResult<Self> {
        let key = value.id.to_string();
        let key = key.as_str();

        let veto = value
            .veto
            .into_iter()
            .map(|entry| {
                Ok(VetoEntryEntity {
                    order_index: to_u64("match", key, "order_index", entry.order_index)? as usize,
                    team: entry.team,
                    map_name: entry.map_name,
                    action: entry.action,
                    actor_id: to_u64("match", key, "actor_id", entry.actor_id)?,
                    performed_at: entry.performed_at.to_system_time(),
                })
            })
            .collect::<MongoResult<Vec<_>>>()?;

        let port = u16::try_from(value.server.port).map_err(|_| MongoDaoError::Corrupted {
            entity: "match",
            id: key.to_owned(),
            reason: format!("server port out of range: {}", value.server.port),
        })?;

        Ok(MatchEntity {
            id: to_u64("match", key, "_id", value.id)?,
            title: value.title,
            team1: value.team1.into_entity(key)?,
            team2: value.team2.into_entity(key)?,
            map_pool: value.map_pool,
            selected_map: value.selected_map,
            status: value.status,
            veto,
            server: ServerDescriptorEntity {
                host: value.server.host,
                port,
                secret: value.server.secret,
            },
            created_by: to_u64("match", key, "created_by", value.created_by)?,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
            revision: to_u64("match", key, "revision", value.revision)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoPlayerDocument {
    #[serde(rename = "_id")]
    id: i64,
    display_name: String,
    avatar_url: Option<String>,
    is_admin: bool,
    #[serde(default)]
    is_banned: bool,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<PlayerEntity> for MongoPlayerDocument {
    fn from(value: PlayerEntity) -> Self {
        Self {
            id: to_i64(value.id),
            display_name: value.display_name,
            avatar_url: value.avatar_url,
            is_admin: value.is_admin,
            is_banned: value.is_banned,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoPlayerDocument> for PlayerEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoPlayerDocument) -> MongoResult<Self> {
        let key = value.id.to_string();
        Ok(PlayerEntity {
            id: to_u64("player", &key, "_id", value.id)?,
            display_name: value.display_name,
            avatar_url: value.avatar_url,
            is_admin: value.is_admin,
            is_banned: value.is_banned,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoChatDocument {
    #[serde(rename = "_id")]
    id: String,
    match_id: i64,
    author_id: Option<i64>,
    author_name: Option<String>,
    text: String,
    sent_at: DateTime,
}

impl From<ChatMessageEntity> for MongoChatDocument {
    fn from(value: ChatMessageEntity) -> Self {
        let (author_id, author_name) = match value.author {
            ChatAuthorEntity::Player {
                player_id,
                display_name,
            } => (Some(to_i64(player_id)), Some(display_name)),
            ChatAuthorEntity::System => (None, None),
        };

        Self {
            id: value.id.to_string(),
            match_id: to_i64(value.match_id),
            author_id,
            author_name,
            text: value.text,
            sent_at: DateTime::from_system_time(value.sent_at),
        }
    }
}

impl TryFrom<MongoChatDocument> for ChatMessageEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoChatDocument) -> MongoResult<Self> {
        let id = Uuid::parse_str(&value.id).map_err(|err| MongoDaoError::Corrupted {
            entity: "chat_message",
            id: value.id.clone(),
            reason: err.to_string(),
        })?;

        let author = match (value.author_id, value.author_name) {
            (Some(player_id), Some(display_name)) => ChatAuthorEntity::Player {
                player_id: to_u64("chat_message", &value.id, "author_id", player_id)?,
                display_name,
            },
            _ => ChatAuthorEntity::System,
        };

        Ok(ChatMessageEntity {
            id,
            match_id: to_u64("chat_message", &value.id, "match_id", value.match_id)?,
            author,
            text: value.text,
            sent_at: value.sent_at.to_system_time(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use mongodb::bson;

    use super::*;
    use crate::dao::models::NewMatchEntity;

    fn sample_match() -> MatchEntity {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let mut entity = MatchEntity::from_draft(
            3,
            NewMatchEntity {
                title: "Friday PUG".into(),
                team1_name: "Team Alpha".into(),
                team2_name: "Team Beta".into(),
                map_pool: vec!["de_dust2".into(), "de_mirage".into(), "de_nuke".into()],
                server: ServerDescriptorEntity {
                    host: "10.0.0.5".into(),
                    port: 27015,
                    secret: "s3cret".into(),
                },
                created_by: 76561198000000001,
            },
            now,
        );
        entity.status = MatchStatus::Veto;
        entity.veto.push(VetoEntryEntity {
            order_index: 0,
            team: TeamSlot::Team1,
            map_name: "de_dust2".into(),
            action: VetoAction::Ban,
            actor_id: 76561198000000001,
            performed_at: now,
        });
        entity
    }

    #[test]
    fn match_document_maps_back_to_entity() {
        let entity = sample_match();
        let document: MongoMatchDocument = entity.clone().into();
        let raw = bson::serialize_to_document(&document).unwrap();
        assert_eq!(raw.get_str("status").unwrap(), "veto");

        let decoded: MongoMatchDocument = bson::deserialize_from_document(raw).unwrap();
        let back = MatchEntity::try_from(decoded).unwrap();
        assert_eq!(back, entity);
    }

    #[test]
    fn pushed_veto_entry_decodes_like_a_stored_one() {
        let entry = sample_match().veto.remove(0);
        let decoded: MongoVetoDocument =
            bson::deserialize_from_document(veto_entry_document(&entry)).unwrap();
        assert_eq!(decoded.order_index, 0);
        assert_eq!(decoded.team, TeamSlot::Team1);
        assert_eq!(decoded.action, VetoAction::Ban);
    }

    #[test]
    fn negative_ids_are_reported_as_corrupted() {
        let mut document: MongoMatchDocument = sample_match().into();
        document.created_by = -4;
        let err = MatchEntity::try_from(document).unwrap_err();
        assert!(matches!(err, MongoDaoError::Corrupted { entity: "match", .. }));
    }
}
