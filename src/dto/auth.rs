use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{dao::models::PlayerEntity, state::matches::PlayerId};

/// Callback payload forwarded verbatim to the identity provider adapter.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Object)]
pub struct LoginRequest(pub serde_json::Value);

#[derive(Debug, Serialize, ToSchema, PartialEq, Eq)]
pub struct PlayerView {
    pub id: PlayerId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub is_admin: bool,
    pub is_banned: bool,
}

/// Session issued on a successful login; send it back as `Authorization: Bearer <token>`.
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub player: PlayerView,
}

impl From<&PlayerEntity> for PlayerView {
    fn from(value: &PlayerEntity) -> Self {
        Self {
            id: value.id,
            display_name: value.display_name.clone(),
            avatar_url: value.avatar_url.clone(),
            is_admin: value.is_admin,
            is_banned: value.is_banned,
        }
    }
}
