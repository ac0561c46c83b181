use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{ChatAuthorEntity, ChatMessageEntity},
    dto::format_system_time,
    state::matches::{MatchId, PlayerId},
};

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ChatRequest {
    /// Trimmed before storage; must keep 1 to 500 characters.
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatAuthorView {
    Player {
        player_id: PlayerId,
        display_name: String,
    },
    System,
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct ChatMessageView {
    pub id: Uuid,
    pub match_id: MatchId,
    pub author: ChatAuthorView,
    pub text: String,
    pub sent_at: String,
}

impl From<&ChatMessageEntity> for ChatMessageView {
    fn from(value: &ChatMessageEntity) -> Self {
        let author = match &value.author {
            ChatAuthorEntity::Player {
                player_id,
                display_name,
            } => ChatAuthorView::Player {
                player_id: *player_id,
                display_name: display_name.clone(),
            },
            ChatAuthorEntity::System => ChatAuthorView::System,
        };

        Self {
            id: value.id,
            match_id: value.match_id,
            author,
            text: value.text.clone(),
            sent_at: format_system_time(value.sent_at),
        }
    }
}
