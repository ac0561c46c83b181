use std::time::SystemTime;

use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::models::{ChatAuthorEntity, ChatMessageEntity},
    dto::chat::ChatMessageView,
    error::ServiceError,
    services::sse_events,
    state::{
        SharedState,
        matches::{Actor, MatchId},
    },
};

pub const MAX_MESSAGE_CHARS: usize = 500;
const HISTORY_LIMIT: usize = 50;

/// Persist a player's chat line and relay it to the match room.
pub async fn post_message(
    state: &SharedState,
    actor: &Actor,
    match_id: MatchId,
    text: &str,
) -> Result<ChatMessageView, ServiceError> {
    let store = state.require_match_store().await?;
    if store.find_match(match_id).await?.is_none() {
        return Err(ServiceError::NotFound(format!("match {match_id}")));
    }

    let text = normalize(text)?;
    let author = ChatAuthorEntity::Player {
        player_id: actor.player_id,
        display_name: actor.display_name.clone(),
    };
    store_and_relay(state, match_id, author, text).await
}

/// Post a line authored by the system; failures are logged, never returned.
pub async fn post_system_message(state: &SharedState, match_id: MatchId, text: String) {
    if let Err(err) = store_and_relay(state, match_id, ChatAuthorEntity::System, text).await {
        warn!(match_id, error = %err, "failed to post system chat message");
    }
}

/// Latest messages of a match, oldest first.
pub async fn history(
    state: &SharedState,
    match_id: MatchId,
) -> Result<Vec<ChatMessageView>, ServiceError> {
    let store = state.require_match_store().await?;
    if store.find_match(match_id).await?.is_none() {
        return Err(ServiceError::NotFound(format!("match {match_id}")));
    }

    let messages = store.list_chat_messages(match_id, HISTORY_LIMIT).await?;
    Ok(messages.iter().map(ChatMessageView::from).collect())
}

fn normalize(text: &str) -> Result<String, ServiceError> {
    let trimmed = text.trim();
    let chars = trimmed.chars().count();
    if chars == 0 || chars > MAX_MESSAGE_CHARS {
        return Err(ServiceError::InvalidArgument(format!(
            "message must be 1 to {MAX_MESSAGE_CHARS} characters after trimming"
        )));
    }
    Ok(trimmed.to_owned())
}

async fn store_and_relay(
    state: &SharedState,
    match_id: MatchId,
    author: ChatAuthorEntity,
    text: String,
) -> Result<ChatMessageView, ServiceError> {
    let store = state.require_match_store().await?;
    let entity = ChatMessageEntity {
        id: Uuid::new_v4(),
        match_id,
        author,
        text,
        sent_at: SystemTime::now(),
    };
    store.save_chat_message(entity.clone()).await?;

    let view = ChatMessageView::from(&entity);
    sse_events::broadcast_new_message(state, &view);
    Ok(view)
}
