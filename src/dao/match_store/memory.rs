use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::SystemTime,
};

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::{
    dao::{
        match_store::{MatchStore, WriteOutcome},
        models::{ChatMessageEntity, MatchEntity, NewMatchEntity, PlayerEntity, VetoEntryEntity},
        storage::StorageResult,
    },
    state::{
        match_status::MatchStatus,
        matches::{MatchId, PlayerId},
    },
};

/// In-process store; every write happens under one lock so conditional writes are atomic.
#[derive(Clone, Default)]
pub struct MemoryMatchStore {
    inner: Arc<RwLock<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    last_match_id: MatchId,
    matches: BTreeMap<MatchId, MatchEntity>,
    players: HashMap<PlayerId, PlayerEntity>,
    chat: HashMap<MatchId, Vec<ChatMessageEntity>>,
}

impl MemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MatchStore for MemoryMatchStore {
    fn create_match(&self, draft: NewMatchEntity) -> BoxFuture<'static, StorageResult<MatchEntity>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.write().await;
            guard.last_match_id += 1;
            let id = guard.last_match_id;
            let entity = MatchEntity::from_draft(id, draft, SystemTime::now());
            guard.matches.insert(id, entity.clone());
            Ok(entity)
        })
    }

    fn find_match(&self, id: MatchId) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.read().await.matches.get(&id).cloned()) })
    }

    fn list_matches(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let guard = inner.read().await;
            Ok(guard.matches.values().rev().take(limit).cloned().collect())
        })
    }

    fn replace_match(
        &self,
        next: MatchEntity,
        expected_revision: u64,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.write().await;
            match guard.matches.get_mut(&next.id) {
                Some(current) if current.revision == expected_revision => {
                    *current = next;
                    Ok(WriteOutcome::Applied)
                }
                _ => Ok(WriteOutcome::Conflict),
            }
        })
    }

    fn append_veto(
        &self,
        id: MatchId,
        entry: VetoEntryEntity,
        selected_map: Option<String>,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.write().await;
            let Some(current) = guard.matches.get_mut(&id) else {
                return Ok(WriteOutcome::Conflict);
            };

            if current.status != MatchStatus::Veto || current.veto.len() != entry.order_index {
                return Ok(WriteOutcome::Conflict);
            }

            current.apply_veto_append(entry, selected_map);
            Ok(WriteOutcome::Applied)
        })
    }

    fn find_player(&self, id: PlayerId) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.read().await.players.get(&id).cloned()) })
    }

    fn save_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.write().await.players.insert(player.id, player);
            Ok(())
        })
    }

    fn save_chat_message(
        &self,
        message: ChatMessageEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner
                .write()
                .await
                .chat
                .entry(message.match_id)
                .or_default()
                .push(message);
            Ok(())
        })
    }

    fn list_chat_messages(
        &self,
        match_id: MatchId,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let guard = inner.read().await;
            let messages = guard.chat.get(&match_id).map(Vec::as_slice).unwrap_or(&[]);
            let skip = messages.len().saturating_sub(limit);
            Ok(messages[skip..].to_vec())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::models::ServerDescriptorEntity,
        state::matches::{TeamSlot, VetoAction},
    };

    fn draft(title: &str) -> NewMatchEntity {
        NewMatchEntity {
            title: title.into(),
            team1_name: "Team Alpha".into(),
            team2_name: "Team Beta".into(),
            map_pool: vec!["de_dust2".into(), "de_mirage".into(), "de_nuke".into()],
            server: ServerDescriptorEntity {
                host: "127.0.0.1".into(),
                port: 27015,
                secret: "hunter2".into(),
            },
            created_by: 1,
        }
    }

    fn entry(order_index: usize, map: &str) -> VetoEntryEntity {
        VetoEntryEntity {
            order_index,
            team: TeamSlot::for_order_index(order_index),
            map_name: map.into(),
            action: VetoAction::Ban,
            actor_id: 1,
            performed_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn ids_are_monotonic_and_team_ids_derived() {
        let store = MemoryMatchStore::new();
        let first = store.create_match(draft("first")).await.unwrap();
        let second = store.create_match(draft("second")).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!((second.team1.id, second.team2.id), (3, 4));

        let listed = store.list_matches(10).await.unwrap();
        assert_eq!(
            listed.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![2, 1]
        );
    }

    #[tokio::test]
    async fn stale_revision_is_rejected() {
        let store = MemoryMatchStore::new();
        let created = store.create_match(draft("m")).await.unwrap();

        let mut next = created.clone();
        next.title = "renamed".into();
        next.revision = 1;
        assert_eq!(
            store.replace_match(next.clone(), 0).await.unwrap(),
            WriteOutcome::Applied
        );
        assert_eq!(
            store.replace_match(next, 0).await.unwrap(),
            WriteOutcome::Conflict
        );
    }

    #[tokio::test]
    async fn veto_append_requires_expected_index_and_phase() {
        let store = MemoryMatchStore::new();
        let mut created = store.create_match(draft("m")).await.unwrap();

        assert_eq!(
            store.append_veto(created.id, entry(0, "de_dust2"), None).await.unwrap(),
            WriteOutcome::Conflict
        );

        created.status = MatchStatus::Veto;
        created.revision = 1;
        store.replace_match(created.clone(), 0).await.unwrap();

        assert_eq!(
            store.append_veto(created.id, entry(0, "de_dust2"), None).await.unwrap(),
            WriteOutcome::Applied
        );
        assert_eq!(
            store.append_veto(created.id, entry(0, "de_mirage"), None).await.unwrap(),
            WriteOutcome::Conflict
        );
        assert_eq!(
            store
                .append_veto(created.id, entry(1, "de_mirage"), Some("de_nuke".into()))
                .await
                .unwrap(),
            WriteOutcome::Applied
        );

        let stored = store.find_match(created.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MatchStatus::Ready);
        assert_eq!(stored.selected_map.as_deref(), Some("de_nuke"));
        assert_eq!(stored.revision, 3);
    }

    #[tokio::test]
    async fn chat_history_returns_latest_messages_in_order() {
        let store = MemoryMatchStore::new();
        for index in 0..5 {
            store
                .save_chat_message(ChatMessageEntity {
                    id: uuid::Uuid::new_v4(),
                    match_id: 1,
                    author: crate::dao::models::ChatAuthorEntity::System,
                    text: format!("line {index}"),
                    sent_at: SystemTime::now(),
                })
                .await
                .unwrap();
        }

        let latest = store.list_chat_messages(1, 2).await.unwrap();
        assert_eq!(
            latest.iter().map(|m| m.text.as_str()).collect::<Vec<_>>(),
            vec!["line 3", "line 4"]
        );
    }
}
