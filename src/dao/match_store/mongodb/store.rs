use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, doc},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoChatDocument, MongoCounterDocument, MongoMatchDocument, MongoPlayerDocument,
        match_filter, veto_entry_document,
    },
};
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

const MATCH_COLLECTION_NAME: &str = "matches";
const PLAYER_COLLECTION_NAME: &str = "players";
const CHAT_COLLECTION_NAME: &str = "chat_messages";
const COUNTER_COLLECTION_NAME: &str = "counters";
const MATCH_COUNTER: &str = "matches";

#[derive(Clone)]
pub struct MongoMatchStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    // Kept so the client outlives every `Database` handle cloned from it.
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.state.read().await.database.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoMatchStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let store = Self {
            inner: Arc::new(MongoInner {
                state: RwLock::new(MongoState { client, database }),
                config,
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let status_index = IndexModel::builder()
            .keys(doc! { "status": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("match_status_idx".to_owned()))
                    .build(),
            )
            .build();
        database
            .collection::<mongodb::bson::Document>(MATCH_COLLECTION_NAME)
            .create_index(status_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: MATCH_COLLECTION_NAME,
                index: "status",
                source,
            })?;

        let chat_index = IndexModel::builder()
            .keys(doc! { "match_id": 1, "sent_at": -1 })
            .options(
                IndexOptions::builder()
                    .name(Some("chat_match_sent_idx".to_owned()))
                    .build(),
            )
            .build();
        database
            .collection::<mongodb::bson::Document>(CHAT_COLLECTION_NAME)
            .create_index(chat_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: CHAT_COLLECTION_NAME,
                index: "match_id,sent_at",
                source,
            })?;

        Ok(())
    }

    async fn database(&self) -> Database {
        self.inner.state.read().await.database.clone()
    }

    async fn matches(&self) -> Collection<MongoMatchDocument> {
        self.database().await.collection(MATCH_COLLECTION_NAME)
    }

    async fn players(&self) -> Collection<MongoPlayerDocument> {
        self.database().await.collection(PLAYER_COLLECTION_NAME)
    }

    async fn chat(&self) -> Collection<MongoChatDocument> {
        self.database().await.collection(CHAT_COLLECTION_NAME)
    }

    async fn next_match_id(&self) -> MongoResult<MatchId> {
        let counters: Collection<MongoCounterDocument> =
            self.database().await.collection(COUNTER_COLLECTION_NAME);

        let counter = counters
            .find_one_and_update(
                doc! { "_id": MATCH_COUNTER },
                doc! { "$inc": { "seq": 1_i64 } },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::AllocateMatchId {
                source: Some(source),
            })?
            .ok_or(MongoDaoError::AllocateMatchId { source: None })?;

        u64::try_from(counter.seq).map_err(|_| MongoDaoError::Corrupted {
            entity: "counter",
            id: MATCH_COUNTER.to_owned(),
            reason: format!("negative sequence {}", counter.seq),
        })
    }

    async fn create_match(&self, draft: NewMatchEntity) -> MongoResult<MatchEntity> {
        let id = self.next_match_id().await?;
        let entity = MatchEntity::from_draft(id, draft, SystemTime::now());
        let document: MongoMatchDocument = entity.clone().into();

        self.matches()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveMatch { id, source })?;

        debug!(match_id = id, "match document inserted");
        Ok(entity)
    }

    async fn find_match(&self, id: MatchId) -> MongoResult<Option<MatchEntity>> {
        let document = self
            .matches()
            .await
            .find_one(match_filter(id))
            .await
            .map_err(|source| MongoDaoError::LoadMatch { id, source })?;

        document.map(MatchEntity::try_from).transpose()
    }

    async fn list_matches(&self, limit: usize) -> MongoResult<Vec<MatchEntity>> {
        let documents: Vec<MongoMatchDocument> = self
            .matches()
            .await
            .find(doc! {})
            .sort(doc! { "_id": -1 })
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await
            .map_err(|source| MongoDaoError::ListMatches { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListMatches { source })?;

        documents.into_iter().map(MatchEntity::try_from).collect()
    }

    async fn replace_match(
        &self,
        next: MatchEntity,
        expected_revision: u64,
    ) -> MongoResult<WriteOutcome> {
        let id = next.id;
        let mut filter = match_filter(id);
        filter.insert("revision", expected_revision as i64);
        let document: MongoMatchDocument = next.into();

        let result = self
            .matches()
            .await
            .replace_one(filter, &document)
            .await
            .map_err(|source| MongoDaoError::SaveMatch { id, source })?;

        Ok(if result.matched_count == 1 {
            WriteOutcome::Applied
        } else {
            WriteOutcome::Conflict
        })
    }

    async fn append_veto(
        &self,
        id: MatchId,
        entry: VetoEntryEntity,
        selected_map: Option<String>,
    ) -> MongoResult<WriteOutcome> {
        let mut filter = match_filter(id);
        filter.insert("status", MatchStatus::Veto.label());
        filter.insert("veto", doc! { "$size": entry.order_index as i64 });

        let mut set = doc! { "updated_at": DateTime::from_system_time(entry.performed_at) };
        if let Some(map) = selected_map {
            set.insert("selected_map", map);
            set.insert("status", MatchStatus::Ready.label());
        }

        let update = doc! {
            "$push": { "veto": veto_entry_document(&entry) },
            "$set": set,
            "$inc": { "revision": 1_i64 },
        };

        let result = self
            .matches()
            .await
            .update_one(filter, update)
            .await
            .map_err(|source| MongoDaoError::SaveMatch { id, source })?;

        Ok(if result.modified_count == 1 {
            WriteOutcome::Applied
        } else {
            WriteOutcome::Conflict
        })
    }

    async fn find_player(&self, id: PlayerId) -> MongoResult<Option<PlayerEntity>> {
        let document = self
            .players()
            .await
            .find_one(doc! { "_id": id as i64 })
            .await
            .map_err(|source| MongoDaoError::LoadPlayer { id, source })?;

        document.map(PlayerEntity::try_from).transpose()
    }

    async fn save_player(&self, player: PlayerEntity) -> MongoResult<()> {
        let id = player.id;
        let document: MongoPlayerDocument = player.into();
        self.players()
            .await
            .replace_one(doc! { "_id": id as i64 }, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SavePlayer { id, source })?;
        Ok(())
    }

    async fn save_chat_message(&self, message: ChatMessageEntity) -> MongoResult<()> {
        let match_id = message.match_id;
        let document: MongoChatDocument = message.into();
        self.chat()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveChat { match_id, source })?;
        Ok(())
    }

    async fn list_chat_messages(
        &self,
        match_id: MatchId,
        limit: usize,
    ) -> MongoResult<Vec<ChatMessageEntity>> {
        let documents: Vec<MongoChatDocument> = self
            .chat()
            .await
            .find(doc! { "match_id": match_id as i64 })
            .sort(doc! { "sent_at": -1 })
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await
            .map_err(|source| MongoDaoError::ListChat { match_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListChat { match_id, source })?;

        let mut messages = documents
            .into_iter()
            .map(ChatMessageEntity::try_from)
            .collect::<MongoResult<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }
}

impl MatchStore for MongoMatchStore {
    fn create_match(&self, draft: NewMatchEntity) -> BoxFuture<'static, StorageResult<MatchEntity>> {
        let store = self.clone();
        Box::pin(async move { store.create_match(draft).await.map_err(Into::into) })
    }

    fn find_match(&self, id: MatchId) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_match(id).await.map_err(Into::into) })
    }

    fn list_matches(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_matches(limit).await.map_err(Into::into) })
    }

    fn replace_match(
        &self,
        next: MatchEntity,
        expected_revision: u64,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .replace_match(next, expected_revision)
                .await
                .map_err(Into::into)
        })
    }

    fn append_veto(
        &self,
        id: MatchId,
        entry: VetoEntryEntity,
        selected_map: Option<String>,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .append_veto(id, entry, selected_map)
                .await
                .map_err(Into::into)
        })
    }

    fn find_player(&self, id: PlayerId) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_player(id).await.map_err(Into::into) })
    }

    fn save_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_player(player).await.map_err(Into::into) })
    }

    fn save_chat_message(
        &self,
        message: ChatMessageEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_chat_message(message).await.map_err(Into::into) })
    }

    fn list_chat_messages(
        &self,
        match_id: MatchId,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_chat_messages(match_id, limit)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
