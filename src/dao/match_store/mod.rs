pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;

use crate::{
    dao::{
        models::{ChatMessageEntity, MatchEntity, NewMatchEntity, PlayerEntity, VetoEntryEntity},
        storage::StorageResult,
    },
    state::matches::{MatchId, PlayerId},
};

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The precondition held and the write is durable.
    Applied,
    /// Another writer changed the record first; nothing was written.
    Conflict,
}

/// Abstraction over the persistence layer for matches, players and chat.
///
/// Every match mutation is conditional: callers read a snapshot, decide, then write back only
/// if nobody else committed in between.
pub trait MatchStore: Send + Sync {
    /// Allocate the next match id and persist the match with both team slots in one write.
    fn create_match(&self, draft: NewMatchEntity) -> BoxFuture<'static, StorageResult<MatchEntity>>;
    fn find_match(&self, id: MatchId) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>>;
    /// Most recent matches first.
    fn list_matches(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>>;
    /// Replace the match iff its stored revision still equals `expected_revision`.
    ///
    /// `next.revision` must already be `expected_revision + 1`.
    fn replace_match(
        &self,
        next: MatchEntity,
        expected_revision: u64,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>>;
    /// Append `entry` iff the match is in its veto phase and its log holds exactly
    /// `entry.order_index` entries. When `selected_map` is set the same write records the map
    /// and moves the match to `ready`.
    fn append_veto(
        &self,
        id: MatchId,
        entry: VetoEntryEntity,
        selected_map: Option<String>,
    ) -> BoxFuture<'static, StorageResult<WriteOutcome>>;
    fn find_player(&self, id: PlayerId) -> BoxFuture<'static, StorageResult<Option<PlayerEntity>>>;
    fn save_player(&self, player: PlayerEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn save_chat_message(
        &self,
        message: ChatMessageEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Latest `limit` messages of a match, oldest first.
    fn list_chat_messages(
        &self,
        match_id: MatchId,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<ChatMessageEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
