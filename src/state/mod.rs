pub mod match_status;
pub mod matches;
mod rooms;
pub mod veto;

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use dashmap::DashMap;
use tokio::{
    sync::{Mutex, RwLock, watch},
    time::timeout,
};
use tracing::debug;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        match_store::{MatchStore, WriteOutcome},
        models::{MatchEntity, VetoEntryEntity},
    },
    dto::handoff::HandoffStatus,
    error::ServiceError,
    services::{auth_service::IdentityProvider, rcon::RemoteConnector},
    state::matches::{MatchId, PlayerId},
};

pub use self::rooms::{Rooms, SseHub};

pub type SharedState = Arc<AppState>;
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(5);
/// Attempts made by [`AppState::run_match_transaction`] before a lost race surfaces as `Conflict`.
pub const MAX_TRANSACTION_ATTEMPTS: u32 = 5;

/// Write produced by a transaction's decision step.
#[derive(Debug)]
pub enum Mutation {
    /// Replace the whole match record, conditional on the revision that was read.
    Replace(MatchEntity),
    /// Append one veto entry, conditional on the log length and the veto phase.
    AppendVeto {
        entry: VetoEntryEntity,
        selected_map: Option<String>,
    },
    /// Nothing to write; the operation was a no-op.
    None,
}

/// What a transaction decided to write, plus the value handed back to the caller.
#[derive(Debug)]
pub struct Decision<T> {
    pub mutation: Mutation,
    pub outcome: T,
}

impl<T> Decision<T> {
    pub fn replace(next: MatchEntity, outcome: T) -> Self {
        Self {
            mutation: Mutation::Replace(next),
            outcome,
        }
    }

    pub fn append_veto(entry: VetoEntryEntity, selected_map: Option<String>, outcome: T) -> Self {
        Self {
            mutation: Mutation::AppendVeto {
                entry,
                selected_map,
            },
            outcome,
        }
    }

    pub fn unchanged(outcome: T) -> Self {
        Self {
            mutation: Mutation::None,
            outcome,
        }
    }
}

/// Central application state: storage handle, fan-out rooms, sessions and collaborators.
pub struct AppState {
    match_store: RwLock<Option<Arc<dyn MatchStore>>>,
    degraded: watch::Sender<bool>,
    rooms: Rooms,
    sessions: DashMap<String, PlayerId>,
    match_gates: DashMap<MatchId, Arc<Mutex<()>>>,
    handoffs: DashMap<MatchId, HandoffStatus>,
    config: AppConfig,
    identity: Arc<dyn IdentityProvider>,
    connector: Arc<dyn RemoteConnector>,
    transaction_timeout: Duration,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`].
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(
        config: AppConfig,
        identity: Arc<dyn IdentityProvider>,
        connector: Arc<dyn RemoteConnector>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            match_store: RwLock::new(None),
            degraded: degraded_tx,
            rooms: Rooms::new(),
            sessions: DashMap::new(),
            match_gates: DashMap::new(),
            handoffs: DashMap::new(),
            config,
            identity,
            connector,
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
        })
    }

    pub async fn match_store(&self) -> Option<Arc<dyn MatchStore>> {
        self.match_store.read().await.as_ref().cloned()
    }

    /// Current store, or [`ServiceError::Degraded`] while none is installed.
    pub async fn require_match_store(&self) -> Result<Arc<dyn MatchStore>, ServiceError> {
        self.match_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a store implementation and leave degraded mode.
    pub async fn install_match_store(&self, store: Arc<dyn MatchStore>) {
        *self.match_store.write().await = Some(store);
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_match_store(&self) {
        self.match_store.write().await.take();
        self.update_degraded(true);
    }

    pub async fn is_degraded(&self) -> bool {
        self.match_store.read().await.is_none()
    }

    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }

    pub fn rooms(&self) -> &Rooms {
        &self.rooms
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }

    pub fn connector(&self) -> &Arc<dyn RemoteConnector> {
        &self.connector
    }

    pub fn handoffs(&self) -> &DashMap<MatchId, HandoffStatus> {
        &self.handoffs
    }

    /// Issue an opaque bearer token bound to `player_id`.
    pub fn open_session(&self, player_id: PlayerId) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.sessions.insert(token.clone(), player_id);
        token
    }

    pub fn session_player(&self, token: &str) -> Option<PlayerId> {
        self.sessions.get(token).map(|entry| *entry.value())
    }

    /// Revoke a token; returns whether it existed.
    pub fn close_session(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    fn match_gate(&self, match_id: MatchId) -> Arc<Mutex<()>> {
        self.match_gates.entry(match_id).or_default().clone()
    }

    /// Forget the per-match gate of a match that reached its terminal phase.
    pub fn release_match_gate(&self, match_id: MatchId) {
        self.match_gates.remove(&match_id);
    }

    /// Atomic read-modify-write of one match.
    ///
    /// Operations on the same match id are serialised by an in-process gate; the write itself is
    /// conditional in the store, so a concurrent writer from another process turns into a
    /// [`WriteOutcome::Conflict`] and the whole read/decide/write cycle is replayed, up to
    /// [`MAX_TRANSACTION_ATTEMPTS`] times. `decide` must therefore be free of side effects.
    ///
    /// Returns the committed record (or the unchanged one for [`Mutation::None`]) together with
    /// the decision's outcome.
    pub async fn run_match_transaction<T, F>(
        &self,
        match_id: MatchId,
        mut decide: F,
    ) -> Result<(MatchEntity, T), ServiceError>
    where
        T: Send,
        F: FnMut(&MatchEntity) -> Result<Decision<T>, ServiceError> + Send,
    {
        let store = self.require_match_store().await?;
        let gate = self.match_gate(match_id);
        let _guard = gate.lock().await;

        timeout(
            self.transaction_timeout,
            transact(store.as_ref(), match_id, &mut decide),
        )
        .await
        .map_err(|_| ServiceError::Timeout)?
    }
}

async fn transact<T, F>(
    store: &dyn MatchStore,
    match_id: MatchId,
    decide: &mut F,
) -> Result<(MatchEntity, T), ServiceError>
where
    F: FnMut(&MatchEntity) -> Result<Decision<T>, ServiceError>,
{
    for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
        let current = store
            .find_match(match_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("match {match_id}")))?;

        let Decision { mutation, outcome } = decide(&current)?;

        let (write, committed) = match mutation {
            Mutation::None => return Ok((current, outcome)),
            Mutation::Replace(mut next) => {
                next.revision = current.revision + 1;
                next.updated_at = SystemTime::now();
                let write = store.replace_match(next.clone(), current.revision).await?;
                (write, next)
            }
            Mutation::AppendVeto {
                entry,
                selected_map,
            } => {
                let mut committed = current;
                committed.apply_veto_append(entry.clone(), selected_map.clone());
                let write = store.append_veto(match_id, entry, selected_map).await?;
                (write, committed)
            }
        };

        match write {
            WriteOutcome::Applied => return Ok((committed, outcome)),
            WriteOutcome::Conflict => {
                debug!(match_id, attempt, "match write lost a race; retrying");
            }
        }
    }

    Err(ServiceError::Conflict(format!(
        "match {match_id} kept changing; gave up after {MAX_TRANSACTION_ATTEMPTS} attempts"
    )))
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::{test_support::memory_state, *};
    use crate::dao::models::{NewMatchEntity, ServerDescriptorEntity};

    async fn seeded() -> (SharedState, MatchId) {
        let (state, store) = memory_state().await;
        let created = store
            .create_match(NewMatchEntity {
                title: "m".into(),
                team1_name: "A".into(),
                team2_name: "B".into(),
                map_pool: vec!["a".into(), "b".into(), "c".into()],
                server: ServerDescriptorEntity {
                    host: "127.0.0.1".into(),
                    port: 27015,
                    secret: "x".into(),
                },
                created_by: 1,
            })
            .await
            .unwrap();
        (state, created.id)
    }

    #[tokio::test]
    async fn degraded_until_store_installed() {
        let (state, _) = memory_state().await;
        assert!(!state.is_degraded().await);
        state.clear_match_store().await;
        assert!(state.is_degraded().await);
        assert!(matches!(
            state.run_match_transaction(1, |_| Ok(Decision::unchanged(()))).await,
            Err(ServiceError::Degraded)
        ));
    }

    #[tokio::test]
    async fn replace_bumps_revision_once() {
        let (state, id) = seeded().await;
        let (committed, ()) = state
            .run_match_transaction(id, |current| {
                let mut next = current.clone();
                next.title = "renamed".into();
                Ok(Decision::replace(next, ()))
            })
            .await
            .unwrap();
        assert_eq!(committed.revision, 1);

        let stored = state
            .require_match_store()
            .await
            .unwrap()
            .find_match(id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.title, "renamed");
        assert_eq!(stored.revision, 1);
    }

    #[tokio::test]
    async fn missing_match_is_not_found() {
        let (state, _) = seeded().await;
        let calls = AtomicU32::new(0);
        let result = state
            .run_match_transaction(99, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Decision::unchanged(()))
            })
            .await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn persistent_conflict_surfaces_after_bounded_retries() {
        let (state, id) = seeded().await;
        let calls = AtomicU32::new(0);
        let result = state
            .run_match_transaction(id, |current| {
                calls.fetch_add(1, Ordering::SeqCst);
                // Appending at a stale index never applies.
                let entry = VetoEntryEntity {
                    order_index: current.veto.len() + 1,
                    team: crate::state::matches::TeamSlot::Team1,
                    map_name: "a".into(),
                    action: crate::state::matches::VetoAction::Ban,
                    actor_id: 1,
                    performed_at: SystemTime::now(),
                };
                Ok(Decision::append_veto(entry, None, ()))
            })
            .await;
        assert!(matches!(result, Err(ServiceError::Conflict(_))));
        assert_eq!(calls.load(Ordering::SeqCst), MAX_TRANSACTION_ATTEMPTS);
    }

    #[tokio::test]
    async fn sessions_resolve_until_closed() {
        let (state, _) = memory_state().await;
        let token = state.open_session(42);
        assert_eq!(token.len(), 32);
        assert_eq!(state.session_player(&token), Some(42));
        assert!(state.close_session(&token));
        assert_eq!(state.session_player(&token), None);
        assert!(!state.close_session(&token));
    }
}
