//! Server handoff: once a match is `ready`, publish its configuration artifact and tell the
//! game server to load it over the remote-command channel.
//!
//! A handoff never touches the match lifecycle. Its outcome is tracked per match in memory,
//! announced to the room and the lobby, and can be retried by an admin.

use std::{error::Error as StdError, io, path::PathBuf, sync::Arc, time::SystemTime};

use dashmap::mapref::entry::Entry;
use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    config::AppConfig,
    dao::models::{MatchEntity, ServerDescriptorEntity, TeamSlotEntity},
    dto::{
        format_system_time,
        handoff::{HandoffResponse, HandoffStatus},
    },
    error::ServiceError,
    services::{
        chat_service,
        rcon::{RemoteCommand, RemoteConnector, RemoteError},
        sse_events,
    },
    state::{
        SharedState,
        match_status::MatchStatus,
        matches::{Actor, MatchId, TEAM_CAPACITY},
    },
};

#[derive(Debug, Error)]
enum HandoffError {
    #[error("match {0} disappeared from the store")]
    MissingMatch(MatchId),
    #[error("match has no selected map")]
    NoSelectedMap,
    #[error("failed to load match")]
    Store(#[source] ServiceError),
    #[error("failed to encode artifact")]
    Encode(#[from] serde_json::Error),
    #[error("failed to publish artifact to {path}")]
    Publish {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Configuration document consumed by the MatchZy plugin.
#[derive(Debug, Serialize)]
struct MatchArtifact {
    matchid: MatchId,
    match_title: String,
    maplist: Vec<String>,
    num_maps: u8,
    skip_veto: bool,
    side_type: &'static str,
    players_per_team: usize,
    team1: ArtifactTeam,
    team2: ArtifactTeam,
    cvars: IndexMap<String, String>,
}

#[derive(Debug, Serialize)]
struct ArtifactTeam {
    name: String,
    /// Player id (as a string key) to display name, in join order.
    players: IndexMap<String, String>,
}

impl From<&TeamSlotEntity> for ArtifactTeam {
    fn from(team: &TeamSlotEntity) -> Self {
        Self {
            name: team.name.clone(),
            players: team
                .members
                .iter()
                .map(|member| (member.player_id.to_string(), member.display_name.clone()))
                .collect(),
        }
    }
}

impl MatchArtifact {
    fn build(entity: &MatchEntity, ruleset: &IndexMap<String, String>) -> Result<Self, HandoffError> {
        let map = entity
            .selected_map
            .clone()
            .ok_or(HandoffError::NoSelectedMap)?;

        Ok(Self {
            matchid: entity.id,
            match_title: entity.title.clone(),
            maplist: vec![map],
            num_maps: 1,
            skip_veto: true,
            side_type: "standard",
            players_per_team: TEAM_CAPACITY,
            team1: ArtifactTeam::from(&entity.team1),
            team2: ArtifactTeam::from(&entity.team2),
            cvars: ruleset.clone(),
        })
    }
}

/// Deterministic, so a retried handoff overwrites the previous artifact.
pub fn artifact_file_name(match_id: MatchId) -> String {
    format!("match_{match_id}.json")
}

pub fn artifact_path(config: &AppConfig, match_id: MatchId) -> PathBuf {
    config.configs_dir.join(artifact_file_name(match_id))
}

pub fn artifact_url(config: &AppConfig, match_id: MatchId) -> String {
    format!(
        "{}/configs/{}",
        config.public_base_url,
        artifact_file_name(match_id)
    )
}

/// Start a background handoff unless one is already running; returns whether it started.
pub fn dispatch(state: &SharedState, match_id: MatchId) -> bool {
    let pending = HandoffStatus::Pending {
        attempt: 0,
        started_at: format_system_time(SystemTime::now()),
    };

    match state.handoffs().entry(match_id) {
        Entry::Occupied(entry) if entry.get().is_pending() => {
            debug!(match_id, "handoff already running");
            return false;
        }
        Entry::Occupied(mut entry) => {
            entry.insert(pending);
        }
        Entry::Vacant(entry) => {
            entry.insert(pending);
        }
    }

    info!(match_id, "dispatching server handoff");
    tokio::spawn(run_handoff(Arc::clone(state), match_id));
    true
}

/// Current handoff progress of an existing match.
pub async fn status(state: &SharedState, match_id: MatchId) -> Result<HandoffResponse, ServiceError> {
    let store = state.require_match_store().await?;
    if store.find_match(match_id).await?.is_none() {
        return Err(ServiceError::NotFound(format!("match {match_id}")));
    }

    Ok(HandoffResponse {
        match_id,
        status: current_status(state, match_id),
    })
}

/// Re-run the handoff of a `ready` or `live` match.
pub async fn retry(
    state: &SharedState,
    actor: &Actor,
    match_id: MatchId,
) -> Result<HandoffResponse, ServiceError> {
    if !actor.is_admin {
        return Err(ServiceError::Forbidden("admin role required".into()));
    }

    let store = state.require_match_store().await?;
    let entity = store
        .find_match(match_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("match {match_id}")))?;
    if !matches!(entity.status, MatchStatus::Ready | MatchStatus::Live) {
        return Err(ServiceError::InvalidState(format!(
            "match {match_id} is {}; only ready or live matches can be handed off",
            entity.status.label()
        )));
    }

    if !dispatch(state, match_id) {
        return Err(ServiceError::InvalidState(format!(
            "a handoff of match {match_id} is already running"
        )));
    }

    info!(match_id, by = actor.player_id, "handoff retry requested");
    Ok(HandoffResponse {
        match_id,
        status: current_status(state, match_id),
    })
}

fn current_status(state: &SharedState, match_id: MatchId) -> HandoffStatus {
    state
        .handoffs()
        .get(&match_id)
        .map(|entry| entry.value().clone())
        .unwrap_or(HandoffStatus::NotStarted)
}

async fn run_handoff(state: SharedState, match_id: MatchId) {
    let (attempts, result) = hand_off(&state, match_id).await;
    let completed_at = format_system_time(SystemTime::now());

    let (status, announcement) = match result {
        Ok(config_url) => {
            info!(match_id, attempts, url = %config_url, "server handoff succeeded");
            (
                HandoffStatus::Succeeded {
                    attempts,
                    config_url,
                    completed_at,
                },
                "Match configuration loaded on the server.".to_owned(),
            )
        }
        Err(err) => {
            let error = error_chain(&err);
            warn!(match_id, attempts, error = %error, "server handoff failed");
            (
                HandoffStatus::Failed {
                    attempts,
                    error: error.clone(),
                    completed_at,
                },
                format!("Server handoff failed: {error}"),
            )
        }
    };

    state.handoffs().insert(match_id, status.clone());
    sse_events::broadcast_handoff(&state, match_id, &status);
    chat_service::post_system_message(&state, match_id, announcement).await;
}

/// Returns the number of remote attempts made alongside the outcome.
async fn hand_off(state: &SharedState, match_id: MatchId) -> (u32, Result<String, HandoffError>) {
    let entity = match load_match(state, match_id).await {
        Ok(entity) => entity,
        Err(err) => return (0, Err(err)),
    };

    let url = match publish_artifact(state.config(), &entity).await {
        Ok(url) => url,
        Err(err) => return (0, Err(err)),
    };

    let handoff = &state.config().handoff;
    let max_attempts = handoff.max_attempts.max(1);
    let started_at = format_system_time(SystemTime::now());
    let mut backoff = handoff.initial_backoff();
    let mut attempt = 0;

    loop {
        attempt += 1;
        state.handoffs().insert(
            match_id,
            HandoffStatus::Pending {
                attempt,
                started_at: started_at.clone(),
            },
        );

        match load_on_server(state.connector().as_ref(), &entity.server, &url).await {
            Ok(()) => return (attempt, Ok(url)),
            Err(err) if attempt < max_attempts && err.is_transient() => {
                warn!(
                    match_id,
                    attempt,
                    max_attempts,
                    retry_in_ms = backoff.as_millis() as u64,
                    error = %err,
                    "handoff attempt failed; retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(err) => return (attempt, Err(err.into())),
        }
    }
}

async fn load_match(state: &SharedState, match_id: MatchId) -> Result<MatchEntity, HandoffError> {
    let store = state.require_match_store().await.map_err(HandoffError::Store)?;
    store
        .find_match(match_id)
        .await
        .map_err(|err| HandoffError::Store(err.into()))?
        .ok_or(HandoffError::MissingMatch(match_id))
}

async fn publish_artifact(config: &AppConfig, entity: &MatchEntity) -> Result<String, HandoffError> {
    let artifact = MatchArtifact::build(entity, &config.ruleset)?;
    let body = serde_json::to_vec_pretty(&artifact)?;
    let path = artifact_path(config, entity.id);

    let publish_error = |source| HandoffError::Publish {
        path: path.display().to_string(),
        source,
    };
    tokio::fs::create_dir_all(&config.configs_dir)
        .await
        .map_err(publish_error)?;
    tokio::fs::write(&path, body).await.map_err(publish_error)?;

    debug!(match_id = entity.id, path = %path.display(), "artifact published");
    Ok(artifact_url(config, entity.id))
}

async fn load_on_server(
    connector: &dyn RemoteConnector,
    server: &ServerDescriptorEntity,
    url: &str,
) -> Result<(), RemoteError> {
    let mut session = connector
        .connect(server.host.clone(), server.port, server.secret.clone())
        .await?;
    let response = session
        .execute(RemoteCommand::LoadMatchUrl(url.to_owned()))
        .await?;
    debug!(host = %server.host, port = server.port, response = %response.trim(), "load command answered");
    Ok(())
}

fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::Value;
    use tokio::net::TcpListener;

    use super::*;
    use crate::{
        error::ErrorKind,
        services::{
            lifecycle_service::{self, fixtures::*},
            rcon::fake::FakeGameServer,
            veto_service,
        },
        state::{matches::VetoAction, test_support::memory_state},
    };

    async fn ready_match(state: &SharedState, port: u16) -> MatchId {
        let id = in_veto(state, &["A", "B", "C"], port).await;
        veto_service::perform_veto_action(state, &player(101), id, "A", VetoAction::Ban)
            .await
            .unwrap();
        veto_service::perform_veto_action(state, &player(201), id, "B", VetoAction::Ban)
            .await
            .unwrap();
        id
    }

    async fn settled(state: &SharedState, match_id: MatchId) -> HandoffStatus {
        for _ in 0..300 {
            let status = current_status(state, match_id);
            if !status.is_pending() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("handoff never settled");
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn artifact_carries_rosters_map_and_ruleset() {
        let server = FakeGameServer::start("s3cret", 0).await;
        let (state, _) = memory_state().await;
        let id = ready_match(&state, server.port).await;
        let status = settled(&state, id).await;

        let HandoffStatus::Succeeded { config_url, .. } = status else {
            panic!("unexpected {status:?}");
        };
        assert_eq!(config_url, artifact_url(state.config(), id));

        let raw = tokio::fs::read(artifact_path(state.config(), id)).await.unwrap();
        let artifact: Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(artifact["matchid"], id);
        assert_eq!(artifact["maplist"], serde_json::json!(["C"]));
        assert_eq!(artifact["num_maps"], 1);
        assert_eq!(artifact["team1"]["name"], "Alpha");
        assert_eq!(artifact["team1"]["players"]["101"], "player101");
        assert_eq!(artifact["team2"]["players"].as_object().unwrap().len(), 5);
        assert_eq!(artifact["cvars"]["mp_maxrounds"], "24");
    }

    #[tokio::test]
    async fn unreachable_server_fails_after_bounded_attempts_without_touching_status() {
        let port = closed_port().await;
        let (state, _) = memory_state().await;
        let id = ready_match(&state, port).await;
        let mut room = state.rooms().room(id).subscribe();

        let status = settled(&state, id).await;
        assert!(
            matches!(status, HandoffStatus::Failed { attempts: 3, .. }),
            "unexpected {status:?}"
        );

        let snapshot = lifecycle_service::get_match(&state, id).await.unwrap();
        assert_eq!(snapshot.status, MatchStatus::Ready);

        let mut saw_failure = false;
        while let Ok(event) = room.try_recv() {
            saw_failure |= event.event.as_deref() == Some("handoff_failed");
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn rejected_secret_is_not_retried_but_admin_can_retry() {
        let server = FakeGameServer::start("s3cret", 1).await;
        let (state, _) = memory_state().await;
        let id = ready_match(&state, server.port).await;

        let status = settled(&state, id).await;
        assert!(matches!(status, HandoffStatus::Failed { attempts: 1, .. }));

        assert_eq!(
            retry(&state, &player(101), id).await.unwrap_err().kind(),
            ErrorKind::Forbidden
        );
        retry(&state, &admin(), id).await.unwrap();
        let status = settled(&state, id).await;
        assert!(matches!(status, HandoffStatus::Succeeded { attempts: 1, .. }));
        assert_eq!(server.commands.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn retry_requires_a_ready_or_live_match() {
        let (state, _) = memory_state().await;
        let id = full_lobby(&state, &["A", "B", "C"], 1).await;

        assert_eq!(
            retry(&state, &admin(), id).await.unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            status(&state, id).await.unwrap().status,
            HandoffStatus::NotStarted
        );
        assert_eq!(
            status(&state, 999).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
