use std::time::SystemTime;

use futures::future::BoxFuture;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    dao::models::PlayerEntity,
    dto::auth::{LoginResponse, PlayerView},
    error::ServiceError,
    state::{
        SharedState,
        matches::{Actor, PlayerId},
    },
};

const MAX_DISPLAY_NAME_LEN: usize = 64;

/// Header the login gateway sets to prove it completed the provider handshake.
pub const GATEWAY_KEY_HEADER: &str = "x-gateway-key";

/// Stable identity returned by the external provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub player_id: PlayerId,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("malformed identity payload: {0}")]
    Malformed(String),
    #[error("identity rejected: {0}")]
    Rejected(String),
}

/// Exchanges a provider callback payload for a stable player identity.
pub trait IdentityProvider: Send + Sync {
    fn authenticate(
        &self,
        payload: serde_json::Value,
    ) -> BoxFuture<'static, Result<ExternalIdentity, IdentityError>>;
}

/// Accepts identities already resolved by an upstream gateway that completed the provider
/// handshake, e.g. `{"player_id": "76561198000000001", "display_name": "alice"}`.
///
/// The payload carries no credential of its own; [`login`] only hands it over once the request
/// presented the gateway secret.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustedPayloadProvider;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPlayerId {
    Number(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct TrustedPayload {
    player_id: RawPlayerId,
    display_name: String,
    #[serde(default)]
    avatar_url: Option<String>,
}

impl TrustedPayloadProvider {
    fn parse(payload: serde_json::Value) -> Result<ExternalIdentity, IdentityError> {
        let raw: TrustedPayload = serde_json::from_value(payload)
            .map_err(|err| IdentityError::Malformed(err.to_string()))?;

        let player_id = match raw.player_id {
            RawPlayerId::Number(id) => id,
            RawPlayerId::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| IdentityError::Malformed(format!("player id `{text}`")))?,
        };
        if player_id == 0 {
            return Err(IdentityError::Rejected("player id 0".into()));
        }

        let display_name = raw.display_name.trim();
        if display_name.is_empty() || display_name.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(IdentityError::Malformed(format!(
                "display name must be 1 to {MAX_DISPLAY_NAME_LEN} characters"
            )));
        }

        Ok(ExternalIdentity {
            player_id,
            display_name: display_name.to_owned(),
            avatar_url: raw.avatar_url.filter(|url| !url.trim().is_empty()),
        })
    }
}

impl IdentityProvider for TrustedPayloadProvider {
    fn authenticate(
        &self,
        payload: serde_json::Value,
    ) -> BoxFuture<'static, Result<ExternalIdentity, IdentityError>> {
        Box::pin(async move { Self::parse(payload) })
    }
}

/// Compare the presented gateway key with the configured secret in constant time.
///
/// Both sides are hashed first so the comparison length never depends on the input.
fn verify_gateway_key(expected: Option<&str>, presented: Option<&str>) -> Result<(), ServiceError> {
    let Some(expected) = expected else {
        return Err(ServiceError::Unauthenticated(
            "logins are disabled: no gateway secret configured".into(),
        ));
    };
    let presented = presented.ok_or_else(|| {
        ServiceError::Unauthenticated(format!("missing `{GATEWAY_KEY_HEADER}` header"))
    })?;

    let expected = Sha256::digest(expected.as_bytes());
    let presented = Sha256::digest(presented.as_bytes());
    if bool::from(expected.as_slice().ct_eq(presented.as_slice())) {
        Ok(())
    } else {
        warn!("login refused: gateway key mismatch");
        Err(ServiceError::Unauthenticated("invalid gateway key".into()))
    }
}

/// Authenticate through the identity adapter, refresh the player record and open a session.
///
/// `gateway_key` is the value of [`GATEWAY_KEY_HEADER`]; requests that did not come through the
/// gateway are refused before the payload is looked at.
pub async fn login(
    state: &SharedState,
    gateway_key: Option<&str>,
    payload: serde_json::Value,
) -> Result<LoginResponse, ServiceError> {
    verify_gateway_key(state.config().gateway_secret.as_deref(), gateway_key)?;

    let identity = state
        .identity()
        .authenticate(payload)
        .await
        .map_err(|err| ServiceError::Unauthenticated(err.to_string()))?;

    let store = state.require_match_store().await?;
    let existing = store.find_player(identity.player_id).await?;
    if existing.as_ref().is_some_and(|player| player.is_banned) {
        return Err(ServiceError::Forbidden(format!(
            "player {} is banned",
            identity.player_id
        )));
    }

    let now = SystemTime::now();
    let player = PlayerEntity {
        id: identity.player_id,
        display_name: identity.display_name,
        avatar_url: identity.avatar_url,
        is_admin: state.config().is_admin(identity.player_id),
        is_banned: false,
        created_at: existing.map(|player| player.created_at).unwrap_or(now),
        updated_at: now,
    };
    store.save_player(player.clone()).await?;

    let token = state.open_session(player.id);
    info!(player_id = player.id, is_admin = player.is_admin, "player logged in");

    Ok(LoginResponse {
        token,
        player: PlayerView::from(&player),
    })
}

/// Revoke a session token.
pub fn logout(state: &SharedState, token: &str) -> Result<(), ServiceError> {
    if state.close_session(token) {
        Ok(())
    } else {
        Err(ServiceError::Unauthenticated("unknown session".into()))
    }
}

/// Build the explicit caller context from a bearer token, re-reading the player record.
pub async fn resolve_actor(state: &SharedState, token: &str) -> Result<Actor, ServiceError> {
    let player_id = state
        .session_player(token)
        .ok_or_else(|| ServiceError::Unauthenticated("unknown session".into()))?;

    let store = state.require_match_store().await?;
    let player = store
        .find_player(player_id)
        .await?
        .ok_or_else(|| ServiceError::Unauthenticated(format!("unknown player {player_id}")))?;

    if player.is_banned {
        return Err(ServiceError::Forbidden(format!("player {player_id} is banned")));
    }

    Ok(Actor {
        player_id: player.id,
        display_name: player.display_name,
        is_admin: player.is_admin,
    })
}

pub async fn me(state: &SharedState, actor: &Actor) -> Result<PlayerView, ServiceError> {
    let store = state.require_match_store().await?;
    store
        .find_player(actor.player_id)
        .await?
        .map(|player| PlayerView::from(&player))
        .ok_or_else(|| ServiceError::NotFound(format!("player {}", actor.player_id)))
}

/// Flag or unflag a player; banned players are refused on their next request.
pub async fn set_banned(
    state: &SharedState,
    actor: &Actor,
    player_id: PlayerId,
    banned: bool,
) -> Result<PlayerView, ServiceError> {
    if !actor.is_admin {
        return Err(ServiceError::Forbidden("admin role required".into()));
    }

    let store = state.require_match_store().await?;
    let mut player = store
        .find_player(player_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("player {player_id}")))?;

    if banned && player_id == actor.player_id {
        return Err(ServiceError::InvalidArgument(
            "admins cannot ban themselves".into(),
        ));
    }

    if player.is_banned != banned {
        player.is_banned = banned;
        player.updated_at = SystemTime::now();
        store.save_player(player.clone()).await?;
        info!(player_id, banned, by = actor.player_id, "player ban flag changed");
    }

    Ok(PlayerView::from(&player))
}
