//! Match lifecycle operations: every mutation is a single read-decide-write transaction on the
//! match record, and events are published only after the write committed.

use std::{collections::HashSet, time::SystemTime};

use tracing::info;

use crate::{
    dao::models::{MatchEntity, MemberEntity, NewMatchEntity, ServerDescriptorEntity},
    dto::matches::{CreateMatchRequest, MatchListItem, MatchSnapshot},
    error::{NotReadyReason, ServiceError},
    services::{chat_service, sse_events},
    state::{
        Decision, SharedState,
        match_status::{MatchEvent, MatchStatus},
        matches::{Actor, MATCH_SIZE, MIN_MAP_POOL, MatchId, PlayerId, TEAM_CAPACITY, TeamSlot},
    },
};

const LIST_LIMIT: usize = 20;

fn require_admin(actor: &Actor) -> Result<(), ServiceError> {
    if actor.is_admin {
        Ok(())
    } else {
        Err(ServiceError::Forbidden("admin role required".into()))
    }
}

fn require_status(entity: &MatchEntity, expected: MatchStatus) -> Result<(), ServiceError> {
    if entity.status == expected {
        Ok(())
    } else {
        Err(ServiceError::InvalidState(format!(
            "match {} is {}, expected {}",
            entity.id,
            entity.status.label(),
            expected.label()
        )))
    }
}

/// Pools must hold an odd number (at least three) of distinct, non-empty names so that
/// alternating bans always end on exactly one map.
pub fn validate_map_pool(pool: &[String]) -> Result<(), ServiceError> {
    if pool.len() < MIN_MAP_POOL {
        return Err(ServiceError::InvalidArgument(format!(
            "map pool needs at least {MIN_MAP_POOL} maps (got {})",
            pool.len()
        )));
    }
    if pool.len() % 2 == 0 {
        return Err(ServiceError::InvalidArgument(format!(
            "map pool size must be odd (got {})",
            pool.len()
        )));
    }

    let mut seen = HashSet::new();
    for map in pool {
        if map.trim().is_empty() {
            return Err(ServiceError::InvalidArgument("map names must be non-empty".into()));
        }
        if !seen.insert(map.as_str()) {
            return Err(ServiceError::InvalidArgument(format!(
                "map `{map}` appears twice in the pool"
            )));
        }
    }
    Ok(())
}

/// Open a match with both team slots in one store write.
pub async fn create_match(
    state: &SharedState,
    actor: &Actor,
    request: CreateMatchRequest,
) -> Result<MatchSnapshot, ServiceError> {
    require_admin(actor)?;

    let title = request.title.trim();
    if title.is_empty() {
        return Err(ServiceError::InvalidArgument("title must not be empty".into()));
    }

    let map_pool = request
        .map_pool
        .unwrap_or_else(|| state.config().default_map_pool.clone());
    validate_map_pool(&map_pool)?;

    let draft = NewMatchEntity {
        title: title.to_owned(),
        team1_name: team_name(request.team1_name, TeamSlot::Team1),
        team2_name: team_name(request.team2_name, TeamSlot::Team2),
        map_pool,
        server: ServerDescriptorEntity {
            host: request.server.host,
            port: request.server.port,
            secret: request.server.secret,
        },
        created_by: actor.player_id,
    };

    let store = state.require_match_store().await?;
    let entity = store.create_match(draft).await?;
    info!(match_id = entity.id, by = actor.player_id, "match created");

    sse_events::broadcast_match_created(state, &entity);
    Ok(MatchSnapshot::from(&entity))
}

fn team_name(requested: Option<String>, slot: TeamSlot) -> String {
    requested
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| match slot {
            TeamSlot::Team1 => "Team 1".to_owned(),
            TeamSlot::Team2 => "Team 2".to_owned(),
        })
}

pub async fn list_matches(state: &SharedState) -> Result<Vec<MatchListItem>, ServiceError> {
    let store = state.require_match_store().await?;
    let matches = store.list_matches(LIST_LIMIT).await?;
    Ok(matches.iter().map(MatchListItem::from).collect())
}

pub async fn get_match(state: &SharedState, match_id: MatchId) -> Result<MatchSnapshot, ServiceError> {
    let store = state.require_match_store().await?;
    store
        .find_match(match_id)
        .await?
        .map(|entity| MatchSnapshot::from(&entity))
        .ok_or_else(|| ServiceError::NotFound(format!("match {match_id}")))
}

/// Put the actor into `slot`. The first member of an empty slot becomes its captain.
///
/// Joining the slot one already occupies changes nothing; joining the other one is refused
/// until the actor leaves.
pub async fn join_team(
    state: &SharedState,
    actor: &Actor,
    match_id: MatchId,
    slot: TeamSlot,
) -> Result<MatchSnapshot, ServiceError> {
    let (committed, joined) = state
        .run_match_transaction(match_id, |current| {
            require_status(current, MatchStatus::Waiting)?;

            match current.slot_of(actor.player_id) {
                Some(occupied) if occupied == slot => return Ok(Decision::unchanged(None)),
                Some(occupied) => return Err(ServiceError::AlreadyJoined { slot: occupied }),
                None => {}
            }

            let team = current.team(slot);
            if team.members.len() >= TEAM_CAPACITY {
                return Err(ServiceError::SlotFull { slot });
            }

            let member = MemberEntity {
                player_id: actor.player_id,
                display_name: actor.display_name.clone(),
                is_captain: team.members.is_empty(),
                is_ready: false,
                joined_at: SystemTime::now(),
            };

            let mut next = current.clone();
            next.team_mut(slot).members.push(member.clone());
            Ok(Decision::replace(next, Some(member)))
        })
        .await?;

    if let Some(member) = joined {
        info!(
            match_id,
            player_id = actor.player_id,
            %slot,
            captain = member.is_captain,
            "player joined team"
        );
        sse_events::broadcast_player_joined(state, match_id, slot, &member);
    }

    Ok(MatchSnapshot::from(&committed))
}

/// Remove the actor from whichever slot they occupy. Captaincy is not handed over.
pub async fn leave_team(
    state: &SharedState,
    actor: &Actor,
    match_id: MatchId,
) -> Result<MatchSnapshot, ServiceError> {
    let (committed, slot) = state
        .run_match_transaction(match_id, |current| {
            require_status(current, MatchStatus::Waiting)?;
            let slot = current
                .slot_of(actor.player_id)
                .ok_or(ServiceError::NotMember)?;

            let mut next = current.clone();
            next.team_mut(slot)
                .members
                .retain(|member| member.player_id != actor.player_id);
            Ok(Decision::replace(next, slot))
        })
        .await?;

    info!(match_id, player_id = actor.player_id, %slot, "player left team");
    sse_events::broadcast_player_left(state, match_id, slot, actor.player_id);
    Ok(MatchSnapshot::from(&committed))
}

/// Set the actor's readiness to `ready`. Setting the current value again is a silent no-op.
pub async fn set_ready(
    state: &SharedState,
    actor: &Actor,
    match_id: MatchId,
    ready: bool,
) -> Result<MatchSnapshot, ServiceError> {
    let (committed, changed) = state
        .run_match_transaction(match_id, |current| {
            require_status(current, MatchStatus::Waiting)?;
            let slot = current
                .slot_of(actor.player_id)
                .ok_or(ServiceError::NotMember)?;

            let already = current
                .team(slot)
                .member(actor.player_id)
                .is_some_and(|member| member.is_ready == ready);
            if already {
                return Ok(Decision::unchanged(false));
            }

            let mut next = current.clone();
            if let Some(member) = next.team_mut(slot).member_mut(actor.player_id) {
                member.is_ready = ready;
            }
            Ok(Decision::replace(next, true))
        })
        .await?;

    if changed {
        info!(match_id, player_id = actor.player_id, ready, "readiness changed");
        sse_events::broadcast_ready_changed(state, &committed, actor.player_id, ready);
    }

    Ok(MatchSnapshot::from(&committed))
}

/// First unmet start precondition, in the order a lobby fills up.
fn start_blocker(entity: &MatchEntity) -> Option<NotReadyReason> {
    let members = entity.member_count();
    if members != MATCH_SIZE {
        return Some(NotReadyReason::RosterIncomplete { members });
    }

    if let Some(slot) = TeamSlot::ALL
        .into_iter()
        .find(|slot| entity.team(*slot).captain().is_none())
    {
        return Some(NotReadyReason::MissingCaptain(slot));
    }

    let pending = members - entity.ready_count();
    (pending > 0).then_some(NotReadyReason::PlayersNotReady { pending })
}

/// Move a full, ready lobby into the veto phase.
pub async fn start_match(
    state: &SharedState,
    actor: &Actor,
    match_id: MatchId,
) -> Result<MatchSnapshot, ServiceError> {
    require_admin(actor)?;

    let (committed, ()) = state
        .run_match_transaction(match_id, |current| {
            let status = current.status.transition(MatchEvent::StartVeto)?;
            if let Some(reason) = start_blocker(current) {
                return Err(ServiceError::NotReady(reason));
            }

            let mut next = current.clone();
            next.status = status;
            Ok(Decision::replace(next, ()))
        })
        .await?;

    info!(match_id, by = actor.player_id, "match started; veto phase begins");
    sse_events::broadcast_veto_started(state, &committed);
    chat_service::post_system_message(
        state,
        match_id,
        format!("Map veto started. {} bans first.", committed.team1.name),
    )
    .await;

    Ok(MatchSnapshot::from(&committed))
}

/// Make `player_id` the captain of `slot`, demoting the previous one.
pub async fn assign_captain(
    state: &SharedState,
    actor: &Actor,
    match_id: MatchId,
    slot: TeamSlot,
    player_id: PlayerId,
) -> Result<MatchSnapshot, ServiceError> {
    require_admin(actor)?;

    let (committed, changed) = state
        .run_match_transaction(match_id, |current| {
            if !matches!(current.status, MatchStatus::Waiting | MatchStatus::Veto) {
                return Err(ServiceError::InvalidState(format!(
                    "captains can only change while waiting or during the veto (match is {})",
                    current.status.label()
                )));
            }

            let team = current.team(slot);
            let target = team.member(player_id).ok_or_else(|| {
                ServiceError::InvalidArgument(format!("player {player_id} is not in {slot}"))
            })?;
            if target.is_captain {
                return Ok(Decision::unchanged(false));
            }

            let mut next = current.clone();
            for member in &mut next.team_mut(slot).members {
                member.is_captain = member.player_id == player_id;
            }
            Ok(Decision::replace(next, true))
        })
        .await?;

    if changed {
        info!(match_id, %slot, player_id, by = actor.player_id, "captain assigned");
        sse_events::broadcast_captain_changed(state, match_id, slot, player_id);
    }

    Ok(MatchSnapshot::from(&committed))
}

async fn apply_admin_transition(
    state: &SharedState,
    actor: &Actor,
    match_id: MatchId,
    event: MatchEvent,
) -> Result<MatchSnapshot, ServiceError> {
    require_admin(actor)?;

    let (committed, ()) = state
        .run_match_transaction(match_id, |current| {
            let mut next = current.clone();
            next.status = current.status.transition(event)?;
            Ok(Decision::replace(next, ()))
        })
        .await?;

    info!(
        match_id,
        by = actor.player_id,
        status = committed.status.label(),
        ?event,
        "match status changed"
    );
    sse_events::broadcast_match_status(state, match_id, committed.status);
    if committed.status.is_terminal() {
        state.release_match_gate(match_id);
        state.rooms().close_room(match_id);
    }
    Ok(MatchSnapshot::from(&committed))
}

/// `ready → live`, once the game server runs the match.
pub async fn mark_live(
    state: &SharedState,
    actor: &Actor,
    match_id: MatchId,
) -> Result<MatchSnapshot, ServiceError> {
    apply_admin_transition(state, actor, match_id, MatchEvent::GoLive).await
}

/// `live → finished(completed)`.
pub async fn finish_match(
    state: &SharedState,
    actor: &Actor,
    match_id: MatchId,
) -> Result<MatchSnapshot, ServiceError> {
    apply_admin_transition(state, actor, match_id, MatchEvent::Complete).await
}

/// Any non-terminal phase `→ finished(abandoned)`.
pub async fn abandon_match(
    state: &SharedState,
    actor: &Actor,
    match_id: MatchId,
) -> Result<MatchSnapshot, ServiceError> {
    apply_admin_transition(state, actor, match_id, MatchEvent::Abandon).await
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::dto::matches::ServerDescriptorInput;

    pub fn admin() -> Actor {
        Actor {
            player_id: 1,
            display_name: "admin".into(),
            is_admin: true,
        }
    }

    pub fn player(player_id: PlayerId) -> Actor {
        Actor {
            player_id,
            display_name: format!("player{player_id}"),
            is_admin: false,
        }
    }

    pub fn create_request(pool: &[&str], port: u16) -> CreateMatchRequest {
        CreateMatchRequest {
            title: "Friday PUG".into(),
            team1_name: Some("Alpha".into()),
            team2_name: Some("Bravo".into()),
            map_pool: Some(pool.iter().map(|m| m.to_string()).collect()),
            server: ServerDescriptorInput {
                host: "127.0.0.1".into(),
                port,
                secret: "s3cret".into(),
            },
        }
    }

    /// Team1 is players 101..=105 (captain 101), team2 is 201..=205 (captain 201).
    pub async fn full_lobby(state: &SharedState, pool: &[&str], port: u16) -> MatchId {
        let created = create_match(state, &admin(), create_request(pool, port))
            .await
            .unwrap();
        for index in 1..=5 {
            for (slot, base) in [(TeamSlot::Team1, 100), (TeamSlot::Team2, 200)] {
                let actor = player(base + index);
                join_team(state, &actor, created.id, slot).await.unwrap();
                set_ready(state, &actor, created.id, true).await.unwrap();
            }
        }
        created.id
    }

    pub async fn in_veto(state: &SharedState, pool: &[&str], port: u16) -> MatchId {
        let id = full_lobby(state, pool, port).await;
        start_match(state, &admin(), id).await.unwrap();
        id
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::{fixtures::*, *};
    use crate::{
        error::ErrorKind,
        state::{match_status::FinishReason, test_support::memory_state},
    };

    const POOL: [&str; 3] = ["de_dust2", "de_mirage", "de_nuke"];

    async fn created(state: &SharedState) -> MatchId {
        create_match(state, &admin(), create_request(&POOL, 27015))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn create_requires_admin_and_valid_pool() {
        let (state, _) = memory_state().await;

        let err = create_match(&state, &player(5), create_request(&POOL, 27015))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        for pool in [&["a", "b"][..], &["a", "b", "c", "d"], &["a", "b", "a"]] {
            let err = create_match(&state, &admin(), create_request(pool, 27015))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "pool {pool:?}");
        }

        let mut request = create_request(&POOL, 27015);
        request.title = "   ".into();
        assert_eq!(
            create_match(&state, &admin(), request).await.unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[tokio::test]
    async fn create_uses_default_pool_and_announces_in_lobby() {
        let (state, _) = memory_state().await;
        let mut lobby = state.rooms().lobby().subscribe();

        let mut request = create_request(&POOL, 27015);
        request.map_pool = None;
        request.team2_name = Some("  ".into());
        let snapshot = create_match(&state, &admin(), request).await.unwrap();

        assert_eq!(snapshot.map_pool.len(), 7);
        assert_eq!(snapshot.status, MatchStatus::Waiting);
        assert_eq!(snapshot.team2.name, "Team 2");
        assert_eq!((snapshot.team1.id, snapshot.team2.id), (1, 2));

        let event = lobby.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some("match_created"));
    }

    #[tokio::test]
    async fn first_joiner_captains_and_rejoin_is_noop() {
        let (state, _) = memory_state().await;
        let id = created(&state).await;
        let mut room = state.rooms().room(id).subscribe();

        let snapshot = join_team(&state, &player(10), id, TeamSlot::Team1).await.unwrap();
        assert_eq!(snapshot.team1.captain_id, Some(10));
        let snapshot = join_team(&state, &player(11), id, TeamSlot::Team1).await.unwrap();
        assert!(!snapshot.team1.members[1].is_captain);

        let again = join_team(&state, &player(10), id, TeamSlot::Team1).await.unwrap();
        assert_eq!(again.team1.members.len(), 2);
        assert_eq!(again.revision, 2);

        let err = join_team(&state, &player(10), id, TeamSlot::Team2).await.unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyJoined { slot: TeamSlot::Team1 }));

        assert_eq!(room.recv().await.unwrap().event.as_deref(), Some("player_joined"));
        assert_eq!(room.recv().await.unwrap().event.as_deref(), Some("player_joined"));
        assert!(room.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_slot_rejects_sixth_player() {
        let (state, _) = memory_state().await;
        let id = created(&state).await;
        for player_id in 10..15 {
            join_team(&state, &player(player_id), id, TeamSlot::Team2).await.unwrap();
        }
        let err = join_team(&state, &player(15), id, TeamSlot::Team2).await.unwrap_err();
        assert!(matches!(err, ServiceError::SlotFull { slot: TeamSlot::Team2 }));

        let snapshot = get_match(&state, id).await.unwrap();
        assert_eq!(snapshot.team2.members.len(), 5);
    }

    #[tokio::test]
    async fn concurrent_joins_never_exceed_capacity_or_double_occupy() {
        let (state, _) = memory_state().await;
        let id = created(&state).await;

        let mut handles = Vec::new();
        for player_id in 10..30u64 {
            for slot in TeamSlot::ALL {
                let state = Arc::clone(&state);
                handles.push(tokio::spawn(async move {
                    join_team(&state, &player(player_id), id, slot).await
                }));
            }
        }

        let mut admitted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => admitted += 1,
                Err(err) => assert!(
                    matches!(
                        err.kind(),
                        ErrorKind::SlotFull | ErrorKind::AlreadyJoined | ErrorKind::Conflict
                    ),
                    "unexpected {err}"
                ),
            }
        }

        let snapshot = get_match(&state, id).await.unwrap();
        assert_eq!(snapshot.team1.members.len(), TEAM_CAPACITY);
        assert_eq!(snapshot.team2.members.len(), TEAM_CAPACITY);
        assert_eq!(admitted, MATCH_SIZE);

        let team1: HashSet<_> = snapshot.team1.members.iter().map(|m| m.player_id).collect();
        assert!(snapshot.team2.members.iter().all(|m| !team1.contains(&m.player_id)));
        assert_eq!(
            snapshot.team1.members.iter().filter(|m| m.is_captain).count(),
            1
        );
    }

    #[tokio::test]
    async fn ready_returns_new_state_and_skips_duplicate_events() {
        let (state, _) = memory_state().await;
        let id = created(&state).await;
        join_team(&state, &player(10), id, TeamSlot::Team1).await.unwrap();
        let mut room = state.rooms().room(id).subscribe();

        let snapshot = set_ready(&state, &player(10), id, true).await.unwrap();
        assert!(snapshot.team1.members[0].is_ready);
        let snapshot = set_ready(&state, &player(10), id, true).await.unwrap();
        assert!(snapshot.team1.members[0].is_ready);

        assert_eq!(
            room.recv().await.unwrap().event.as_deref(),
            Some("player_ready_changed")
        );
        assert!(room.try_recv().is_err());

        let snapshot = set_ready(&state, &player(10), id, false).await.unwrap();
        assert!(!snapshot.team1.members[0].is_ready);

        let err = set_ready(&state, &player(99), id, true).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotMember);
    }

    #[tokio::test]
    async fn leaving_keeps_slot_captainless_until_it_empties() {
        let (state, _) = memory_state().await;
        let id = created(&state).await;
        join_team(&state, &player(10), id, TeamSlot::Team1).await.unwrap();
        join_team(&state, &player(11), id, TeamSlot::Team1).await.unwrap();

        let snapshot = leave_team(&state, &player(10), id).await.unwrap();
        assert_eq!(snapshot.team1.captain_id, None);

        let snapshot = join_team(&state, &player(12), id, TeamSlot::Team1).await.unwrap();
        assert_eq!(snapshot.team1.captain_id, None);

        leave_team(&state, &player(11), id).await.unwrap();
        leave_team(&state, &player(12), id).await.unwrap();
        let snapshot = join_team(&state, &player(13), id, TeamSlot::Team1).await.unwrap();
        assert_eq!(snapshot.team1.captain_id, Some(13));

        assert_eq!(
            leave_team(&state, &player(10), id).await.unwrap_err().kind(),
            ErrorKind::NotMember
        );
    }

    #[tokio::test]
    async fn start_names_the_failed_precondition() {
        let (state, _) = memory_state().await;
        let id = created(&state).await;

        assert_eq!(
            start_match(&state, &player(5), id).await.unwrap_err().kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(
            start_match(&state, &admin(), 404).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );

        for index in 1..=5 {
            join_team(&state, &player(100 + index), id, TeamSlot::Team1).await.unwrap();
        }
        assert!(matches!(
            start_match(&state, &admin(), id).await,
            Err(ServiceError::NotReady(NotReadyReason::RosterIncomplete { members: 5 }))
        ));

        for index in 1..=5 {
            join_team(&state, &player(200 + index), id, TeamSlot::Team2).await.unwrap();
        }
        leave_team(&state, &player(201), id).await.unwrap();
        join_team(&state, &player(206), id, TeamSlot::Team2).await.unwrap();
        assert!(matches!(
            start_match(&state, &admin(), id).await,
            Err(ServiceError::NotReady(NotReadyReason::MissingCaptain(TeamSlot::Team2)))
        ));

        assign_captain(&state, &admin(), id, TeamSlot::Team2, 206).await.unwrap();
        assert!(matches!(
            start_match(&state, &admin(), id).await,
            Err(ServiceError::NotReady(NotReadyReason::PlayersNotReady { pending: 10 }))
        ));
    }

    #[tokio::test]
    async fn start_moves_ready_lobby_into_veto() {
        let (state, _) = memory_state().await;
        let id = full_lobby(&state, &POOL, 27015).await;
        let snapshot = start_match(&state, &admin(), id).await.unwrap();

        assert_eq!(snapshot.status, MatchStatus::Veto);
        assert_eq!(snapshot.next_team, Some(TeamSlot::Team1));

        assert_eq!(
            start_match(&state, &admin(), id).await.unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            join_team(&state, &player(300), id, TeamSlot::Team1)
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidState
        );
    }

    #[tokio::test]
    async fn admin_transitions_follow_the_table() {
        let (state, _) = memory_state().await;
        let id = created(&state).await;

        assert_eq!(
            mark_live(&state, &admin(), id).await.unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            abandon_match(&state, &player(2), id).await.unwrap_err().kind(),
            ErrorKind::Forbidden
        );

        let mut room = state.rooms().room(id).subscribe();
        let snapshot = abandon_match(&state, &admin(), id).await.unwrap();
        assert_eq!(snapshot.status, MatchStatus::Finished(FinishReason::Abandoned));

        let last = room.recv().await.unwrap();
        assert_eq!(last.event.as_deref(), Some("match_finished"));
        assert!(matches!(
            room.recv().await,
            Err(tokio::sync::broadcast::error::RecvError::Closed)
        ));
        assert_eq!(
            finish_match(&state, &admin(), id).await.unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }

    #[tokio::test]
    async fn captain_reassignment_requires_membership() {
        let (state, _) = memory_state().await;
        let id = created(&state).await;
        join_team(&state, &player(10), id, TeamSlot::Team1).await.unwrap();
        join_team(&state, &player(11), id, TeamSlot::Team1).await.unwrap();

        let snapshot = assign_captain(&state, &admin(), id, TeamSlot::Team1, 11)
            .await
            .unwrap();
        assert_eq!(snapshot.team1.captain_id, Some(11));
        assert_eq!(
            snapshot.team1.members.iter().filter(|m| m.is_captain).count(),
            1
        );

        assert_eq!(
            assign_captain(&state, &admin(), id, TeamSlot::Team2, 11)
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidArgument
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        /// Start succeeds iff ten members, two captains and all ready, whatever the order of
        /// joins and ready toggles.
        #[test]
        fn prop_start_requires_full_ready_roster(
            order in Just((0..10usize).collect::<Vec<_>>()).prop_shuffle(),
            ready_mask in proptest::collection::vec(any::<bool>(), 10),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let (state, _) = memory_state().await;
                let id = created(&state).await;

                for index in &order {
                    let slot = if *index < 5 { TeamSlot::Team1 } else { TeamSlot::Team2 };
                    let actor = player(100 + *index as u64);
                    join_team(&state, &actor, id, slot).await.unwrap();
                    if ready_mask[*index] {
                        set_ready(&state, &actor, id, true).await.unwrap();
                    }
                }

                let all_ready = ready_mask.iter().all(|ready| *ready);
                let result = start_match(&state, &admin(), id).await;
                prop_assert_eq!(result.is_ok(), all_ready);
                if !all_ready {
                    prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::NotReady);
                }
                Ok(())
            })?;
        }
    }
}
