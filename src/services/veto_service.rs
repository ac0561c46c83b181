use std::time::SystemTime;

use tracing::{info, warn};

use crate::{
    dao::models::VetoEntryEntity,
    dto::matches::MatchSnapshot,
    error::ServiceError,
    services::{chat_service, handoff_service, sse_events},
    state::{
        Decision, SharedState,
        match_status::{MatchEvent, MatchStatus},
        matches::{Actor, MatchId, VetoAction},
        veto,
    },
};

/// Append one ban or pick to the veto log of `match_id`.
///
/// The acting team and the remaining maps are recomputed from the log inside the transaction,
/// and the store only accepts the entry at the expected order index, so two captains racing on
/// the same turn can never both land. When the action leaves a single map, the same write selects
/// it and moves the match to `ready`; the server handoff is then dispatched in the background.
pub async fn perform_veto_action(
    state: &SharedState,
    actor: &Actor,
    match_id: MatchId,
    map_name: &str,
    action: VetoAction,
) -> Result<MatchSnapshot, ServiceError> {
    let transaction = state
        .run_match_transaction(match_id, |current| {
            if current.status != MatchStatus::Veto {
                return Err(ServiceError::InvalidState(format!(
                    "match {match_id} is {}, not in its veto phase",
                    current.status.label()
                )));
            }

            let acting = veto::acting_team(&current.veto);
            let is_acting_captain = current
                .team(acting)
                .captain()
                .is_some_and(|captain| captain.player_id == actor.player_id);
            if !is_acting_captain {
                let reason = if current
                    .team(acting.other())
                    .captain()
                    .is_some_and(|captain| captain.player_id == actor.player_id)
                {
                    format!("it is {acting}'s turn")
                } else {
                    format!("only the captain of {acting} can act now")
                };
                return Err(ServiceError::Forbidden(reason));
            }

            let step = veto::plan_action(&current.map_pool, &current.veto, map_name, action)?;
            if step.selected_map.is_some() {
                current.status.transition(MatchEvent::VetoCompleted)?;
            }

            let entry = VetoEntryEntity {
                order_index: step.order_index,
                team: step.team,
                map_name: map_name.to_owned(),
                action,
                actor_id: actor.player_id,
                performed_at: SystemTime::now(),
            };
            Ok(Decision::append_veto(
                entry.clone(),
                step.selected_map.clone(),
                (entry, step.selected_map),
            ))
        })
        .await;

    let (committed, (entry, selected_map)) = match transaction {
        Ok(done) => done,
        Err(ServiceError::Timeout) => {
            resume_handoff_if_ready(state, match_id).await;
            return Err(ServiceError::Timeout);
        }
        Err(err) => return Err(err),
    };

    info!(
        match_id,
        order_index = entry.order_index,
        team = %entry.team,
        map = %entry.map_name,
        action = %entry.action,
        "veto action recorded"
    );
    sse_events::broadcast_veto_action(state, &committed, &entry);

    if let Some(map) = selected_map {
        info!(match_id, map = %map, "veto complete");
        sse_events::broadcast_veto_complete(state, match_id, &map);
        chat_service::post_system_message(
            state,
            match_id,
            format!("Map veto complete: {map} will be played."),
        )
        .await;
        handoff_service::dispatch(state, match_id);
    }

    Ok(MatchSnapshot::from(&committed))
}

/// A timed-out veto write may still have committed the final ban. Start the handoff from the
/// stored record when the match is `ready` and no handoff was ever recorded for it.
async fn resume_handoff_if_ready(state: &SharedState, match_id: MatchId) -> bool {
    if state.handoffs().contains_key(&match_id) {
        return false;
    }
    let store = match state.require_match_store().await {
        Ok(store) => store,
        Err(_) => return false,
    };

    match store.find_match(match_id).await {
        Ok(Some(stored)) if stored.status == MatchStatus::Ready && stored.selected_map.is_some() => {
            warn!(match_id, "veto completed behind a timeout; dispatching handoff");
            handoff_service::dispatch(state, match_id)
        }
        Ok(_) => false,
        Err(err) => {
            warn!(match_id, error = %err, "cannot re-read match after veto timeout");
            false
        }
    }
}
