use serde::Serialize;
use tracing::warn;

use crate::{
    dao::models::{MatchEntity, MemberEntity, VetoEntryEntity},
    dto::{
        chat::ChatMessageView,
        handoff::HandoffStatus,
        matches::MatchListItem,
        sse::{
            CaptainChangedEvent, HandoffEvent, MatchCreatedEvent, MatchStatusEvent,
            PlayerJoinedEvent, PlayerLeftEvent, PlayerReadyChangedEvent, ServerEvent,
            SystemStatus, VetoActionPerformedEvent, VetoCompleteEvent, VetoStartedEvent,
        },
    },
    state::{
        SharedState,
        match_status::MatchStatus,
        matches::{MatchId, PlayerId, TeamSlot},
        veto,
    },
};

pub const EVENT_MATCH_CREATED: &str = "match_created";
pub const EVENT_PLAYER_JOINED: &str = "player_joined";
pub const EVENT_PLAYER_LEFT: &str = "player_left";
pub const EVENT_PLAYER_READY_CHANGED: &str = "player_ready_changed";
pub const EVENT_CAPTAIN_CHANGED: &str = "captain_changed";
pub const EVENT_VETO_STARTED: &str = "veto_started";
pub const EVENT_VETO_ACTION_PERFORMED: &str = "veto_action_performed";
pub const EVENT_VETO_COMPLETE: &str = "veto_complete";
pub const EVENT_MATCH_LIVE: &str = "match_live";
pub const EVENT_MATCH_FINISHED: &str = "match_finished";
pub const EVENT_HANDOFF_SUCCEEDED: &str = "handoff_succeeded";
pub const EVENT_HANDOFF_FAILED: &str = "handoff_failed";
pub const EVENT_NEW_MESSAGE: &str = "new_message";
pub const EVENT_SYSTEM_STATUS: &str = "system_status";

pub fn broadcast_match_created(state: &SharedState, entity: &MatchEntity) {
    let payload = MatchCreatedEvent {
        summary: MatchListItem::from(entity),
    };
    send_room_event(state, entity.id, EVENT_MATCH_CREATED, &payload);
}

pub fn broadcast_player_joined(
    state: &SharedState,
    match_id: MatchId,
    slot: TeamSlot,
    member: &MemberEntity,
) {
    let payload = PlayerJoinedEvent {
        match_id,
        slot,
        player_id: member.player_id,
        display_name: member.display_name.clone(),
        is_captain: member.is_captain,
    };
    send_room_event(state, match_id, EVENT_PLAYER_JOINED, &payload);
}

pub fn broadcast_player_left(
    state: &SharedState,
    match_id: MatchId,
    slot: TeamSlot,
    player_id: PlayerId,
) {
    let payload = PlayerLeftEvent {
        match_id,
        slot,
        player_id,
    };
    send_room_event(state, match_id, EVENT_PLAYER_LEFT, &payload);
}

pub fn broadcast_ready_changed(
    state: &SharedState,
    entity: &MatchEntity,
    player_id: PlayerId,
    ready: bool,
) {
    let payload = PlayerReadyChangedEvent {
        match_id: entity.id,
        player_id,
        ready,
        ready_count: entity.ready_count(),
    };
    send_room_event(state, entity.id, EVENT_PLAYER_READY_CHANGED, &payload);
}

pub fn broadcast_captain_changed(
    state: &SharedState,
    match_id: MatchId,
    slot: TeamSlot,
    player_id: PlayerId,
) {
    let payload = CaptainChangedEvent {
        match_id,
        slot,
        player_id,
    };
    send_room_event(state, match_id, EVENT_CAPTAIN_CHANGED, &payload);
}

pub fn broadcast_veto_started(state: &SharedState, entity: &MatchEntity) {
    let payload = VetoStartedEvent {
        match_id: entity.id,
        map_pool: entity.map_pool.clone(),
        next_team: veto::acting_team(&entity.veto),
    };
    send_room_event(state, entity.id, EVENT_VETO_STARTED, &payload);
}

/// Announce an appended entry; `entity` is the record as committed with that entry.
pub fn broadcast_veto_action(state: &SharedState, entity: &MatchEntity, entry: &VetoEntryEntity) {
    let next_team =
        (entity.status == MatchStatus::Veto).then(|| veto::acting_team(&entity.veto));
    let payload = VetoActionPerformedEvent {
        match_id: entity.id,
        order_index: entry.order_index,
        team: entry.team,
        map_name: entry.map_name.clone(),
        action: entry.action,
        remaining_maps: veto::remaining_maps(&entity.map_pool, &entity.veto),
        next_team,
    };
    send_room_event(state, entity.id, EVENT_VETO_ACTION_PERFORMED, &payload);
}

pub fn broadcast_veto_complete(state: &SharedState, match_id: MatchId, selected_map: &str) {
    let payload = VetoCompleteEvent {
        match_id,
        selected_map: selected_map.to_owned(),
    };
    send_room_event(state, match_id, EVENT_VETO_COMPLETE, &payload);
}

/// Announce `live` or a terminal phase.
pub fn broadcast_match_status(state: &SharedState, match_id: MatchId, status: MatchStatus) {
    let event = match status {
        MatchStatus::Live => EVENT_MATCH_LIVE,
        MatchStatus::Finished(_) => EVENT_MATCH_FINISHED,
        other => {
            warn!(match_id, status = other.label(), "no event for this match status");
            return;
        }
    };
    let payload = MatchStatusEvent { match_id, status };
    send_room_event(state, match_id, event, &payload);
}

pub fn broadcast_handoff(state: &SharedState, match_id: MatchId, status: &HandoffStatus) {
    let event = match status {
        HandoffStatus::Succeeded { .. } => EVENT_HANDOFF_SUCCEEDED,
        HandoffStatus::Failed { .. } => EVENT_HANDOFF_FAILED,
        HandoffStatus::NotStarted | HandoffStatus::Pending { .. } => return,
    };
    let payload = HandoffEvent {
        match_id,
        status: status.clone(),
    };
    send_room_event(state, match_id, event, &payload);
}

/// Chat lines stay in their room; the lobby does not relay them.
pub fn broadcast_new_message(state: &SharedState, message: &ChatMessageView) {
    match ServerEvent::json(Some(EVENT_NEW_MESSAGE.to_string()), message) {
        Ok(event) => state.rooms().room(message.match_id).broadcast(event),
        Err(err) => warn!(error = %err, "failed to serialize chat payload"),
    }
}

pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    match ServerEvent::json(
        Some(EVENT_SYSTEM_STATUS.to_string()),
        &SystemStatus { degraded },
    ) {
        Ok(event) => state.rooms().lobby().broadcast(event),
        Err(err) => warn!(error = %err, "failed to serialize system status payload"),
    }
}

fn send_room_event(state: &SharedState, match_id: MatchId, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => {
            state.rooms().room(match_id).broadcast(event.clone());
            state.rooms().lobby().broadcast(event);
        }
        Err(err) => warn!(event, match_id, error = %err, "failed to serialize room payload"),
    }
}
