//! Map veto rules derived entirely from the append-only veto log.
//!
//! Nothing here stores a "current turn" or a mutable pool: the acting team is the parity of the
//! log length and the remaining maps are the pool minus every banned map. A client that
//! reconnects mid-veto can rebuild the whole state from the pool and the log alone.

use std::collections::HashSet;

use thiserror::Error;

use crate::{
    dao::models::VetoEntryEntity,
    state::matches::{TeamSlot, VetoAction},
};

/// Reasons a veto action is rejected by the log rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VetoRuleError {
    /// The map is not part of the match's pool.
    #[error("map `{0}` is not in the map pool")]
    MapNotInPool(String),
    /// The map already appears in the veto log.
    #[error("map `{0}` has already been vetoed")]
    AlreadyDecided(String),
    /// A map was already picked; only bans can follow.
    #[error("map `{picked}` was already picked; remaining actions must be bans")]
    PickAlreadyMade { picked: String },
    /// The log already reduced the pool to a single map.
    #[error("veto already reduced the pool to a single map")]
    Complete,
    /// The action would leave several maps with nothing left to ban.
    #[error("veto cannot reduce {remaining} remaining maps to one")]
    Stuck { remaining: usize },
}

/// Outcome of validating one action against the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VetoStep {
    /// Index the new entry must be appended at.
    pub order_index: usize,
    /// Team whose captain is allowed to act.
    pub team: TeamSlot,
    /// Maps still in contention once the action is applied.
    pub remaining: Vec<String>,
    /// Set when the action reduces the pool to exactly one map.
    pub selected_map: Option<String>,
}

/// Team whose captain acts next.
pub fn acting_team(log: &[VetoEntryEntity]) -> TeamSlot {
    TeamSlot::for_order_index(log.len())
}

/// Pool minus every banned map, in pool order.
pub fn remaining_maps(pool: &[String], log: &[VetoEntryEntity]) -> Vec<String> {
    let banned: HashSet<&str> = log
        .iter()
        .filter(|entry| entry.action == VetoAction::Ban)
        .map(|entry| entry.map_name.as_str())
        .collect();

    pool.iter()
        .filter(|map| !banned.contains(map.as_str()))
        .cloned()
        .collect()
}

/// Pool maps not referenced by any log entry.
pub fn unvetoed_maps(pool: &[String], log: &[VetoEntryEntity]) -> Vec<String> {
    let used: HashSet<&str> = log.iter().map(|entry| entry.map_name.as_str()).collect();
    pool.iter()
        .filter(|map| !used.contains(map.as_str()))
        .cloned()
        .collect()
}

/// Validate `action` on `map_name` against the pool and the log, returning the resulting step.
pub fn plan_action(
    pool: &[String],
    log: &[VetoEntryEntity],
    map_name: &str,
    action: VetoAction,
) -> Result<VetoStep, VetoRuleError> {
    if remaining_maps(pool, log).len() <= 1 {
        return Err(VetoRuleError::Complete);
    }

    if !pool.iter().any(|map| map == map_name) {
        return Err(VetoRuleError::MapNotInPool(map_name.to_owned()));
    }

    if log.iter().any(|entry| entry.map_name == map_name) {
        return Err(VetoRuleError::AlreadyDecided(map_name.to_owned()));
    }

    if action == VetoAction::Pick {
        if let Some(picked) = log.iter().find(|entry| entry.action == VetoAction::Pick) {
            return Err(VetoRuleError::PickAlreadyMade {
                picked: picked.map_name.clone(),
            });
        }
    }

    let remaining: Vec<String> = match action {
        VetoAction::Ban => remaining_maps(pool, log)
            .into_iter()
            .filter(|map| map != map_name)
            .collect(),
        VetoAction::Pick => remaining_maps(pool, log),
    };

    let unvetoed_after = unvetoed_maps(pool, log)
        .into_iter()
        .filter(|map| map != map_name)
        .count();
    if remaining.len() > 1 && unvetoed_after == 0 {
        return Err(VetoRuleError::Stuck {
            remaining: remaining.len(),
        });
    }

    let selected_map = match remaining.as_slice() {
        [only] => Some(only.clone()),
        _ => None,
    };

    Ok(VetoStep {
        order_index: log.len(),
        team: acting_team(log),
        remaining,
        selected_map,
    })
}
