use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle phases of a match.
///
/// `waiting → veto → ready → live → finished`, plus an abandon edge from every
/// non-terminal phase straight to `finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Players are joining teams and toggling readiness.
    Waiting,
    /// Captains are eliminating maps.
    Veto,
    /// A map is selected; the configuration is being handed to the game server.
    Ready,
    /// The game server is running the match.
    Live,
    /// Terminal phase.
    Finished(FinishReason),
}

/// Why a match reached its terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The match was played to the end.
    Completed,
    /// An admin cancelled the match before it finished.
    Abandoned,
}

/// Events that move a match through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchEvent {
    /// Admin started the match with a full, ready roster.
    StartVeto,
    /// The veto log reduced the pool to a single map.
    VetoCompleted,
    /// The game server picked up the configuration.
    GoLive,
    /// The match was played out.
    Complete,
    /// Admin cancelled the match.
    Abandon,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// The phase the match was in when the event was received.
    pub from: MatchStatus,
    /// The event that cannot be applied from this phase.
    pub event: MatchEvent,
}

impl MatchStatus {
    /// Compute the phase reached by applying `event`, if the transition is valid.
    pub fn transition(self, event: MatchEvent) -> Result<MatchStatus, InvalidTransition> {
        let next = match (self, event) {
            (MatchStatus::Waiting, MatchEvent::StartVeto) => MatchStatus::Veto,
            (MatchStatus::Veto, MatchEvent::VetoCompleted) => MatchStatus::Ready,
            (MatchStatus::Ready, MatchEvent::GoLive) => MatchStatus::Live,
            (MatchStatus::Live, MatchEvent::Complete) => {
                MatchStatus::Finished(FinishReason::Completed)
            }
            (
                MatchStatus::Waiting | MatchStatus::Veto | MatchStatus::Ready | MatchStatus::Live,
                MatchEvent::Abandon,
            ) => MatchStatus::Finished(FinishReason::Abandoned),
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }

    /// Whether no further transition can leave this phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, MatchStatus::Finished(_))
    }

    /// Short lowercase label used in messages and logs.
    pub fn label(self) -> &'static str {
        match self {
            MatchStatus::Waiting => "waiting",
            MatchStatus::Veto => "veto",
            MatchStatus::Ready => "ready",
            MatchStatus::Live => "live",
            MatchStatus::Finished(_) => "finished",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_EVENTS: [MatchEvent; 5] = [
        MatchEvent::StartVeto,
        MatchEvent::VetoCompleted,
        MatchEvent::GoLive,
        MatchEvent::Complete,
        MatchEvent::Abandon,
    ];

    #[test]
    fn full_happy_path_through_match() {
        let mut status = MatchStatus::Waiting;
        for event in [
            MatchEvent::StartVeto,
            MatchEvent::VetoCompleted,
            MatchEvent::GoLive,
            MatchEvent::Complete,
        ] {
            status = status.transition(event).unwrap();
        }
        assert_eq!(status, MatchStatus::Finished(FinishReason::Completed));
    }

    #[test]
    fn abandon_is_accepted_from_every_non_terminal_phase() {
        for from in [
            MatchStatus::Waiting,
            MatchStatus::Veto,
            MatchStatus::Ready,
            MatchStatus::Live,
        ] {
            assert_eq!(
                from.transition(MatchEvent::Abandon).unwrap(),
                MatchStatus::Finished(FinishReason::Abandoned)
            );
        }
    }

    #[test]
    fn finished_phases_reject_every_event() {
        for reason in [FinishReason::Completed, FinishReason::Abandoned] {
            let from = MatchStatus::Finished(reason);
            assert!(from.is_terminal());
            for event in ALL_EVENTS {
                let err = from.transition(event).unwrap_err();
                assert_eq!(err, InvalidTransition { from, event });
            }
        }
    }

    #[test]
    fn veto_cannot_be_skipped() {
        let err = MatchStatus::Waiting
            .transition(MatchEvent::VetoCompleted)
            .unwrap_err();
        assert_eq!(err.from, MatchStatus::Waiting);
        assert!(MatchStatus::Waiting.transition(MatchEvent::GoLive).is_err());
        assert!(MatchStatus::Veto.transition(MatchEvent::StartVeto).is_err());
    }

    #[test]
    fn status_serializes_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&MatchStatus::Veto).unwrap(),
            "\"veto\""
        );
        assert_eq!(
            serde_json::to_string(&MatchStatus::Finished(FinishReason::Abandoned)).unwrap(),
            "{\"finished\":\"abandoned\"}"
        );
    }
}
