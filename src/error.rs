use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    state::{match_status::InvalidTransition, matches::TeamSlot, veto::VetoRuleError},
};

/// Stable, machine-readable name of a failure, shared by HTTP bodies and WebSocket replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    InvalidArgument,
    InvalidState,
    Conflict,
    SlotFull,
    AlreadyJoined,
    NotMember,
    NotReady,
    AlreadyDecided,
    MapNotInPool,
    Unavailable,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden | ErrorKind::NotMember => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidArgument | ErrorKind::MapNotInPool => StatusCode::BAD_REQUEST,
            ErrorKind::InvalidState
            | ErrorKind::Conflict
            | ErrorKind::SlotFull
            | ErrorKind::AlreadyJoined
            | ErrorKind::NotReady
            | ErrorKind::AlreadyDecided => StatusCode::CONFLICT,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Start precondition that is not met yet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotReadyReason {
    #[error("{0} has no captain")]
    MissingCaptain(TeamSlot),
    #[error("roster has {members} of 10 players")]
    RosterIncomplete { members: usize },
    #[error("{pending} player(s) are not ready")]
    PlayersNotReady { pending: usize },
}

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Operation cannot be performed in the current lifecycle phase.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// A concurrent writer kept winning after bounded retries.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{slot} is full")]
    SlotFull { slot: TeamSlot },
    #[error("already a member of {slot}")]
    AlreadyJoined { slot: TeamSlot },
    #[error("not a member of this match")]
    NotMember,
    #[error("match cannot start: {0}")]
    NotReady(NotReadyReason),
    #[error("map `{0}` has already been vetoed")]
    AlreadyDecided(String),
    #[error("map `{0}` is not in the map pool")]
    MapNotInPool(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Unavailable(_) | ServiceError::Degraded | ServiceError::Timeout => {
                ErrorKind::Unavailable
            }
            ServiceError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            ServiceError::Forbidden(_) => ErrorKind::Forbidden,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ServiceError::InvalidState(_) => ErrorKind::InvalidState,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::SlotFull { .. } => ErrorKind::SlotFull,
            ServiceError::AlreadyJoined { .. } => ErrorKind::AlreadyJoined,
            ServiceError::NotMember => ErrorKind::NotMember,
            ServiceError::NotReady(_) => ErrorKind::NotReady,
            ServiceError::AlreadyDecided(_) => ErrorKind::AlreadyDecided,
            ServiceError::MapNotInPool(_) => ErrorKind::MapNotInPool,
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(format!(
            "match is {} and cannot accept {:?}",
            err.from.label(),
            err.event
        ))
    }
}

impl From<VetoRuleError> for ServiceError {
    fn from(err: VetoRuleError) -> Self {
        match err {
            VetoRuleError::MapNotInPool(map) => ServiceError::MapNotInPool(map),
            VetoRuleError::AlreadyDecided(map) => ServiceError::AlreadyDecided(map),
            VetoRuleError::PickAlreadyMade { .. } => ServiceError::InvalidArgument(err.to_string()),
            VetoRuleError::Complete | VetoRuleError::Stuck { .. } => {
                ServiceError::InvalidState(err.to_string())
            }
        }
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// Request rejected before reaching a service.
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Service(err) => err.kind(),
            AppError::BadRequest(_) => ErrorKind::InvalidArgument,
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {err}"))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// JSON body of every failed request.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let kind = self.kind();
        if kind == ErrorKind::Unavailable {
            tracing::warn!(error = %self, "request failed on an unavailable collaborator");
        }

        let payload = Json(ErrorBody {
            kind,
            message: self.to_string(),
        });

        (kind.status(), payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn veto_rule_errors_keep_their_kind() {
        let cases = [
            (VetoRuleError::MapNotInPool("x".into()), ErrorKind::MapNotInPool),
            (VetoRuleError::AlreadyDecided("x".into()), ErrorKind::AlreadyDecided),
            (
                VetoRuleError::PickAlreadyMade { picked: "x".into() },
                ErrorKind::InvalidArgument,
            ),
            (VetoRuleError::Complete, ErrorKind::InvalidState),
            (VetoRuleError::Stuck { remaining: 2 }, ErrorKind::InvalidState),
        ];
        for (err, kind) in cases {
            assert_eq!(ServiceError::from(err).kind(), kind);
        }
    }

    #[test]
    fn kinds_serialize_as_snake_case_and_map_to_status() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::AlreadyJoined).unwrap(),
            "\"already_joined\""
        );
        assert_eq!(ErrorKind::SlotFull.status(), StatusCode::CONFLICT);
        assert_eq!(ErrorKind::NotMember.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::from(ServiceError::Degraded).kind().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn not_ready_names_the_failed_precondition() {
        let err = ServiceError::NotReady(NotReadyReason::MissingCaptain(TeamSlot::Team2));
        assert_eq!(err.to_string(), "match cannot start: team2 has no captain");
    }
}
