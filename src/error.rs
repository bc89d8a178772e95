//! Error taxonomy for the ring state machine.

use axum::http::StatusCode;

/// Result type for game operations
pub type GameResult<T> = Result<T, GameError>;

/// Failures surfaced by the workflow boundary.
///
/// Replaying an action on a finalized report is not an error; outcomes carry
/// an `already_finalized` flag for that.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("token is not valid for this action")]
    TokenPurposeMismatch,

    #[error("no active assignment for hunter")]
    NoActiveAssignment,

    #[error("ring inconsistent: {0}")]
    RingInconsistent(String),

    #[error("{0}")]
    AlreadyUnderReview(String),

    #[error("need at least 2 active players to start a round (found {found})")]
    InsufficientPlayers { found: usize },

    #[error("a round is already active")]
    RoundAlreadyActive,

    #[error("token does not belong to the reported player")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("{0}")]
    Validation(String),

    #[error("signups are closed: a game is currently in progress")]
    SignupsClosed,

    #[error("this email is already registered")]
    DuplicateEmail,

    #[error("storage failure: {0}")]
    Storage(String),
}

impl GameError {
    /// HTTP status used when this error crosses the API boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            GameError::InvalidOrExpiredToken
            | GameError::TokenPurposeMismatch
            | GameError::NoActiveAssignment
            | GameError::InsufficientPlayers { .. }
            | GameError::Validation(_) => StatusCode::BAD_REQUEST,
            GameError::Forbidden | GameError::SignupsClosed | GameError::DuplicateEmail => {
                StatusCode::FORBIDDEN
            }
            GameError::NotFound(_) => StatusCode::NOT_FOUND,
            GameError::AlreadyUnderReview(_) | GameError::RoundAlreadyActive => {
                StatusCode::CONFLICT
            }
            GameError::RingInconsistent(_)
            | GameError::ConstraintViolation(_)
            | GameError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            GameError::InvalidOrExpiredToken => "INVALID_TOKEN",
            GameError::TokenPurposeMismatch => "TOKEN_PURPOSE_MISMATCH",
            GameError::NoActiveAssignment => "NO_ACTIVE_ASSIGNMENT",
            GameError::RingInconsistent(_) => "RING_INCONSISTENT",
            GameError::AlreadyUnderReview(_) => "ALREADY_UNDER_REVIEW",
            GameError::InsufficientPlayers { .. } => "INSUFFICIENT_PLAYERS",
            GameError::RoundAlreadyActive => "ROUND_ALREADY_ACTIVE",
            GameError::Forbidden => "FORBIDDEN",
            GameError::NotFound(_) => "NOT_FOUND",
            GameError::ConstraintViolation(_) => "CONSTRAINT_VIOLATION",
            GameError::Validation(_) => "VALIDATION",
            GameError::SignupsClosed => "SIGNUPS_CLOSED",
            GameError::DuplicateEmail => "DUPLICATE_EMAIL",
            GameError::Storage(_) => "STORAGE",
        }
    }

    /// Operator-facing failures that indicate corrupted state
    pub fn is_hard_failure(&self) -> bool {
        matches!(
            self,
            GameError::RingInconsistent(_)
                | GameError::ConstraintViolation(_)
                | GameError::Storage(_)
        )
    }
}
