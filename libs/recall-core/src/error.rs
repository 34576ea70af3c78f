//! Error types for recall-core.

use thiserror::Error;

use crate::session::Phase;

/// Result type alias using SessionError.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Events a review session refuses to apply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot {event} while {phase}")]
    InvalidTransition { event: &'static str, phase: Phase },

    #[error("an answer is already being graded")]
    GradingInProgress,

    #[error("answer is empty")]
    EmptyAnswer,

    #[error("result belongs to an abandoned session or attempt")]
    StaleTicket,

    #[error("nothing to retry")]
    NothingPending,

    #[error("previous request has not finished")]
    RequestInFlight,
}
