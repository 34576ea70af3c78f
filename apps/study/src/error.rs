//! Error handling for the study service

use recall_core::SessionError;
use serde::Serialize;
use thiserror::Error;

/// Item store failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Grading oracle failures. None of these carry a usable grade.
#[derive(Debug, Error)]
pub enum GradingError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Grader error: {status} - {message}")]
    Backend { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Grader returned no reply")]
    EmptyReply,
}

/// Errors surfaced to callers of the study service
#[derive(Debug, Error)]
pub enum StudyError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Grading error: {0}")]
    Grading(#[from] GradingError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Config error: {0}")]
    Config(String),
}

impl StudyError {
    /// Whether calling `retry` may succeed after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Grading(_))
    }
}

/// Error body for UI layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub retryable: bool,
}

impl From<&StudyError> for ErrorResponse {
    fn from(error: &StudyError) -> Self {
        let error_type = match error {
            StudyError::Store(_) => "store_error",
            StudyError::Grading(_) => "grading_error",
            StudyError::Session(_) => "session_error",
            StudyError::Config(_) => "config_error",
        };
        Self {
            error: error_type.to_string(),
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// Result type alias for study operations
pub type Result<T> = std::result::Result<T, StudyError>;
