//! Shared error types for the services crate.

use chrono::{DateTime, Utc};
use thiserror::Error;

use exam_core::model::QuestionError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by a `QuestionSource`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuestionSourceError {
    #[error("question source is not configured")]
    Disabled,
    #[error("question source returned an empty response")]
    EmptyResponse,
    #[error("question source request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("question source returned malformed output: {0}")]
    Malformed(String),
    #[error("question source unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl QuestionSourceError {
    /// Whether asking again may succeed without changing configuration.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, QuestionSourceError::Disabled)
    }
}

/// Errors emitted by `HistoryService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HistoryError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `SessionController`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("select at least one topic")]
    NoTopics,
    #[error("a session is already in progress")]
    AlreadyRunning,
    #[error("no active session")]
    NotActive,
    #[error("question index {index} is out of range (session has {len})")]
    QuestionOutOfRange { index: usize, len: usize },
    #[error("{option:?} is not an option of question {index}")]
    UnknownOption { index: usize, option: String },
    #[error("daily assessment already taken; available again at {next_available_at}")]
    CooldownActive { next_available_at: DateTime<Utc> },
    #[error("question source returned no questions")]
    EmptyQuestionSet,
    #[error("question {index} is malformed: {source}")]
    InvalidQuestion {
        index: usize,
        #[source]
        source: QuestionError,
    },
    #[error("session was reset before questions arrived")]
    Superseded,
    #[error(transparent)]
    Source(#[from] QuestionSourceError),
}

impl SessionError {
    /// Whether the user can simply try starting again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Source(err) => err.is_retryable(),
            SessionError::EmptyQuestionSet
            | SessionError::InvalidQuestion { .. }
            | SessionError::Superseded => true,
            _ => false,
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
