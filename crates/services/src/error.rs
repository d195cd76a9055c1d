//! Shared error types for the services crate.

use thiserror::Error;

use interview_core::model::{CompletionStage, SessionModelError};
use interview_core::{IndexError, NavigationError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the question, evaluation, and summary collaborators.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CollaboratorError {
    #[error("AI client is not configured")]
    Disabled,
    #[error("collaborator returned an empty response")]
    EmptyResponse,
    #[error("collaborator request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("collaborator response could not be parsed: {0}")]
    Malformed(String),
}

/// Errors emitted by `SubmissionCoordinator`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubmissionError {
    #[error(transparent)]
    OutOfRange(#[from] IndexError),
    #[error("nothing to submit")]
    NothingToSubmit,
    #[error("a submission is already in flight")]
    SubmissionInFlight,
    #[error("session already completed")]
    SessionCompleted,
    #[error("answers are locked while the session is {0}")]
    AnswersLocked(CompletionStage),
    #[error(transparent)]
    Model(SessionModelError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<SessionModelError> for SubmissionError {
    fn from(err: SessionModelError) -> Self {
        match err {
            SessionModelError::Completed => Self::SessionCompleted,
            SessionModelError::AnswersLocked { stage } => Self::AnswersLocked(stage),
            SessionModelError::Index(index) => Self::OutOfRange(index),
            other => Self::Model(other),
        }
    }
}

/// Errors emitted by `CompletionPipeline`. The session keeps its last reached stage.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompletionError {
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error(transparent)]
    Model(#[from] SessionModelError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `SessionLoopService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionServiceError {
    #[error("session not found")]
    NotFound,
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Navigation(#[from] NavigationError),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error(transparent)]
    Model(#[from] SessionModelError),
    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for SessionServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => Self::NotFound,
            other => Self::Storage(other),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_errors_map_onto_submission_variants() {
        assert!(matches!(
            SubmissionError::from(SessionModelError::Completed),
            SubmissionError::SessionCompleted
        ));
        let index = IndexError::SlotOutOfRange { slot: 9, total: 3 };
        assert!(matches!(
            SubmissionError::from(SessionModelError::Index(index)),
            SubmissionError::OutOfRange(_)
        ));
        assert!(matches!(
            SubmissionError::from(SessionModelError::AnswersLocked {
                stage: CompletionStage::Evaluated
            }),
            SubmissionError::AnswersLocked(CompletionStage::Evaluated)
        ));
    }

    #[test]
    fn missing_session_is_not_a_storage_failure() {
        assert!(matches!(
            SessionServiceError::from(StorageError::NotFound),
            SessionServiceError::NotFound
        ));
    }
}
