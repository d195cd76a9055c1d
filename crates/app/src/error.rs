use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use interview_core::NavigationError;
use interview_core::model::SessionModelError;
use services::{CompletionError, SessionServiceError, SubmissionError};
use storage::repository::StorageError;

/// Error returned by every handler, rendered as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("session not found")]
    NotFound,

    #[error("round {blocking_round} must be completed first")]
    RoundLocked { blocking_round: usize },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream collaborator failed: {0}")]
    BadGateway(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::RoundLocked { .. } | ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.status();
        if code.is_server_error() {
            tracing::warn!(status = code.as_u16(), error = %self, "request failed");
        }
        let body = match &self {
            ApiError::RoundLocked { blocking_round } => json!({
                "error": self.to_string(),
                "blockingRound": blocking_round,
            }),
            _ => json!({ "error": self.to_string() }),
        };
        (code, Json(body)).into_response()
    }
}

fn from_storage(err: StorageError) -> ApiError {
    match err {
        StorageError::NotFound => ApiError::NotFound,
        StorageError::Model(
            SessionModelError::Completed | SessionModelError::AnswersLocked { .. },
        ) => ApiError::Conflict(err.to_string()),
        other => ApiError::Internal(other.to_string()),
    }
}

fn from_submission(err: SubmissionError) -> ApiError {
    match err {
        SubmissionError::OutOfRange(_)
        | SubmissionError::NothingToSubmit
        | SubmissionError::Model(_) => ApiError::BadRequest(err.to_string()),
        SubmissionError::SubmissionInFlight
        | SubmissionError::SessionCompleted
        | SubmissionError::AnswersLocked(_) => ApiError::Conflict(err.to_string()),
        SubmissionError::Storage(inner) => from_storage(inner),
        other => ApiError::Internal(other.to_string()),
    }
}

fn from_completion(err: CompletionError) -> ApiError {
    match err {
        CompletionError::Submission(inner) => from_submission(inner),
        CompletionError::Collaborator(inner) => ApiError::BadGateway(inner.to_string()),
        CompletionError::Model(inner) => ApiError::BadRequest(inner.to_string()),
        CompletionError::Storage(inner) => from_storage(inner),
        other => ApiError::Internal(other.to_string()),
    }
}

impl From<SessionServiceError> for ApiError {
    fn from(err: SessionServiceError) -> Self {
        match err {
            SessionServiceError::NotFound => ApiError::NotFound,
            SessionServiceError::Submission(inner) => from_submission(inner),
            SessionServiceError::Completion(inner) => from_completion(inner),
            SessionServiceError::Navigation(NavigationError::RoundLocked { blocking_round }) => {
                ApiError::RoundLocked { blocking_round }
            }
            SessionServiceError::Navigation(inner) => ApiError::BadRequest(inner.to_string()),
            SessionServiceError::Collaborator(inner) => ApiError::BadGateway(inner.to_string()),
            SessionServiceError::Model(inner) => ApiError::BadRequest(inner.to_string()),
            SessionServiceError::Storage(inner) => from_storage(inner),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
