//! Outside services the session loop consumes: question generation, answer
//! scoring, and narrative summaries.
//!
//! `AiClient` talks to a chat-completions endpoint; `TemplateCollaborators`
//! is the deterministic offline stand-in used when no API key is configured.

mod ai;
mod template;

use async_trait::async_trait;

use interview_core::model::{OwnerId, QuestionEvaluation, RoundDraft, Session, SessionMode};

use crate::error::CollaboratorError;

pub use ai::AiClient;
pub use template::TemplateCollaborators;

/// Parameters for creating a session.
#[derive(Debug, Clone, PartialEq)]
pub struct StartRequest {
    pub owner: OwnerId,
    pub mode: SessionMode,
    /// Exam only: how many questions to ask. Ignored for interviews.
    pub question_count: Option<u32>,
}

/// Produces the rounds of a new session from its mode parameters.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    /// # Errors
    ///
    /// Returns `CollaboratorError` on transport failures or unusable output.
    async fn generate(&self, request: &StartRequest) -> Result<Vec<RoundDraft>, CollaboratorError>;
}

/// Scores every question of a session. One inner list per round, in order.
#[async_trait]
pub trait AnswerEvaluator: Send + Sync {
    /// # Errors
    ///
    /// Returns `CollaboratorError` on transport failures or unusable output.
    async fn evaluate(
        &self,
        session: &Session,
    ) -> Result<Vec<Vec<QuestionEvaluation>>, CollaboratorError>;
}

/// Writes the closing narrative for an evaluated session.
#[async_trait]
pub trait SummaryWriter: Send + Sync {
    /// # Errors
    ///
    /// Returns `CollaboratorError` on transport failures or an empty reply.
    async fn summarize(&self, session: &Session) -> Result<String, CollaboratorError>;
}

/// Number of exam questions when the caller does not ask for a count.
pub const DEFAULT_EXAM_QUESTIONS: u32 = 10;
/// Upper bound on requested exam questions.
pub const MAX_EXAM_QUESTIONS: u32 = 50;

pub(crate) fn exam_question_count(request: &StartRequest) -> u32 {
    request
        .question_count
        .unwrap_or(DEFAULT_EXAM_QUESTIONS)
        .clamp(1, MAX_EXAM_QUESTIONS)
}
