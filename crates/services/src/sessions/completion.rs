use std::sync::Arc;

use interview_core::model::{BehavioralMetrics, CompletionStage, Session};
use storage::repository::SessionRepository;

use super::active::ActiveSession;
use super::submission::SubmissionCoordinator;
use crate::Clock;
use crate::collaborators::{AnswerEvaluator, SummaryWriter};
use crate::error::CompletionError;

/// Drives a session through `Active → AnswersSubmitted → Evaluated → Summarized → Complete`.
///
/// Each step works on a copy; the live session adopts it only after the store
/// accepted it, so a failed step leaves the session at the last reached stage
/// and a retry resumes from there.
pub struct CompletionPipeline {
    clock: Clock,
    store: Arc<dyn SessionRepository>,
    coordinator: SubmissionCoordinator,
    evaluator: Arc<dyn AnswerEvaluator>,
    summarizer: Arc<dyn SummaryWriter>,
}

impl CompletionPipeline {
    #[must_use]
    pub fn new(
        clock: Clock,
        store: Arc<dyn SessionRepository>,
        coordinator: SubmissionCoordinator,
        evaluator: Arc<dyn AnswerEvaluator>,
        summarizer: Arc<dyn SummaryWriter>,
    ) -> Self {
        Self {
            clock,
            store,
            coordinator,
            evaluator,
            summarizer,
        }
    }

    /// Finalize the session. A completed session returns `Complete` untouched.
    ///
    /// # Errors
    ///
    /// Returns `CompletionError` from the first step that failed.
    pub async fn run(&self, active: &mut ActiveSession) -> Result<CompletionStage, CompletionError> {
        self.advance_to(active, CompletionStage::Complete).await
    }

    /// Run the steps up to and including evaluation.
    ///
    /// # Errors
    ///
    /// Returns `CompletionError` from the first step that failed.
    pub async fn evaluate(
        &self,
        active: &mut ActiveSession,
    ) -> Result<CompletionStage, CompletionError> {
        self.advance_to(active, CompletionStage::Evaluated).await
    }

    /// Run the steps up to and including the summary.
    ///
    /// # Errors
    ///
    /// Returns `CompletionError` from the first step that failed.
    pub async fn summarize(
        &self,
        active: &mut ActiveSession,
    ) -> Result<CompletionStage, CompletionError> {
        self.advance_to(active, CompletionStage::Summarized).await
    }

    /// Step forward until `target` is reached. Stages already passed are skipped.
    ///
    /// # Errors
    ///
    /// Returns `CompletionError` from the first step that failed.
    pub async fn advance_to(
        &self,
        active: &mut ActiveSession,
        target: CompletionStage,
    ) -> Result<CompletionStage, CompletionError> {
        loop {
            let stage = active.session.stage();
            let Some(next) = stage.next().filter(|_| stage < target) else {
                return Ok(stage);
            };
            self.step(active, next).await?;
            tracing::info!(session_id = %active.id(), stage = %next, "completion stage reached");
        }
    }

    async fn step(
        &self,
        active: &mut ActiveSession,
        next: CompletionStage,
    ) -> Result<(), CompletionError> {
        let mut draft = match next {
            CompletionStage::AnswersSubmitted => self.checkpoint_answers(active).await?,
            CompletionStage::Evaluated => {
                let evaluations = self.evaluator.evaluate(&active.session).await?;
                let mut draft = active.session.clone();
                draft.apply_evaluations(evaluations)?;
                draft
            }
            CompletionStage::Summarized => {
                let samples = self.store.list_telemetry(active.id()).await?;
                let mut draft = active.session.clone();
                draft.set_metrics(BehavioralMetrics::from_samples(&samples));
                draft.replace_telemetry(samples);
                let summary = self.summarizer.summarize(&draft).await?;
                draft.set_summary(summary);
                draft
            }
            CompletionStage::Active | CompletionStage::Complete => active.session.clone(),
        };

        draft.advance_stage(next, self.clock.now())?;
        self.store.save_session(&draft).await?;
        active.session = draft;

        if next == CompletionStage::Complete {
            active.timer.stop();
        }
        Ok(())
    }

    /// Settle outstanding writes and adopt the store's copy, which may hold
    /// answers confirmed after the live copy last synced.
    async fn checkpoint_answers(
        &self,
        active: &mut ActiveSession,
    ) -> Result<Session, CompletionError> {
        self.coordinator.flush_pending(active).await?;
        let authoritative = self.store.get_session(active.id()).await?;
        active.session.reconcile(authoritative, &[])?;
        Ok(active.session.clone())
    }
}
