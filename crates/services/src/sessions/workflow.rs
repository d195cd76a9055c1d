use std::sync::Arc;

use interview_core::model::{OwnerId, Session, SessionId, TelemetrySample};
use storage::repository::SessionRepository;

use super::active::SessionView;
use super::completion::CompletionPipeline;
use super::drivers::{spawn_telemetry_driver, spawn_timer_driver};
use super::registry::{SessionDrivers, SessionRegistry, SessionSlot};
use super::submission::{AnswerEntry, SubmissionCoordinator};
use crate::Clock;
use crate::collaborators::{AnswerEvaluator, QuestionGenerator, StartRequest, SummaryWriter};
use crate::config::ServiceConfig;
use crate::error::SessionServiceError;
use crate::telemetry::{
    PushOutcome, RepositorySink, SimulatedSource, TelemetryCapability, TelemetryCollector,
};

/// Result of a batch submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub submitted: usize,
    pub session: Session,
}

/// Orchestrates session start, answering, navigation, and finalization.
///
/// Sessions live in a registry with one lock each; every operation on a
/// session runs while holding that lock.
pub struct SessionLoopService {
    clock: Clock,
    config: ServiceConfig,
    store: Arc<dyn SessionRepository>,
    registry: SessionRegistry,
    coordinator: SubmissionCoordinator,
    pipeline: Arc<CompletionPipeline>,
    generator: Arc<dyn QuestionGenerator>,
    telemetry: Arc<TelemetryCollector>,
}

impl SessionLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        config: ServiceConfig,
        store: Arc<dyn SessionRepository>,
        generator: Arc<dyn QuestionGenerator>,
        evaluator: Arc<dyn AnswerEvaluator>,
        summarizer: Arc<dyn SummaryWriter>,
    ) -> Self {
        let coordinator = SubmissionCoordinator::new(clock, Arc::clone(&store));
        let pipeline = Arc::new(CompletionPipeline::new(
            clock,
            Arc::clone(&store),
            coordinator.clone(),
            evaluator,
            summarizer,
        ));
        let capability = if config.simulate_telemetry {
            TelemetryCapability::SimulatedFallback
        } else {
            TelemetryCapability::SensorOnly
        };
        let telemetry = Arc::new(TelemetryCollector::new(
            clock,
            Arc::new(RepositorySink::new(Arc::clone(&store))),
            config.telemetry_interval,
            capability,
        ));
        Self {
            clock,
            registry: SessionRegistry::new(clock, Arc::clone(&store)),
            config,
            store,
            coordinator,
            pipeline,
            generator,
            telemetry,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    #[must_use]
    pub fn telemetry(&self) -> Arc<TelemetryCollector> {
        Arc::clone(&self.telemetry)
    }

    /// Generate rounds, persist the new session, and start its drivers.
    ///
    /// Completed sessions still held live are evicted first.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError` when generation, validation, or storage fails.
    pub async fn start(&self, request: StartRequest) -> Result<Session, SessionServiceError> {
        for id in self.registry.evict_completed().await {
            self.telemetry.forget(id);
        }
        let drafts = self.generator.generate(&request).await?;
        let session = Session::new(
            SessionId::generate(),
            request.owner,
            request.mode,
            drafts,
            self.clock.now(),
        )?;
        self.store.insert_session(&session).await?;

        let id = session.id();
        let slot = self.registry.insert(session.clone()).await;
        self.ensure_drivers(&slot, id);
        tracing::info!(
            session_id = %id,
            mode = session.mode().label(),
            rounds = session.rounds_view().len(),
            "session started"
        );
        Ok(session)
    }

    /// Current state of the session, pending writes included in progress only.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::NotFound` for unknown sessions.
    pub async fn session(&self, id: SessionId) -> Result<Session, SessionServiceError> {
        let slot = self.slot(id).await?;
        let active = slot.lock().await;
        Ok(active.session().clone())
    }

    /// Progress snapshot plus timer state.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::NotFound` for unknown sessions.
    pub async fn view(&self, id: SessionId) -> Result<SessionView, SessionServiceError> {
        let slot = self.slot(id).await?;
        let active = slot.lock().await;
        Ok(active.view())
    }

    /// Write one answer.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Submission` for rejected or failed writes.
    pub async fn answer(
        &self,
        id: SessionId,
        round: usize,
        question: usize,
        answer: String,
    ) -> Result<Session, SessionServiceError> {
        let slot = self.slot(id).await?;
        let mut active = slot.lock().await;
        self.coordinator
            .submit_single(&mut active, round, question, answer)
            .await?;
        Ok(active.session().clone())
    }

    /// Write many answers in one round-trip.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Submission` for rejected or failed writes,
    /// including an all-blank batch.
    pub async fn submit(
        &self,
        id: SessionId,
        entries: Vec<AnswerEntry>,
    ) -> Result<SubmitOutcome, SessionServiceError> {
        let slot = self.slot(id).await?;
        let mut active = slot.lock().await;
        let submitted = self.coordinator.submit_batch(&mut active, entries).await?;
        Ok(SubmitOutcome {
            submitted,
            session: active.session().clone(),
        })
    }

    /// Move the round pointer if the navigation guard allows it.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Navigation` when the round is locked or unknown.
    pub async fn navigate(
        &self,
        id: SessionId,
        round: usize,
    ) -> Result<SessionView, SessionServiceError> {
        let slot = self.slot(id).await?;
        let mut active = slot.lock().await;
        let mut draft = active.session.clone();
        draft.navigate_to(&active.indexer, round)?;
        if draft.current_round() != active.session.current_round()
            || draft.furthest_round() != active.session.furthest_round()
        {
            draft.touch(self.clock.now());
            self.store.save_session(&draft).await?;
        }
        active.session = draft;
        Ok(active.view())
    }

    /// Run the pipeline through evaluation.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Completion` when a step fails.
    pub async fn evaluate(&self, id: SessionId) -> Result<Session, SessionServiceError> {
        let slot = self.slot(id).await?;
        let mut active = slot.lock().await;
        self.pipeline.evaluate(&mut active).await?;
        Ok(active.session().clone())
    }

    /// Run the pipeline through the summary.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Completion` when a step fails.
    pub async fn summarize(&self, id: SessionId) -> Result<Session, SessionServiceError> {
        let slot = self.slot(id).await?;
        let mut active = slot.lock().await;
        self.pipeline.summarize(&mut active).await?;
        Ok(active.session().clone())
    }

    /// Finalize the session, stop its drivers, and drop it from the registry.
    /// Idempotent; later reads come from the store.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Completion` when a step fails; the session
    /// keeps the last stage it reached.
    pub async fn complete(&self, id: SessionId) -> Result<Session, SessionServiceError> {
        let slot = self.slot(id).await?;
        let mut active = slot.lock().await;
        self.pipeline.run(&mut active).await?;
        let session = active.session().clone();
        drop(active);
        self.registry.remove(id).await;
        self.telemetry.forget(id);
        Ok(session)
    }

    /// Most recently created sessions for `owner`, newest first, read from the store.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Storage` if the query fails.
    pub async fn list(
        &self,
        owner: &OwnerId,
        limit: u32,
    ) -> Result<Vec<Session>, SessionServiceError> {
        Ok(self.store.list_sessions(owner, limit).await?)
    }

    /// Forward one camera-derived sample. Never fails; see [`PushOutcome`].
    pub async fn record_frame(&self, id: SessionId, mut sample: TelemetrySample) -> PushOutcome {
        sample.simulated = false;
        self.telemetry.push_sample(id, sample).await
    }

    /// Stop the drivers and drop the live session. The stored session is kept.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::NotFound` when the session exists nowhere.
    pub async fn abandon(&self, id: SessionId) -> Result<(), SessionServiceError> {
        if self.registry.remove(id).await.is_none() {
            self.store.get_session(id).await?;
        }
        self.telemetry.forget(id);
        tracing::info!(session_id = %id, "session abandoned");
        Ok(())
    }

    async fn slot(&self, id: SessionId) -> Result<Arc<SessionSlot>, SessionServiceError> {
        let slot = self.registry.get(id).await?;
        let completed = slot.lock().await.session().is_completed();
        if !completed {
            self.ensure_drivers(&slot, id);
        }
        Ok(slot)
    }

    fn ensure_drivers(&self, slot: &Arc<SessionSlot>, id: SessionId) {
        slot.start_drivers_once(|| {
            let timer = spawn_timer_driver(
                Arc::downgrade(slot),
                Arc::clone(&self.pipeline),
                self.config.timer_tick,
                self.config.auto_submit_on_expiry,
            );
            let telemetry = self.telemetry.simulates().then(|| {
                spawn_telemetry_driver(
                    id,
                    Arc::downgrade(slot),
                    Arc::clone(&self.telemetry),
                    Box::new(SimulatedSource::new()),
                    self.clock,
                    self.config.telemetry_interval,
                )
            });
            SessionDrivers::new(Some(timer), telemetry)
        });
    }
}
