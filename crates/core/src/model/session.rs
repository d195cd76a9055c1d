use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::indexer::{AnswerIndexer, IndexError};
use crate::model::ids::{OwnerId, SessionId};
use crate::model::question::{Question, QuestionError, QuestionEvaluation};
use crate::model::round::{Round, RoundCategory, RoundDraft};
use crate::model::telemetry::{BehavioralMetrics, TelemetrySample};
use crate::navigation::{NavigationError, NavigationGuard};
use crate::progress::ProgressCalculator;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionModelError {
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("session already completed")]
    Completed,

    #[error("answers are locked while the session is {stage}")]
    AnswersLocked { stage: CompletionStage },

    #[error("cannot move completion stage from {from} to {to}")]
    StageOrder {
        from: CompletionStage,
        to: CompletionStage,
    },

    #[error(transparent)]
    Question(#[from] QuestionError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

fn violation(msg: impl Into<String>) -> SessionModelError {
    SessionModelError::InvariantViolation(msg.into())
}

//
// ─── MODE ──────────────────────────────────────────────────────────────────────
//

/// Exam or interview, with the parameters each mode was started from.
///
/// Both modes store their questions as rounds; an exam is one implicit round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SessionMode {
    Exam {
        exam_type: String,
    },
    Interview {
        company: String,
        role: String,
        experience: String,
    },
}

impl SessionMode {
    #[must_use]
    pub fn is_exam(&self) -> bool {
        matches!(self, SessionMode::Exam { .. })
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            SessionMode::Exam { .. } => "exam",
            SessionMode::Interview { .. } => "interview",
        }
    }
}

//
// ─── COMPLETION STAGE ──────────────────────────────────────────────────────────
//

/// Finalization progress. Only ever moves forward, one step at a time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStage {
    #[default]
    Active,
    AnswersSubmitted,
    Evaluated,
    Summarized,
    Complete,
}

impl CompletionStage {
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            CompletionStage::Active => Some(CompletionStage::AnswersSubmitted),
            CompletionStage::AnswersSubmitted => Some(CompletionStage::Evaluated),
            CompletionStage::Evaluated => Some(CompletionStage::Summarized),
            CompletionStage::Summarized => Some(CompletionStage::Complete),
            CompletionStage::Complete => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionStage::Active => "active",
            CompletionStage::AnswersSubmitted => "answers_submitted",
            CompletionStage::Evaluated => "evaluated",
            CompletionStage::Summarized => "summarized",
            CompletionStage::Complete => "complete",
        }
    }
}

impl fmt::Display for CompletionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One run of an exam or interview.
///
/// Answers live in two tiers: confirmed answers on the questions themselves, and
/// a local pending layer keyed by absolute slot for writes the authoritative
/// store has not acknowledged yet. Readers see pending text over confirmed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    id: SessionId,
    owner: OwnerId,
    #[serde(flatten)]
    mode: SessionMode,
    rounds: Vec<Round>,
    total_duration_minutes: u32,
    is_completed: bool,
    stage: CompletionStage,
    current_round: usize,
    furthest_round: usize,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    telemetry: Vec<TelemetrySample>,
    #[serde(default)]
    metrics: Option<BehavioralMetrics>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    pending: BTreeMap<usize, String>,
}

impl Session {
    /// Create a session from generated round content.
    ///
    /// Exam sessions fold every draft into a single implicit round.
    ///
    /// # Errors
    ///
    /// Returns `SessionModelError::InvariantViolation` if there are no rounds or a
    /// round has no questions or no duration, and `SessionModelError::Question` for blank prompts.
    pub fn new(
        id: SessionId,
        owner: OwnerId,
        mode: SessionMode,
        drafts: Vec<RoundDraft>,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionModelError> {
        if drafts.is_empty() {
            return Err(violation("session needs at least one round"));
        }
        let drafts = match &mode {
            SessionMode::Exam { exam_type } => vec![fold_exam_drafts(exam_type, drafts)],
            SessionMode::Interview { .. } => drafts,
        };

        let mut rounds = Vec::with_capacity(drafts.len());
        for (index, draft) in drafts.into_iter().enumerate() {
            let round = Round::from_draft(index, draft)?;
            if round.question_count() == 0 {
                return Err(violation(format!("round {index} has no questions")));
            }
            if round.duration_minutes() == 0 {
                return Err(violation(format!("round {index} has no time allotted")));
            }
            rounds.push(round);
        }
        let total_duration_minutes = rounds.iter().map(Round::duration_minutes).sum();

        Ok(Self {
            id,
            owner,
            mode,
            rounds,
            total_duration_minutes,
            is_completed: false,
            stage: CompletionStage::Active,
            current_round: 0,
            furthest_round: 0,
            summary: None,
            telemetry: Vec::new(),
            metrics: None,
            created_at: now,
            updated_at: now,
            pending: BTreeMap::new(),
        })
    }

    /// Check structural invariants on a session rehydrated from storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionModelError::InvariantViolation` describing the first broken rule.
    pub fn validate(&self) -> Result<(), SessionModelError> {
        if self.rounds.is_empty() {
            return Err(violation("session needs at least one round"));
        }
        if self.mode.is_exam() && self.rounds.len() != 1 {
            return Err(violation("exam sessions hold exactly one round"));
        }
        for (position, round) in self.rounds.iter().enumerate() {
            if round.index() != position {
                return Err(violation(format!(
                    "round at position {position} carries index {}",
                    round.index()
                )));
            }
            if round.question_count() == 0 {
                return Err(violation(format!("round {position} has no questions")));
            }
            if round.duration_minutes() == 0 {
                return Err(violation(format!("round {position} has no time allotted")));
            }
        }
        if self.furthest_round >= self.rounds.len() || self.current_round > self.furthest_round {
            return Err(violation("round pointer outside visited range"));
        }
        if self.is_completed != (self.stage == CompletionStage::Complete) {
            return Err(violation("completion flag disagrees with completion stage"));
        }
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    #[must_use]
    pub fn mode(&self) -> &SessionMode {
        &self.mode
    }

    /// Uniform round list for both modes.
    #[must_use]
    pub fn rounds_view(&self) -> &[Round] {
        &self.rounds
    }

    /// # Errors
    ///
    /// Returns `IndexError::RoundOutOfRange` for an unknown round.
    pub fn round(&self, round: usize) -> Result<&Round, IndexError> {
        self.rounds.get(round).ok_or(IndexError::RoundOutOfRange {
            round,
            rounds: self.rounds.len(),
        })
    }

    /// Slot mapping for this session. Build once per load and reuse.
    #[must_use]
    pub fn indexer(&self) -> AnswerIndexer {
        AnswerIndexer::from_rounds(&self.rounds)
    }

    #[must_use]
    pub fn total_duration_minutes(&self) -> u32 {
        self.total_duration_minutes
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    #[must_use]
    pub fn stage(&self) -> CompletionStage {
        self.stage
    }

    #[must_use]
    pub fn current_round(&self) -> usize {
        self.current_round
    }

    #[must_use]
    pub fn furthest_round(&self) -> usize {
        self.furthest_round
    }

    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    #[must_use]
    pub fn telemetry(&self) -> &[TelemetrySample] {
        &self.telemetry
    }

    #[must_use]
    pub fn metrics(&self) -> Option<&BehavioralMetrics> {
        self.metrics.as_ref()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    //
    // ─── SLOTS ─────────────────────────────────────────────────────────────────
    //

    /// What a reader should see in `slot`: pending text if any, else the confirmed answer.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::SlotOutOfRange` for an unknown slot.
    pub fn effective_answer(
        &self,
        indexer: &AnswerIndexer,
        slot: usize,
    ) -> Result<Option<&str>, IndexError> {
        let (round, question) = indexer.coordinates(slot)?;
        if let Some(text) = self.pending.get(&slot) {
            return Ok(Some(text.as_str()));
        }
        let questions = self.round(round)?.questions();
        questions
            .get(question)
            .map(Question::answer)
            .ok_or(IndexError::QuestionOutOfRange {
                round,
                question,
                len: questions.len(),
            })
    }

    /// Put an unconfirmed write into the pending layer.
    ///
    /// Returns the pending text it replaced so a failed send can restore it.
    ///
    /// # Errors
    ///
    /// Returns `SessionModelError::Completed` on a finished session,
    /// `SessionModelError::AnswersLocked` once finalization has started, and
    /// `SessionModelError::Index` for an unknown slot.
    pub fn stage_answer(
        &mut self,
        indexer: &AnswerIndexer,
        slot: usize,
        text: String,
    ) -> Result<Option<String>, SessionModelError> {
        self.ensure_answers_open()?;
        indexer.coordinates(slot)?;
        Ok(self.pending.insert(slot, text))
    }

    /// Answers can change only while the session is `Active`.
    fn ensure_answers_open(&self) -> Result<(), SessionModelError> {
        if self.is_completed {
            return Err(SessionModelError::Completed);
        }
        if self.stage > CompletionStage::Active {
            return Err(SessionModelError::AnswersLocked { stage: self.stage });
        }
        Ok(())
    }

    /// Undo a [`Session::stage_answer`], putting back what was pending before.
    pub fn restore_pending(&mut self, slot: usize, previous: Option<String>) {
        match previous {
            Some(text) => {
                self.pending.insert(slot, text);
            }
            None => {
                self.pending.remove(&slot);
            }
        }
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Snapshot of outstanding pending writes in slot order.
    #[must_use]
    pub fn pending_entries(&self) -> Vec<(usize, String)> {
        self.pending
            .iter()
            .map(|(slot, text)| (*slot, text.clone()))
            .collect()
    }

    /// Confirmed write, as performed by the authoritative store.
    ///
    /// # Errors
    ///
    /// Returns `SessionModelError::Completed` on a finished session,
    /// `SessionModelError::AnswersLocked` once finalization has started, and
    /// `SessionModelError::Index` for an unknown slot.
    pub fn record_answer(
        &mut self,
        indexer: &AnswerIndexer,
        slot: usize,
        text: String,
        answered_at: DateTime<Utc>,
        elapsed_seconds: Option<u32>,
    ) -> Result<(), SessionModelError> {
        self.ensure_answers_open()?;
        let (round, question) = indexer.coordinates(slot)?;
        let rounds = self.rounds.len();
        let target = self
            .rounds
            .get_mut(round)
            .ok_or(IndexError::RoundOutOfRange { round, rounds })?;
        let len = target.question_count();
        let target = target
            .question_mut(question)
            .ok_or(IndexError::QuestionOutOfRange {
                round,
                question,
                len,
            })?;
        target.record_answer(text, answered_at, elapsed_seconds);
        self.updated_at = answered_at;
        Ok(())
    }

    /// Adopt the authoritative copy, dropping the pending entries it acknowledged.
    ///
    /// Pending writes for other slots survive the merge.
    ///
    /// # Errors
    ///
    /// Returns `SessionModelError::InvariantViolation` if the copies disagree on
    /// identity or round sizes, or if the authoritative copy would un-complete
    /// the session.
    pub fn reconcile(
        &mut self,
        authoritative: Session,
        acknowledged: &[usize],
    ) -> Result<(), SessionModelError> {
        if authoritative.id != self.id {
            return Err(violation("reconcile across different sessions"));
        }
        let local_sizes = self.rounds.iter().map(Round::question_count);
        let remote_sizes = authoritative.rounds.iter().map(Round::question_count);
        if !local_sizes.eq(remote_sizes) {
            return Err(violation("round sizes changed after creation"));
        }
        if self.is_completed && !authoritative.is_completed {
            return Err(violation("completion flag cannot revert"));
        }

        let mut pending = std::mem::take(&mut self.pending);
        for slot in acknowledged {
            pending.remove(slot);
        }
        *self = authoritative;
        self.pending = pending;
        Ok(())
    }

    /// Attach per-question evaluation results, one inner list per round.
    ///
    /// # Errors
    ///
    /// Returns `SessionModelError::InvariantViolation` if the shape differs from the
    /// session's rounds, and `SessionModelError::Question` for invalid scores.
    pub fn apply_evaluations(
        &mut self,
        evaluations: Vec<Vec<QuestionEvaluation>>,
    ) -> Result<(), SessionModelError> {
        if evaluations.len() != self.rounds.len() {
            return Err(violation(format!(
                "evaluation covers {} rounds, session has {}",
                evaluations.len(),
                self.rounds.len()
            )));
        }
        for (round, evals) in self.rounds.iter().zip(&evaluations) {
            if evals.len() != round.question_count() {
                return Err(violation(format!(
                    "evaluation for round {} has {} entries, expected {}",
                    round.index(),
                    evals.len(),
                    round.question_count()
                )));
            }
            for eval in evals {
                eval.validate()?;
            }
        }

        for (round, evals) in self.rounds.iter_mut().zip(evaluations) {
            for (question, eval) in evals.into_iter().enumerate() {
                if let Some(q) = round.question_mut(question) {
                    q.apply_evaluation(eval);
                }
            }
        }
        Ok(())
    }

    pub fn set_summary(&mut self, summary: String) {
        self.summary = Some(summary);
    }

    pub fn set_metrics(&mut self, metrics: Option<BehavioralMetrics>) {
        self.metrics = metrics;
    }

    /// Telemetry is appended out of band by the store; this installs its list.
    pub fn replace_telemetry(&mut self, samples: Vec<TelemetrySample>) {
        self.telemetry = samples;
    }

    /// Move the completion stage forward by exactly one step.
    ///
    /// Reaching `Complete` sets the completion flag, which never reverts.
    ///
    /// # Errors
    ///
    /// Returns `SessionModelError::StageOrder` for anything but the next stage, and
    /// `SessionModelError::InvariantViolation` if pending writes are still open.
    pub fn advance_stage(
        &mut self,
        to: CompletionStage,
        now: DateTime<Utc>,
    ) -> Result<(), SessionModelError> {
        if self.stage.next() != Some(to) {
            return Err(SessionModelError::StageOrder {
                from: self.stage,
                to,
            });
        }
        if self.has_pending() {
            return Err(violation("pending answers must settle before finalizing"));
        }
        self.stage = to;
        if to == CompletionStage::Complete {
            self.is_completed = true;
        }
        self.updated_at = now;
        Ok(())
    }

    //
    // ─── NAVIGATION ────────────────────────────────────────────────────────────
    //

    /// Move the round pointer after checking the navigation guard.
    ///
    /// # Errors
    ///
    /// Returns `NavigationError::RoundLocked` naming the blocking round, or
    /// `NavigationError::Index` for an unknown round.
    pub fn navigate_to(
        &mut self,
        indexer: &AnswerIndexer,
        target: usize,
    ) -> Result<(), NavigationError> {
        {
            let progress = ProgressCalculator::new(self, indexer);
            NavigationGuard::new(progress).can_navigate_to(target)?;
        }
        self.current_round = target;
        self.furthest_round = self.furthest_round.max(target);
        Ok(())
    }
}

fn fold_exam_drafts(exam_type: &str, drafts: Vec<RoundDraft>) -> RoundDraft {
    let category = drafts
        .first()
        .map_or(RoundCategory::General, |d| d.category);
    let description = drafts
        .first()
        .map(|d| d.description.clone())
        .unwrap_or_default();
    let name = if exam_type.trim().is_empty() {
        "Exam".to_owned()
    } else {
        exam_type.to_owned()
    };
    let mut duration_minutes = 0;
    let mut questions = Vec::new();
    for draft in drafts {
        duration_minutes += draft.duration_minutes;
        questions.extend(draft.questions);
    }
    RoundDraft {
        name,
        category,
        duration_minutes,
        description,
        questions,
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
