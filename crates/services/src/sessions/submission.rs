use std::sync::Arc;

use serde::Deserialize;

use interview_core::model::{CompletionStage, is_filled};
use storage::repository::{AnswerRecord, SessionRepository};

use super::active::ActiveSession;
use crate::Clock;
use crate::error::SubmissionError;

/// One answer addressed by round and question.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerEntry {
    pub round_index: usize,
    pub question_index: usize,
    pub answer: String,
}

/// Writes answers optimistically and confirms them against the store.
///
/// A write lands in the session's pending layer first. The store's reply is
/// adopted on success; on failure the pending layer is put back as it was.
#[derive(Clone)]
pub struct SubmissionCoordinator {
    clock: Clock,
    store: Arc<dyn SessionRepository>,
}

impl SubmissionCoordinator {
    #[must_use]
    pub fn new(clock: Clock, store: Arc<dyn SessionRepository>) -> Self {
        Self { clock, store }
    }

    /// Write one slot. A blank answer clears it.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::OutOfRange` for unknown coordinates,
    /// `SessionCompleted`, `AnswersLocked` or `SubmissionInFlight` for rejected writes, and
    /// `Storage` when the store call fails (the slot is rolled back).
    pub async fn submit_single(
        &self,
        active: &mut ActiveSession,
        round: usize,
        question: usize,
        answer: String,
    ) -> Result<(), SubmissionError> {
        let slot = active.indexer.absolute_index(round, question)?;
        self.send(active, vec![(slot, answer)]).await.map(|_| ())
    }

    /// Write many slots in one store round-trip. Blank answers are skipped.
    ///
    /// Returns the number of answers sent.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::NothingToSubmit` when every answer is blank,
    /// otherwise the same errors as [`Self::submit_single`]. Coordinates are
    /// checked before anything is staged.
    pub async fn submit_batch(
        &self,
        active: &mut ActiveSession,
        entries: Vec<AnswerEntry>,
    ) -> Result<usize, SubmissionError> {
        let mut writes = Vec::with_capacity(entries.len());
        for entry in entries {
            if !is_filled(Some(&entry.answer)) {
                continue;
            }
            let slot = active
                .indexer
                .absolute_index(entry.round_index, entry.question_index)?;
            writes.push((slot, entry.answer));
        }
        if writes.is_empty() {
            return Err(SubmissionError::NothingToSubmit);
        }
        self.send(active, writes).await
    }

    /// Resend whatever is still pending. Already-confirmed answers are untouched.
    ///
    /// # Errors
    ///
    /// Same as [`Self::submit_batch`], except an empty pending layer is `Ok(0)`.
    pub async fn flush_pending(&self, active: &mut ActiveSession) -> Result<usize, SubmissionError> {
        let writes = active.session.pending_entries();
        if writes.is_empty() {
            return Ok(0);
        }
        self.send(active, writes).await
    }

    async fn send(
        &self,
        active: &mut ActiveSession,
        writes: Vec<(usize, String)>,
    ) -> Result<usize, SubmissionError> {
        let mut flight = InFlight::begin(active)?;

        let answered_at = self.clock.now();
        let elapsed_seconds = flight
            .active
            .timer
            .is_running()
            .then(|| flight.active.timer.elapsed());

        let mut records = Vec::with_capacity(writes.len());
        for (slot, answer) in writes {
            flight.stage(slot, answer.clone())?;
            records.push(AnswerRecord {
                slot,
                answer,
                answered_at,
                elapsed_seconds,
            });
        }

        let id = flight.active.id();
        let authoritative = self.store.record_answers(id, &records).await?;
        let acknowledged: Vec<usize> = records.iter().map(|r| r.slot).collect();
        flight.active.session.reconcile(authoritative, &acknowledged)?;
        flight.settle();

        tracing::debug!(session_id = %id, answers = records.len(), "answers confirmed");
        Ok(records.len())
    }
}

/// Marks the session as submitting and undoes staged writes unless settled.
///
/// Dropping it on any path, including a cancelled future, clears the flag.
struct InFlight<'a> {
    active: &'a mut ActiveSession,
    staged: Vec<(usize, Option<String>)>,
    settled: bool,
}

impl<'a> InFlight<'a> {
    fn begin(active: &'a mut ActiveSession) -> Result<Self, SubmissionError> {
        if active.session.is_completed() {
            return Err(SubmissionError::SessionCompleted);
        }
        let stage = active.session.stage();
        if stage > CompletionStage::Active {
            return Err(SubmissionError::AnswersLocked(stage));
        }
        if active.submitting {
            return Err(SubmissionError::SubmissionInFlight);
        }
        active.submitting = true;
        Ok(Self {
            active,
            staged: Vec::new(),
            settled: false,
        })
    }

    fn stage(&mut self, slot: usize, text: String) -> Result<(), SubmissionError> {
        let active = &mut *self.active;
        let previous = active.session.stage_answer(&active.indexer, slot, text)?;
        self.staged.push((slot, previous));
        Ok(())
    }

    fn settle(&mut self) {
        self.settled = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            for (slot, previous) in self.staged.drain(..).rev() {
                self.active.session.restore_pending(slot, previous);
            }
        }
        self.active.submitting = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use interview_core::model::{
        OwnerId, RoundDraft, Session, SessionId, SessionMode, TelemetrySample,
    };
    use interview_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, StorageError};

    fn session() -> Session {
        Session::new(
            SessionId::generate(),
            OwnerId::anonymous(),
            SessionMode::Interview {
                company: "Acme".into(),
                role: "Backend".into(),
                experience: "2 years".into(),
            },
            vec![
                RoundDraft {
                    name: "One".into(),
                    category: Default::default(),
                    duration_minutes: 5,
                    description: String::new(),
                    questions: vec!["A?".into(), "B?".into()],
                },
                RoundDraft {
                    name: "Two".into(),
                    category: Default::default(),
                    duration_minutes: 5,
                    description: String::new(),
                    questions: vec!["C?".into()],
                },
            ],
            fixed_now(),
        )
        .unwrap()
    }

    /// Store that rejects every answer write.
    struct OfflineStore;

    #[async_trait]
    impl SessionRepository for OfflineStore {
        async fn insert_session(&self, _: &Session) -> Result<(), StorageError> {
            Ok(())
        }
        async fn get_session(&self, _: SessionId) -> Result<Session, StorageError> {
            Err(StorageError::NotFound)
        }
        async fn save_session(&self, _: &Session) -> Result<(), StorageError> {
            Ok(())
        }
        async fn record_answers(
            &self,
            _: SessionId,
            _: &[AnswerRecord],
        ) -> Result<Session, StorageError> {
            Err(StorageError::Connection("timed out".into()))
        }
        async fn append_telemetry(
            &self,
            _: SessionId,
            _: &TelemetrySample,
        ) -> Result<(), StorageError> {
            Ok(())
        }
        async fn list_telemetry(&self, _: SessionId) -> Result<Vec<TelemetrySample>, StorageError> {
            Ok(Vec::new())
        }
        async fn list_sessions(&self, _: &OwnerId, _: u32) -> Result<Vec<Session>, StorageError> {
            Ok(Vec::new())
        }
    }

    async fn live() -> (SubmissionCoordinator, ActiveSession) {
        let repo = Arc::new(InMemoryRepository::new());
        let session = session();
        repo.insert_session(&session).await.unwrap();
        (
            SubmissionCoordinator::new(Clock::fixed(fixed_now()), repo),
            ActiveSession::new(session),
        )
    }

    #[tokio::test]
    async fn single_write_is_confirmed_with_timestamp() {
        let (coordinator, mut active) = live().await;
        coordinator
            .submit_single(&mut active, 1, 0, "Because.".into())
            .await
            .unwrap();

        let question = &active.session().rounds_view()[1].questions()[0];
        assert_eq!(question.answer(), Some("Because."));
        assert_eq!(question.answered_at(), Some(fixed_now()));
        assert_eq!(question.elapsed_seconds(), Some(0));
        assert!(!active.session().has_pending());
        assert!(!active.is_submitting());
    }

    #[tokio::test]
    async fn failed_store_write_rolls_back_pending() {
        let session = session();
        let mut active = ActiveSession::new(session);
        let coordinator = SubmissionCoordinator::new(Clock::default(), Arc::new(OfflineStore));

        let err = coordinator
            .submit_single(&mut active, 0, 1, "draft".into())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Storage(_)));
        assert!(!active.session().has_pending());
        assert!(!active.is_submitting());
        assert_eq!(active.progress().answered_count(), 0);
    }

    #[tokio::test]
    async fn batch_skips_blank_and_rejects_empty() {
        let (coordinator, mut active) = live().await;
        let err = coordinator
            .submit_batch(
                &mut active,
                vec![AnswerEntry {
                    round_index: 0,
                    question_index: 0,
                    answer: "   ".into(),
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::NothingToSubmit));

        let sent = coordinator
            .submit_batch(
                &mut active,
                vec![
                    AnswerEntry {
                        round_index: 0,
                        question_index: 0,
                        answer: "first".into(),
                    },
                    AnswerEntry {
                        round_index: 0,
                        question_index: 1,
                        answer: String::new(),
                    },
                    AnswerEntry {
                        round_index: 1,
                        question_index: 0,
                        answer: "third".into(),
                    },
                ],
            )
            .await
            .unwrap();
        assert_eq!(sent, 2);
        assert_eq!(active.progress().answered_count(), 2);
    }

    #[tokio::test]
    async fn out_of_range_batch_stages_nothing() {
        let (coordinator, mut active) = live().await;
        let err = coordinator
            .submit_batch(
                &mut active,
                vec![
                    AnswerEntry {
                        round_index: 0,
                        question_index: 0,
                        answer: "ok".into(),
                    },
                    AnswerEntry {
                        round_index: 1,
                        question_index: 1,
                        answer: "nope".into(),
                    },
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::OutOfRange(_)));
        assert!(!active.session().has_pending());
        assert_eq!(active.progress().answered_count(), 0);
    }

    #[tokio::test]
    async fn flag_rejects_reentrant_submission() {
        let (coordinator, mut active) = live().await;
        active.submitting = true;
        let err = coordinator
            .submit_single(&mut active, 0, 0, "x".into())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::SubmissionInFlight));
        assert!(active.is_submitting());
    }

    #[tokio::test]
    async fn writes_are_rejected_once_finalization_starts() {
        let (coordinator, mut active) = live().await;
        coordinator
            .submit_single(&mut active, 0, 0, "kept".into())
            .await
            .unwrap();
        active
            .session
            .advance_stage(CompletionStage::AnswersSubmitted, fixed_now())
            .unwrap();

        let err = coordinator
            .submit_single(&mut active, 0, 0, "rewritten".into())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SubmissionError::AnswersLocked(CompletionStage::AnswersSubmitted)
        ));
        assert!(!active.is_submitting());
        assert!(!active.session().has_pending());
        let question = &active.session().rounds_view()[0].questions()[0];
        assert_eq!(question.answer(), Some("kept"));
    }
}
