use async_trait::async_trait;
use chrono::{DateTime, Utc};
use interview_core::model::{OwnerId, Session, SessionId, SessionModelError, TelemetrySample};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Model(#[from] SessionModelError),
}

/// One confirmed answer write, addressed by absolute slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    pub slot: usize,
    pub answer: String,
    pub answered_at: DateTime<Utc>,
    pub elapsed_seconds: Option<u32>,
}

/// Authoritative store for sessions.
///
/// Telemetry is kept beside the session rather than inside it so background
/// sample pushes never race with the session actor's own saves.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a freshly created session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id already exists.
    async fn insert_session(&self, session: &Session) -> Result<(), StorageError>;

    /// Fetch a session with its telemetry attached.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_session(&self, id: SessionId) -> Result<Session, StorageError>;

    /// Overwrite an existing session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, and `StorageError::Conflict`
    /// if the write would un-complete a completed session.
    async fn save_session(&self, session: &Session) -> Result<(), StorageError>;

    /// Apply answer writes atomically and return the resulting session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown session and
    /// `StorageError::Model` if a write is rejected by the session.
    async fn record_answers(
        &self,
        id: SessionId,
        answers: &[AnswerRecord],
    ) -> Result<Session, StorageError>;

    /// Append one telemetry sample.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown session, or other storage errors.
    async fn append_telemetry(
        &self,
        id: SessionId,
        sample: &TelemetrySample,
    ) -> Result<(), StorageError>;

    /// Telemetry samples in arrival order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown session, or other storage errors.
    async fn list_telemetry(&self, id: SessionId) -> Result<Vec<TelemetrySample>, StorageError>;

    /// Most recently created sessions for an owner.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn list_sessions(
        &self,
        owner: &OwnerId,
        limit: u32,
    ) -> Result<Vec<Session>, StorageError>;
}

/// Apply answer records to a session through its own indexer.
///
/// # Errors
///
/// Returns `StorageError::Model` for writes the session rejects.
pub fn apply_answer_records(
    session: &mut Session,
    answers: &[AnswerRecord],
) -> Result<(), StorageError> {
    let indexer = session.indexer();
    for record in answers {
        session.record_answer(
            &indexer,
            record.slot,
            record.answer.clone(),
            record.answered_at,
            record.elapsed_seconds,
        )?;
    }
    Ok(())
}

/// Reject writes that would flip a completed session back to active.
///
/// # Errors
///
/// Returns `StorageError::Conflict` when `stored` is completed and `incoming` is not.
pub fn ensure_completion_monotonic(stored: &Session, incoming: &Session) -> Result<(), StorageError> {
    if stored.is_completed() && !incoming.is_completed() {
        return Err(StorageError::Conflict(format!(
            "session {} is already completed",
            stored.id()
        )));
    }
    Ok(())
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    sessions: Arc<Mutex<HashMap<SessionId, Session>>>,
    telemetry: Arc<Mutex<HashMap<SessionId, Vec<TelemetrySample>>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn telemetry_for(&self, id: SessionId) -> Result<Vec<TelemetrySample>, StorageError> {
        let guard = self
            .telemetry
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn insert_session(&self, session: &Session) -> Result<(), StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard.contains_key(&session.id()) {
            return Err(StorageError::Conflict(format!(
                "session {} already exists",
                session.id()
            )));
        }
        let mut stored = session.clone();
        stored.replace_telemetry(Vec::new());
        guard.insert(session.id(), stored);
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<Session, StorageError> {
        let mut session = {
            let guard = self
                .sessions
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            guard.get(&id).cloned().ok_or(StorageError::NotFound)?
        };
        session.replace_telemetry(self.telemetry_for(id)?);
        Ok(session)
    }

    async fn save_session(&self, session: &Session) -> Result<(), StorageError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let stored = guard.get_mut(&session.id()).ok_or(StorageError::NotFound)?;
        ensure_completion_monotonic(stored, session)?;
        let mut next = session.clone();
        next.replace_telemetry(Vec::new());
        *stored = next;
        Ok(())
    }

    async fn record_answers(
        &self,
        id: SessionId,
        answers: &[AnswerRecord],
    ) -> Result<Session, StorageError> {
        let mut session = {
            let mut guard = self
                .sessions
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            let stored = guard.get_mut(&id).ok_or(StorageError::NotFound)?;
            // Apply to a copy so a rejected record leaves the stored session untouched.
            let mut next = stored.clone();
            apply_answer_records(&mut next, answers)?;
            *stored = next.clone();
            next
        };
        session.replace_telemetry(self.telemetry_for(id)?);
        Ok(session)
    }

    async fn append_telemetry(
        &self,
        id: SessionId,
        sample: &TelemetrySample,
    ) -> Result<(), StorageError> {
        {
            let guard = self
                .sessions
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            if !guard.contains_key(&id) {
                return Err(StorageError::NotFound);
            }
        }
        let mut guard = self
            .telemetry
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.entry(id).or_default().push(sample.clone());
        Ok(())
    }

    async fn list_telemetry(&self, id: SessionId) -> Result<Vec<TelemetrySample>, StorageError> {
        {
            let guard = self
                .sessions
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            if !guard.contains_key(&id) {
                return Err(StorageError::NotFound);
            }
        }
        self.telemetry_for(id)
    }

    async fn list_sessions(
        &self,
        owner: &OwnerId,
        limit: u32,
    ) -> Result<Vec<Session>, StorageError> {
        let guard = self
            .sessions
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut owned: Vec<Session> = guard
            .values()
            .filter(|s| s.owner() == owner)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        owned.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(owned)
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let sessions: Arc<dyn SessionRepository> = Arc::new(InMemoryRepository::new());
        Self { sessions }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interview_core::model::{CompletionStage, RoundCategory, RoundDraft, SessionMode};
    use interview_core::time::fixed_now;

    fn build_session() -> Session {
        Session::new(
            SessionId::generate(),
            OwnerId::new("cand-1"),
            SessionMode::Exam {
                exam_type: "Logical reasoning".into(),
            },
            vec![RoundDraft {
                name: "Reasoning".into(),
                category: RoundCategory::Aptitude,
                duration_minutes: 20,
                description: String::new(),
                questions: vec!["Q1".into(), "Q2".into(), "Q3".into()],
            }],
            fixed_now(),
        )
        .unwrap()
    }

    fn record(slot: usize, answer: &str) -> AnswerRecord {
        AnswerRecord {
            slot,
            answer: answer.into(),
            answered_at: fixed_now(),
            elapsed_seconds: Some(12),
        }
    }

    #[tokio::test]
    async fn records_answers_and_returns_session() {
        let repo = InMemoryRepository::new();
        let session = build_session();
        repo.insert_session(&session).await.unwrap();

        let updated = repo
            .record_answers(session.id(), &[record(0, "A"), record(2, "C")])
            .await
            .unwrap();
        let answers: Vec<_> = updated.rounds_view()[0]
            .questions()
            .iter()
            .map(|q| q.answer())
            .collect();
        assert_eq!(answers, vec![Some("A"), None, Some("C")]);
    }

    #[tokio::test]
    async fn rejected_batch_leaves_store_untouched() {
        let repo = InMemoryRepository::new();
        let session = build_session();
        repo.insert_session(&session).await.unwrap();

        let err = repo
            .record_answers(session.id(), &[record(0, "A"), record(9, "out of range")])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Model(_)));

        let stored = repo.get_session(session.id()).await.unwrap();
        assert!(!stored.rounds_view()[0].questions()[0].has_answer());
    }

    #[tokio::test]
    async fn store_refuses_answers_after_evaluation() {
        let repo = InMemoryRepository::new();
        let mut session = build_session();
        repo.insert_session(&session).await.unwrap();
        repo.record_answers(session.id(), &[record(0, "A")])
            .await
            .unwrap();

        session = repo.get_session(session.id()).await.unwrap();
        session
            .advance_stage(CompletionStage::AnswersSubmitted, fixed_now())
            .unwrap();
        session
            .advance_stage(CompletionStage::Evaluated, fixed_now())
            .unwrap();
        repo.save_session(&session).await.unwrap();

        let err = repo
            .record_answers(session.id(), &[record(0, "rewritten")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorageError::Model(SessionModelError::AnswersLocked {
                stage: CompletionStage::Evaluated
            })
        ));
        let stored = repo.get_session(session.id()).await.unwrap();
        assert_eq!(stored.rounds_view()[0].questions()[0].answer(), Some("A"));
    }

    #[tokio::test]
    async fn duplicate_insert_conflicts() {
        let repo = InMemoryRepository::new();
        let session = build_session();
        repo.insert_session(&session).await.unwrap();
        assert!(matches!(
            repo.insert_session(&session).await,
            Err(StorageError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn completed_session_cannot_be_reopened() {
        let repo = InMemoryRepository::new();
        let active = build_session();
        repo.insert_session(&active).await.unwrap();

        let mut done = active.clone();
        for stage in [
            CompletionStage::AnswersSubmitted,
            CompletionStage::Evaluated,
            CompletionStage::Summarized,
            CompletionStage::Complete,
        ] {
            done.advance_stage(stage, fixed_now()).unwrap();
        }
        repo.save_session(&done).await.unwrap();
        assert!(matches!(
            repo.save_session(&active).await,
            Err(StorageError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn telemetry_survives_session_saves() {
        let repo = InMemoryRepository::new();
        let session = build_session();
        repo.insert_session(&session).await.unwrap();

        let sample = TelemetrySample {
            timestamp: fixed_now(),
            face_detected: true,
            num_faces: 1,
            emotions: Default::default(),
            simulated: false,
        };
        repo.append_telemetry(session.id(), &sample).await.unwrap();
        repo.save_session(&session).await.unwrap();

        let stored = repo.get_session(session.id()).await.unwrap();
        assert_eq!(stored.telemetry(), &[sample]);
    }

    #[tokio::test]
    async fn telemetry_for_unknown_session_is_not_found() {
        let repo = InMemoryRepository::new();
        let sample = TelemetrySample {
            timestamp: fixed_now(),
            face_detected: false,
            num_faces: 0,
            emotions: Default::default(),
            simulated: true,
        };
        assert!(matches!(
            repo.append_telemetry(SessionId::generate(), &sample).await,
            Err(StorageError::NotFound)
        ));
    }
}
