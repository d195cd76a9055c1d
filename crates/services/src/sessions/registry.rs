use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{Mutex, MutexGuard, RwLock};

use interview_core::model::{Session, SessionId};
use storage::repository::{SessionRepository, StorageError};

use super::active::ActiveSession;
use super::drivers::BackgroundTask;
use crate::Clock;

/// One live session: its state behind an async mutex plus its background drivers.
///
/// Every request for the session serializes on the state mutex.
#[derive(Debug)]
pub struct SessionSlot {
    state: Mutex<ActiveSession>,
    drivers: StdMutex<SessionDrivers>,
}

#[derive(Debug, Default)]
pub(crate) struct SessionDrivers {
    timer: Option<BackgroundTask>,
    telemetry: Option<BackgroundTask>,
    started: bool,
}

impl SessionDrivers {
    pub(crate) fn new(timer: Option<BackgroundTask>, telemetry: Option<BackgroundTask>) -> Self {
        Self {
            timer,
            telemetry,
            started: true,
        }
    }
}

impl SessionSlot {
    #[must_use]
    pub fn new(active: ActiveSession) -> Self {
        Self {
            state: Mutex::new(active),
            drivers: StdMutex::new(SessionDrivers::default()),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, ActiveSession> {
        self.state.lock().await
    }

    /// Install drivers built by `spawn`, unless drivers were started before.
    pub(crate) fn start_drivers_once(&self, spawn: impl FnOnce() -> SessionDrivers) {
        let mut drivers = self.drivers.lock().unwrap_or_else(PoisonError::into_inner);
        if drivers.started {
            return;
        }
        *drivers = spawn();
        drivers.started = true;
    }

    /// Cancel the timer and telemetry drivers. They are not restarted.
    pub fn stop_drivers(&self) {
        let mut drivers = self.drivers.lock().unwrap_or_else(PoisonError::into_inner);
        drivers.timer.take();
        drivers.telemetry.take();
        drivers.started = true;
    }

    #[must_use]
    pub fn drivers_running(&self) -> bool {
        let drivers = self.drivers.lock().unwrap_or_else(PoisonError::into_inner);
        drivers.timer.as_ref().is_some_and(|t| !t.is_finished())
            || drivers.telemetry.as_ref().is_some_and(|t| !t.is_finished())
    }
}

/// Live sessions keyed by id, loaded from the store on first use.
pub struct SessionRegistry {
    clock: Clock,
    store: Arc<dyn SessionRepository>,
    slots: RwLock<HashMap<SessionId, Arc<SessionSlot>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(clock: Clock, store: Arc<dyn SessionRepository>) -> Self {
        Self {
            clock,
            store,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session that was just created.
    pub async fn insert(&self, session: Session) -> Arc<SessionSlot> {
        let id = session.id();
        let slot = Arc::new(SessionSlot::new(ActiveSession::new(session)));
        self.slots.write().await.insert(id, Arc::clone(&slot));
        slot
    }

    /// The live slot for `id`, rehydrating it from the store if needed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for unknown sessions.
    pub async fn get(&self, id: SessionId) -> Result<Arc<SessionSlot>, StorageError> {
        if let Some(slot) = self.slots.read().await.get(&id) {
            return Ok(Arc::clone(slot));
        }

        let session = self.store.get_session(id).await?;
        let mut slots = self.slots.write().await;
        let slot = slots.entry(id).or_insert_with(|| {
            tracing::debug!(session_id = %id, "session rehydrated from store");
            Arc::new(SessionSlot::new(ActiveSession::resume(session, &self.clock)))
        });
        Ok(Arc::clone(slot))
    }

    /// Drop the live slot, stopping its drivers.
    pub async fn remove(&self, id: SessionId) -> Option<Arc<SessionSlot>> {
        let slot = self.slots.write().await.remove(&id)?;
        slot.stop_drivers();
        Some(slot)
    }

    /// Drop every idle slot whose session has completed and return their ids.
    ///
    /// Slots whose lock is held are skipped; a later sweep picks them up.
    pub async fn evict_completed(&self) -> Vec<SessionId> {
        let mut slots = self.slots.write().await;
        let finished: Vec<SessionId> = slots
            .iter()
            .filter(|(_, slot)| {
                slot.state
                    .try_lock()
                    .is_ok_and(|active| active.session().is_completed())
            })
            .map(|(id, _)| *id)
            .collect();
        for id in &finished {
            if let Some(slot) = slots.remove(id) {
                slot.stop_drivers();
            }
        }
        if !finished.is_empty() {
            tracing::debug!(evicted = finished.len(), "completed sessions evicted");
        }
        finished
    }

    pub async fn contains(&self, id: SessionId) -> bool {
        self.slots.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interview_core::model::{CompletionStage, OwnerId, RoundDraft, SessionMode};
    use interview_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    fn session() -> Session {
        Session::new(
            SessionId::generate(),
            OwnerId::anonymous(),
            SessionMode::Exam {
                exam_type: "Logic".into(),
            },
            vec![RoundDraft {
                name: "Logic".into(),
                category: Default::default(),
                duration_minutes: 1,
                description: String::new(),
                questions: vec!["A?".into()],
            }],
            fixed_now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn rehydrates_stored_sessions_once() {
        let repo = Arc::new(InMemoryRepository::new());
        let stored = session();
        repo.insert_session(&stored).await.unwrap();
        let registry = SessionRegistry::new(Clock::fixed(fixed_now()), repo);

        let first = registry.get(stored.id()).await.unwrap();
        let second = registry.get(stored.id()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.lock().await.session(), &stored);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_sessions_are_not_found() {
        let registry = SessionRegistry::new(Clock::default(), Arc::new(InMemoryRepository::new()));
        assert!(matches!(
            registry.get(SessionId::generate()).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn removal_forgets_the_slot() {
        let registry = SessionRegistry::new(Clock::default(), Arc::new(InMemoryRepository::new()));
        let session = session();
        let id = session.id();
        registry.insert(session).await;
        assert!(registry.contains(id).await);
        assert!(registry.remove(id).await.is_some());
        assert!(registry.is_empty().await);
        assert!(registry.remove(id).await.is_none());
    }

    fn completed() -> Session {
        let mut done = session();
        for stage in [
            CompletionStage::AnswersSubmitted,
            CompletionStage::Evaluated,
            CompletionStage::Summarized,
            CompletionStage::Complete,
        ] {
            done.advance_stage(stage, fixed_now()).unwrap();
        }
        done
    }

    #[tokio::test]
    async fn sweep_evicts_only_completed_idle_slots() {
        let registry = SessionRegistry::new(Clock::default(), Arc::new(InMemoryRepository::new()));
        let open = session();
        let done = completed();
        let busy = completed();
        let (open_id, done_id, busy_id) = (open.id(), done.id(), busy.id());
        registry.insert(open).await;
        registry.insert(done).await;
        let busy_slot = registry.insert(busy).await;

        let guard = busy_slot.lock().await;
        assert_eq!(registry.evict_completed().await, vec![done_id]);
        assert!(registry.contains(open_id).await);
        assert!(!registry.contains(done_id).await);
        assert!(registry.contains(busy_id).await);
        drop(guard);

        assert_eq!(registry.evict_completed().await, vec![busy_id]);
        assert_eq!(registry.len().await, 1);
    }
}
