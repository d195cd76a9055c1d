use serde::Serialize;

use interview_core::model::{CompletionStage, Session, SessionId};
use interview_core::{AnswerIndexer, Clock, ProgressCalculator, ProgressSnapshot, TimerService};

/// Everything the session actor owns while a session is live.
///
/// The indexer is built once from the round sizes, which never change.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub(crate) session: Session,
    pub(crate) indexer: AnswerIndexer,
    pub(crate) timer: TimerService,
    pub(crate) submitting: bool,
}

impl ActiveSession {
    /// Wrap a freshly created session and start its countdown.
    #[must_use]
    pub fn new(session: Session) -> Self {
        let indexer = session.indexer();
        let mut timer = TimerService::from_minutes(session.total_duration_minutes());
        if !session.is_completed() {
            timer.start();
        }
        Self {
            session,
            indexer,
            timer,
            submitting: false,
        }
    }

    /// Rehydrate a stored session, charging the time elapsed since it was created.
    #[must_use]
    pub fn resume(session: Session, clock: &Clock) -> Self {
        let indexer = session.indexer();
        let initial = i64::from(session.total_duration_minutes()) * 60;
        let elapsed = i64::from(clock.seconds_since(session.created_at()));
        let mut timer = TimerService::resumed(initial, elapsed);
        if !session.is_completed() {
            timer.start();
        }
        Self {
            session,
            indexer,
            timer,
            submitting: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.session.id()
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn indexer(&self) -> &AnswerIndexer {
        &self.indexer
    }

    #[must_use]
    pub fn timer(&self) -> &TimerService {
        &self.timer
    }

    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    #[must_use]
    pub fn progress(&self) -> ProgressCalculator<'_> {
        ProgressCalculator::new(&self.session, &self.indexer)
    }

    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView {
            session_id: self.session.id(),
            stage: self.session.stage(),
            is_completed: self.session.is_completed(),
            submitting: self.submitting,
            progress: self.progress().snapshot(),
            timer: TimerView {
                remaining_seconds: self.timer.remaining(),
                display: self.timer.format(),
                running: self.timer.is_running(),
                expired: self.timer.is_expired(),
            },
        }
    }
}

/// Progress plus timer state, as served to clients polling a live session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: SessionId,
    pub stage: CompletionStage,
    pub is_completed: bool,
    pub submitting: bool,
    #[serde(flatten)]
    pub progress: ProgressSnapshot,
    pub timer: TimerView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerView {
    pub remaining_seconds: i64,
    pub display: String,
    pub running: bool,
    pub expired: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use interview_core::model::{OwnerId, RoundDraft, SessionMode};
    use interview_core::time::fixed_now;

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
                duration_minutes: 2,
                description: String::new(),
                questions: vec!["A?".into(), "B?".into()],
            }],
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn new_session_counts_down_full_duration() {
        let active = ActiveSession::new(session());
        assert!(active.timer().is_running());
        assert_eq!(active.view().timer.display, "02:00");
        assert_eq!(active.view().progress.total, 2);
    }

    #[test]
    fn resume_charges_elapsed_time() {
        let mut clock = Clock::fixed(fixed_now());
        clock.advance(Duration::seconds(90));
        let active = ActiveSession::resume(session(), &clock);
        assert_eq!(active.timer().remaining(), 30);
        assert_eq!(active.timer().elapsed(), 90);
    }
}
