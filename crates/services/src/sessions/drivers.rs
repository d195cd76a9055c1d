use std::future::Future;
use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use interview_core::TimerSignal;
use interview_core::model::SessionId;

use super::completion::CompletionPipeline;
use super::registry::SessionSlot;
use crate::Clock;
use crate::telemetry::{SampleSource, TelemetryCollector};

/// A spawned periodic task, aborted when stopped or dropped.
#[derive(Debug)]
pub struct BackgroundTask {
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Run `tick` every `period` until it breaks or the task is stopped.
    ///
    /// The first tick fires one full period after spawning.
    pub fn spawn_periodic<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                interval.tick().await;
                if tick().await.is_break() {
                    break;
                }
            }
        });
        Self { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Countdown driver: ticks the session timer and, on expiry, finalizes the session.
pub(crate) fn spawn_timer_driver(
    slot: Weak<SessionSlot>,
    pipeline: Arc<CompletionPipeline>,
    period: Duration,
    auto_submit: bool,
) -> BackgroundTask {
    BackgroundTask::spawn_periodic(period, move || {
        let slot = slot.clone();
        let pipeline = Arc::clone(&pipeline);
        async move {
            let Some(slot) = slot.upgrade() else {
                return ControlFlow::Break(());
            };
            let mut active = slot.lock().await;
            if active.session.is_completed() {
                active.timer.stop();
                return ControlFlow::Break(());
            }
            if active.timer.tick() != Some(TimerSignal::Expired) {
                return ControlFlow::Continue(());
            }

            let id = active.id();
            tracing::info!(session_id = %id, "session timer expired");
            if !auto_submit {
                return ControlFlow::Continue(());
            }
            match pipeline.run(&mut active).await {
                Ok(stage) => {
                    tracing::info!(session_id = %id, stage = %stage, "auto-submitted on expiry");
                    drop(active);
                    slot.stop_drivers();
                }
                Err(err) => {
                    active.timer.stop();
                    tracing::warn!(
                        session_id = %id,
                        error = %err,
                        "auto-submit failed; session stays at its last stage"
                    );
                }
            }
            ControlFlow::Break(())
        }
    })
}

/// Synthetic telemetry driver for sessions without a camera feed.
pub(crate) fn spawn_telemetry_driver(
    id: SessionId,
    slot: Weak<SessionSlot>,
    collector: Arc<TelemetryCollector>,
    mut source: Box<dyn SampleSource>,
    clock: Clock,
    period: Duration,
) -> BackgroundTask {
    BackgroundTask::spawn_periodic(period, move || {
        let alive = slot.strong_count() > 0;
        let sample = source.next_sample(clock.now());
        let collector = Arc::clone(&collector);
        async move {
            if !alive {
                return ControlFlow::Break(());
            }
            collector.push_scheduled(id, sample).await;
            ControlFlow::Continue(())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use interview_core::model::{OwnerId, RoundDraft, Session, SessionMode, TelemetrySample};
    use interview_core::time::fixed_now;
    use storage::repository::StorageError;

    use crate::sessions::ActiveSession;
    use crate::telemetry::{SimulatedSource, TelemetryCapability, TelemetrySink};

    #[derive(Default)]
    struct CountingSink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TelemetrySink for CountingSink {
        async fn send(&self, _id: SessionId, _sample: &TelemetrySample) -> Result<(), StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn slot() -> Arc<SessionSlot> {
        let session = Session::new(
            SessionId::generate(),
            OwnerId::anonymous(),
            SessionMode::Exam {
                exam_type: "Logic".into(),
            },
            vec![RoundDraft {
                name: "Logic".into(),
                category: Default::default(),
                duration_minutes: 30,
                description: String::new(),
                questions: vec!["A?".into()],
            }],
            fixed_now(),
        )
        .unwrap();
        Arc::new(SessionSlot::new(ActiveSession::new(session)))
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_task_runs_until_break() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let task = BackgroundTask::spawn_periodic(Duration::from_secs(1), move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        });

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_cancels_the_task() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let task = BackgroundTask::spawn_periodic(Duration::from_secs(1), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                ControlFlow::Continue(())
            }
        });

        tokio::time::sleep(Duration::from_millis(2500)).await;
        drop(task);
        let seen = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
        assert_eq!(seen, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn every_simulated_tick_is_delivered() {
        let sink = Arc::new(CountingSink::default());
        let period = Duration::from_secs(5);
        // Wall clock barely moves while tokio time is paused, so every tick
        // lands well inside the interval the collector would rate limit.
        let collector = Arc::new(TelemetryCollector::new(
            Clock::System,
            sink.clone(),
            period,
            TelemetryCapability::SimulatedFallback,
        ));
        let slot = slot();
        let id = slot.lock().await.id();

        let task = spawn_telemetry_driver(
            id,
            Arc::downgrade(&slot),
            collector,
            Box::new(SimulatedSource::seeded(7)),
            Clock::System,
            period,
        );
        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(sink.calls.load(Ordering::SeqCst), 4);

        drop(slot);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(task.is_finished());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 4);
    }
}
