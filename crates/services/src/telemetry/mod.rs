//! Behavioral telemetry: rate-limited, fire-and-forget sample pushes.

mod source;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use interview_core::model::{SessionId, TelemetrySample};
use storage::repository::{SessionRepository, StorageError};

use crate::Clock;

pub use source::{SampleSource, SimulatedSource};

/// Where accepted samples go.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` when the sample could not be delivered.
    async fn send(&self, id: SessionId, sample: &TelemetrySample) -> Result<(), StorageError>;
}

/// Appends samples beside the session in the authoritative store.
#[derive(Clone)]
pub struct RepositorySink {
    store: Arc<dyn SessionRepository>,
}

impl RepositorySink {
    #[must_use]
    pub fn new(store: Arc<dyn SessionRepository>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TelemetrySink for RepositorySink {
    async fn send(&self, id: SessionId, sample: &TelemetrySample) -> Result<(), StorageError> {
        self.store.append_telemetry(id, sample).await
    }
}

/// Whether the collector may fill gaps with synthetic samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TelemetryCapability {
    /// Only real sensor samples are accepted.
    #[default]
    SensorOnly,
    /// Synthetic samples are accepted and flagged `simulated`.
    SimulatedFallback,
}

/// What happened to a pushed sample. Never an error for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Sent,
    /// Dropped locally: another sample for the session was sent too recently.
    RateLimited,
    /// Synthetic sample dropped because simulation is off or real data is flowing.
    Suppressed,
    /// Delivery failed; logged and swallowed.
    Failed,
}

/// Share of the interval a sample may arrive early and still be admitted.
const JITTER_TOLERANCE_DIVISOR: i32 = 10;

/// Per-session minimum spacing between accepted samples.
///
/// A sample arriving up to a tenth of the interval early is admitted, so a
/// sender ticking at exactly the interval is not dropped by clock jitter.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: chrono::Duration,
    tolerance: chrono::Duration,
    last_sent: Mutex<HashMap<SessionId, DateTime<Utc>>>,
    last_real: Mutex<HashMap<SessionId, DateTime<Utc>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        let min_interval =
            chrono::Duration::from_std(min_interval).unwrap_or_else(|_| chrono::Duration::seconds(5));
        Self {
            min_interval,
            tolerance: min_interval / JITTER_TOLERANCE_DIVISOR,
            last_sent: Mutex::new(HashMap::new()),
            last_real: Mutex::new(HashMap::new()),
        }
    }

    /// Claims the slot for `id` at `now` unless the previous one is too recent.
    pub fn admit(&self, id: SessionId, now: DateTime<Utc>, real: bool) -> bool {
        let mut last_sent = self.last_sent.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = last_sent.get(&id) {
            if now - *prev < self.min_interval - self.tolerance {
                return false;
            }
        }
        last_sent.insert(id, now);
        if real {
            self.last_real
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id, now);
        }
        true
    }

    /// True while real samples for `id` arrived within two intervals of `now`.
    #[must_use]
    pub fn real_data_flowing(&self, id: SessionId, now: DateTime<Utc>) -> bool {
        self.last_real
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .is_some_and(|prev| now - *prev < self.min_interval * 2)
    }

    pub fn forget(&self, id: SessionId) {
        self.last_sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        self.last_real
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

/// Accepts samples for any session and forwards them to the sink.
pub struct TelemetryCollector {
    clock: Clock,
    sink: Arc<dyn TelemetrySink>,
    limiter: RateLimiter,
    capability: TelemetryCapability,
}

impl TelemetryCollector {
    #[must_use]
    pub fn new(
        clock: Clock,
        sink: Arc<dyn TelemetrySink>,
        min_interval: Duration,
        capability: TelemetryCapability,
    ) -> Self {
        Self {
            clock,
            sink,
            limiter: RateLimiter::new(min_interval),
            capability,
        }
    }

    #[must_use]
    pub fn capability(&self) -> TelemetryCapability {
        self.capability
    }

    #[must_use]
    pub fn simulates(&self) -> bool {
        self.capability == TelemetryCapability::SimulatedFallback
    }

    /// Push one sample. Failures are logged and swallowed.
    pub async fn push_sample(&self, id: SessionId, sample: TelemetrySample) -> PushOutcome {
        let now = self.clock.now();
        if self.suppressed(id, &sample, now) {
            return PushOutcome::Suppressed;
        }
        if !self.limiter.admit(id, now, !sample.simulated) {
            tracing::trace!(session_id = %id, "telemetry sample rate limited");
            return PushOutcome::RateLimited;
        }
        self.deliver(id, &sample).await
    }

    /// Push a sample from a driver already paced at the collector's interval.
    ///
    /// Skips the rate limiter but still honors suppression of synthetic samples.
    pub async fn push_scheduled(&self, id: SessionId, sample: TelemetrySample) -> PushOutcome {
        if self.suppressed(id, &sample, self.clock.now()) {
            return PushOutcome::Suppressed;
        }
        self.deliver(id, &sample).await
    }

    fn suppressed(&self, id: SessionId, sample: &TelemetrySample, now: DateTime<Utc>) -> bool {
        sample.simulated && (!self.simulates() || self.limiter.real_data_flowing(id, now))
    }

    async fn deliver(&self, id: SessionId, sample: &TelemetrySample) -> PushOutcome {
        match self.sink.send(id, sample).await {
            Ok(()) => PushOutcome::Sent,
            Err(err) => {
                tracing::warn!(session_id = %id, error = %err, "telemetry push failed");
                PushOutcome::Failed
            }
        }
    }

    /// Drop rate-limit bookkeeping for a session that ended.
    pub fn forget(&self, id: SessionId) {
        self.limiter.forget(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interview_core::time::fixed_now;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingSink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TelemetrySink for FailingSink {
        async fn send(&self, _id: SessionId, _sample: &TelemetrySample) -> Result<(), StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Connection("offline".into()))
        }
    }

    fn sample(simulated: bool) -> TelemetrySample {
        TelemetrySample {
            timestamp: fixed_now(),
            face_detected: true,
            num_faces: 1,
            emotions: BTreeMap::new(),
            simulated,
        }
    }

    #[test]
    fn limiter_spaces_samples_per_session() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let a = SessionId::generate();
        let b = SessionId::generate();
        let t0 = fixed_now();

        assert!(limiter.admit(a, t0, true));
        assert!(!limiter.admit(a, t0 + chrono::Duration::seconds(4), true));
        assert!(limiter.admit(b, t0 + chrono::Duration::seconds(1), true));
        assert!(limiter.admit(a, t0 + chrono::Duration::seconds(5), true));
    }

    #[test]
    fn limiter_tolerates_tick_jitter() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let id = SessionId::generate();
        let t0 = fixed_now();

        assert!(limiter.admit(id, t0, false));
        let early = t0 + chrono::Duration::milliseconds(4_990);
        assert!(limiter.admit(id, early, false));
        let too_early = early + chrono::Duration::milliseconds(4_400);
        assert!(!limiter.admit(id, too_early, false));
    }

    #[test]
    fn real_samples_shadow_simulation_for_two_intervals() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let id = SessionId::generate();
        let t0 = fixed_now();
        assert!(!limiter.real_data_flowing(id, t0));
        limiter.admit(id, t0, true);
        assert!(limiter.real_data_flowing(id, t0 + chrono::Duration::seconds(9)));
        assert!(!limiter.real_data_flowing(id, t0 + chrono::Duration::seconds(10)));
    }

    #[tokio::test]
    async fn failures_are_swallowed_and_oversampling_dropped() {
        let sink = Arc::new(FailingSink {
            calls: AtomicUsize::new(0),
        });
        let collector = TelemetryCollector::new(
            Clock::fixed(fixed_now()),
            sink.clone(),
            Duration::from_secs(5),
            TelemetryCapability::SensorOnly,
        );
        let id = SessionId::generate();

        assert_eq!(collector.push_sample(id, sample(false)).await, PushOutcome::Failed);
        assert_eq!(
            collector.push_sample(id, sample(false)).await,
            PushOutcome::RateLimited
        );
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn synthetic_samples_need_the_capability() {
        let sink = Arc::new(FailingSink {
            calls: AtomicUsize::new(0),
        });
        let collector = TelemetryCollector::new(
            Clock::fixed(fixed_now()),
            sink.clone(),
            Duration::from_secs(5),
            TelemetryCapability::SensorOnly,
        );
        assert_eq!(
            collector
                .push_sample(SessionId::generate(), sample(true))
                .await,
            PushOutcome::Suppressed
        );
        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

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

    #[tokio::test]
    async fn scheduled_samples_bypass_the_limiter() {
        let sink = Arc::new(CountingSink {
            calls: AtomicUsize::new(0),
        });
        let collector = TelemetryCollector::new(
            Clock::fixed(fixed_now()),
            sink.clone(),
            Duration::from_secs(5),
            TelemetryCapability::SimulatedFallback,
        );
        let id = SessionId::generate();

        for _ in 0..3 {
            assert_eq!(collector.push_scheduled(id, sample(true)).await, PushOutcome::Sent);
        }
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);

        assert_eq!(collector.push_sample(id, sample(false)).await, PushOutcome::Sent);
        assert_eq!(
            collector.push_scheduled(id, sample(true)).await,
            PushOutcome::Suppressed
        );
        assert_eq!(sink.calls.load(Ordering::SeqCst), 4);
    }
}
