use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use interview_core::model::TelemetrySample;

const EMOTIONS: &[&str] = &["neutral", "happy", "surprised", "sad", "angry", "fearful"];

/// Produces samples for the periodic telemetry driver.
pub trait SampleSource: Send {
    fn next_sample(&mut self, now: DateTime<Utc>) -> TelemetrySample;
}

/// Placeholder readings for deployments without a camera pipeline.
///
/// Every sample is flagged `simulated` so aggregates can ignore it.
pub struct SimulatedSource {
    rng: StdRng,
}

impl SimulatedSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for SimulatedSource {
    fn next_sample(&mut self, now: DateTime<Utc>) -> TelemetrySample {
        let face_detected = self.rng.random_bool(0.9);
        let num_faces = if face_detected {
            if self.rng.random_bool(0.05) { 2 } else { 1 }
        } else {
            0
        };

        let mut emotions = BTreeMap::new();
        if face_detected {
            let weights: Vec<f32> = EMOTIONS
                .iter()
                .map(|_| self.rng.random_range(0.0_f32..1.0))
                .collect();
            let total: f32 = weights.iter().sum::<f32>().max(f32::EPSILON);
            for (emotion, weight) in EMOTIONS.iter().zip(weights) {
                emotions.insert((*emotion).to_owned(), weight / total);
            }
        }

        TelemetrySample {
            timestamp: now,
            face_detected,
            num_faces,
            emotions,
            simulated: true,
        }
    }
}
