use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One periodic behavioral observation (face presence and emotion scores).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    pub timestamp: DateTime<Utc>,
    pub face_detected: bool,
    pub num_faces: u32,
    #[serde(default)]
    pub emotions: BTreeMap<String, f32>,
    /// Synthetic placeholder rather than a real sensor reading.
    #[serde(default)]
    pub simulated: bool,
}

/// Aggregate over the real (non-simulated) samples of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehavioralMetrics {
    pub sample_count: u32,
    pub simulated_count: u32,
    pub face_presence_ratio: f32,
    pub multiple_faces_ratio: f32,
    pub mean_emotions: BTreeMap<String, f32>,
    pub dominant_emotion: Option<String>,
}

impl BehavioralMetrics {
    /// Aggregates samples, ignoring simulated ones for every ratio.
    ///
    /// Returns `None` when there are no samples at all.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_samples(samples: &[TelemetrySample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let simulated_count = samples.iter().filter(|s| s.simulated).count();
        let real: Vec<&TelemetrySample> = samples.iter().filter(|s| !s.simulated).collect();

        let mut mean_emotions: BTreeMap<String, f32> = BTreeMap::new();
        let (face_presence_ratio, multiple_faces_ratio) = if real.is_empty() {
            (0.0, 0.0)
        } else {
            let n = real.len() as f32;
            let present = real.iter().filter(|s| s.face_detected).count() as f32;
            let crowded = real.iter().filter(|s| s.num_faces > 1).count() as f32;

            let mut counts: BTreeMap<&str, u32> = BTreeMap::new();
            for sample in &real {
                for (emotion, score) in &sample.emotions {
                    *mean_emotions.entry(emotion.clone()).or_default() += score;
                    *counts.entry(emotion.as_str()).or_default() += 1;
                }
            }
            for (emotion, total) in &mut mean_emotions {
                let seen = counts.get(emotion.as_str()).copied().unwrap_or(1).max(1);
                *total /= seen as f32;
            }
            (present / n, crowded / n)
        };

        let dominant_emotion = mean_emotions
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(emotion, _)| emotion.clone());

        Some(Self {
            sample_count: u32::try_from(real.len()).unwrap_or(u32::MAX),
            simulated_count: u32::try_from(simulated_count).unwrap_or(u32::MAX),
            face_presence_ratio,
            multiple_faces_ratio,
            mean_emotions,
            dominant_emotion,
        })
    }
}
