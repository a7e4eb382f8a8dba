//! Stand-in for face-tracking emotion detection.
//!
//! Every interval there is a 30% chance of "seeing" a random emotion with
//! confidence in [0.5, 1.0). Detections go straight to the avatar's rapport
//! policy.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::avatar::{AvatarEngine, AvatarError, Emotion};

const DETECTION_PROBABILITY: f64 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: &'static str,
    pub confidence: f32,
}

pub struct SimulatedEmotionDetector {
    interval: Duration,
    rng: StdRng,
}

impl SimulatedEmotionDetector {
    pub fn new(interval: Duration, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { interval, rng }
    }

    /// One detection attempt. Most attempts see nothing.
    pub fn sample(&mut self) -> Option<Detection> {
        if !self.rng.gen_bool(DETECTION_PROBABILITY) {
            return None;
        }
        let emotion = Emotion::ALL.choose(&mut self.rng).copied()?;
        let confidence = 0.5 + self.rng.gen::<f32>() * 0.5;
        Some(Detection {
            label: emotion.as_str(),
            confidence,
        })
    }

    /// Feed detections to `engine` until it stops accepting them.
    pub fn spawn(mut self, engine: Arc<AvatarEngine>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(detection) = self.sample() else {
                    continue;
                };
                tracing::debug!(
                    "[Call] Detected user emotion {} ({:.2})",
                    detection.label,
                    detection.confidence
                );
                match engine
                    .react_to_observed_emotion(detection.label, detection.confidence)
                    .await
                {
                    Ok(_) => {}
                    Err(AvatarError::NotInitialized) => break,
                    Err(e) => tracing::warn!("[Call] Emotion reaction failed: {}", e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detections_are_sparse_and_confident() {
        let mut detector = SimulatedEmotionDetector::new(Duration::from_secs(5), Some(17));
        let samples: Vec<_> = (0..2_000).filter_map(|_| detector.sample()).collect();

        let rate = samples.len() as f64 / 2_000.0;
        assert!((0.25..0.35).contains(&rate), "detection rate {}", rate);
        for d in &samples {
            assert!((0.5..1.0).contains(&d.confidence), "confidence {}", d.confidence);
            assert!(d.label.parse::<Emotion>().is_ok());
        }
    }

    #[test]
    fn same_seed_same_detections() {
        let mut a = SimulatedEmotionDetector::new(Duration::from_secs(5), Some(3));
        let mut b = SimulatedEmotionDetector::new(Duration::from_secs(5), Some(3));
        for _ in 0..100 {
            assert_eq!(a.sample(), b.sample());
        }
    }
}
