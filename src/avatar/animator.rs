//! Animator: the deterministic per-tick core of the avatar.
//!
//! Owns the emotion state, the blend-shape frame, idle motion and the RNG.
//! Time is passed in explicitly as the offset from engine start, so a
//! seeded animator replays identically. The engine task is its only owner.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use uuid::Uuid;

use super::blend_shapes::{BlendShape, BlendShapeFrame};
use super::config::{AvatarConfig, DampingMode};
use super::emotion::{Emotion, EmotionState};
use super::idle::IdleMotion;
use super::rapport::{ObservedEmotion, RapportPolicy};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("blend shape {0:?} became non-finite")]
    NonFinite(BlendShape),
}

pub struct Animator {
    emotion: EmotionState,
    frame: BlendShapeFrame,
    idle: IdleMotion,
    rapport: RapportPolicy,
    damping: DampingMode,
    relaxation_rate: f32,
    talking_amplitude: f32,
    default_dt: Duration,
    last_tick: Option<Duration>,
    speaking: Option<Uuid>,
    rng: StdRng,
}

impl Animator {
    pub fn new(config: &AvatarConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            emotion: EmotionState::new(),
            frame: BlendShapeFrame::at_rest(),
            idle: IdleMotion::new(config.animation.clone()),
            rapport: RapportPolicy::new(config.emotion_sensitivity),
            damping: config.damping.clone(),
            relaxation_rate: config.animation.relaxation_rate,
            talking_amplitude: config.animation.talking_amplitude,
            default_dt: config.tick_period(),
            last_tick: None,
            speaking: None,
            rng,
        }
    }

    // ── Emotion ────────────────────────────────────────

    pub fn set_emotion(&mut self, emotion: Emotion, intensity: f32) {
        self.emotion.set_emotion(emotion, intensity);
        tracing::debug!(
            "[Avatar] Emotion updated to {} with intensity {:.2}",
            emotion,
            self.emotion.intensity()
        );
    }

    pub fn set_emotion_label(&mut self, label: &str, intensity: f32) -> Emotion {
        let applied = self.emotion.set_emotion_label(label, intensity);
        tracing::debug!(
            "[Avatar] Emotion updated to {} with intensity {:.2}",
            applied,
            self.emotion.intensity()
        );
        applied
    }

    /// Apply the rapport policy to a user-side observation.
    pub fn react_to_observed_emotion(&mut self, label: &str, confidence: f32) -> Emotion {
        let observed = ObservedEmotion::parse(label);
        let (emotion, intensity) = self.rapport.respond(&observed, confidence);
        self.set_emotion(emotion, intensity);
        emotion
    }

    pub fn emotion(&self) -> &EmotionState {
        &self.emotion
    }

    // ── Speech ─────────────────────────────────────────

    /// Mark `id` as the utterance being voiced.
    pub fn begin_speech(&mut self, id: Uuid) {
        self.speaking = Some(id);
    }

    /// Clear the speaking flag if `id` is still the current utterance.
    ///
    /// Returns false for stale ids, which leave a newer utterance intact.
    pub fn end_speech(&mut self, id: Uuid) -> bool {
        if self.speaking == Some(id) {
            self.speaking = None;
            true
        } else {
            false
        }
    }

    pub fn clear_speech(&mut self) {
        self.speaking = None;
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.is_some()
    }

    // ── Tick ───────────────────────────────────────────

    pub fn frame(&self) -> &BlendShapeFrame {
        &self.frame
    }

    /// Advance one frame to time `now` (offset from engine start).
    ///
    /// Order matters: relax, emotion, speech overlay, idle motion, micro
    /// noise. A frame that ends up non-finite is discarded and the face is
    /// reset to rest.
    pub fn tick(&mut self, now: Duration) -> Result<&BlendShapeFrame, FrameError> {
        self.idle.run_scheduled(&mut self.frame, now);

        let dt = match self.last_tick {
            Some(prev) => now.saturating_sub(prev),
            None => self.default_dt,
        };
        self.last_tick = Some(now);

        let factor = self.damping.factor(self.relaxation_rate, dt);
        self.frame.relax(factor);

        self.frame
            .apply_emotion(self.emotion.current_emotion(), self.emotion.active_score());

        if self.speaking.is_some() {
            let now_ms = now.as_secs_f64() * 1000.0;
            self.frame.apply_speech(now_ms, self.talking_amplitude);
        }

        self.idle.perform(&mut self.frame, now, &mut self.rng);
        self.idle.add_micro_expressions(&mut self.frame, &mut self.rng);

        if let Some(shape) = self.frame.first_non_finite() {
            self.frame = BlendShapeFrame::at_rest();
            return Err(FrameError::NonFinite(shape));
        }
        Ok(&self.frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avatar::config::AnimationParameters;

    fn still_config() -> AvatarConfig {
        AvatarConfig {
            seed: Some(11),
            animation: AnimationParameters::still(),
            ..AvatarConfig::default()
        }
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn surprised_single_tick_widens_eyes_and_opens_jaw() {
        let mut animator = Animator::new(&still_config());
        animator.set_emotion(Emotion::Surprised, 1.0);
        let frame = animator.tick(ms(16)).unwrap();
        assert!(frame[BlendShape::EyeOpen] > 1.0);
        assert!(frame[BlendShape::JawOpen] > 0.0);
    }

    #[test]
    fn displacement_decays_monotonically_without_offsets() {
        let mut animator = Animator::new(&still_config());
        animator.set_emotion(Emotion::Happy, 1.0);
        animator.tick(ms(0)).unwrap();
        animator.set_emotion(Emotion::Neutral, 1.0);

        let mut previous = *animator.frame();
        for i in 1..60 {
            let frame = *animator.tick(ms(i * 16)).unwrap();
            for shape in BlendShape::ALL {
                let before = previous.displacement(shape);
                let after = frame.displacement(shape);
                if before > 0.0 {
                    assert!(after < before, "{:?}: {} -> {}", shape, before, after);
                } else {
                    assert_eq!(after, 0.0);
                }
            }
            previous = frame;
        }
    }

    #[test]
    fn speaking_overlay_runs_after_emotion() {
        let mut animator = Animator::new(&still_config());
        animator.set_emotion(Emotion::Surprised, 1.0);
        animator.begin_speech(Uuid::new_v4());
        // sin(471.24ms * 0.01) ~= -1: overlay contributes its base only.
        let frame = animator.tick(ms(471)).unwrap();
        assert!((frame[BlendShape::JawOpen] - 0.2).abs() < 1e-3);
        assert!((frame[BlendShape::MouthOpen] - 0.3).abs() < 1e-3);
    }

    #[test]
    fn stale_speech_end_is_ignored() {
        let mut animator = Animator::new(&still_config());
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        animator.begin_speech(first);
        animator.begin_speech(second);
        assert!(!animator.end_speech(first));
        assert!(animator.is_speaking());
        assert!(animator.end_speech(second));
        assert!(!animator.is_speaking());
    }

    #[test]
    fn rapport_uses_configured_sensitivity() {
        let mut animator = Animator::new(&still_config());
        let applied = animator.react_to_observed_emotion("sad", 0.8);
        assert_eq!(applied, Emotion::Concerned);
        assert!((animator.emotion().score(Emotion::Concerned) - 0.56).abs() < 1e-5);
        assert_eq!(animator.emotion().score(Emotion::Happy), 0.0);
    }

    #[test]
    fn seeded_animators_replay_identically() {
        let config = AvatarConfig {
            seed: Some(99),
            ..AvatarConfig::default()
        };
        let mut a = Animator::new(&config);
        let mut b = Animator::new(&config);
        for i in 0..120 {
            let fa = *a.tick(ms(i * 16)).unwrap();
            let fb = *b.tick(ms(i * 16)).unwrap();
            assert_eq!(fa, fb);
        }
    }

    #[test]
    fn idle_noise_stays_bounded_over_time() {
        let config = AvatarConfig {
            seed: Some(5),
            ..AvatarConfig::default()
        };
        let mut animator = Animator::new(&config);
        for i in 0..5_000 {
            let frame = animator.tick(ms(i * 16)).unwrap();
            for shape in BlendShape::ALL {
                if shape != BlendShape::EyeOpen {
                    assert!(frame.displacement(shape) < 0.5, "{:?} drifted", shape);
                }
            }
        }
    }

    #[test]
    fn time_scaled_damping_relaxes_by_elapsed_time() {
        let config = AvatarConfig {
            damping: DampingMode::TimeScaled {
                reference_fps: 60.0,
            },
            ..still_config()
        };
        let mut animator = Animator::new(&config);
        animator.set_emotion(Emotion::Happy, 1.0);
        animator.tick(ms(0)).unwrap();
        animator.set_emotion(Emotion::Neutral, 1.0);

        // One tick spanning ~10 reference frames relaxes like ten ticks.
        let frame = animator.tick(ms(167)).unwrap();
        let expected = 0.7 * 0.9f32.powf(0.167 * 60.0);
        assert!(
            (frame[BlendShape::MouthSmile] - expected).abs() < 1e-3,
            "got {}, expected {}",
            frame[BlendShape::MouthSmile],
            expected
        );
    }
}
