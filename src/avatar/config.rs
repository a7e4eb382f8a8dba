use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::AvatarError;

/// Above this the tick period rounds toward zero.
pub const MAX_FRAME_RATE: f32 = 1000.0;

// ── Animation Parameters ───────────────────────────────

/// Per-avatar animation tunables. Probabilities are per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationParameters {
    pub blink_rate: f32,
    pub blink_duration_ms: u64,
    pub breathing_rate: f32,
    pub breathing_depth: f32,
    pub fidget_rate: f32,
    pub fidget_amount: f32,
    pub talking_amplitude: f32,
    pub micro_rate: f32,
    pub micro_amount: f32,
    /// Fraction of the distance to rest recovered each tick.
    pub relaxation_rate: f32,
}

impl Default for AnimationParameters {
    fn default() -> Self {
        Self {
            blink_rate: 0.1,
            blink_duration_ms: 150,
            breathing_rate: 0.05,
            breathing_depth: 0.01,
            fidget_rate: 0.03,
            fidget_amount: 0.05,
            talking_amplitude: 0.3,
            micro_rate: 0.05,
            micro_amount: 0.02,
            relaxation_rate: 0.1,
        }
    }
}

impl AnimationParameters {
    /// No blinking, fidgeting, breathing or micro noise. Emotion and speech
    /// still animate; useful wherever a frame must be reproducible.
    pub fn still() -> Self {
        Self {
            blink_rate: 0.0,
            breathing_depth: 0.0,
            fidget_rate: 0.0,
            micro_rate: 0.0,
            ..Self::default()
        }
    }

    pub fn blink_duration(&self) -> Duration {
        Duration::from_millis(self.blink_duration_ms)
    }
}

// ── Damping ────────────────────────────────────────────

/// How the relaxation rate is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DampingMode {
    /// Fixed fraction per tick, whatever the tick spacing.
    PerTick,
    /// Relaxation scaled by elapsed time so that the face settles at the
    /// same speed regardless of frame rate. `reference_fps` is the rate at
    /// which this matches `PerTick`.
    TimeScaled { reference_fps: f32 },
}

impl Default for DampingMode {
    fn default() -> Self {
        DampingMode::PerTick
    }
}

impl DampingMode {
    /// Effective relaxation factor for a tick spanning `dt`.
    pub fn factor(&self, rate: f32, dt: Duration) -> f32 {
        match self {
            DampingMode::PerTick => rate,
            DampingMode::TimeScaled { reference_fps } => {
                let ticks = dt.as_secs_f32() * reference_fps;
                1.0 - (1.0 - rate).powf(ticks)
            }
        }
    }
}

// ── Avatar Config ──────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    /// How responsive the avatar is to detected user emotions (0.0-1.0).
    pub emotion_sensitivity: f32,
    /// Default pitch handed to the speech backend.
    pub voice_pitch: f32,
    /// Appearance preset name.
    pub avatar_type: String,
    pub background_color: String,
    /// Tick loop frequency.
    pub frame_rate: f32,
    pub damping: DampingMode,
    /// Fixed RNG seed for reproducible idle motion.
    pub seed: Option<u64>,
    pub animation: AnimationParameters,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            emotion_sensitivity: 0.7,
            voice_pitch: 1.0,
            avatar_type: "professional".to_string(),
            background_color: "#f0f8ff".to_string(),
            frame_rate: 60.0,
            damping: DampingMode::PerTick,
            seed: None,
            animation: AnimationParameters::default(),
        }
    }
}

impl AvatarConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.frame_rate)
    }

    /// Reject configurations the engine cannot animate sensibly.
    pub fn validate(&self) -> Result<(), AvatarError> {
        let a = &self.animation;
        let unit_fields = [
            ("emotion_sensitivity", self.emotion_sensitivity),
            ("blink_rate", a.blink_rate),
            ("fidget_rate", a.fidget_rate),
            ("micro_rate", a.micro_rate),
            ("relaxation_rate", a.relaxation_rate),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(AvatarError::InvalidConfig(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        let finite_fields = [
            ("voice_pitch", self.voice_pitch),
            ("breathing_rate", a.breathing_rate),
            ("breathing_depth", a.breathing_depth),
            ("fidget_amount", a.fidget_amount),
            ("talking_amplitude", a.talking_amplitude),
            ("micro_amount", a.micro_amount),
        ];
        for (name, value) in finite_fields {
            if !value.is_finite() {
                return Err(AvatarError::InvalidConfig(format!(
                    "{} must be finite",
                    name
                )));
            }
        }

        if !(self.frame_rate > 0.0 && self.frame_rate <= MAX_FRAME_RATE) {
            return Err(AvatarError::InvalidConfig(format!(
                "frame_rate must be within (0, {}], got {}",
                MAX_FRAME_RATE,
                self.frame_rate
            )));
        }
        if let DampingMode::TimeScaled { reference_fps } = self.damping {
            if !(reference_fps.is_finite() && reference_fps > 0.0) {
                return Err(AvatarError::InvalidConfig(
                    "damping.reference_fps must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(AvatarConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_sensitivity() {
        let config = AvatarConfig {
            emotion_sensitivity: 1.5,
            ..AvatarConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("emotion_sensitivity"));
    }

    #[test]
    fn rejects_zero_frame_rate() {
        let config = AvatarConfig {
            frame_rate: 0.0,
            ..AvatarConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_frame_rates_too_fast_to_tick() {
        for frame_rate in [1e12, f32::INFINITY, f32::NAN, MAX_FRAME_RATE + 1.0] {
            let config = AvatarConfig {
                frame_rate,
                ..AvatarConfig::default()
            };
            assert!(config.validate().is_err(), "frame_rate {} accepted", frame_rate);
        }

        let fastest = AvatarConfig {
            frame_rate: MAX_FRAME_RATE,
            ..AvatarConfig::default()
        };
        assert!(fastest.validate().is_ok());
        assert!(fastest.tick_period() > Duration::ZERO);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: AvatarConfig =
            serde_json::from_str(r#"{"emotion_sensitivity": 0.5, "animation": {"blink_rate": 0.2}}"#)
                .unwrap();
        assert_eq!(config.emotion_sensitivity, 0.5);
        assert_eq!(config.animation.blink_rate, 0.2);
        assert_eq!(config.animation.blink_duration_ms, 150);
        assert_eq!(config.damping, DampingMode::PerTick);
    }

    #[test]
    fn time_scaled_damping_matches_per_tick_at_reference_rate() {
        let mode = DampingMode::TimeScaled {
            reference_fps: 60.0,
        };
        let f = mode.factor(0.1, Duration::from_secs_f32(1.0 / 60.0));
        assert!((f - 0.1).abs() < 1e-4, "got {}", f);

        // Two reference frames' worth of time relaxes like two ticks.
        let f2 = mode.factor(0.1, Duration::from_secs_f32(2.0 / 60.0));
        assert!((f2 - 0.19).abs() < 1e-4, "got {}", f2);
    }

    #[test]
    fn damping_mode_json_shape() {
        let mode: DampingMode =
            serde_json::from_str(r#"{"mode": "time_scaled", "reference_fps": 30.0}"#).unwrap();
        assert_eq!(
            mode,
            DampingMode::TimeScaled {
                reference_fps: 30.0
            }
        );
    }
}
