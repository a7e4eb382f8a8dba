//! Avatar emotion state.
//!
//! The avatar expresses exactly one emotion at a time. Its score map is a
//! one-hot vector: the current emotion's score equals the intensity and
//! every other entry is zero. Updates go through [`EmotionState::set_emotion`]
//! only, so the invariant cannot be broken from outside.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── Emotion ────────────────────────────────────────────────

/// The closed set of expressions the avatar can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Neutral,
    Happy,
    Sad,
    Surprised,
    Concerned,
    Thoughtful,
}

const EMOTION_COUNT: usize = 6;

impl Emotion {
    pub const ALL: [Emotion; EMOTION_COUNT] = [
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Surprised,
        Emotion::Concerned,
        Emotion::Thoughtful,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Surprised => "surprised",
            Emotion::Concerned => "concerned",
            Emotion::Thoughtful => "thoughtful",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a label is not one of the six avatar emotions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown emotion: {0}")]
pub struct UnknownEmotion(pub String);

impl FromStr for Emotion {
    type Err = UnknownEmotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Emotion::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| UnknownEmotion(s.to_string()))
    }
}

// ── Emotion State ──────────────────────────────────────────

/// Tracks the avatar's current expression and its intensity.
#[derive(Debug, Clone)]
pub struct EmotionState {
    current_emotion: Emotion,
    intensity: f32,
    scores: [f32; EMOTION_COUNT],
}

impl Default for EmotionState {
    fn default() -> Self {
        Self::new()
    }
}

impl EmotionState {
    pub fn new() -> Self {
        let mut state = Self {
            current_emotion: Emotion::Neutral,
            intensity: 0.0,
            scores: [0.0; EMOTION_COUNT],
        };
        state.set_emotion(Emotion::Neutral, 1.0);
        state
    }

    /// Switch to `emotion` at the given intensity (clamped to [0, 1]).
    ///
    /// All other scores are reset, so repeated calls with the same
    /// arguments leave the state unchanged.
    pub fn set_emotion(&mut self, emotion: Emotion, intensity: f32) {
        let intensity = clamp_unit(intensity);
        self.scores = [0.0; EMOTION_COUNT];
        self.scores[emotion.index()] = intensity;
        self.current_emotion = emotion;
        self.intensity = intensity;
    }

    /// Label-based variant of [`set_emotion`](Self::set_emotion).
    ///
    /// Unknown labels fall back to neutral with a warning. Returns the
    /// emotion that was actually applied.
    pub fn set_emotion_label(&mut self, label: &str, intensity: f32) -> Emotion {
        let emotion = match label.parse::<Emotion>() {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("[Avatar] {}, defaulting to neutral", e);
                Emotion::Neutral
            }
        };
        self.set_emotion(emotion, intensity);
        emotion
    }

    pub fn current_emotion(&self) -> Emotion {
        self.current_emotion
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn score(&self, emotion: Emotion) -> f32 {
        self.scores[emotion.index()]
    }

    /// Score of the emotion currently being expressed.
    pub fn active_score(&self) -> f32 {
        self.score(self.current_emotion)
    }

    pub fn snapshot(&self) -> EmotionSnapshot {
        EmotionSnapshot {
            emotion: self.current_emotion,
            intensity: self.intensity,
            scores: Emotion::ALL
                .iter()
                .map(|e| (*e, self.score(*e)))
                .collect(),
        }
    }
}

/// Clamp to [0, 1]; NaN counts as 0.
fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Serializable view of the emotion state for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSnapshot {
    pub emotion: Emotion,
    pub intensity: f32,
    pub scores: Vec<(Emotion, f32)>,
}

// ── Tests ──────────────────────────────────────────────────
