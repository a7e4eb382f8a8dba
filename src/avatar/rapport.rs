//! Rapport mirroring: the avatar's reaction to the user's observed emotion.
//!
//! An external detector reports what it believes the user is feeling along
//! with a confidence. The policy below turns that into the avatar's own
//! expression: concern for distress, a mirrored smile for happiness, a
//! thoughtful look for confusion, and a calm neutral face otherwise.

use super::emotion::Emotion;

/// Intensity used when no rule matches.
const FALLBACK_NEUTRAL_INTENSITY: f32 = 0.8;

/// A user-side emotion label as reported by a detector.
///
/// The detector's vocabulary is wider than the avatar's, so anything not
/// listed here is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservedEmotion {
    Sad,
    Angry,
    Fearful,
    Happy,
    Confused,
    Other(String),
}

impl ObservedEmotion {
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "sad" => Self::Sad,
            "angry" => Self::Angry,
            "fearful" => Self::Fearful,
            "happy" => Self::Happy,
            "confused" => Self::Confused,
            other => Self::Other(other.to_string()),
        }
    }

    fn is_distress(&self) -> bool {
        matches!(self, Self::Sad | Self::Angry | Self::Fearful)
    }
}

/// Maps observed user emotions to the avatar's expression.
#[derive(Debug, Clone, Copy)]
pub struct RapportPolicy {
    /// How strongly observed emotions move the avatar, in [0, 1].
    pub sensitivity: f32,
}

impl RapportPolicy {
    pub fn new(sensitivity: f32) -> Self {
        Self {
            sensitivity: sensitivity.clamp(0.0, 1.0),
        }
    }

    /// Decide the avatar's (emotion, intensity) for an observation.
    ///
    /// Rules are checked in order and the first match wins, so distress at
    /// high confidence always yields concern.
    pub fn respond(&self, observed: &ObservedEmotion, confidence: f32) -> (Emotion, f32) {
        let scaled = confidence * self.sensitivity;

        if observed.is_distress() && confidence > 0.6 {
            return (Emotion::Concerned, scaled);
        }
        if *observed == ObservedEmotion::Happy && confidence > 0.5 {
            return (Emotion::Happy, scaled);
        }
        if *observed == ObservedEmotion::Confused && confidence > 0.5 {
            return (Emotion::Thoughtful, scaled);
        }

        (Emotion::Neutral, FALLBACK_NEUTRAL_INTENSITY)
    }
}
