//! Speech backend contract and the timing fallback.
//!
//! The engine never synthesizes audio itself. It hands text to a
//! [`SpeechBackend`] and waits for completion. When no backend can speak,
//! the utterance is timed from its word count instead, so the lip
//! animation still runs for a plausible duration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::emotion::Emotion;

/// Average speaking rate used to time utterances without a backend.
pub const WORDS_PER_MINUTE: f64 = 200.0;

// ── Error Types ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpeechError {
    /// No synthesis facility; the caller should fall back to timing.
    #[error("speech backend unavailable: {0}")]
    Unavailable(String),
    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),
}

// ── Parameters ─────────────────────────────────────────

/// Options for one `speak` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakOptions {
    /// Expression to switch to (at full intensity) before speaking.
    /// `None` keeps the current expression.
    pub emotion: Option<Emotion>,
    pub rate: f32,
    /// `None` uses the avatar's configured voice pitch.
    pub pitch: Option<f32>,
    pub volume: f32,
}

impl Default for SpeakOptions {
    fn default() -> Self {
        Self {
            emotion: None,
            rate: 1.0,
            pitch: None,
            volume: 1.0,
        }
    }
}

impl SpeakOptions {
    pub fn with_emotion(mut self, emotion: Emotion) -> Self {
        self.emotion = Some(emotion);
        self
    }

    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = rate;
        self
    }
}

/// Resolved parameters handed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeechParams {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// How a `speak` call ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpeechOutcome {
    /// The backend reported completion.
    Spoken,
    /// No backend was available; the estimated duration elapsed.
    Estimated(Duration),
    /// Interrupted by `cancel_speech` or shutdown.
    Cancelled,
}

/// Speaking time for `text` at [`WORDS_PER_MINUTE`].
pub fn estimate_speaking_duration(text: &str) -> Duration {
    let words = text.split_whitespace().count() as f64;
    Duration::from_secs_f64(words / WORDS_PER_MINUTE * 60.0)
}

// ── Backend Trait ──────────────────────────────────────

#[async_trait]
pub trait SpeechBackend: Send + Sync {
    fn id(&self) -> String;

    /// Whether synthesis is currently possible.
    async fn is_available(&self) -> bool;

    /// Speak `text`, resolving when playback has finished.
    async fn speak(&self, text: &str, params: SpeechParams) -> Result<(), SpeechError>;

    /// Stop any playback in progress. Default does nothing.
    async fn cancel(&self) {}
}

/// A backend that never speaks, forcing the timer fallback.
///
/// Stands in for hosts without a synthesis facility.
pub struct SilentSpeechBackend;

#[async_trait]
impl SpeechBackend for SilentSpeechBackend {
    fn id(&self) -> String {
        "silent".to_string()
    }

    async fn is_available(&self) -> bool {
        false
    }

    async fn speak(&self, _text: &str, _params: SpeechParams) -> Result<(), SpeechError> {
        Err(SpeechError::Unavailable("no synthesis facility".to_string()))
    }
}
