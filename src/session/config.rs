use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_GREETING: &str =
    "Hello, I'm your AI therapy assistant. How are you feeling today?";
pub const DEFAULT_FAREWELL: &str = "Thank you for the session today. I hope you found it helpful. Take care and I look forward to our next conversation.";

// ── Session Config ─────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_session_id")]
    pub session_id: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Extra attempts for failed requests. 0 means a single attempt.
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_greeting")]
    pub greeting: String,
    #[serde(default = "default_farewell")]
    pub farewell: String,
    /// How long a still portrait "talks" for greetings and canned replies.
    #[serde(default = "default_still_greeting_ms")]
    pub still_greeting_ms: u64,
    /// Speech rate for everything the therapist says during a call.
    #[serde(default = "default_speech_rate")]
    pub speech_rate: f32,
    /// Feed randomly generated user emotions to the avatar while a call runs.
    #[serde(default)]
    pub simulate_emotion_detection: bool,
    #[serde(default = "default_detection_interval_secs")]
    pub detection_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            session_id: default_session_id(),
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: 0,
            greeting: default_greeting(),
            farewell: default_farewell(),
            still_greeting_ms: default_still_greeting_ms(),
            speech_rate: default_speech_rate(),
            simulate_emotion_detection: false,
            detection_interval_secs: default_detection_interval_secs(),
        }
    }
}

impl SessionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn still_greeting(&self) -> Duration {
        Duration::from_millis(self.still_greeting_ms)
    }

    pub fn detection_interval(&self) -> Duration {
        Duration::from_secs(self.detection_interval_secs.max(1))
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_session_id() -> String {
    "temp-session".to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}
fn default_farewell() -> String {
    DEFAULT_FAREWELL.to_string()
}
fn default_still_greeting_ms() -> u64 {
    3000
}
fn default_speech_rate() -> f32 {
    0.9
}
fn default_detection_interval_secs() -> u64 {
    5
}
