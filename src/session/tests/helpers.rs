use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use wiremock::MockServer;

use crate::avatar::{
    AnimationParameters, AvatarConfig, AvatarEngine, FrameBroadcastRenderer, SpeechBackend,
    SpeechError, SpeechParams,
};
use crate::session::{
    MediaBackend, MediaError, MediaStream, RecognizerError, SessionConfig, SpeechRecognizer,
    TherapyApiClient, UiEvent,
};

// ── Config & API ────────────────────────────────────────────

pub const SESSION_ID: &str = "s-42";

/// Short greeting/farewell and a quick still portrait so tests stay fast.
pub fn test_config(base_url: &str) -> SessionConfig {
    SessionConfig {
        base_url: base_url.to_string(),
        session_id: SESSION_ID.to_string(),
        greeting: "Hello there".to_string(),
        farewell: "Goodbye now".to_string(),
        still_greeting_ms: 20,
        ..SessionConfig::default()
    }
}

/// Nothing listens on the discard port, so every request fails fast.
pub fn unreachable_config() -> SessionConfig {
    test_config("http://127.0.0.1:9")
}

pub fn test_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(timeout)
        .build()
        .expect("failed to build client")
}

pub fn api_for(config: &SessionConfig) -> TherapyApiClient {
    TherapyApiClient::with_client(test_client(Duration::from_secs(5)), config)
}

pub async fn mock_server_config() -> (MockServer, SessionConfig) {
    let server = MockServer::start().await;
    let config = test_config(&server.uri());
    (server, config)
}

pub fn endpoint(action: &str) -> String {
    format!("/sessions/{}/{}", SESSION_ID, action)
}

// ── Speech ──────────────────────────────────────────────────

/// Finishes every utterance immediately and remembers what was said.
#[derive(Default)]
pub struct InstantSpeech {
    pub spoken: Mutex<Vec<(String, SpeechParams)>>,
}

impl InstantSpeech {
    pub fn texts(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .map(|(text, _)| text.clone())
            .collect()
    }
}

#[async_trait]
impl SpeechBackend for InstantSpeech {
    fn id(&self) -> String {
        "instant".to_string()
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn speak(&self, text: &str, params: SpeechParams) -> Result<(), SpeechError> {
        self.spoken.lock().unwrap().push((text.to_string(), params));
        Ok(())
    }
}

pub async fn animated_engine(speech: Arc<InstantSpeech>) -> Arc<AvatarEngine> {
    let (renderer, _frames) = FrameBroadcastRenderer::new();
    let config = AvatarConfig {
        seed: Some(1),
        animation: AnimationParameters::still(),
        ..AvatarConfig::default()
    };
    let engine = Arc::new(AvatarEngine::new(config, speech, Box::new(renderer)).unwrap());
    engine.initialize().await.unwrap();
    engine
}

// ── Media ───────────────────────────────────────────────────

pub struct DeniedMedia;

#[async_trait]
impl MediaBackend for DeniedMedia {
    async fn request_user_media(
        &self,
        _audio: bool,
        _video: bool,
    ) -> Result<MediaStream, MediaError> {
        Err(MediaError::PermissionDenied("user dismissed prompt".to_string()))
    }
}

// ── Recognition ─────────────────────────────────────────────

/// Records every start and stop it is asked for.
#[derive(Default)]
pub struct RecordingRecognizer {
    pub calls: Mutex<Vec<&'static str>>,
}

impl RecordingRecognizer {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechRecognizer for RecordingRecognizer {
    fn id(&self) -> String {
        "recording".to_string()
    }

    async fn start(&self) -> Result<(), RecognizerError> {
        self.calls.lock().unwrap().push("start");
        Ok(())
    }

    async fn stop(&self) {
        self.calls.lock().unwrap().push("stop");
    }
}

// ── Events ──────────────────────────────────────────────────

pub fn drain(rx: &mut mpsc::UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
