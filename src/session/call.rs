//! VideoCall: one therapy call from greeting to farewell.
//!
//! Glues the avatar to the backend: user utterances go into the transcript
//! and out to the chat API, replies come back through the avatar's mouth.
//! Everything the UI needs to show is reported on an event channel.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::client::{ChatReply, TherapyApiClient};
use super::config::SessionConfig;
use super::detector::SimulatedEmotionDetector;
use super::media::{MediaBackend, MediaError, MediaStream, TrackKind};
use super::recognizer::SpeechRecognizer;
use super::transcript::{Sender, Transcript};
use crate::avatar::{AvatarEngine, AvatarError, Emotion, SpeakOptions};

const START_FAILED: &str = "Failed to start video call. Please try again.";

/// How the therapist is shown.
#[derive(Clone)]
pub enum AvatarSurface {
    /// Blend-shape animated face with speech.
    Animated(Arc<AvatarEngine>),
    /// Static portrait that only toggles a talking indicator.
    Still,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    CallStarted,
    CallEnded,
    /// Chat bubble.
    Message { sender: Sender, text: String },
    /// Greeting or farewell shown outside the chat flow.
    SystemMessage(String),
    AvatarTalking(bool),
    MicToggled { muted: bool },
    CameraToggled { off: bool },
    /// Dismissible error notification.
    Error(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("media access error: {0}")]
    Media(#[from] MediaError),
    #[error(transparent)]
    Avatar(#[from] AvatarError),
}

#[derive(Default)]
struct CallState {
    active: bool,
    /// Set while the greeting plays, before `active`.
    starting: bool,
    recognizing: bool,
    stream: Option<MediaStream>,
    transcript: Transcript,
    mic_muted: bool,
    camera_off: bool,
    detector: Option<JoinHandle<()>>,
    pending_saves: Vec<JoinHandle<()>>,
}

/// Talking time for a still portrait showing `text`.
pub fn still_talking_duration(text: &str) -> Duration {
    let ms = (text.chars().count() as u64 * 50).clamp(1000, 5000);
    Duration::from_millis(ms)
}

pub struct VideoCall {
    config: SessionConfig,
    surface: AvatarSurface,
    api: TherapyApiClient,
    media: Arc<dyn MediaBackend>,
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    events: mpsc::UnboundedSender<UiEvent>,
    state: Mutex<CallState>,
}

impl VideoCall {
    pub fn new(
        config: SessionConfig,
        surface: AvatarSurface,
        api: TherapyApiClient,
        media: Arc<dyn MediaBackend>,
    ) -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let call = Self {
            config,
            surface,
            api,
            media,
            recognizer: None,
            events,
            state: Mutex::new(CallState::default()),
        };
        (call, rx)
    }

    /// Listen to the microphone while the call runs and the mic is unmuted.
    pub fn with_recognizer(mut self, recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    fn emit(&self, event: UiEvent) {
        // Nobody listening is fine for a headless call.
        let _ = self.events.send(event);
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.active
    }

    pub async fn transcript(&self) -> Transcript {
        self.state.lock().await.transcript.clone()
    }

    // ── Call Lifecycle ─────────────────────────────────

    pub async fn start_call(&self) -> Result<(), CallError> {
        {
            let mut state = self.state.lock().await;
            if state.active || state.starting {
                tracing::warn!("[Call] Call is already active");
                return Ok(());
            }
            if state.stream.is_none() {
                match self.media.request_user_media(true, true).await {
                    Ok(stream) => state.stream = Some(stream),
                    Err(e) => {
                        tracing::error!("[Call] Error accessing user media: {}", e);
                        self.emit(UiEvent::Error(format!("Media access error: {}", e)));
                        return Err(e.into());
                    }
                }
            }
            state.starting = true;
        }

        tracing::info!("[Call] Starting video call for session {}", self.api.session_id());
        self.emit(UiEvent::CallStarted);

        let greeting = self.config.greeting.clone();
        if let Err(e) = self.present_system_message(&greeting, Some(Emotion::Happy)).await {
            tracing::error!("[Call] Error starting video call: {}", e);
            self.state.lock().await.starting = false;
            self.emit(UiEvent::Error(START_FAILED.to_string()));
            return Err(e.into());
        }

        let mut state = self.state.lock().await;
        if self.config.simulate_emotion_detection {
            if let AvatarSurface::Animated(engine) = &self.surface {
                if let Some(previous) = state.detector.take() {
                    previous.abort();
                }
                let detector =
                    SimulatedEmotionDetector::new(self.config.detection_interval(), None);
                state.detector = Some(detector.spawn(engine.clone()));
            }
        }
        state.starting = false;
        state.active = true;
        self.start_recognition(&mut state).await;
        tracing::info!("[Call] Video call started");
        Ok(())
    }

    pub async fn end_call(&self) -> Result<(), CallError> {
        {
            let mut state = self.state.lock().await;
            if !state.active {
                tracing::warn!("[Call] No active call to end");
                return Ok(());
            }
            if let Some(detector) = state.detector.take() {
                detector.abort();
            }
            self.stop_recognition(&mut state).await;
        }
        tracing::info!("[Call] Ending video call");

        if let AvatarSurface::Animated(engine) = &self.surface {
            if let Err(e) = engine.cancel_speech().await {
                tracing::warn!("[Call] Could not cancel speech: {}", e);
            }
        }

        let farewell = self.config.farewell.clone();
        if let Err(e) = self.present_system_message(&farewell, Some(Emotion::Happy)).await {
            tracing::warn!("[Call] Error during final message: {}", e);
        }

        if let AvatarSurface::Animated(engine) = &self.surface {
            if let Err(e) = engine.set_emotion(Emotion::Neutral, 1.0).await {
                tracing::warn!("[Call] Could not reset avatar emotion: {}", e);
            }
        }
        self.emit(UiEvent::CallEnded);

        let mut state = self.state.lock().await;
        if let Some(mut stream) = state.stream.take() {
            stream.stop();
        }
        let transcript = state.transcript.take();
        if let Some(handle) = self.api.spawn_save_transcript(transcript) {
            state.pending_saves.push(handle);
        }
        state.mic_muted = false;
        state.camera_off = false;
        state.active = false;
        tracing::info!("[Call] Video call ended");
        Ok(())
    }

    /// Wait for background transcript uploads started by `end_call`.
    pub async fn wait_for_pending_saves(&self) {
        let handles = std::mem::take(&mut self.state.lock().await.pending_saves);
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::error!("[Call] Transcript upload task failed: {}", e);
            }
        }
    }

    // ── Conversation ───────────────────────────────────

    /// Handle recognized user speech. Returns the therapist's reply, or
    /// `None` when the text is blank, the mic is muted or no call is running.
    pub async fn on_user_speech(&self, text: &str) -> Result<Option<ChatReply>, CallError> {
        if self.state.lock().await.mic_muted {
            tracing::debug!("[Call] Ignoring speech while the microphone is muted");
            return Ok(None);
        }
        self.handle_user_input(text).await
    }

    /// Typed chat. Works while the mic is muted.
    pub async fn send_text_message(&self, message: &str) -> Result<Option<ChatReply>, CallError> {
        if message.trim().is_empty() {
            return Ok(None);
        }
        tracing::debug!("[Call] Sending text message");
        self.handle_user_input(message).await
    }

    async fn handle_user_input(&self, text: &str) -> Result<Option<ChatReply>, CallError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        {
            let mut state = self.state.lock().await;
            if !state.active {
                return Ok(None);
            }
            state.transcript.push(Sender::User, text);
        }
        tracing::debug!("[Call] User said: {}", text);
        self.emit(UiEvent::Message {
            sender: Sender::User,
            text: text.to_string(),
        });

        let reply = self.api.send_message(text).await;

        self.state
            .lock()
            .await
            .transcript
            .push(Sender::Ai, reply.text.clone());
        self.emit(UiEvent::Message {
            sender: Sender::Ai,
            text: reply.text.clone(),
        });

        let still_duration = if reply.is_fallback() {
            self.config.still_greeting()
        } else {
            still_talking_duration(&reply.text)
        };
        if let Err(e) = self.present(&reply.text, None, still_duration).await {
            tracing::warn!("[Call] Could not voice reply: {}", e);
        }
        Ok(Some(reply))
    }

    async fn present_system_message(
        &self,
        text: &str,
        emotion: Option<Emotion>,
    ) -> Result<(), AvatarError> {
        self.emit(UiEvent::SystemMessage(text.to_string()));
        self.present(text, emotion, self.config.still_greeting()).await
    }

    /// Say `text` through whichever surface is active.
    async fn present(
        &self,
        text: &str,
        emotion: Option<Emotion>,
        still_duration: Duration,
    ) -> Result<(), AvatarError> {
        match &self.surface {
            AvatarSurface::Animated(engine) => {
                let options = SpeakOptions {
                    emotion,
                    rate: self.config.speech_rate,
                    pitch: Some(1.0),
                    ..SpeakOptions::default()
                };
                engine.speak(text, options).await?;
            }
            AvatarSurface::Still => {
                self.emit(UiEvent::AvatarTalking(true));
                tokio::time::sleep(still_duration).await;
                self.emit(UiEvent::AvatarTalking(false));
            }
        }
        Ok(())
    }

    // ── Controls ───────────────────────────────────────

    /// Mute or unmute. Returns the new muted state, or `None` without a
    /// microphone.
    pub async fn toggle_mic(&self) -> Option<bool> {
        let mut state = self.state.lock().await;
        let muted = !state.mic_muted;
        let stream = state.stream.as_mut()?;
        if stream.set_enabled(TrackKind::Audio, !muted) == 0 {
            return None;
        }
        state.mic_muted = muted;
        if muted {
            self.stop_recognition(&mut state).await;
        } else if state.active {
            self.start_recognition(&mut state).await;
        }
        tracing::info!("[Call] Microphone {}", if muted { "muted" } else { "unmuted" });
        self.emit(UiEvent::MicToggled { muted });
        Some(muted)
    }

    /// Turn the camera off or on. Returns the new off state, or `None`
    /// without a camera.
    pub async fn toggle_camera(&self) -> Option<bool> {
        let mut state = self.state.lock().await;
        let off = !state.camera_off;
        let stream = state.stream.as_mut()?;
        if stream.set_enabled(TrackKind::Video, !off) == 0 {
            return None;
        }
        state.camera_off = off;
        tracing::info!("[Call] Camera {}", if off { "disabled" } else { "enabled" });
        self.emit(UiEvent::CameraToggled { off });
        Some(off)
    }

    // ── Recognition ────────────────────────────────────

    async fn start_recognition(&self, state: &mut CallState) {
        let Some(recognizer) = &self.recognizer else {
            return;
        };
        if state.recognizing || state.mic_muted {
            return;
        }
        match recognizer.start().await {
            Ok(()) => {
                state.recognizing = true;
                tracing::info!("[Call] Speech recognition '{}' started", recognizer.id());
            }
            Err(e) => tracing::error!("[Call] Error starting speech recognition: {}", e),
        }
    }

    async fn stop_recognition(&self, state: &mut CallState) {
        let Some(recognizer) = &self.recognizer else {
            return;
        };
        if !state.recognizing {
            return;
        }
        recognizer.stop().await;
        state.recognizing = false;
        tracing::info!("[Call] Speech recognition '{}' stopped", recognizer.id());
    }

    /// Forward an emotion detected on the user's face to the avatar.
    ///
    /// Returns the emotion the avatar adopted; `None` for a still portrait.
    pub async fn on_observed_emotion(
        &self,
        label: &str,
        confidence: f32,
    ) -> Result<Option<Emotion>, CallError> {
        match &self.surface {
            AvatarSurface::Animated(engine) => Ok(Some(
                engine.react_to_observed_emotion(label, confidence).await?,
            )),
            AvatarSurface::Still => Ok(None),
        }
    }
}
