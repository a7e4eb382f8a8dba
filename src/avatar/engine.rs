//! AvatarEngine: public face of the animation engine.
//!
//! The engine is an actor. `initialize()` spawns one task that owns the
//! [`Animator`] and the renderer, ticks at the configured frame rate and
//! serves commands from an mpsc channel. Public methods only send messages
//! and await oneshot replies, so animation state never sits behind a lock.
//!
//! `speak()` runs on the caller's task: it takes a turn from the
//! [`SpeechQueue`], flags the utterance in the actor, waits for the backend
//! (or the word-count timer when no backend is available) and then clears
//! the flag again. `cancel_speech()` bumps an epoch that every in-flight
//! utterance watches. A `speak` future dropped before it finishes still
//! clears its flag through [`UtteranceGuard`].

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use super::animator::Animator;
use super::blend_shapes::BlendShapeFrame;
use super::config::AvatarConfig;
use super::emotion::{Emotion, EmotionSnapshot};
use super::error::AvatarError;
use super::queue::SpeechQueue;
use super::render::{FramePacket, RenderInput, Renderer};
use super::speech::{
    estimate_speaking_duration, SpeakOptions, SpeechBackend, SpeechError, SpeechOutcome,
    SpeechParams,
};

const COMMAND_BUFFER: usize = 64;

/// Lifecycle of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Uninitialized,
    Ready,
    /// Terminal. Reached through `shutdown()`.
    Stopped,
}

enum Command {
    SetEmotion {
        emotion: Emotion,
        intensity: f32,
        reply: oneshot::Sender<()>,
    },
    SetEmotionLabel {
        label: String,
        intensity: f32,
        reply: oneshot::Sender<Emotion>,
    },
    ReactObserved {
        label: String,
        confidence: f32,
        reply: oneshot::Sender<Emotion>,
    },
    BeginSpeech {
        id: Uuid,
        emotion: Option<Emotion>,
        reply: oneshot::Sender<()>,
    },
    EndSpeech {
        id: Uuid,
        reply: oneshot::Sender<bool>,
    },
    ClearSpeech,
    Snapshot {
        reply: oneshot::Sender<EmotionSnapshot>,
    },
    IsSpeaking {
        reply: oneshot::Sender<bool>,
    },
    Frame {
        reply: oneshot::Sender<BlendShapeFrame>,
    },
    Shutdown,
}

enum EngineState {
    Uninitialized,
    Ready {
        tx: mpsc::Sender<Command>,
        task: JoinHandle<()>,
    },
    Stopped,
}

pub struct AvatarEngine {
    config: AvatarConfig,
    backend: Arc<dyn SpeechBackend>,
    renderer: Mutex<Option<Box<dyn Renderer>>>,
    state: RwLock<EngineState>,
    queue: SpeechQueue,
    cancel_epoch: watch::Sender<u64>,
    frames: watch::Sender<Option<FramePacket>>,
}

impl AvatarEngine {
    pub fn new(
        config: AvatarConfig,
        backend: Arc<dyn SpeechBackend>,
        renderer: Box<dyn Renderer>,
    ) -> Result<Self, AvatarError> {
        config.validate()?;
        let (cancel_epoch, _) = watch::channel(0);
        let (frames, _) = watch::channel(None);
        Ok(Self {
            config,
            backend,
            renderer: Mutex::new(Some(renderer)),
            state: RwLock::new(EngineState::Uninitialized),
            queue: SpeechQueue::new(),
            cancel_epoch,
            frames,
        })
    }

    pub fn config(&self) -> &AvatarConfig {
        &self.config
    }

    /// A tick loop that died on its own reports `Stopped` as well.
    pub async fn status(&self) -> EngineStatus {
        match &*self.state.read().await {
            EngineState::Uninitialized => EngineStatus::Uninitialized,
            EngineState::Ready { task, .. } if task.is_finished() => EngineStatus::Stopped,
            EngineState::Ready { .. } => EngineStatus::Ready,
            EngineState::Stopped => EngineStatus::Stopped,
        }
    }

    // ── Lifecycle ──────────────────────────────────────

    /// Start the tick loop. A no-op on a ready engine.
    ///
    /// A stopped engine cannot be restarted and reports `NotInitialized`.
    pub async fn initialize(&self) -> Result<(), AvatarError> {
        let mut state = self.state.write().await;
        match &*state {
            EngineState::Ready { task, .. } if task.is_finished() => {
                return Err(AvatarError::NotInitialized)
            }
            EngineState::Ready { .. } => return Ok(()),
            EngineState::Stopped => return Err(AvatarError::NotInitialized),
            EngineState::Uninitialized => {}
        }

        let renderer = self
            .renderer
            .lock()
            .await
            .take()
            .ok_or(AvatarError::NotInitialized)?;
        let animator = Animator::new(&self.config);
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let period = self.config.tick_period();
        let frames = self.frames.clone();

        tracing::info!(
            "[Avatar] Initializing {} avatar at {} fps, renderer '{}', speech '{}'",
            self.config.avatar_type,
            self.config.frame_rate,
            renderer.name(),
            self.backend.id()
        );

        let task = tokio::spawn(run_loop(animator, renderer, rx, frames, period));
        *state = EngineState::Ready { tx, task };
        Ok(())
    }

    /// Stop the tick loop and cancel any utterance. Terminal.
    pub async fn shutdown(&self) -> Result<(), AvatarError> {
        let (tx, task) = {
            let mut state = self.state.write().await;
            match *state {
                EngineState::Uninitialized => return Err(AvatarError::NotInitialized),
                EngineState::Stopped => return Ok(()),
                EngineState::Ready { .. } => {}
            }
            match std::mem::replace(&mut *state, EngineState::Stopped) {
                EngineState::Ready { tx, task } => (tx, task),
                _ => return Ok(()),
            }
        };

        self.queue.close();
        self.cancel_epoch.send_modify(|epoch| *epoch += 1);
        self.backend.cancel().await;
        // The loop also exits when the channel closes, so a failed send is fine.
        let _ = tx.send(Command::Shutdown).await;
        if let Err(e) = task.await {
            tracing::error!("[Avatar] Tick loop ended abnormally: {}", e);
        }
        tracing::info!("[Avatar] Engine stopped");
        Ok(())
    }

    async fn sender(&self) -> Result<mpsc::Sender<Command>, AvatarError> {
        match &*self.state.read().await {
            EngineState::Ready { tx, task } if !task.is_finished() => Ok(tx.clone()),
            _ => Err(AvatarError::NotInitialized),
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, AvatarError> {
        let tx = self.sender().await?;
        send_request(&tx, make).await
    }

    // ── Emotion ────────────────────────────────────────

    pub async fn set_emotion(&self, emotion: Emotion, intensity: f32) -> Result<(), AvatarError> {
        self.request(|reply| Command::SetEmotion {
            emotion,
            intensity,
            reply,
        })
        .await
    }

    /// Set the expression from a label. Unknown labels fall back to neutral.
    /// Returns the emotion actually applied.
    pub async fn set_emotion_label(
        &self,
        label: &str,
        intensity: f32,
    ) -> Result<Emotion, AvatarError> {
        self.request(|reply| Command::SetEmotionLabel {
            label: label.to_string(),
            intensity,
            reply,
        })
        .await
    }

    /// Mirror an emotion detected on the user's face.
    pub async fn react_to_observed_emotion(
        &self,
        label: &str,
        confidence: f32,
    ) -> Result<Emotion, AvatarError> {
        self.request(|reply| Command::ReactObserved {
            label: label.to_string(),
            confidence,
            reply,
        })
        .await
    }

    // ── Speech ─────────────────────────────────────────

    /// Voice `text` and animate the mouth until it is done.
    ///
    /// Calls are served one at a time in arrival order.
    pub async fn speak(
        &self,
        text: &str,
        options: SpeakOptions,
    ) -> Result<SpeechOutcome, AvatarError> {
        let tx = self.sender().await?;
        let _turn = self.queue.acquire().await?;

        let mut cancelled = self.cancel_epoch.subscribe();

        let id = Uuid::new_v4();
        let guard = UtteranceGuard::new(tx.clone(), id);
        send_request(&tx, |reply| Command::BeginSpeech {
            id,
            emotion: options.emotion,
            reply,
        })
        .await?;
        tracing::debug!(
            "[Avatar] Speaking {} ({} chars)",
            id,
            text.chars().count()
        );

        let params = SpeechParams {
            rate: options.rate,
            pitch: options.pitch.unwrap_or(self.config.voice_pitch),
            volume: options.volume,
        };
        let outcome = tokio::select! {
            result = self.voice(text, params) => result,
            _ = cancelled.changed() => Ok(SpeechOutcome::Cancelled),
        };

        guard.finish().await;

        match &outcome {
            Ok(o) => tracing::debug!("[Avatar] Utterance {} finished: {:?}", id, o),
            Err(e) => tracing::warn!("[Avatar] Utterance {} failed: {}", id, e),
        }
        outcome.map_err(AvatarError::from)
    }

    async fn voice(&self, text: &str, params: SpeechParams) -> Result<SpeechOutcome, SpeechError> {
        let estimate = estimate_speaking_duration(text);
        if !self.backend.is_available().await {
            tokio::time::sleep(estimate).await;
            return Ok(SpeechOutcome::Estimated(estimate));
        }
        match self.backend.speak(text, params).await {
            Ok(()) => Ok(SpeechOutcome::Spoken),
            Err(SpeechError::Unavailable(reason)) => {
                tracing::debug!(
                    "[Avatar] Backend '{}' unavailable ({}), timing utterance",
                    self.backend.id(),
                    reason
                );
                tokio::time::sleep(estimate).await;
                Ok(SpeechOutcome::Estimated(estimate))
            }
            Err(e) => Err(e),
        }
    }

    /// Stop the current utterance. Its `speak` call resolves `Cancelled`.
    pub async fn cancel_speech(&self) -> Result<(), AvatarError> {
        let tx = self.sender().await?;
        self.cancel_epoch.send_modify(|epoch| *epoch += 1);
        tx.send(Command::ClearSpeech)
            .await
            .map_err(|_| AvatarError::NotInitialized)?;
        self.backend.cancel().await;
        Ok(())
    }

    // ── Diagnostics ────────────────────────────────────

    pub async fn is_speaking(&self) -> Result<bool, AvatarError> {
        self.request(|reply| Command::IsSpeaking { reply }).await
    }

    pub async fn current_emotion(&self) -> Result<Emotion, AvatarError> {
        Ok(self.emotion_snapshot().await?.emotion)
    }

    pub async fn emotion_snapshot(&self) -> Result<EmotionSnapshot, AvatarError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub async fn latest_frame(&self) -> Result<BlendShapeFrame, AvatarError> {
        self.request(|reply| Command::Frame { reply }).await
    }

    /// Every rendered frame, latest value only.
    pub async fn subscribe_frames(&self) -> Result<watch::Receiver<Option<FramePacket>>, AvatarError> {
        self.sender().await?;
        Ok(self.frames.subscribe())
    }
}

/// Clears an utterance's speaking flag, even when `speak` is dropped midway.
struct UtteranceGuard {
    tx: mpsc::Sender<Command>,
    id: Uuid,
    armed: bool,
}

impl UtteranceGuard {
    fn new(tx: mpsc::Sender<Command>, id: Uuid) -> Self {
        Self { tx, id, armed: true }
    }

    async fn finish(mut self) {
        self.armed = false;
        let id = self.id;
        // After shutdown the actor is gone and there is no flag left to clear.
        let _ = send_request(&self.tx, |reply| Command::EndSpeech { id, reply }).await;
    }
}

impl Drop for UtteranceGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        tracing::debug!("[Avatar] Utterance {} abandoned by its caller", self.id);
        let (reply, _) = oneshot::channel();
        let command = Command::EndSpeech { id: self.id, reply };
        if let Err(mpsc::error::TrySendError::Full(command)) = self.tx.try_send(command) {
            let tx = self.tx.clone();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = tx.send(command).await;
                });
            }
        }
    }
}

async fn send_request<T>(
    tx: &mpsc::Sender<Command>,
    make: impl FnOnce(oneshot::Sender<T>) -> Command,
) -> Result<T, AvatarError> {
    let (reply, rx) = oneshot::channel();
    tx.send(make(reply))
        .await
        .map_err(|_| AvatarError::NotInitialized)?;
    rx.await.map_err(|_| AvatarError::NotInitialized)
}

// ── Tick Loop ──────────────────────────────────────────

async fn run_loop(
    mut animator: Animator,
    mut renderer: Box<dyn Renderer>,
    mut rx: mpsc::Receiver<Command>,
    frames: watch::Sender<Option<FramePacket>>,
    period: Duration,
) {
    let start = Instant::now();
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut render_failing = false;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let frame = match animator.tick(start.elapsed()) {
                    Ok(frame) => *frame,
                    Err(e) => {
                        tracing::warn!("[Avatar] Dropping frame: {}", e);
                        continue;
                    }
                };
                let emotion = animator.emotion().current_emotion();
                let speaking = animator.is_speaking();

                let input = RenderInput { frame: &frame, emotion, speaking };
                match renderer.render(&input) {
                    Ok(()) => render_failing = false,
                    Err(e) => {
                        // Report once per failure streak.
                        if !render_failing {
                            tracing::warn!("[Avatar] Renderer '{}' failed: {}", renderer.name(), e);
                        }
                        render_failing = true;
                    }
                }

                frames.send_replace(Some(FramePacket {
                    emotion,
                    speaking,
                    blend_shapes: frame,
                }));
            }
            command = rx.recv() => {
                match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => handle_command(&mut animator, command),
                }
            }
        }
    }

    animator.clear_speech();
    tracing::debug!("[Avatar] Tick loop exited");
}

// A dropped reply means the caller gave up waiting, so send results are ignored.
fn handle_command(animator: &mut Animator, command: Command) {
    match command {
        Command::SetEmotion {
            emotion,
            intensity,
            reply,
        } => {
            animator.set_emotion(emotion, intensity);
            let _ = reply.send(());
        }
        Command::SetEmotionLabel {
            label,
            intensity,
            reply,
        } => {
            let _ = reply.send(animator.set_emotion_label(&label, intensity));
        }
        Command::ReactObserved {
            label,
            confidence,
            reply,
        } => {
            let _ = reply.send(animator.react_to_observed_emotion(&label, confidence));
        }
        Command::BeginSpeech { id, emotion, reply } => {
            if let Some(emotion) = emotion {
                animator.set_emotion(emotion, 1.0);
            }
            animator.begin_speech(id);
            let _ = reply.send(());
        }
        Command::EndSpeech { id, reply } => {
            let _ = reply.send(animator.end_speech(id));
        }
        Command::ClearSpeech => animator.clear_speech(),
        Command::Snapshot { reply } => {
            let _ = reply.send(animator.emotion().snapshot());
        }
        Command::IsSpeaking { reply } => {
            let _ = reply.send(animator.is_speaking());
        }
        Command::Frame { reply } => {
            let _ = reply.send(*animator.frame());
        }
        Command::Shutdown => {}
    }
}
