//! Speech-to-text for the user's microphone.
//!
//! The call decides when recognition runs: only while a call is active and
//! the microphone is unmuted. Final transcripts are handed back through
//! [`VideoCall::on_user_speech`](super::VideoCall::on_user_speech).

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecognizerError {
    #[error("speech recognition unavailable: {0}")]
    Unavailable(String),
    #[error("speech recognition failed to start: {0}")]
    Start(String),
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    fn id(&self) -> String;

    /// Begin listening. Called on call start and when the mic is unmuted.
    async fn start(&self) -> Result<(), RecognizerError>;

    /// Stop listening. Called on mute and when the call ends.
    async fn stop(&self);
}
