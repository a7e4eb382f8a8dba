use super::speech::SpeechError;

#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    /// Operation invoked before `initialize()` completed, or after shutdown.
    #[error("avatar not initialized")]
    NotInitialized,

    #[error("invalid avatar config: {0}")]
    InvalidConfig(String),

    #[error("speech failed: {0}")]
    Speech(#[from] SpeechError),
}
