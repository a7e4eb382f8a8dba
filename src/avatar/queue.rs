use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::error::AvatarError;

/// FIFO gate for utterances.
///
/// Only one utterance holds the mouth at a time. Later callers wait in
/// arrival order; tokio's semaphore is fair, so nobody is starved.
pub struct SpeechQueue {
    semaphore: Arc<Semaphore>,
}

impl SpeechQueue {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Wait for the turn to speak. The turn ends when the permit drops.
    ///
    /// Fails once the queue is closed by shutdown.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AvatarError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AvatarError::NotInitialized)
    }

    /// Reject every waiting and future caller.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Whether nobody is currently speaking.
    pub fn is_idle(&self) -> bool {
        self.semaphore.available_permits() == 1
    }
}

impl Default for SpeechQueue {
    fn default() -> Self {
        Self::new()
    }
}
