//! HTTP client for the therapy backend.
//!
//! Chat replies never fail from the caller's point of view: any transport,
//! status or decoding problem is swapped for a canned therapeutic prompt so
//! the conversation can carry on. Session start/end errors are returned.

use rand::seq::SliceRandom;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use super::config::SessionConfig;
use super::transcript::Transcript;
use crate::utils::http::{request_with_retry, HttpError};

pub const FALLBACK_RESPONSES: [&str; 6] = [
    "I understand how you're feeling. Could you tell me more about that?",
    "That's interesting. How does that make you feel?",
    "Thank you for sharing that with me. Let's explore that further.",
    "I'm here to listen and help. What else is on your mind?",
    "It sounds like that's been challenging for you. How have you been coping?",
    "I appreciate your openness. What thoughts come up when you consider that situation?",
];

/// Used when the backend answers but leaves out the reply text.
pub const MISSING_RESPONSE_APOLOGY: &str =
    "I apologize, but I had trouble processing your message.";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("API returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("could not decode API response: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("could not encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Backend,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub text: String,
    pub source: ReplySource,
}

impl ChatReply {
    pub fn is_fallback(&self) -> bool {
        self.source == ReplySource::Fallback
    }
}

#[derive(Serialize)]
struct MessageRequest<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct MessageResponse {
    #[serde(default)]
    response: Option<String>,
}

pub fn fallback_response() -> &'static str {
    FALLBACK_RESPONSES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(FALLBACK_RESPONSES[0])
}

#[derive(Clone)]
pub struct TherapyApiClient {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
    max_retries: u32,
}

impl TherapyApiClient {
    pub fn new(config: &SessionConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(ApiError::Client)?;
        Ok(Self::with_client(client, config))
    }

    /// Use a preconfigured client (proxy settings, test servers).
    pub fn with_client(client: reqwest::Client, config: &SessionConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session_id: config.session_id.clone(),
            max_retries: config.max_retries,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/sessions/{}/{}", self.base_url, self.session_id, action)
    }

    async fn post_json<B: Serialize>(
        &self,
        action: &str,
        body: &B,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.endpoint(action);
        let body = serde_json::to_value(body)?;
        let client = self.client.clone();

        let response = request_with_retry(
            move || {
                let client = client.clone();
                let url = url.clone();
                let body = body.clone();
                async move { client.post(&url).json(&body).send().await }
            },
            self.max_retries,
        )
        .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status, body });
        }
        Ok(response)
    }

    // ── Session Lifecycle ──────────────────────────────

    pub async fn start_session(&self) -> Result<serde_json::Value, ApiError> {
        let response = self.post_json("start", &serde_json::json!({})).await?;
        tracing::info!("[API] Session {} started", self.session_id);
        response.json().await.map_err(ApiError::Decode)
    }

    pub async fn end_session(&self) -> Result<serde_json::Value, ApiError> {
        let response = self.post_json("end", &serde_json::json!({})).await?;
        tracing::info!("[API] Session {} ended", self.session_id);
        response.json().await.map_err(ApiError::Decode)
    }

    // ── Chat ───────────────────────────────────────────

    /// Ask the backend for a reply, reporting every failure.
    pub async fn try_send_message(&self, message: &str) -> Result<String, ApiError> {
        let response = self.post_json("message", &MessageRequest { message }).await?;
        let data: MessageResponse = response.json().await.map_err(ApiError::Decode)?;
        Ok(data
            .response
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| MISSING_RESPONSE_APOLOGY.to_string()))
    }

    /// Ask the backend for a reply, substituting a canned prompt on failure.
    pub async fn send_message(&self, message: &str) -> ChatReply {
        match self.try_send_message(message).await {
            Ok(text) => ChatReply {
                text,
                source: ReplySource::Backend,
            },
            Err(e) => {
                tracing::warn!("[API] Chat request failed, using fallback reply: {}", e);
                ChatReply {
                    text: fallback_response().to_string(),
                    source: ReplySource::Fallback,
                }
            }
        }
    }

    // ── Transcript ─────────────────────────────────────

    /// Upload the transcript. Empty transcripts are skipped.
    pub async fn save_transcript(&self, transcript: &Transcript) -> Result<(), ApiError> {
        if transcript.is_empty() {
            tracing::debug!("[API] Transcript empty, nothing to save");
            return Ok(());
        }
        self.post_json("transcript", transcript).await?;
        tracing::info!(
            "[API] Saved transcript with {} entries for session {}",
            transcript.len(),
            self.session_id
        );
        Ok(())
    }

    /// Upload in the background. Failures are logged only.
    ///
    /// Returns `None` when there is nothing to upload.
    pub fn spawn_save_transcript(&self, transcript: Transcript) -> Option<JoinHandle<()>> {
        if transcript.is_empty() {
            return None;
        }
        let api = self.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = api.save_transcript(&transcript).await {
                tracing::error!("[API] Error saving transcript: {}", e);
            }
        }))
    }
}
