//! Therapy session plumbing: backend API, transcript, media and the
//! video-call controller that ties them to the avatar.

pub mod call;
pub mod client;
pub mod config;
pub mod detector;
pub mod media;
pub mod recognizer;
pub mod transcript;

#[cfg(test)]
mod tests;

pub use call::{AvatarSurface, CallError, UiEvent, VideoCall};
pub use client::{ApiError, ChatReply, ReplySource, TherapyApiClient, FALLBACK_RESPONSES};
pub use config::SessionConfig;
pub use detector::SimulatedEmotionDetector;
pub use media::{HeadlessMedia, MediaBackend, MediaError, MediaStream, MediaTrack, TrackKind};
pub use recognizer::{RecognizerError, SpeechRecognizer};
pub use transcript::{Sender, Transcript, TranscriptEntry};
