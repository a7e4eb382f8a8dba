//! Camera and microphone access.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MediaError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaTrack {
    pub kind: TrackKind,
    pub label: String,
    pub enabled: bool,
    pub stopped: bool,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            enabled: true,
            stopped: false,
        }
    }
}

/// The user's captured audio/video.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaStream {
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn has_track(&self, kind: TrackKind) -> bool {
        self.tracks.iter().any(|t| t.kind == kind)
    }

    /// Enable or disable every track of `kind`. Returns how many matched.
    pub fn set_enabled(&mut self, kind: TrackKind, enabled: bool) -> usize {
        let mut count = 0;
        for track in self.tracks.iter_mut().filter(|t| t.kind == kind) {
            track.enabled = enabled;
            count += 1;
        }
        count
    }

    /// Release every track.
    pub fn stop(&mut self) {
        for track in &mut self.tracks {
            track.enabled = false;
            track.stopped = true;
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.tracks.iter().all(|t| t.stopped)
    }
}

#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn request_user_media(&self, audio: bool, video: bool)
        -> Result<MediaStream, MediaError>;
}

/// Media for hosts without devices: hands out placeholder tracks.
pub struct HeadlessMedia;

#[async_trait]
impl MediaBackend for HeadlessMedia {
    async fn request_user_media(
        &self,
        audio: bool,
        video: bool,
    ) -> Result<MediaStream, MediaError> {
        let mut tracks = Vec::new();
        if audio {
            tracks.push(MediaTrack::new(TrackKind::Audio, "headless-microphone"));
        }
        if video {
            tracks.push(MediaTrack::new(TrackKind::Video, "headless-camera"));
        }
        Ok(MediaStream::new(tracks))
    }
}
