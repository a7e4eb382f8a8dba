//! Emotion-driven avatar animation.

pub mod animator;
pub mod blend_shapes;
pub mod config;
pub mod emotion;
pub mod engine;
pub mod error;
pub mod idle;
pub mod queue;
pub mod rapport;
pub mod render;
pub mod speech;


pub use blend_shapes::{BlendShape, BlendShapeFrame};
pub use config::{AnimationParameters, AvatarConfig, DampingMode};
pub use emotion::{Emotion, EmotionSnapshot, EmotionState, UnknownEmotion};
pub use engine::{AvatarEngine, EngineStatus};
pub use error::AvatarError;
pub use render::{
    FaceSketch, FaceSketchRenderer, FrameBroadcastRenderer, FramePacket, RenderError, Renderer,
    TalkingChange, TalkingIndicatorRenderer,
};
pub use speech::{
    SilentSpeechBackend, SpeakOptions, SpeechBackend, SpeechError, SpeechOutcome, SpeechParams,
};
