//! Rendering strategies.
//!
//! The engine hands every finished frame to a [`Renderer`] and does not care
//! what it draws. Three strategies are provided:
//!
//! - [`FaceSketchRenderer`] derives 2D face geometry from the blend shapes.
//! - [`TalkingIndicatorRenderer`] drives a static portrait that only needs
//!   to know when the avatar starts and stops talking.
//! - [`FrameBroadcastRenderer`] forwards raw frames to an external renderer.

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use super::blend_shapes::{BlendShape, BlendShapeFrame};
use super::emotion::Emotion;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("render target disconnected: {0}")]
    Disconnected(&'static str),
    #[error("invalid surface: {0}")]
    InvalidSurface(String),
}

/// Everything a renderer may look at for one frame.
#[derive(Debug, Clone, Copy)]
pub struct RenderInput<'a> {
    pub frame: &'a BlendShapeFrame,
    pub emotion: Emotion,
    pub speaking: bool,
}

pub trait Renderer: Send + 'static {
    fn name(&self) -> &'static str;

    fn render(&mut self, input: &RenderInput<'_>) -> Result<(), RenderError>;
}

// ── Face Sketch ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

fn pt(x: f32, y: f32) -> Point {
    Point { x, y }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Ellipse {
    pub center: Point,
    pub rx: f32,
    pub ry: f32,
}

fn ellipse(x: f32, y: f32, rx: f32, ry: f32) -> Ellipse {
    Ellipse {
        center: pt(x, y),
        rx: rx.max(0.0),
        ry: ry.max(0.0),
    }
}

/// Quadratic Bézier segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Curve {
    pub start: Point,
    pub control: Point,
    pub end: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmotionFeature {
    RosyCheeks { left: Ellipse, right: Ellipse },
    ForeheadWrinkle { line: Curve },
}

/// Geometry of one drawn face, in surface pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceSketch {
    pub width: f32,
    pub height: f32,
    pub background: String,
    pub head: Ellipse,
    /// Upper half only.
    pub hair: Ellipse,
    pub eyes: [Ellipse; 2],
    pub pupils: [Ellipse; 2],
    pub brows: [Curve; 2],
    pub nose_bridge: (Point, Point),
    pub nose_tip: Curve,
    pub lips: Curve,
    pub inner_mouth: Option<Ellipse>,
    pub feature: Option<EmotionFeature>,
    pub speaking: bool,
}

impl FaceSketch {
    pub fn draw(
        frame: &BlendShapeFrame,
        emotion: Emotion,
        speaking: bool,
        width: f32,
        height: f32,
        background: &str,
    ) -> Self {
        let (w, h) = (width, height);
        let (cx, cy) = (w / 2.0, h / 2.0);
        let s = |shape: BlendShape| frame.get(shape);

        let eye_y = cy - h * 0.05;
        let left_eye_x = cx - w * 0.1;
        let right_eye_x = cx + w * 0.1;
        let eye_open = s(BlendShape::EyeOpen).max(0.0);
        let eye_w = w * 0.08 * eye_open;
        let eye_h = h * 0.04 * eye_open;
        let look_left = s(BlendShape::EyeLookLeft);
        let look_down = s(BlendShape::EyeLookDown);

        let eye_at = |x: f32| {
            ellipse(
                x + w * 0.02 * look_left,
                eye_y + h * 0.02 * look_down,
                eye_w,
                eye_h,
            )
        };
        let pupil_at = |x: f32| {
            ellipse(
                x + w * 0.03 * look_left,
                eye_y + h * 0.03 * look_down,
                eye_w * 0.4,
                eye_h * 0.5,
            )
        };

        let brow_y = eye_y - h * 0.05;
        let inner_up = s(BlendShape::BrowInnerUp);
        let outer_up = s(BlendShape::BrowOuterUp);
        let brow_arch = brow_y - h * 0.04 * inner_up + h * 0.03 * s(BlendShape::BrowDown);
        let outer_y = brow_y - h * 0.02 * outer_up;
        let inner_y = brow_y - h * 0.01 * inner_up;
        let brows = [
            Curve {
                start: pt(left_eye_x - eye_w, outer_y),
                control: pt(left_eye_x, brow_arch),
                end: pt(left_eye_x + eye_w, inner_y),
            },
            Curve {
                start: pt(right_eye_x - eye_w, inner_y),
                control: pt(right_eye_x, brow_arch),
                end: pt(right_eye_x + eye_w, outer_y),
            },
        ];

        let nose_y = cy + h * 0.02;
        let nose_tip = Curve {
            start: pt(cx - w * 0.03, nose_y),
            control: pt(cx, nose_y + h * 0.02),
            end: pt(cx + w * 0.03, nose_y),
        };

        let jaw = s(BlendShape::JawOpen);
        let mouth_y = cy + h * 0.15;
        let mouth_w = w * 0.15;
        let mouth_h = h * (0.02 + 0.08 * jaw);
        let smile = s(BlendShape::MouthSmile) - s(BlendShape::MouthFrown);
        let lips = Curve {
            start: pt(cx - mouth_w, mouth_y + h * 0.03 * smile),
            control: pt(cx, mouth_y - h * 0.1 * smile + h * 0.1 * jaw),
            end: pt(cx + mouth_w, mouth_y + h * 0.03 * smile),
        };
        let inner_mouth = (jaw > 0.1)
            .then(|| ellipse(cx, mouth_y + h * 0.02, mouth_w * 0.7, mouth_h * 0.8));

        let feature = match emotion {
            Emotion::Happy => Some(EmotionFeature::RosyCheeks {
                left: ellipse(left_eye_x - w * 0.08, mouth_y - h * 0.05, w * 0.08, h * 0.06),
                right: ellipse(right_eye_x + w * 0.08, mouth_y - h * 0.05, w * 0.08, h * 0.06),
            }),
            Emotion::Concerned => Some(EmotionFeature::ForeheadWrinkle {
                line: Curve {
                    start: pt(cx - w * 0.15, brow_y - h * 0.08),
                    control: pt(cx, brow_y - h * 0.1),
                    end: pt(cx + w * 0.15, brow_y - h * 0.08),
                },
            }),
            _ => None,
        };

        Self {
            width: w,
            height: h,
            background: background.to_string(),
            head: ellipse(cx, cy, w * 0.25, h * 0.3),
            hair: ellipse(cx, cy - h * 0.15, w * 0.26, h * 0.2),
            eyes: [eye_at(left_eye_x), eye_at(right_eye_x)],
            pupils: [pupil_at(left_eye_x), pupil_at(right_eye_x)],
            brows,
            nose_bridge: (pt(cx, eye_y + h * 0.05), pt(cx, nose_y)),
            nose_tip,
            lips,
            inner_mouth,
            feature,
            speaking,
        }
    }
}

/// 2D procedural face. Each frame's sketch is published to subscribers.
pub struct FaceSketchRenderer {
    width: f32,
    height: f32,
    background: String,
    tx: watch::Sender<Option<FaceSketch>>,
}

impl FaceSketchRenderer {
    pub fn new(width: f32, height: f32, background: &str) -> Result<Self, RenderError> {
        if !(width > 0.0 && height > 0.0) {
            return Err(RenderError::InvalidSurface(format!(
                "surface must have positive size, got {}x{}",
                width, height
            )));
        }
        let (tx, _) = watch::channel(None);
        Ok(Self {
            width,
            height,
            background: background.to_string(),
            tx,
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<FaceSketch>> {
        self.tx.subscribe()
    }
}

impl Renderer for FaceSketchRenderer {
    fn name(&self) -> &'static str {
        "face_sketch"
    }

    fn render(&mut self, input: &RenderInput<'_>) -> Result<(), RenderError> {
        let sketch = FaceSketch::draw(
            input.frame,
            input.emotion,
            input.speaking,
            self.width,
            self.height,
            &self.background,
        );
        self.tx.send_replace(Some(sketch));
        Ok(())
    }
}

// ── Talking Indicator ──────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TalkingChange {
    Started,
    Stopped,
}

/// Static portrait that toggles a "talking" affordance.
///
/// Emits only on transitions, not once per frame.
pub struct TalkingIndicatorRenderer {
    talking: bool,
    tx: mpsc::UnboundedSender<TalkingChange>,
}

impl TalkingIndicatorRenderer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TalkingChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { talking: false, tx }, rx)
    }
}

impl Renderer for TalkingIndicatorRenderer {
    fn name(&self) -> &'static str {
        "talking_indicator"
    }

    fn render(&mut self, input: &RenderInput<'_>) -> Result<(), RenderError> {
        if input.speaking == self.talking {
            return Ok(());
        }
        let change = if input.speaking {
            TalkingChange::Started
        } else {
            TalkingChange::Stopped
        };
        self.tx
            .send(change)
            .map_err(|_| RenderError::Disconnected("talking indicator"))?;
        self.talking = input.speaking;
        Ok(())
    }
}

// ── Frame Broadcast ────────────────────────────────────

/// Payload published by [`FrameBroadcastRenderer`].
#[derive(Debug, Clone, Serialize)]
pub struct FramePacket {
    pub emotion: Emotion,
    pub speaking: bool,
    pub blend_shapes: BlendShapeFrame,
}

/// Forwards raw frames, e.g. to a 3D model driver.
pub struct FrameBroadcastRenderer {
    tx: watch::Sender<Option<FramePacket>>,
}

impl FrameBroadcastRenderer {
    pub fn new() -> (Self, watch::Receiver<Option<FramePacket>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }
}

impl Renderer for FrameBroadcastRenderer {
    fn name(&self) -> &'static str {
        "frame_broadcast"
    }

    fn render(&mut self, input: &RenderInput<'_>) -> Result<(), RenderError> {
        self.tx
            .send(Some(FramePacket {
                emotion: input.emotion,
                speaking: input.speaking,
                blend_shapes: *input.frame,
            }))
            .map_err(|_| RenderError::Disconnected("frame broadcast"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(frame: &BlendShapeFrame, emotion: Emotion, speaking: bool) -> RenderInput<'_> {
        RenderInput {
            frame,
            emotion,
            speaking,
        }
    }

    #[test]
    fn rest_face_has_symmetric_eyes_and_no_feature() {
        let frame = BlendShapeFrame::at_rest();
        let sketch = FaceSketch::draw(&frame, Emotion::Neutral, false, 400.0, 400.0, "#fff");
        assert_eq!(sketch.eyes[0].rx, sketch.eyes[1].rx);
        assert!((sketch.eyes[0].rx - 32.0).abs() < 1e-3);
        assert_eq!(sketch.inner_mouth, None);
        assert_eq!(sketch.feature, None);
    }

    #[test]
    fn closed_eyes_never_yield_negative_radii() {
        let mut frame = BlendShapeFrame::at_rest();
        frame.set(BlendShape::EyeOpen, -0.02);
        let sketch = FaceSketch::draw(&frame, Emotion::Neutral, false, 400.0, 300.0, "#fff");
        assert_eq!(sketch.eyes[0].rx, 0.0);
        assert_eq!(sketch.pupils[1].ry, 0.0);
    }

    #[test]
    fn smile_lifts_lip_corners_above_center() {
        let mut frame = BlendShapeFrame::at_rest();
        frame.apply_emotion(Emotion::Happy, 1.0);
        let sketch = FaceSketch::draw(&frame, Emotion::Happy, false, 400.0, 400.0, "#fff");
        // Canvas y grows downward: the control point sits above the corners.
        assert!(sketch.lips.control.y < sketch.lips.start.y);
        assert!(matches!(
            sketch.feature,
            Some(EmotionFeature::RosyCheeks { .. })
        ));
    }

    #[test]
    fn open_jaw_shows_inner_mouth() {
        let mut frame = BlendShapeFrame::at_rest();
        frame.set(BlendShape::JawOpen, 0.4);
        let sketch = FaceSketch::draw(&frame, Emotion::Concerned, true, 400.0, 400.0, "#fff");
        assert!(sketch.inner_mouth.is_some());
        assert!(matches!(
            sketch.feature,
            Some(EmotionFeature::ForeheadWrinkle { .. })
        ));
    }

    #[test]
    fn face_sketch_renderer_publishes_latest() {
        let mut renderer = FaceSketchRenderer::new(320.0, 240.0, "#f0f8ff").unwrap();
        let rx = renderer.subscribe();
        let frame = BlendShapeFrame::at_rest();
        renderer.render(&input(&frame, Emotion::Neutral, false)).unwrap();
        let sketch = rx.borrow().clone().unwrap();
        assert_eq!(sketch.width, 320.0);
        assert_eq!(sketch.background, "#f0f8ff");
    }

    #[test]
    fn face_sketch_renderer_rejects_empty_surface() {
        assert!(FaceSketchRenderer::new(0.0, 240.0, "#fff").is_err());
    }

    #[test]
    fn talking_indicator_emits_only_on_transitions() {
        let (mut renderer, mut rx) = TalkingIndicatorRenderer::new();
        let frame = BlendShapeFrame::at_rest();
        for speaking in [false, true, true, true, false, false] {
            renderer.render(&input(&frame, Emotion::Neutral, speaking)).unwrap();
        }
        assert_eq!(rx.try_recv(), Ok(TalkingChange::Started));
        assert_eq!(rx.try_recv(), Ok(TalkingChange::Stopped));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn talking_indicator_reports_disconnect() {
        let (mut renderer, rx) = TalkingIndicatorRenderer::new();
        drop(rx);
        let frame = BlendShapeFrame::at_rest();
        assert_eq!(
            renderer.render(&input(&frame, Emotion::Neutral, true)),
            Err(RenderError::Disconnected("talking indicator"))
        );
    }

    #[test]
    fn frame_broadcast_serializes_packet() {
        let (mut renderer, rx) = FrameBroadcastRenderer::new();
        let mut frame = BlendShapeFrame::at_rest();
        frame.apply_emotion(Emotion::Sad, 1.0);
        renderer.render(&input(&frame, Emotion::Sad, false)).unwrap();
        let packet = rx.borrow().clone().unwrap();
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["emotion"], "sad");
        assert!((json["blend_shapes"]["mouthFrown"].as_f64().unwrap() - 0.6).abs() < 1e-6);
    }
}
