//! Blend-shape frame: the per-tick facial parameters handed to renderers.
//!
//! Each [`BlendShape`] drives one localized deformation. Values generally
//! live in [0, 1] but may exceed it briefly (surprise widens the eyes past
//! their resting openness). Every tick the frame is first relaxed toward
//! rest, then the current emotion and the speech overlay are written on top.

use super::emotion::Emotion;
use serde::{Serialize, Serializer};
use std::ops::{Index, IndexMut};

/// Named facial controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BlendShape {
    BrowInnerUp,
    BrowOuterUp,
    BrowDown,
    EyeOpen,
    EyeSquint,
    EyeLookUp,
    EyeLookDown,
    EyeLookLeft,
    EyeLookRight,
    MouthClose,
    MouthOpen,
    MouthSmile,
    MouthFrown,
    JawOpen,
    CheekPuff,
    NoseSneer,
}

const SHAPE_COUNT: usize = 16;

impl BlendShape {
    pub const ALL: [BlendShape; SHAPE_COUNT] = [
        BlendShape::BrowInnerUp,
        BlendShape::BrowOuterUp,
        BlendShape::BrowDown,
        BlendShape::EyeOpen,
        BlendShape::EyeSquint,
        BlendShape::EyeLookUp,
        BlendShape::EyeLookDown,
        BlendShape::EyeLookLeft,
        BlendShape::EyeLookRight,
        BlendShape::MouthClose,
        BlendShape::MouthOpen,
        BlendShape::MouthSmile,
        BlendShape::MouthFrown,
        BlendShape::JawOpen,
        BlendShape::CheekPuff,
        BlendShape::NoseSneer,
    ];

    /// Resting value: eyes open, everything else relaxed.
    pub fn rest_value(self) -> f32 {
        match self {
            BlendShape::EyeOpen => 1.0,
            _ => 0.0,
        }
    }
}

/// Emotion-specific offsets from rest, before scaling by the emotion score.
pub fn emotion_offsets(emotion: Emotion) -> &'static [(BlendShape, f32)] {
    use BlendShape::*;
    match emotion {
        Emotion::Happy => &[(MouthSmile, 0.7), (BrowInnerUp, 0.3), (EyeSquint, 0.3)],
        Emotion::Sad => &[(MouthFrown, 0.6), (BrowInnerUp, 0.4), (BrowOuterUp, -0.2)],
        Emotion::Surprised => &[
            (EyeOpen, 0.5),
            (BrowInnerUp, 0.7),
            (BrowOuterUp, 0.7),
            (JawOpen, 0.3),
        ],
        Emotion::Concerned => &[(BrowInnerUp, 0.5), (BrowDown, 0.3), (MouthClose, 0.2)],
        Emotion::Thoughtful => &[(EyeLookUp, 0.3), (BrowOuterUp, 0.2), (MouthClose, 0.1)],
        Emotion::Neutral => &[],
    }
}

/// One value per [`BlendShape`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendShapeFrame {
    values: [f32; SHAPE_COUNT],
}

impl Default for BlendShapeFrame {
    fn default() -> Self {
        Self::at_rest()
    }
}

impl BlendShapeFrame {
    pub fn at_rest() -> Self {
        let mut values = [0.0; SHAPE_COUNT];
        for shape in BlendShape::ALL {
            values[shape as usize] = shape.rest_value();
        }
        Self { values }
    }

    pub fn get(&self, shape: BlendShape) -> f32 {
        self.values[shape as usize]
    }

    pub fn set(&mut self, shape: BlendShape, value: f32) {
        self.values[shape as usize] = value;
    }

    pub fn add(&mut self, shape: BlendShape, delta: f32) {
        self.values[shape as usize] += delta;
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlendShape, f32)> + '_ {
        BlendShape::ALL.iter().map(move |s| (*s, self.get(*s)))
    }

    /// Distance of a parameter from its rest value.
    pub fn displacement(&self, shape: BlendShape) -> f32 {
        (self.get(shape) - shape.rest_value()).abs()
    }

    /// Move every parameter toward rest by `factor` of the remaining distance.
    pub fn relax(&mut self, factor: f32) {
        for shape in BlendShape::ALL {
            let rest = shape.rest_value();
            let v = &mut self.values[shape as usize];
            *v += (rest - *v) * factor;
        }
    }

    /// Write the emotion's expression as `rest + offset * score`.
    pub fn apply_emotion(&mut self, emotion: Emotion, score: f32) {
        for (shape, offset) in emotion_offsets(emotion) {
            self.set(*shape, shape.rest_value() + offset * score);
        }
    }

    /// Lip movement while speaking; overrides jaw and mouth openness.
    pub fn apply_speech(&mut self, elapsed_ms: f64, amplitude: f32) {
        let talking = ((elapsed_ms * 0.01).sin() as f32 * amplitude).max(0.0);
        self.set(BlendShape::JawOpen, 0.2 + talking);
        self.set(BlendShape::MouthOpen, 0.3 + talking);
    }

    /// First parameter holding a NaN or infinite value, if any.
    pub fn first_non_finite(&self) -> Option<BlendShape> {
        self.iter().find(|(_, v)| !v.is_finite()).map(|(s, _)| s)
    }
}

impl Index<BlendShape> for BlendShapeFrame {
    type Output = f32;

    fn index(&self, shape: BlendShape) -> &f32 {
        &self.values[shape as usize]
    }
}

impl IndexMut<BlendShape> for BlendShapeFrame {
    fn index_mut(&mut self, shape: BlendShape) -> &mut f32 {
        &mut self.values[shape as usize]
    }
}

impl Serialize for BlendShapeFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}
