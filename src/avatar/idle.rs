//! Idle motion: blinking, breathing, fidgeting and micro-expressions.
//!
//! Keeps the face from looking frozen between expressions. Everything here
//! is small and random; the next tick's relaxation pulls it back, so noise
//! never accumulates.

use rand::Rng;
use std::time::Duration;

use super::blend_shapes::{BlendShape, BlendShapeFrame};
use super::config::AnimationParameters;

pub struct IdleMotion {
    params: AnimationParameters,
    /// When the eyes reopen after a blink, measured from engine start.
    blink_restore_at: Option<Duration>,
}

impl IdleMotion {
    pub fn new(params: AnimationParameters) -> Self {
        Self {
            params,
            blink_restore_at: None,
        }
    }

    pub fn is_blinking(&self) -> bool {
        self.blink_restore_at.is_some()
    }

    /// Fire the pending blink restore if its deadline has passed.
    ///
    /// Runs ahead of the tick body, like a timer callback that fired
    /// between frames.
    pub fn run_scheduled(&mut self, frame: &mut BlendShapeFrame, now: Duration) {
        if let Some(at) = self.blink_restore_at {
            if now >= at {
                frame.set(BlendShape::EyeOpen, 1.0);
                self.blink_restore_at = None;
            }
        }
    }

    /// Blink, breathe and fidget for this tick.
    pub fn perform<R: Rng + ?Sized>(
        &mut self,
        frame: &mut BlendShapeFrame,
        now: Duration,
        rng: &mut R,
    ) {
        let p = &self.params;

        if rng.gen::<f32>() < p.blink_rate {
            frame.set(BlendShape::EyeOpen, 0.0);
            self.blink_restore_at = Some(now + p.blink_duration());
        }

        let now_ms = now.as_secs_f64() * 1000.0;
        let breath = (now_ms * 0.001 * p.breathing_rate as f64).sin() as f32;
        frame.add(BlendShape::JawOpen, breath * p.breathing_depth);

        if rng.gen::<f32>() < p.fidget_rate {
            frame.add(BlendShape::EyeLookUp, symmetric(rng, p.fidget_amount));
            frame.add(BlendShape::EyeLookLeft, symmetric(rng, p.fidget_amount));
        }
    }

    /// Occasional tiny perturbation on every parameter.
    pub fn add_micro_expressions<R: Rng + ?Sized>(&self, frame: &mut BlendShapeFrame, rng: &mut R) {
        for shape in BlendShape::ALL {
            if rng.gen::<f32>() < self.params.micro_rate {
                frame.add(shape, symmetric(rng, self.params.micro_amount));
            }
        }
    }
}

/// Uniform sample in [-amount, amount).
fn symmetric<R: Rng + ?Sized>(rng: &mut R, amount: f32) -> f32 {
    (rng.gen::<f32>() * 2.0 - 1.0) * amount
}
