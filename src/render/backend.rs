//! Render backend trait definition

use crate::spatial::{Matrix44, Vector3D};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Triangle winding treated as front-facing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrontFace {
    Clockwise,
    CounterClockwise,
}

impl FrontFace {
    /// Mirrored video flips the winding
    pub fn for_reflection(reflection: bool) -> Self {
        if reflection {
            FrontFace::Clockwise
        } else {
            FrontFace::CounterClockwise
        }
    }
}

/// Backend rendering trait.
///
/// Called only from the render thread and must not block.
pub trait RenderBackend: Send {
    /// Clear color and depth for a new frame
    fn clear(&mut self);

    /// Set the view camera
    fn set_camera(&mut self, position: Vector3D, up: Vector3D, direction: Vector3D, fov: f32);

    /// Set triangle winding; most backends can ignore this
    fn set_front_face(&mut self, _face: FrontFace) {}

    /// Draw the model with the given object transform
    fn draw_model(&mut self, transform: &Matrix44);

    /// Present the finished frame
    fn present(&mut self);
}

/// Backend that only logs what it is asked to draw
#[derive(Debug, Default)]
pub struct LogBackend {
    frames: u64,
    draws: u64,
}

impl LogBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn draws(&self) -> u64 {
        self.draws
    }
}

impl RenderBackend for LogBackend {
    fn clear(&mut self) {}

    fn set_camera(&mut self, position: Vector3D, up: Vector3D, direction: Vector3D, fov: f32) {
        debug!(
            position = ?(position.x, position.y, position.z),
            up = ?(up.x, up.y, up.z),
            direction = ?(direction.x, direction.y, direction.z),
            fov_deg = fov.to_degrees(),
            "Camera updated"
        );
    }

    fn draw_model(&mut self, _transform: &Matrix44) {
        self.draws += 1;
    }

    fn present(&mut self) {
        self.frames += 1;
    }
}
