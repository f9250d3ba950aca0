//! Pose samples reported by the tracking engine and the camera they produce.

mod transformer;

pub use transformer::{
    camera_from_pose, compensate_reflection, fallback_camera, field_of_view, model_transform,
    projection, scene_scale_factor, PoseTransformer, DEFAULT_FOV_RADIANS, FALLBACK_POSITION,
    FALLBACK_TARGET, VIRTUAL_FOV_Y_DEGREES,
};

use crate::spatial::{Matrix44, Vector3D};
use serde::{Deserialize, Serialize};

/// One trackable's pose for the current frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    /// Engine-assigned trackable id
    pub id: i32,
    /// Trackable name from the loaded data set
    pub name: String,
    /// Raw engine pose, row-major
    pub matrix: Matrix44,
    /// Video background is mirrored (front-facing camera)
    pub reflection: bool,
}

impl PoseSample {
    pub fn new(id: i32, name: impl Into<String>, matrix: Matrix44) -> Self {
        Self {
            id,
            name: name.into(),
            matrix,
            reflection: false,
        }
    }

    pub fn with_reflection(mut self, reflection: bool) -> Self {
        self.reflection = reflection;
        self
    }
}

/// Trackables detected in one frame, in engine order.
///
/// The first element places the camera; nothing carries over between frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackableResult {
    samples: Vec<PoseSample>,
}

impl TrackableResult {
    pub fn new(samples: Vec<PoseSample>) -> Self {
        Self { samples }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Authoritative sample for camera placement
    pub fn primary(&self) -> Option<&PoseSample> {
        self.samples.first()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PoseSample> {
        self.samples.iter()
    }

    /// Name of the last trackable reported this frame
    pub fn last_trackable_name(&self) -> Option<&str> {
        self.samples.last().map(|s| s.name.as_str())
    }
}

impl From<Vec<PoseSample>> for TrackableResult {
    fn from(samples: Vec<PoseSample>) -> Self {
        Self::new(samples)
    }
}

/// Intrinsics of the physical camera
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    /// Sensor image size in pixels (width, height)
    pub size: [f32; 2],
    /// Focal length in pixels (x, y)
    pub focal_length: [f32; 2],
    /// Principal point in pixels (x, y)
    pub principal_point: [f32; 2],
    /// Physical field of view in radians (x, y)
    pub field_of_view_rads: [f32; 2],
}

impl CameraCalibration {
    /// Pinhole calibration centered on the image, field of view derived from focal length
    pub fn pinhole(width: f32, height: f32, focal_x: f32, focal_y: f32) -> Self {
        Self {
            size: [width, height],
            focal_length: [focal_x, focal_y],
            principal_point: [width * 0.5, height * 0.5],
            field_of_view_rads: [
                2.0 * (0.5 * width / focal_x).atan(),
                2.0 * (0.5 * height / focal_y).atan(),
            ],
        }
    }
}

/// Camera placement handed to the renderer for one frame.
///
/// Always fully populated; produced fresh every frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraFrame {
    pub position: Vector3D,
    pub up: Vector3D,
    pub direction: Vector3D,
    /// Field of view in radians
    pub fov: f32,
}
