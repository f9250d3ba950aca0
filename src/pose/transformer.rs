//! Pose-to-camera transform
//!
//! Everything here is a pure function of its inputs so the render thread can
//! call it without locking. Failures fall back to a fixed camera instead of
//! erroring.

use super::{CameraCalibration, CameraFrame, PoseSample, TrackableResult};
use crate::config::SessionConfig;
use crate::error::ErrorKind;
use crate::spatial::{Matrix44, Vector3D};
use tracing::{debug, warn};

/// Fallback camera eye, far outside the scene
pub const FALLBACK_POSITION: Vector3D = Vector3D::new(100.0, 100.0, 100.0);
/// Fallback camera target
pub const FALLBACK_TARGET: Vector3D = Vector3D::new(1000.0, 1000.0, 1000.0);
/// Field of view used when no calibration is available (60°)
pub const DEFAULT_FOV_RADIANS: f32 = std::f32::consts::FRAC_PI_3;
/// Vertical field of view of the virtual scene camera on stereo viewers
pub const VIRTUAL_FOV_Y_DEGREES: f32 = 85.0;

/// Fixed camera used whenever there is nothing to track.
///
/// Looks from [`FALLBACK_POSITION`] toward [`FALLBACK_TARGET`] with world up
/// re-orthogonalized, so the result never depends on earlier frames.
pub fn fallback_camera() -> CameraFrame {
    let direction = (FALLBACK_TARGET - FALLBACK_POSITION).normalize();
    let right = direction.cross(&Vector3D::UP);
    let up = right.cross(&direction).normalize();

    CameraFrame {
        position: FALLBACK_POSITION,
        up,
        direction,
        fov: DEFAULT_FOV_RADIANS,
    }
}

/// Swap the first two columns of the pose to undo the engine's axis convention.
///
/// The back camera also negates the swapped-in second column; the front
/// camera does not, which compensates for its mirrored video.
pub fn compensate_reflection(pose: &Matrix44, reflection: bool) -> Matrix44 {
    let raw = pose.as_array();
    let sign = if reflection { 1.0 } else { -1.0 };

    let mut out = [0.0f32; 16];
    for row in 0..4 {
        let base = row * 4;
        out[base] = raw[base + 1];
        out[base + 1] = sign * raw[base];
        out[base + 2] = raw[base + 2];
        out[base + 3] = raw[base + 3];
    }
    Matrix44::from_row_major(out)
}

/// Horizontal field of view from sensor width and focal length
pub fn field_of_view(calibration: &CameraCalibration) -> Option<f32> {
    let width = calibration.size[0];
    let focal_x = calibration.focal_length[0];
    if !(focal_x > 0.0) || !(width > 0.0) {
        return None;
    }
    Some(2.0 * (0.5 * width / focal_x).atan())
}

/// Camera for the current frame.
///
/// With no pose, or with a pose that cannot be inverted, the fallback camera
/// is returned whole; a partially written camera is never produced.
pub fn camera_from_pose(
    pose: Option<&PoseSample>,
    calibration: Option<&CameraCalibration>,
) -> CameraFrame {
    let Some(pose) = pose else {
        return fallback_camera();
    };

    let rotated = compensate_reflection(&pose.matrix, pose.reflection);
    let Some(inverse) = rotated.inverse() else {
        debug!(trackable = %pose.name, "Pose matrix is singular, using fallback camera");
        return fallback_camera();
    };
    let view = inverse.transpose();

    let position = view.row_xyz(3);
    let up = view.row_xyz(1);
    let direction = view.row_xyz(2);
    if !(position.is_finite() && up.is_finite() && direction.is_finite()) {
        debug!(trackable = %pose.name, "Pose produced non-finite camera, using fallback camera");
        return fallback_camera();
    }

    let fov = match calibration.and_then(field_of_view) {
        Some(fov) => fov,
        None => {
            debug!(
                kind = %ErrorKind::CalibrationUnavailable,
                "No usable camera calibration, keeping default field of view"
            );
            DEFAULT_FOV_RADIANS
        }
    };

    CameraFrame {
        position,
        up,
        direction,
        fov,
    }
}

/// Scale applied to the video background on stereo viewers.
///
/// Ratio of the physical and virtual half-angle tangents. Returns 0 when the
/// calibration is missing.
pub fn scene_scale_factor(calibration: Option<&CameraCalibration>) -> f32 {
    let Some(calibration) = calibration else {
        warn!(
            kind = %ErrorKind::CalibrationUnavailable,
            "Cannot compute scene scale factor, camera calibration is invalid"
        );
        return 0.0;
    };

    let camera_fov_y = calibration.field_of_view_rads[1];
    let virtual_fov_y = VIRTUAL_FOV_Y_DEGREES.to_radians();

    (camera_fov_y / 2.0).tan() / (virtual_fov_y / 2.0).tan()
}

/// Static model placement: quarter turn about X, then uniform scale.
///
/// This follows the authored orientation of the asset and ignores tracking.
pub fn model_transform(scale: f32) -> Matrix44 {
    Matrix44::rotation_x(90f32.to_radians()) * Matrix44::uniform_scale(scale)
}

/// Projection for one view.
///
/// Built from the camera intrinsics (the engine looks down +Z) when
/// available, otherwise a symmetric frustum with the default field of view.
pub fn projection(calibration: Option<&CameraCalibration>, near: f32, far: f32) -> Matrix44 {
    let depth = far - near;
    let z_scale = (far + near) / depth;
    let z_offset = -2.0 * far * near / depth;

    match calibration {
        Some(c) if c.size[0] > 0.0 && c.size[1] > 0.0 => {
            let [w, h] = c.size;
            let [fx, fy] = c.focal_length;
            let [cx, cy] = c.principal_point;
            Matrix44::from_row_major([
                2.0 * fx / w, 0.0, 2.0 * cx / w - 1.0, 0.0, //
                0.0, -2.0 * fy / h, 1.0 - 2.0 * cy / h, 0.0, //
                0.0, 0.0, z_scale, z_offset, //
                0.0, 0.0, 1.0, 0.0,
            ])
        }
        _ => {
            let f = 1.0 / (DEFAULT_FOV_RADIANS / 2.0).tan();
            Matrix44::from_row_major([
                f, 0.0, 0.0, 0.0, //
                0.0, f, 0.0, 0.0, //
                0.0, 0.0, z_scale, z_offset, //
                0.0, 0.0, 1.0, 0.0,
            ])
        }
    }
}

/// Render-side handle bundling the static model scale with the transform functions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseTransformer {
    model_scale: f32,
}

impl PoseTransformer {
    pub fn new(model_scale: f32) -> Self {
        Self { model_scale }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.model_scale)
    }

    /// Camera placed by the first trackable, or the fallback camera
    pub fn camera(
        &self,
        trackables: &TrackableResult,
        calibration: Option<&CameraCalibration>,
    ) -> CameraFrame {
        camera_from_pose(trackables.primary(), calibration)
    }

    pub fn model(&self) -> Matrix44 {
        model_transform(self.model_scale)
    }
}

impl Default for PoseTransformer {
    fn default() -> Self {
        Self::new(SessionConfig::default().model_scale)
    }
}
