//! Tracking engine collaborator
//!
//! The native engine is opaque. The controller only talks to it through
//! [`TrackingEngine`]; every handle it needs is passed in explicitly.

mod simulated;

pub use simulated::{EngineOp, SimulatedEngine};

use crate::config::{CameraFacing, ScreenOrientation, VideoMode};
use crate::pose::{CameraCalibration, PoseSample};
use anyhow::Result;
use std::fmt;
use std::sync::Arc;

/// Opaque handle to a tracker data set owned by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatasetHandle(pub u64);

/// Camera focus modes understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusMode {
    Normal,
    ContinuousAuto,
    Infinity,
    Macro,
}

/// Result of one engine initialization step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitProgress {
    /// Percent complete, initialization is finished at 100
    Progress(u8),
    Failed(InitErrorCode),
}

/// Reasons the engine can refuse to initialize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitErrorCode {
    DeviceNotSupported,
    NoCameraAccess,
    LicenseMissingKey,
    LicenseInvalidKey,
    LicenseNoNetworkTransient,
    LicenseNoNetworkPermanent,
    LicenseCanceledKey,
    LicenseProductTypeMismatch,
    Unknown,
}

impl InitErrorCode {
    /// Map a raw negative engine status to an error code
    pub fn from_status(status: i32) -> Self {
        match status {
            -2 => InitErrorCode::DeviceNotSupported,
            -3 => InitErrorCode::NoCameraAccess,
            -4 => InitErrorCode::LicenseMissingKey,
            -5 => InitErrorCode::LicenseInvalidKey,
            -6 => InitErrorCode::LicenseNoNetworkPermanent,
            -7 => InitErrorCode::LicenseNoNetworkTransient,
            -8 => InitErrorCode::LicenseCanceledKey,
            -9 => InitErrorCode::LicenseProductTypeMismatch,
            _ => InitErrorCode::Unknown,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            InitErrorCode::DeviceNotSupported => "This device is not supported",
            InitErrorCode::NoCameraAccess => "Camera access was denied",
            InitErrorCode::LicenseMissingKey => "License key is missing",
            InitErrorCode::LicenseInvalidKey => "Invalid license key",
            InitErrorCode::LicenseNoNetworkTransient => {
                "Unable to contact the license server, please try again later"
            }
            InitErrorCode::LicenseNoNetworkPermanent => "No network available for license check",
            InitErrorCode::LicenseCanceledKey => "This license key has been cancelled",
            InitErrorCode::LicenseProductTypeMismatch => {
                "License key does not match this product type"
            }
            InitErrorCode::Unknown => "Failed to initialize the tracking engine",
        }
    }
}

impl fmt::Display for InitErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Engine state passed to the per-frame update hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameState {
    /// Monotonic engine frame counter
    pub frame: u64,
    /// Trackables reported for this frame
    pub trackable_count: usize,
    /// Name of the last trackable in engine order
    pub last_trackable: Option<String>,
}

/// Callback invoked by the engine once per processed camera frame
pub type FrameUpdateHook = Arc<dyn Fn(&FrameState) + Send + Sync>;

/// Operations consumed from the native tracking engine.
///
/// Calls may block on hardware, so async callers must run them on a
/// blocking thread. `query_trackables` and `camera_calibration` must be safe
/// to call from the render thread while a lifecycle phase is running.
pub trait TrackingEngine: Send + Sync {
    /// Advance engine initialization by one step
    fn engine_init_step(&self) -> InitProgress;
    fn engine_deinit(&self) -> Result<()>;
    fn engine_pause(&self) -> Result<()>;
    fn engine_resume(&self) -> Result<()>;

    /// Lock the display to an orientation before the engine starts
    fn set_screen_orientation(&self, orientation: ScreenOrientation);
    fn surface_created(&self);
    fn surface_changed(&self, width: u32, height: u32);
    fn configuration_changed(&self);

    fn camera_open(&self, facing: CameraFacing) -> Result<()>;
    fn camera_select_mode(&self, mode: VideoMode) -> Result<()>;
    fn camera_start(&self) -> Result<()>;
    fn camera_stop(&self) -> Result<()>;
    fn camera_deinit(&self) -> Result<()>;
    fn set_focus_mode(&self, mode: FocusMode) -> Result<()>;

    fn tracker_init(&self) -> Result<()>;
    fn tracker_start(&self) -> Result<()>;
    fn tracker_stop(&self) -> Result<()>;
    fn tracker_deinit(&self) -> Result<()>;
    fn set_max_simultaneous_targets(&self, count: u32) -> Result<()>;

    fn dataset_create(&self) -> Result<DatasetHandle>;
    fn dataset_load(&self, handle: DatasetHandle, name: &str) -> Result<()>;
    fn dataset_activate(&self, handle: DatasetHandle) -> Result<()>;
    fn dataset_is_active(&self, handle: DatasetHandle) -> bool;
    fn dataset_deactivate(&self, handle: DatasetHandle) -> Result<()>;
    fn dataset_destroy(&self, handle: DatasetHandle) -> Result<()>;

    /// Trackables for the current camera frame, in engine order
    fn query_trackables(&self) -> Vec<PoseSample>;
    fn camera_calibration(&self) -> Option<CameraCalibration>;

    fn register_update_callback(&self, hook: FrameUpdateHook);
}
