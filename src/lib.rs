//! ar-session: lifecycle orchestration for camera-based AR tracking
//!
//! This crate sits between an opaque tracking engine and an opaque renderer:
//! - A session controller driving engine init, tracker init and data load as
//!   ordered background phases under a lifecycle lock
//! - Best-effort teardown that attempts every cleanup step
//! - A per-frame render loop that reads a lock-free state snapshot
//! - A pure pose transformer turning engine poses into camera parameters

pub mod config;
pub mod engine;
pub mod error;
pub mod pose;
pub mod render;
pub mod session;
pub mod spatial;
pub mod tracker;

// Re-export commonly used types
pub use config::{CameraFacing, ScreenOrientation, SessionConfig, VideoMode};
pub use engine::{SimulatedEngine, TrackingEngine};
pub use error::{ErrorKind, Result, SessionError};
pub use pose::{CameraFrame, PoseSample, TrackableResult};
pub use render::{FrameReport, FrameRenderer, ModelRenderer, RenderBackend, RenderLoop};
pub use session::{
    ChannelReporter, ErrorReporter, LifecycleOp, LifecycleReport, LogReporter, SessionController,
    SessionState,
};
pub use spatial::{Matrix44, Vector3D};
pub use tracker::TrackerGateway;
