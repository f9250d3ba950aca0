//! Per-view rendering capability

use super::backend::{FrontFace, RenderBackend};
use crate::pose::{CameraFrame, TrackableResult};
use crate::session::SessionState;
use crate::spatial::Matrix44;
use serde::{Deserialize, Serialize};

/// Logical view rendered within one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Mono,
    LeftEye,
    RightEye,
    /// Distortion pass of a stereo viewer, never drawn into
    PostProcess,
}

impl ViewKind {
    /// Views the device reports for one frame
    pub fn for_device(stereo_viewer: bool) -> &'static [ViewKind] {
        if stereo_viewer {
            &[ViewKind::LeftEye, ViewKind::RightEye, ViewKind::PostProcess]
        } else {
            &[ViewKind::Mono]
        }
    }
}

/// Everything a renderer needs to draw one view
#[derive(Debug, Clone)]
pub struct ViewState<'a> {
    pub view: ViewKind,
    pub camera: CameraFrame,
    pub model: Matrix44,
    pub front_face: FrontFace,
    pub trackables: &'a TrackableResult,
}

/// Renderer invoked once per logical view per frame.
///
/// Returns the trackables it rendered for that view.
pub trait FrameRenderer: Send {
    fn begin_frame(&mut self) {}

    fn render_frame(&mut self, state: &ViewState<'_>, projection: &Matrix44) -> TrackableResult;

    fn end_frame(&mut self) {}
}

/// Draws the static model through a [`RenderBackend`]
pub struct ModelRenderer<B: RenderBackend> {
    backend: B,
}

impl<B: RenderBackend> ModelRenderer<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }
}

impl<B: RenderBackend> FrameRenderer for ModelRenderer<B> {
    fn begin_frame(&mut self) {
        self.backend.clear();
    }

    fn render_frame(&mut self, state: &ViewState<'_>, _projection: &Matrix44) -> TrackableResult {
        let camera = &state.camera;
        self.backend.set_front_face(state.front_face);
        self.backend
            .set_camera(camera.position, camera.up, camera.direction, camera.fov);
        self.backend.draw_model(&state.model);
        state.trackables.clone()
    }

    fn end_frame(&mut self) {
        self.backend.present();
    }
}

/// Diagnostics for one rendered frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame: u64,
    /// State snapshot the frame was rendered under
    pub state: SessionState,
    pub trackables: usize,
    pub last_trackable: Option<String>,
    pub camera: CameraFrame,
    /// Camera came from the fallback rather than a pose
    pub fell_back: bool,
    pub front_face: FrontFace,
    /// Only computed for stereo viewers while running
    pub scene_scale: Option<f32>,
    pub views: usize,
}
