//! Per-frame driver
//!
//! Reads the committed session state without locking, pulls trackables from
//! the gateway only while running, and feeds the pose transformer.

use super::backend::FrontFace;
use super::frame::{FrameRenderer, FrameReport, ViewKind, ViewState};
use crate::pose::{self, PoseTransformer, TrackableResult};
use crate::session::{SessionController, SessionState, StateCell};
use crate::tracker::TrackerGateway;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

pub struct RenderLoop<R: FrameRenderer> {
    state: Arc<StateCell>,
    gateway: Arc<TrackerGateway>,
    mirrored: Arc<AtomicBool>,
    renderer: R,
    transformer: PoseTransformer,
    near_plane: f32,
    far_plane: f32,
    stereo_viewer: bool,
    frames: u64,
}

impl<R: FrameRenderer> RenderLoop<R> {
    pub fn new(controller: &SessionController, renderer: R) -> Self {
        let config = controller.config();
        Self {
            state: controller.state_handle(),
            gateway: controller.gateway(),
            mirrored: controller.mirrored_handle(),
            renderer,
            transformer: PoseTransformer::from_config(config),
            near_plane: config.near_plane,
            far_plane: config.far_plane,
            stereo_viewer: config.stereo_viewer,
            frames: 0,
        }
    }

    /// Render one frame
    pub fn render_frame(&mut self) -> FrameReport {
        self.frames += 1;
        let state = self.state.load();

        let (trackables, calibration) = if state == SessionState::Running {
            (self.gateway.query(), self.gateway.calibration())
        } else {
            (TrackableResult::empty(), None)
        };

        let camera = self.transformer.camera(&trackables, calibration.as_ref());
        let fell_back = camera == pose::fallback_camera();
        // Winding follows the video background, tracked or not
        let front_face = FrontFace::for_reflection(self.mirrored.load(Ordering::SeqCst));
        let scene_scale = (self.stereo_viewer && state == SessionState::Running)
            .then(|| pose::scene_scale_factor(calibration.as_ref()));
        let projection = pose::projection(calibration.as_ref(), self.near_plane, self.far_plane);
        let model = self.transformer.model();

        self.renderer.begin_frame();
        let mut rendered = TrackableResult::empty();
        let mut views = 0;
        for &view in ViewKind::for_device(self.stereo_viewer) {
            if view == ViewKind::PostProcess {
                continue;
            }
            let view_state = ViewState {
                view,
                camera,
                model,
                front_face,
                trackables: &trackables,
            };
            rendered = self.renderer.render_frame(&view_state, &projection);
            views += 1;
        }
        self.renderer.end_frame();

        trace!(frame = self.frames, state = %state, trackables = rendered.len(), "Frame rendered");

        FrameReport {
            frame: self.frames,
            state,
            trackables: rendered.len(),
            last_trackable: rendered.last_trackable_name().map(str::to_string),
            camera,
            fell_back,
            front_face,
            scene_scale,
            views,
        }
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn into_renderer(self) -> R {
        self.renderer
    }
}
