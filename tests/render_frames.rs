use ar_session::engine::{EngineOp, SimulatedEngine};
use ar_session::pose::{fallback_camera, CameraCalibration};
use ar_session::render::{FrontFace, RenderBackend};
use ar_session::{
    CameraFacing, ChannelReporter, LifecycleReport, Matrix44, ModelRenderer, PoseSample,
    RenderLoop, SessionConfig, SessionController, SessionState, Vector3D,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

const EPS: f32 = 1e-4;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Clear,
    Camera {
        position: Vector3D,
        up: Vector3D,
        direction: Vector3D,
        fov: f32,
    },
    FrontFace(FrontFace),
    Draw(Matrix44),
    Present,
}

#[derive(Default)]
struct RecordingBackend {
    calls: Vec<Call>,
}

impl RecordingBackend {
    fn last_camera(&self) -> Option<(Vector3D, Vector3D, Vector3D, f32)> {
        self.calls.iter().rev().find_map(|call| match call {
            Call::Camera {
                position,
                up,
                direction,
                fov,
            } => Some((*position, *up, *direction, *fov)),
            _ => None,
        })
    }
}

impl RenderBackend for RecordingBackend {
    fn clear(&mut self) {
        self.calls.push(Call::Clear);
    }

    fn set_camera(&mut self, position: Vector3D, up: Vector3D, direction: Vector3D, fov: f32) {
        self.calls.push(Call::Camera {
            position,
            up,
            direction,
            fov,
        });
    }

    fn set_front_face(&mut self, face: FrontFace) {
        self.calls.push(Call::FrontFace(face));
    }

    fn draw_model(&mut self, transform: &Matrix44) {
        self.calls.push(Call::Draw(*transform));
    }

    fn present(&mut self) {
        self.calls.push(Call::Present);
    }
}

fn known_pose() -> Matrix44 {
    Matrix44::from_row_major([
        1.0, 0.0, 0.0, 10.0, //
        0.0, 1.0, 0.0, 20.0, //
        0.0, 0.0, 1.0, 500.0, //
        0.0, 0.0, 0.0, 1.0,
    ])
}

fn session(
    engine: SimulatedEngine,
    config: SessionConfig,
) -> (
    Arc<SimulatedEngine>,
    SessionController,
    UnboundedReceiver<LifecycleReport>,
) {
    let engine = Arc::new(engine);
    let (reporter, rx) = ChannelReporter::new();
    let controller = SessionController::new(engine.clone(), config, Arc::new(reporter)).unwrap();
    (engine, controller, rx)
}

async fn until_ready(controller: &SessionController, rx: &mut UnboundedReceiver<LifecycleReport>) {
    controller.initialize().await.unwrap();
    let report = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(report.is_ok(), "{:?}", report.error);
}

#[tokio::test]
async fn test_end_to_end_session() {
    let engine =
        SimulatedEngine::new().with_trackables(vec![PoseSample::new(7, "stones", known_pose())]);
    let (engine, controller, mut rx) = session(engine, SessionConfig::default());

    until_ready(&controller, &mut rx).await;
    controller.start(CameraFacing::Default).await.unwrap();
    assert_eq!(controller.state(), SessionState::Running);

    let mut render_loop = RenderLoop::new(&controller, ModelRenderer::new(RecordingBackend::default()));
    let report = render_loop.render_frame();

    assert_eq!(report.state, SessionState::Running);
    assert_eq!(report.trackables, 1);
    assert_eq!(report.last_trackable.as_deref(), Some("stones"));
    assert!(!report.fell_back);
    assert_eq!(report.front_face, FrontFace::CounterClockwise);

    let backend = render_loop.renderer().backend();
    let (position, up, direction, fov) = backend.last_camera().unwrap();
    assert!(position.approx_eq(&Vector3D::new(-20.0, 10.0, -500.0), EPS));
    assert!(up.approx_eq(&Vector3D::new(1.0, 0.0, 0.0), EPS));
    assert!(direction.approx_eq(&Vector3D::new(0.0, 0.0, 1.0), EPS));
    assert!((fov - 60f32.to_radians()).abs() < EPS);
    assert_eq!(backend.calls.first(), Some(&Call::Clear));
    assert_eq!(backend.calls.last(), Some(&Call::Present));
    assert!(controller.frames_processed() >= 1);

    controller.pause().await.unwrap();
    assert_eq!(controller.state(), SessionState::Paused);
    assert!(!engine.camera_running());

    // Paused frames skip tracking
    let queries = engine.call_count(EngineOp::QueryTrackables);
    let paused = render_loop.render_frame();
    assert!(paused.fell_back);
    assert_eq!(engine.call_count(EngineOp::QueryTrackables), queries);

    controller.stop().await.unwrap();
    assert_eq!(controller.state(), SessionState::Stopped);
    assert_eq!(engine.call_count(EngineOp::DatasetDestroy), 1);
    assert_eq!(engine.call_count(EngineOp::TrackerDeinit), 1);
    assert_eq!(engine.call_count(EngineOp::EngineDeinit), 1);
}

#[tokio::test]
async fn test_front_camera_flips_winding() {
    let engine =
        SimulatedEngine::new().with_trackables(vec![PoseSample::new(7, "stones", known_pose())]);
    let config = SessionConfig {
        camera_facing: CameraFacing::Front,
        ..Default::default()
    };
    let (_engine, controller, mut rx) = session(engine, config);
    until_ready(&controller, &mut rx).await;
    controller.start(CameraFacing::Front).await.unwrap();

    let mut render_loop = RenderLoop::new(&controller, ModelRenderer::new(RecordingBackend::default()));
    let report = render_loop.render_frame();

    assert_eq!(report.front_face, FrontFace::Clockwise);
    assert!(report
        .camera
        .position
        .approx_eq(&Vector3D::new(-20.0, -10.0, -500.0), EPS));
    let backend = render_loop.renderer().backend();
    assert!(backend.calls.contains(&Call::FrontFace(FrontFace::Clockwise)));
}

#[tokio::test]
async fn test_no_trackables_falls_back_while_running() {
    let (_engine, controller, mut rx) = session(SimulatedEngine::new(), SessionConfig::default());
    until_ready(&controller, &mut rx).await;
    controller.start(CameraFacing::Back).await.unwrap();

    let mut render_loop = RenderLoop::new(&controller, ModelRenderer::new(RecordingBackend::default()));
    let first = render_loop.render_frame();
    let second = render_loop.render_frame();

    assert!(first.fell_back);
    assert_eq!(first.camera, fallback_camera());
    assert_eq!(second.camera, first.camera);
    assert_eq!(first.last_trackable, None);
}

#[tokio::test]
async fn test_stereo_scene_scale() {
    let mut calibration = CameraCalibration::pinhole(640.0, 480.0, 554.256, 554.256);
    calibration.field_of_view_rads[1] = 60f32.to_radians();
    let engine = SimulatedEngine::new().with_calibration(Some(calibration));
    let config = SessionConfig {
        stereo_viewer: true,
        ..Default::default()
    };
    let (_engine, controller, mut rx) = session(engine, config);
    until_ready(&controller, &mut rx).await;
    controller.start(CameraFacing::Back).await.unwrap();

    let mut render_loop = RenderLoop::new(&controller, ModelRenderer::new(RecordingBackend::default()));
    let report = render_loop.render_frame();

    assert_eq!(report.views, 2);
    let scale = report.scene_scale.unwrap();
    assert!((scale - 0.630).abs() < 1e-3);

    let draws = render_loop
        .renderer()
        .backend()
        .calls
        .iter()
        .filter(|c| matches!(c, Call::Draw(_)))
        .count();
    assert_eq!(draws, 2);
}

#[tokio::test]
async fn test_missing_calibration_is_not_reported() {
    let engine = SimulatedEngine::new()
        .with_calibration(None)
        .with_trackables(vec![PoseSample::new(1, "chips", known_pose())]);
    let config = SessionConfig {
        stereo_viewer: true,
        ..Default::default()
    };
    let (_engine, controller, mut rx) = session(engine, config);
    until_ready(&controller, &mut rx).await;
    controller.start(CameraFacing::Back).await.unwrap();
    rx.recv().await.unwrap();

    let mut render_loop = RenderLoop::new(&controller, ModelRenderer::new(RecordingBackend::default()));
    let report = render_loop.render_frame();

    assert_eq!(report.scene_scale, Some(0.0));
    assert!(!report.fell_back);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_front_camera_winding_without_trackables() {
    let (_engine, controller, mut rx) = session(SimulatedEngine::new(), SessionConfig::default());
    until_ready(&controller, &mut rx).await;
    controller.start(CameraFacing::Front).await.unwrap();

    let mut render_loop = RenderLoop::new(&controller, ModelRenderer::new(RecordingBackend::default()));
    let report = render_loop.render_frame();

    assert!(report.fell_back);
    assert_eq!(report.front_face, FrontFace::Clockwise);

    controller.stop().await.unwrap();
    let report = render_loop.render_frame();
    assert_eq!(report.front_face, FrontFace::CounterClockwise);
}
