use ar_session::engine::{EngineOp, SimulatedEngine};
use ar_session::{
    CameraFacing, ChannelReporter, ErrorKind, LifecycleOp, LifecycleReport, SessionConfig,
    SessionController, SessionState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

fn session(
    engine: SimulatedEngine,
) -> (
    Arc<SimulatedEngine>,
    SessionController,
    UnboundedReceiver<LifecycleReport>,
) {
    let engine = Arc::new(engine);
    let (reporter, rx) = ChannelReporter::new();
    let controller =
        SessionController::new(engine.clone(), SessionConfig::default(), Arc::new(reporter))
            .unwrap();
    (engine, controller, rx)
}

async fn next_report(rx: &mut UnboundedReceiver<LifecycleReport>) -> LifecycleReport {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for report")
        .expect("reporter dropped")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_phases_never_overlap() {
    let engine = SimulatedEngine::new().with_phase_delay(Duration::from_millis(5));
    let (engine, controller, _rx) = session(engine);

    controller.initialize().await.unwrap();
    // Hammer the controller while the chain runs
    let _ = controller.initialize().await;
    let _ = controller.resume().await;

    controller
        .wait_for_state(|s| *s == SessionState::Ready || s.is_failed())
        .await;
    controller.start(CameraFacing::Back).await.unwrap();
    controller.pause().await.unwrap();
    controller.resume().await.unwrap();
    let _ = controller.resume().await;
    controller.stop().await.unwrap();

    assert_eq!(engine.max_in_flight(), 1);
}

#[tokio::test]
async fn test_second_initialize_leaves_first_chain_alone() {
    let engine = SimulatedEngine::new().with_phase_delay(Duration::from_millis(10));
    let (engine, controller, mut rx) = session(engine);

    controller.initialize().await.unwrap();
    let err = controller.initialize().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyInitialized);

    let rejected = next_report(&mut rx).await;
    assert_eq!(rejected.error.map(|e| e.kind()), Some(ErrorKind::AlreadyInitialized));

    let first = next_report(&mut rx).await;
    assert_eq!(first.op, LifecycleOp::Initialize);
    assert!(first.is_ok(), "{:?}", first.error);
    assert_eq!(controller.state(), SessionState::Ready);
    assert_eq!(engine.call_count(EngineOp::TrackerInit), 1);
    assert_eq!(engine.call_count(EngineOp::DatasetLoad), 1);
}

#[tokio::test]
async fn test_init_failure_short_circuits() {
    let (engine, controller, mut rx) =
        session(SimulatedEngine::new().fail_on(EngineOp::TrackerInit));

    controller.initialize().await.unwrap();
    let report = next_report(&mut rx).await;
    assert_eq!(report.error.map(|e| e.kind()), Some(ErrorKind::TrackerInitFailure));
    assert_eq!(
        controller.state(),
        SessionState::Failed(ErrorKind::TrackerInitFailure)
    );
    assert_eq!(engine.call_count(EngineOp::DatasetCreate), 0);
    assert!(!engine.has_update_callback());

    // Exactly one report for the chain
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_data_load_failure_reports_kind() {
    let (_engine, controller, mut rx) =
        session(SimulatedEngine::new().fail_on(EngineOp::DatasetLoad));

    controller.initialize().await.unwrap();
    let err = next_report(&mut rx).await.error.unwrap();
    assert_eq!(err.kind(), ErrorKind::DataLoadFailure);
    assert!(err.message().contains("StonesAndChips.xml"));
}

async fn assert_full_teardown(fail: Option<EngineOp>) {
    let mut engine = SimulatedEngine::new();
    if let Some(op) = fail {
        engine = engine.fail_on(op);
    }
    let (engine, controller, mut rx) = session(engine);
    controller.initialize().await.unwrap();
    next_report(&mut rx).await;

    let outcome = controller.stop().await;
    let expected = match fail {
        Some(EngineOp::DatasetDeactivate) | Some(EngineOp::DatasetDestroy) => {
            Some(ErrorKind::DataUnloadFailure)
        }
        Some(EngineOp::TrackerDeinit) => Some(ErrorKind::TrackerDeinitFailure),
        _ => None,
    };
    assert_eq!(outcome.err().map(|e| e.kind()), expected, "fail = {:?}", fail);

    let unload_attempts = engine.call_count(EngineOp::DatasetDeactivate)
        + engine.call_count(EngineOp::DatasetDestroy);
    assert!(unload_attempts >= 1);
    assert_eq!(engine.call_count(EngineOp::TrackerDeinit), 1);
    assert_eq!(engine.call_count(EngineOp::EngineDeinit), 1);
    assert_eq!(controller.state(), SessionState::Stopped);

    let report = next_report(&mut rx).await;
    assert_eq!(report.op, LifecycleOp::Stop);
    assert_eq!(report.error.map(|e| e.kind()), expected);
}

#[tokio::test]
async fn test_stop_attempts_every_teardown_step() {
    for fail in [
        None,
        Some(EngineOp::DatasetDeactivate),
        Some(EngineOp::DatasetDestroy),
        Some(EngineOp::TrackerDeinit),
        Some(EngineOp::EngineDeinit),
    ] {
        assert_full_teardown(fail).await;
    }
}

#[tokio::test]
async fn test_duplicate_resume_runs_once() {
    let engine = SimulatedEngine::new().with_phase_delay(Duration::from_millis(50));
    let (engine, controller, mut rx) = session(engine);
    controller.initialize().await.unwrap();
    next_report(&mut rx).await;
    controller.start(CameraFacing::Back).await.unwrap();
    controller.pause().await.unwrap();
    next_report(&mut rx).await;
    next_report(&mut rx).await;

    controller.resume().await.unwrap();
    controller.resume().await.unwrap();

    let report = next_report(&mut rx).await;
    assert_eq!(report.op, LifecycleOp::Resume);
    assert!(report.is_ok(), "{:?}", report.error);
    assert_eq!(engine.call_count(EngineOp::EngineResume), 1);
    assert_eq!(controller.state(), SessionState::Running);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_pause_requires_running() {
    let (_engine, controller, mut rx) = session(SimulatedEngine::new());
    controller.initialize().await.unwrap();
    next_report(&mut rx).await;

    let err = controller.pause().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
    assert_eq!(controller.state(), SessionState::Ready);
}

#[tokio::test]
async fn test_stop_during_resume_waits_then_tears_down() {
    let engine = SimulatedEngine::new().with_phase_delay(Duration::from_millis(20));
    let (engine, controller, mut rx) = session(engine);
    controller.initialize().await.unwrap();
    next_report(&mut rx).await;
    controller.start(CameraFacing::Back).await.unwrap();
    controller.pause().await.unwrap();

    controller.resume().await.unwrap();
    controller.stop().await.unwrap();

    assert_eq!(controller.state(), SessionState::Stopped);
    assert!(!engine.camera_running());
    assert_eq!(engine.loaded_datasets(), 0);
    assert_eq!(engine.call_count(EngineOp::EngineDeinit), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_waits_for_camera_start() {
    let engine = SimulatedEngine::new().with_phase_delay(Duration::from_millis(40));
    let (engine, controller, mut rx) = session(engine);
    controller.initialize().await.unwrap();
    next_report(&mut rx).await;

    let starting = controller.clone();
    let start = tokio::spawn(async move { starting.start(CameraFacing::Back).await });
    controller
        .wait_for_state(|s| *s == SessionState::Starting)
        .await;

    controller.stop().await.unwrap();
    let err = start.await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    assert_eq!(controller.state(), SessionState::Stopped);
    assert!(!engine.camera_running());
    assert_eq!(engine.max_in_flight(), 1);

    let calls = engine.calls();
    let position = |op: EngineOp| calls.iter().position(|c| *c == op).unwrap();
    assert!(position(EngineOp::CameraStart) < position(EngineOp::DatasetDeactivate));
    assert!(position(EngineOp::CameraDeinit) < position(EngineOp::DatasetDeactivate));
    assert_eq!(calls.last(), Some(&EngineOp::EngineDeinit));
}
