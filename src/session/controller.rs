//! Session controller
//!
//! Drives the engine through initialization, camera start/stop and teardown.
//! Tracker data operations and every state transition run under the
//! lifecycle lock. Camera bring-up and release run under a separate camera
//! lock, always taken before the lifecycle lock, so `stop` can wait for a
//! camera that is still coming up.

use super::reporter::{ErrorReporter, LifecycleOp, LifecycleReport};
use super::state::{SessionState, StateCell};
use super::task::{CancelToken, PhaseTask};
use crate::config::{CameraFacing, SessionConfig, VideoMode};
use crate::engine::{FocusMode, FrameState, InitProgress, TrackingEngine};
use crate::error::{ErrorKind, Result, SessionError};
use crate::tracker::TrackerGateway;
use anyhow::Context;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};
use uuid::Uuid;

#[derive(Default)]
struct Tasks {
    init: Option<PhaseTask<()>>,
    resume: Option<PhaseTask<()>>,
    facing: CameraFacing,
}

struct Inner {
    id: Uuid,
    config: SessionConfig,
    gateway: Arc<TrackerGateway>,
    reporter: Arc<dyn ErrorReporter>,
    state: Arc<StateCell>,
    lifecycle: tokio::sync::Mutex<()>,
    camera: tokio::sync::Mutex<()>,
    tasks: Mutex<Tasks>,
    camera_running: AtomicBool,
    was_started: AtomicBool,
    paused_before_stop: AtomicBool,
    mirrored: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
}

/// Owns the session lifecycle.
///
/// Every public operation produces exactly one [`LifecycleReport`]. For
/// `initialize` and `resume` the report arrives when the background phase
/// finishes; the other operations report before returning.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    pub fn new(
        engine: Arc<dyn TrackingEngine>,
        config: SessionConfig,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self> {
        config.validate()?;

        let gateway = Arc::new(TrackerGateway::new(engine, &config));
        let id = Uuid::new_v4();
        info!(session = %id, dataset = %config.dataset, "Created tracking session");

        Ok(Self {
            inner: Arc::new(Inner {
                id,
                tasks: Mutex::new(Tasks {
                    facing: config.camera_facing,
                    ..Default::default()
                }),
                config,
                gateway,
                reporter,
                state: Arc::new(StateCell::new()),
                lifecycle: tokio::sync::Mutex::new(()),
                camera: tokio::sync::Mutex::new(()),
                camera_running: AtomicBool::new(false),
                was_started: AtomicBool::new(false),
                paused_before_stop: AtomicBool::new(false),
                mirrored: Arc::new(AtomicBool::new(false)),
                frames: Arc::new(AtomicU64::new(0)),
            }),
        })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Lock-free snapshot of the committed state
    pub fn state(&self) -> SessionState {
        self.inner.state.load()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Read-only state handle for the render context
    pub fn state_handle(&self) -> Arc<StateCell> {
        self.inner.state.clone()
    }

    /// Set while the active camera delivers mirrored video
    pub fn mirrored_handle(&self) -> Arc<AtomicBool> {
        self.inner.mirrored.clone()
    }

    pub fn gateway(&self) -> Arc<TrackerGateway> {
        self.inner.gateway.clone()
    }

    pub fn camera_running(&self) -> bool {
        self.inner.camera_running.load(Ordering::SeqCst)
    }

    /// Engine frames seen by the update hook since data load
    pub fn frames_processed(&self) -> u64 {
        self.inner.frames.load(Ordering::Relaxed)
    }

    /// Wait until the committed state satisfies `predicate`
    pub async fn wait_for_state<F>(&self, mut predicate: F) -> SessionState
    where
        F: FnMut(&SessionState) -> bool,
    {
        let mut rx = self.subscribe();
        let state = match rx.wait_for(|s| predicate(s)).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        state
    }

    /// Begin engine init, tracker init and data load in the background.
    ///
    /// Returns once the chain is spawned; its outcome is reported when it
    /// reaches `Ready` or fails.
    pub async fn initialize(&self) -> Result<()> {
        let accepted = {
            let _guard = self.inner.lifecycle.lock().await;
            let mut tasks = self.inner.tasks();
            let state = self.inner.state.load();

            if tasks.init.is_some() {
                Err(SessionError::new(
                    ErrorKind::AlreadyInitialized,
                    "Session is already initialized or initializing",
                ))
            } else if state != SessionState::Uninitialized {
                Err(invalid_transition(LifecycleOp::Initialize, state))
            } else {
                self.inner.state.store(SessionState::Initializing);
                let inner = self.inner.clone();
                let span = info_span!("init_chain", session = %self.inner.id);
                tasks.init = Some(PhaseTask::spawn(move |token| {
                    inner.run_init_chain(token).instrument(span)
                }));
                Ok(())
            }
        };

        match accepted {
            Ok(()) => {
                info!(session = %self.inner.id, "Initialization started");
                Ok(())
            }
            Err(e) => {
                warn!(session = %self.inner.id, "Rejected initialize: {}", e);
                self.inner.report(LifecycleOp::Initialize, &Err(e.clone())).await;
                Err(e)
            }
        }
    }

    /// Open and start the camera, then start the trackers
    pub async fn start(&self, facing: CameraFacing) -> Result<()> {
        let outcome = self.inner.start(facing).await;
        self.inner.report(LifecycleOp::Start, &outcome).await;
        outcome
    }

    /// Stop the camera and trackers, keeping loaded data
    pub async fn pause(&self) -> Result<()> {
        let outcome = self.inner.pause().await;
        self.inner.report(LifecycleOp::Pause, &outcome).await;
        outcome
    }

    /// Resume the engine in the background, restarting the camera if the
    /// session had been started.
    ///
    /// A call while a resume is still outstanding does nothing.
    pub async fn resume(&self) -> Result<()> {
        if self.inner.resume_outstanding() {
            debug!(session = %self.inner.id, "Resume already outstanding, ignoring");
            return Ok(());
        }

        let accepted = {
            let _guard = self.inner.lifecycle.lock().await;
            let mut tasks = self.inner.tasks();
            let prior = self.inner.state.load();

            if tasks.resume.as_ref().is_some_and(|t| t.is_outstanding()) {
                debug!(session = %self.inner.id, "Resume already outstanding, ignoring");
                return Ok(());
            }
            let resumable = match prior {
                SessionState::Paused => true,
                SessionState::Stopped => self.inner.paused_before_stop.load(Ordering::SeqCst),
                _ => false,
            };
            if resumable {
                self.inner.state.store(SessionState::Resuming);
                let inner = self.inner.clone();
                let span = info_span!("resume", session = %self.inner.id);
                tasks.resume = Some(PhaseTask::spawn(move |token| {
                    inner.run_resume(prior, token).instrument(span)
                }));
                Ok(())
            } else {
                Err(invalid_transition(LifecycleOp::Resume, prior))
            }
        };

        if let Err(e) = &accepted {
            self.inner.report(LifecycleOp::Resume, &accepted).await;
            warn!(session = %self.inner.id, "Rejected resume: {}", e);
        }
        accepted
    }

    /// Cancel pending phases, stop the camera and tear everything down.
    ///
    /// Valid from any state. Every teardown step is attempted; at most one
    /// failure is returned.
    pub async fn stop(&self) -> Result<()> {
        let outcome = self
            .inner
            .stop()
            .instrument(info_span!("stop", session = %self.inner.id))
            .await;
        self.inner.report(LifecycleOp::Stop, &outcome).await;
        outcome
    }

    pub fn surface_created(&self) {
        self.inner.gateway.engine().surface_created();
    }

    pub fn surface_changed(&self, width: u32, height: u32) {
        self.inner.gateway.engine().surface_changed(width, height);
    }

    /// Forwarded to the engine only while the session is started
    pub fn configuration_changed(&self) {
        if self.inner.was_started.load(Ordering::SeqCst) {
            self.inner.gateway.engine().configuration_changed();
        }
    }
}

impl Inner {
    fn tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn resume_outstanding(&self) -> bool {
        self.tasks()
            .resume
            .as_ref()
            .is_some_and(|t| t.is_outstanding())
    }

    async fn report(&self, op: LifecycleOp, outcome: &Result<()>) {
        let report = LifecycleReport::new(self.id, op, outcome.as_ref().err().cloned());
        self.reporter.report(report).await;
    }

    async fn run_init_chain(self: Arc<Self>, token: CancelToken) {
        let outcome = self.init_phases(&token).await;

        let outcome = {
            let _guard = self.lifecycle.lock().await;
            match outcome {
                Ok(()) if token.is_cancelled() => Err(cancelled(LifecycleOp::Initialize)),
                Ok(()) => {
                    self.register_update_hook();
                    self.state.store(SessionState::Ready);
                    info!("Session ready");
                    Ok(())
                }
                Err(e) => {
                    if !token.is_cancelled() {
                        self.state.store(SessionState::Failed(e.kind()));
                    }
                    Err(e)
                }
            }
        };

        if let Err(e) = &outcome {
            error!(kind = %e.kind(), "Initialization failed: {}", e);
        }
        self.report(LifecycleOp::Initialize, &outcome).await;
    }

    async fn init_phases(&self, token: &CancelToken) -> Result<()> {
        let engine = self.gateway.engine().clone();
        let orientation = self.config.orientation.resolved();
        let step_token = token.clone();
        self.run_phase(
            token,
            SessionState::Initializing,
            ErrorKind::EngineInitFailure,
            move || {
                engine.set_screen_orientation(orientation);
                init_engine(engine.as_ref(), &step_token)
            },
        )
        .await?;

        let gateway = self.gateway.clone();
        self.run_phase(
            token,
            SessionState::TrackerInitializing,
            ErrorKind::TrackerInitFailure,
            move || {
                gateway.init_trackers().map_err(|e| {
                    SessionError::from_engine(
                        ErrorKind::TrackerInitFailure,
                        "Failed to initialize trackers",
                        &e,
                    )
                })
            },
        )
        .await?;

        let gateway = self.gateway.clone();
        self.run_phase(
            token,
            SessionState::DataLoading,
            ErrorKind::DataLoadFailure,
            move || {
                gateway.load_data().map_err(|e| {
                    SessionError::from_engine(
                        ErrorKind::DataLoadFailure,
                        "Failed to load tracker data",
                        &e,
                    )
                })
            },
        )
        .await
    }

    /// Run one phase under the lifecycle lock.
    ///
    /// A cancelled phase is dropped before it starts. A phase that finishes
    /// after cancellation still reports `Cancelled` so the chain stops and
    /// teardown unwinds its work.
    async fn run_phase<F>(
        &self,
        token: &CancelToken,
        phase: SessionState,
        kind: ErrorKind,
        work: F,
    ) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let _guard = self.lifecycle.lock().await;
        if token.is_cancelled() {
            debug!(phase = %phase, "Phase dropped before start");
            return Err(cancelled(LifecycleOp::Initialize));
        }

        self.state.store(phase);
        debug!(phase = %phase, "Phase started");
        blocking(kind, work).await?;
        debug!(phase = %phase, "Phase finished");

        if token.is_cancelled() {
            return Err(cancelled(LifecycleOp::Initialize));
        }
        Ok(())
    }

    fn register_update_hook(&self) {
        let frames = self.frames.clone();
        self.gateway
            .engine()
            .register_update_callback(Arc::new(move |frame: &FrameState| {
                frames.fetch_add(1, Ordering::Relaxed);
                trace!(
                    frame = frame.frame,
                    trackables = frame.trackable_count,
                    "Engine frame processed"
                );
            }));
    }

    async fn start(&self, facing: CameraFacing) -> Result<()> {
        let _camera = self.camera.lock().await;
        {
            let _guard = self.lifecycle.lock().await;
            if self.camera_running.load(Ordering::SeqCst) {
                return Err(SessionError::new(
                    ErrorKind::CameraAlreadyRunning,
                    "Camera already running, unable to open again",
                ));
            }
            let state = self.state.load();
            if !matches!(state, SessionState::Ready | SessionState::Paused) {
                return Err(invalid_transition(LifecycleOp::Start, state));
            }
            self.state.store(SessionState::Starting);
        }

        self.tasks().facing = facing;
        self.bring_up_camera(facing, SessionState::Starting).await
    }

    /// Start camera and trackers, committing `Running` only if the session is
    /// still in `pending` afterwards.
    async fn bring_up_camera(&self, facing: CameraFacing, pending: SessionState) -> Result<()> {
        let gateway = self.gateway.clone();
        let mode = self.config.video_mode;
        let opened = blocking(ErrorKind::CameraInitFailure, move || {
            open_camera(&gateway, facing, mode)
        })
        .await;

        let superseded = {
            let _guard = self.lifecycle.lock().await;
            let superseded = self.state.load() != pending;
            match &opened {
                Ok(()) if !superseded => {
                    self.camera_running.store(true, Ordering::SeqCst);
                    self.was_started.store(true, Ordering::SeqCst);
                    self.mirrored.store(facing.is_mirrored(), Ordering::SeqCst);
                    self.state.store(SessionState::Running);
                }
                Ok(()) => {}
                Err(e) => {
                    if !superseded {
                        self.state.store(SessionState::Failed(e.kind()));
                    }
                }
            }
            superseded
        };

        match opened {
            Ok(()) if superseded => {
                warn!("Session changed while the camera was starting, closing camera");
                let gateway = self.gateway.clone();
                release_in_background(gateway).await;
                Err(cancelled(LifecycleOp::Start))
            }
            Ok(()) => {
                info!(?facing, "Camera started");
                Ok(())
            }
            Err(e) => {
                error!("Camera start failed: {}", e);
                Err(e)
            }
        }
    }

    async fn pause(&self) -> Result<()> {
        let _camera = self.camera.lock().await;
        {
            let _guard = self.lifecycle.lock().await;
            let state = self.state.load();
            if state != SessionState::Running {
                return Err(invalid_transition(LifecycleOp::Pause, state));
            }
            self.state.store(SessionState::Pausing);
        }

        self.stop_camera().await;

        let engine = self.gateway.engine().clone();
        best_effort("Engine pause", move || engine.engine_pause()).await;

        let _guard = self.lifecycle.lock().await;
        if self.state.load() == SessionState::Pausing {
            self.state.store(SessionState::Paused);
        }
        info!("Session paused");
        Ok(())
    }

    async fn run_resume(self: Arc<Self>, prior: SessionState, token: CancelToken) {
        let outcome = self.resume_phases(prior, &token).await;
        if let Err(e) = &outcome {
            warn!(kind = %e.kind(), "Resume did not complete: {}", e);
        }
        self.report(LifecycleOp::Resume, &outcome).await;
    }

    async fn resume_phases(&self, prior: SessionState, token: &CancelToken) -> Result<()> {
        {
            let _guard = self.lifecycle.lock().await;
            if token.is_cancelled() {
                return Err(cancelled(LifecycleOp::Resume));
            }
            let engine = self.gateway.engine().clone();
            best_effort("Engine resume", move || engine.engine_resume()).await;
        }

        if token.is_cancelled() {
            return Err(cancelled(LifecycleOp::Resume));
        }

        if self.was_started.load(Ordering::SeqCst) && !self.camera_running.load(Ordering::SeqCst) {
            let _camera = self.camera.lock().await;
            if token.is_cancelled() {
                return Err(cancelled(LifecycleOp::Resume));
            }
            let facing = self.tasks().facing;
            return self.bring_up_camera(facing, SessionState::Resuming).await;
        }

        let _guard = self.lifecycle.lock().await;
        if self.state.load() == SessionState::Resuming {
            self.state.store(prior);
        }
        info!(state = %prior, "Session resumed");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        // Drop queued phases before waiting on the lock
        {
            let tasks = self.tasks();
            for task in [&tasks.init, &tasks.resume].into_iter().flatten() {
                task.cancel();
            }
        }

        let (init, resume) = {
            let _guard = self.lifecycle.lock().await;
            let mut tasks = self.tasks();
            for task in [&tasks.init, &tasks.resume].into_iter().flatten() {
                task.cancel();
            }
            let prior = self.state.load();
            if prior != SessionState::Stopped {
                self.paused_before_stop.store(
                    matches!(prior, SessionState::Paused | SessionState::Pausing),
                    Ordering::SeqCst,
                );
            }
            self.state.store(SessionState::Stopping);
            (tasks.init.take(), tasks.resume.take())
        };
        info!("Stopping session");

        if let Some(task) = init {
            task.join().await;
        }
        if let Some(task) = resume {
            task.join().await;
        }

        // Waits for a start still bringing the camera up
        {
            let _camera = self.camera.lock().await;
            self.stop_camera().await;
        }
        self.was_started.store(false, Ordering::SeqCst);
        self.mirrored.store(false, Ordering::SeqCst);

        let _guard = self.lifecycle.lock().await;
        let gateway = self.gateway.clone();
        let outcome = blocking(ErrorKind::DataUnloadFailure, move || teardown(&gateway)).await;
        self.state.store(SessionState::Stopped);
        info!("Session stopped");
        outcome
    }

    /// Stop trackers and release the camera. No-op when the camera is not running.
    async fn stop_camera(&self) {
        if !self.camera_running.swap(false, Ordering::SeqCst) {
            debug!("Camera not running, nothing to stop");
            return;
        }
        release_in_background(self.gateway.clone()).await;
    }
}

/// Step engine initialization to completion, checking for cancellation between steps
fn init_engine(engine: &dyn TrackingEngine, token: &CancelToken) -> Result<()> {
    loop {
        if token.is_cancelled() {
            return Err(cancelled(LifecycleOp::Initialize));
        }
        match engine.engine_init_step() {
            InitProgress::Progress(p) if p >= 100 => {
                info!("Tracking engine initialized");
                return Ok(());
            }
            InitProgress::Progress(p) => debug!(progress = p, "Engine initialization progress"),
            InitProgress::Failed(code) => {
                return Err(SessionError::new(
                    ErrorKind::EngineInitFailure,
                    code.message(),
                ))
            }
        }
    }
}

fn open_camera(
    gateway: &TrackerGateway,
    facing: CameraFacing,
    mode: VideoMode,
) -> Result<()> {
    let engine = gateway.engine();
    engine.camera_open(facing).map_err(|e| {
        SessionError::from_engine(
            ErrorKind::CameraInitFailure,
            "Unable to open camera device",
            &e,
        )
    })?;

    let started = engine
        .camera_select_mode(mode)
        .context("Unable to set video mode")
        .and_then(|()| engine.camera_start().context("Unable to start camera device"))
        .and_then(|()| gateway.start_trackers());
    if let Err(e) = started {
        release_camera(gateway);
        return Err(SessionError::from_engine(
            ErrorKind::CameraInitFailure,
            "Unable to start the camera",
            &e,
        ));
    }

    if let Err(e) = engine.set_focus_mode(FocusMode::ContinuousAuto) {
        warn!("Unable to enable continuous autofocus: {:#}", e);
    }
    Ok(())
}

fn release_camera(gateway: &TrackerGateway) {
    let engine = gateway.engine();
    if let Err(e) = gateway.stop_trackers() {
        warn!("{:#}", e);
    }
    if let Err(e) = engine.camera_stop() {
        warn!("Unable to stop camera: {:#}", e);
    }
    if let Err(e) = engine.camera_deinit() {
        warn!("Unable to release camera: {:#}", e);
    }
}

/// Run blocking engine work whose failure is logged and otherwise ignored
async fn best_effort<F>(what: &'static str, work: F)
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("{} failed: {:#}", what, e),
        Err(e) => error!("{} did not complete: {}", what, e),
    }
}

async fn release_in_background(gateway: Arc<TrackerGateway>) {
    if let Err(e) = tokio::task::spawn_blocking(move || release_camera(&gateway)).await {
        error!("Camera release did not complete: {}", e);
    }
}

/// Unload data, deinit trackers, deinit engine; each step runs regardless of
/// earlier failures. Unload failure takes precedence over tracker deinit.
fn teardown(gateway: &TrackerGateway) -> Result<()> {
    let unloaded = gateway.unload_data();
    if let Err(e) = &unloaded {
        error!("Failed to unload tracker data: {:#}", e);
    }

    let deinited = gateway.deinit_trackers();
    if let Err(e) = &deinited {
        error!("Failed to deinitialize trackers: {:#}", e);
    }

    if let Err(e) = gateway.engine().engine_deinit() {
        error!("Failed to deinitialize tracking engine: {:#}", e);
    }

    match (unloaded, deinited) {
        (Err(unload), Err(deinit)) => Err(SessionError::from_engine(
            ErrorKind::DataUnloadFailure,
            &format!(
                "Failed to unload tracker data (tracker deinit also failed: {:#})",
                deinit
            ),
            &unload,
        )),
        (Err(unload), Ok(())) => Err(SessionError::from_engine(
            ErrorKind::DataUnloadFailure,
            "Failed to unload tracker data",
            &unload,
        )),
        (Ok(()), Err(deinit)) => Err(SessionError::from_engine(
            ErrorKind::TrackerDeinitFailure,
            "Failed to deinitialize trackers",
            &deinit,
        )),
        (Ok(()), Ok(())) => Ok(()),
    }
}

/// Run blocking engine work off the async threads
async fn blocking<F>(kind: ErrorKind, work: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) => Err(SessionError::new(
            kind,
            format!("Engine call did not complete: {}", e),
        )),
    }
}

fn invalid_transition(op: LifecycleOp, state: SessionState) -> SessionError {
    SessionError::new(
        ErrorKind::InvalidStateTransition,
        format!("Cannot {} from state {}", op, state),
    )
}

fn cancelled(op: LifecycleOp) -> SessionError {
    SessionError::new(ErrorKind::Cancelled, format!("{} cancelled by stop", op))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScreenOrientation;
    use crate::engine::{EngineOp, InitErrorCode, SimulatedEngine};
    use crate::session::reporter::ChannelReporter;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn controller(
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

    async fn ready(controller: &SessionController, rx: &mut UnboundedReceiver<LifecycleReport>) {
        controller.initialize().await.unwrap();
        let report = rx.recv().await.unwrap();
        assert_eq!(report.op, LifecycleOp::Initialize);
        assert!(report.is_ok(), "{:?}", report.error);
        assert_eq!(controller.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_initialize_reaches_ready() {
        let (engine, controller, mut rx) = controller(SimulatedEngine::new());
        ready(&controller, &mut rx).await;

        assert!(engine.active_dataset().is_some());
        assert!(engine.has_update_callback());
        assert_eq!(
            &engine.calls()[3..],
            &[
                EngineOp::TrackerInit,
                EngineOp::DatasetCreate,
                EngineOp::DatasetLoad,
                EngineOp::DatasetActivate,
                EngineOp::RegisterCallback,
            ]
        );
    }

    #[tokio::test]
    async fn test_engine_init_error_code_is_reported() {
        let engine = SimulatedEngine::new().with_init_steps(vec![
            InitProgress::Progress(10),
            InitProgress::Failed(InitErrorCode::NoCameraAccess),
        ]);
        let (engine, controller, mut rx) = controller(engine);

        controller.initialize().await.unwrap();
        let report = rx.recv().await.unwrap();
        let err = report.error.unwrap();
        assert_eq!(err.kind(), ErrorKind::EngineInitFailure);
        assert_eq!(err.message(), "Camera access was denied");
        assert_eq!(
            controller.state(),
            SessionState::Failed(ErrorKind::EngineInitFailure)
        );
        assert_eq!(engine.call_count(EngineOp::TrackerInit), 0);
    }

    #[tokio::test]
    async fn test_initialize_from_wrong_state() {
        let (_engine, controller, mut rx) = controller(SimulatedEngine::new());
        controller.stop().await.unwrap();
        rx.recv().await.unwrap();

        let err = controller.initialize().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
        assert_eq!(rx.recv().await.unwrap().error, Some(err));
    }

    #[tokio::test]
    async fn test_initialize_after_ready_is_already_initialized() {
        let (_engine, controller, mut rx) = controller(SimulatedEngine::new());
        ready(&controller, &mut rx).await;

        let err = controller.initialize().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyInitialized);
    }

    #[tokio::test]
    async fn test_start_twice_reports_camera_running() {
        let (_engine, controller, mut rx) = controller(SimulatedEngine::new());
        ready(&controller, &mut rx).await;

        controller.start(CameraFacing::Back).await.unwrap();
        assert_eq!(controller.state(), SessionState::Running);
        assert!(rx.recv().await.unwrap().is_ok());

        let err = controller.start(CameraFacing::Back).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CameraAlreadyRunning);
        assert_eq!(controller.state(), SessionState::Running);
    }

    #[tokio::test]
    async fn test_start_failure_is_camera_init_failure() {
        let (engine, controller, mut rx) =
            controller(SimulatedEngine::new().fail_on(EngineOp::CameraStart));
        ready(&controller, &mut rx).await;

        let err = controller.start(CameraFacing::Back).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CameraInitFailure);
        assert!(err.message().contains("camera_start"));
        assert_eq!(
            controller.state(),
            SessionState::Failed(ErrorKind::CameraInitFailure)
        );
        // Remaining steps skipped, opened camera released
        assert_eq!(engine.call_count(EngineOp::TrackerStart), 0);
        assert_eq!(engine.call_count(EngineOp::CameraDeinit), 1);
    }

    #[tokio::test]
    async fn test_start_before_ready_rejected() {
        let (_engine, controller, _rx) = controller(SimulatedEngine::new());
        let err = controller.start(CameraFacing::Back).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
    }

    #[tokio::test]
    async fn test_pause_keeps_data_loaded() {
        let (engine, controller, mut rx) = controller(SimulatedEngine::new());
        ready(&controller, &mut rx).await;
        controller.start(CameraFacing::Back).await.unwrap();

        controller.pause().await.unwrap();
        assert_eq!(controller.state(), SessionState::Paused);
        assert!(!engine.camera_running());
        assert!(engine.active_dataset().is_some());
        assert_eq!(engine.call_count(EngineOp::EnginePause), 1);
        assert_eq!(engine.call_count(EngineOp::DatasetDestroy), 0);
    }

    #[tokio::test]
    async fn test_resume_restarts_camera() {
        let (engine, controller, mut rx) = controller(SimulatedEngine::new());
        ready(&controller, &mut rx).await;
        controller.start(CameraFacing::Back).await.unwrap();
        controller.pause().await.unwrap();

        controller.resume().await.unwrap();
        let state = controller
            .wait_for_state(|s| *s == SessionState::Running || s.is_failed())
            .await;
        assert_eq!(state, SessionState::Running);
        assert!(engine.camera_running());
        assert_eq!(engine.call_count(EngineOp::CameraOpen), 2);
    }

    #[tokio::test]
    async fn test_resume_after_plain_stop_rejected() {
        let (engine, controller, mut rx) = controller(SimulatedEngine::new());
        controller.stop().await.unwrap();
        rx.recv().await.unwrap();

        let err = controller.resume().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStateTransition);
        let report = rx.recv().await.unwrap();
        assert_eq!(report.op, LifecycleOp::Resume);
        assert_eq!(report.error, Some(err));
        assert_eq!(controller.state(), SessionState::Stopped);
        assert_eq!(engine.call_count(EngineOp::EngineResume), 0);
    }

    #[tokio::test]
    async fn test_resume_after_paused_stop_stays_stopped() {
        let (engine, controller, mut rx) = controller(SimulatedEngine::new());
        ready(&controller, &mut rx).await;
        controller.start(CameraFacing::Back).await.unwrap();
        controller.pause().await.unwrap();
        controller.stop().await.unwrap();
        for _ in 0..3 {
            rx.recv().await.unwrap();
        }

        controller.resume().await.unwrap();
        let report = rx.recv().await.unwrap();
        assert_eq!(report.op, LifecycleOp::Resume);
        assert!(report.is_ok(), "{:?}", report.error);
        assert_eq!(controller.state(), SessionState::Stopped);
        assert_eq!(engine.call_count(EngineOp::EngineResume), 1);
        // Camera is not reopened after teardown
        assert_eq!(engine.call_count(EngineOp::CameraOpen), 1);
    }

    #[tokio::test]
    async fn test_orientation_sent_before_engine_init() {
        let engine = Arc::new(SimulatedEngine::new());
        let (reporter, mut rx) = ChannelReporter::new();
        let config = SessionConfig {
            orientation: ScreenOrientation::Sensor,
            ..Default::default()
        };
        let controller = SessionController::new(engine.clone(), config, Arc::new(reporter)).unwrap();
        ready(&controller, &mut rx).await;

        assert_eq!(engine.screen_orientation(), Some(ScreenOrientation::FullSensor));
    }

    #[tokio::test]
    async fn test_teardown_reports_unload_over_deinit() {
        let engine = SimulatedEngine::new()
            .fail_on(EngineOp::DatasetDestroy)
            .fail_on(EngineOp::TrackerDeinit);
        let (engine, controller, mut rx) = controller(engine);
        ready(&controller, &mut rx).await;

        let err = controller.stop().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataUnloadFailure);
        assert!(err.message().contains("tracker deinit also failed"));
        assert_eq!(engine.call_count(EngineOp::EngineDeinit), 1);
        assert_eq!(controller.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_cancels_pending_chain() {
        let engine = SimulatedEngine::new().with_phase_delay(std::time::Duration::from_millis(30));
        let (engine, controller, mut rx) = controller(engine);

        controller.initialize().await.unwrap();
        controller.stop().await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.op, LifecycleOp::Initialize);
        assert_eq!(first.error.map(|e| e.kind()), Some(ErrorKind::Cancelled));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.op, LifecycleOp::Stop);

        assert_eq!(controller.state(), SessionState::Stopped);
        assert_eq!(engine.call_count(EngineOp::DatasetLoad), 0);
        assert_eq!(engine.call_count(EngineOp::EngineDeinit), 1);
    }

    #[tokio::test]
    async fn test_configuration_change_only_when_started() {
        let (_engine, controller, mut rx) = controller(SimulatedEngine::new());
        controller.configuration_changed();
        ready(&controller, &mut rx).await;
        controller.start(CameraFacing::Front).await.unwrap();
        controller.configuration_changed();
        controller.surface_changed(1280, 720);
        assert!(controller.camera_running());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SessionConfig {
            far_plane: 0.5,
            ..Default::default()
        };
        let (reporter, _rx) = ChannelReporter::new();
        let result = SessionController::new(
            Arc::new(SimulatedEngine::new()),
            config,
            Arc::new(reporter),
        );
        assert_eq!(
            result.err().map(|e| e.kind()),
            Some(ErrorKind::InvalidConfiguration)
        );
    }
}
