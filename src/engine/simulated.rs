//! In-process tracking engine
//!
//! Scripted stand-in for the native engine. Used by the demo binary and the
//! tests: it replays configured trackables, injects failures per operation,
//! and records every call so callers can assert on ordering and concurrency.

use super::{
    DatasetHandle, FocusMode, FrameState, FrameUpdateHook, InitErrorCode, InitProgress,
    TrackingEngine,
};
use crate::config::{CameraFacing, ScreenOrientation, VideoMode};
use crate::pose::{CameraCalibration, PoseSample};
use anyhow::{anyhow, bail, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Focal length giving a 60° horizontal field of view on a 640 px sensor
const DEFAULT_FOCAL_LENGTH: f32 = 554.256;

/// Engine operations that can be counted or made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    EngineInit,
    EngineDeinit,
    EnginePause,
    EngineResume,
    CameraOpen,
    CameraSelectMode,
    CameraStart,
    CameraStop,
    CameraDeinit,
    SetFocusMode,
    TrackerInit,
    TrackerStart,
    TrackerStop,
    TrackerDeinit,
    SetMaxTargets,
    DatasetCreate,
    DatasetLoad,
    DatasetActivate,
    DatasetDeactivate,
    DatasetDestroy,
    QueryTrackables,
    RegisterCallback,
}

impl EngineOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineOp::EngineInit => "engine_init",
            EngineOp::EngineDeinit => "engine_deinit",
            EngineOp::EnginePause => "engine_pause",
            EngineOp::EngineResume => "engine_resume",
            EngineOp::CameraOpen => "camera_open",
            EngineOp::CameraSelectMode => "camera_select_mode",
            EngineOp::CameraStart => "camera_start",
            EngineOp::CameraStop => "camera_stop",
            EngineOp::CameraDeinit => "camera_deinit",
            EngineOp::SetFocusMode => "set_focus_mode",
            EngineOp::TrackerInit => "tracker_init",
            EngineOp::TrackerStart => "tracker_start",
            EngineOp::TrackerStop => "tracker_stop",
            EngineOp::TrackerDeinit => "tracker_deinit",
            EngineOp::SetMaxTargets => "set_max_targets",
            EngineOp::DatasetCreate => "dataset_create",
            EngineOp::DatasetLoad => "dataset_load",
            EngineOp::DatasetActivate => "dataset_activate",
            EngineOp::DatasetDeactivate => "dataset_deactivate",
            EngineOp::DatasetDestroy => "dataset_destroy",
            EngineOp::QueryTrackables => "query_trackables",
            EngineOp::RegisterCallback => "register_callback",
        }
    }

    pub const ALL: [EngineOp; 22] = [
        EngineOp::EngineInit,
        EngineOp::EngineDeinit,
        EngineOp::EnginePause,
        EngineOp::EngineResume,
        EngineOp::CameraOpen,
        EngineOp::CameraSelectMode,
        EngineOp::CameraStart,
        EngineOp::CameraStop,
        EngineOp::CameraDeinit,
        EngineOp::SetFocusMode,
        EngineOp::TrackerInit,
        EngineOp::TrackerStart,
        EngineOp::TrackerStop,
        EngineOp::TrackerDeinit,
        EngineOp::SetMaxTargets,
        EngineOp::DatasetCreate,
        EngineOp::DatasetLoad,
        EngineOp::DatasetActivate,
        EngineOp::DatasetDeactivate,
        EngineOp::DatasetDestroy,
        EngineOp::QueryTrackables,
        EngineOp::RegisterCallback,
    ];

    /// Lifecycle operations, tracked for overlap. Per-frame reads are excluded.
    fn is_phase_work(&self) -> bool {
        !matches!(self, EngineOp::QueryTrackables | EngineOp::RegisterCallback)
    }
}

impl FromStr for EngineOp {
    type Err = anyhow::Error;

    /// Accepts `dataset_load`, `dataset-load` or any casing of either
    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_lowercase().replace('-', "_");
        EngineOp::ALL
            .into_iter()
            .find(|op| op.as_str() == needle)
            .ok_or_else(|| anyhow!("unknown engine operation: {}", s))
    }
}

impl fmt::Display for EngineOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct EngineState {
    init_script: VecDeque<InitProgress>,
    facing: CameraFacing,
    orientation: Option<ScreenOrientation>,
    camera_open: bool,
    camera_running: bool,
    tracker_ready: bool,
    tracker_running: bool,
    max_targets: u32,
    next_dataset: u64,
    datasets: HashSet<u64>,
    active: Option<DatasetHandle>,
    trackables: Vec<PoseSample>,
    calibration: Option<CameraCalibration>,
    hook: Option<FrameUpdateHook>,
    frame: u64,
    failures: HashSet<EngineOp>,
    counts: HashMap<EngineOp, usize>,
    log: Vec<EngineOp>,
}

/// Scripted [`TrackingEngine`]
pub struct SimulatedEngine {
    state: Mutex<EngineState>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    phase_delay: Duration,
}

/// Marks a phase operation as running for its lifetime
struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self {
            state: Mutex::new(EngineState {
                init_script: VecDeque::from([
                    InitProgress::Progress(25),
                    InitProgress::Progress(50),
                    InitProgress::Progress(100),
                ]),
                facing: CameraFacing::Default,
                orientation: None,
                camera_open: false,
                camera_running: false,
                tracker_ready: false,
                tracker_running: false,
                max_targets: 0,
                next_dataset: 1,
                datasets: HashSet::new(),
                active: None,
                trackables: Vec::new(),
                calibration: Some(CameraCalibration::pinhole(
                    640.0,
                    480.0,
                    DEFAULT_FOCAL_LENGTH,
                    DEFAULT_FOCAL_LENGTH,
                )),
                hook: None,
                frame: 0,
                failures: HashSet::new(),
                counts: HashMap::new(),
                log: Vec::new(),
            }),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            phase_delay: Duration::ZERO,
        }
    }
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trackables reported while the camera and tracker are running
    pub fn with_trackables(self, trackables: Vec<PoseSample>) -> Self {
        self.state().trackables = trackables;
        self
    }

    pub fn with_calibration(self, calibration: Option<CameraCalibration>) -> Self {
        self.state().calibration = calibration;
        self
    }

    /// Replace the engine init progress script
    pub fn with_init_steps(self, steps: Vec<InitProgress>) -> Self {
        self.state().init_script = steps.into();
        self
    }

    /// Sleep inside every phase operation to widen race windows
    pub fn with_phase_delay(mut self, delay: Duration) -> Self {
        self.phase_delay = delay;
        self
    }

    pub fn fail_on(self, op: EngineOp) -> Self {
        self.inject_failure(op);
        self
    }

    pub fn inject_failure(&self, op: EngineOp) {
        self.state().failures.insert(op);
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    pub fn set_trackables(&self, trackables: Vec<PoseSample>) {
        self.state().trackables = trackables;
    }

    pub fn call_count(&self, op: EngineOp) -> usize {
        self.state().counts.get(&op).copied().unwrap_or(0)
    }

    /// Lifecycle calls in the order they arrived (per-frame queries excluded)
    pub fn calls(&self) -> Vec<EngineOp> {
        self.state().log.clone()
    }

    /// Highest number of phase operations observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn camera_running(&self) -> bool {
        self.state().camera_running
    }

    /// Orientation requested by the session, if any
    pub fn screen_orientation(&self) -> Option<ScreenOrientation> {
        self.state().orientation
    }

    pub fn active_dataset(&self) -> Option<DatasetHandle> {
        self.state().active
    }

    pub fn loaded_datasets(&self) -> usize {
        self.state().datasets.len()
    }

    pub fn max_targets(&self) -> u32 {
        self.state().max_targets
    }

    pub fn has_update_callback(&self) -> bool {
        self.state().hook.is_some()
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self, op: EngineOp) -> Option<InFlight<'_>> {
        if !op.is_phase_work() {
            return None;
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.phase_delay.is_zero() {
            thread::sleep(self.phase_delay);
        }
        Some(InFlight {
            counter: &self.in_flight,
        })
    }

    /// Count the call and fail it if a failure was injected
    fn record(state: &mut EngineState, op: EngineOp) -> Result<()> {
        *state.counts.entry(op).or_insert(0) += 1;
        if op != EngineOp::QueryTrackables {
            state.log.push(op);
        }
        if state.failures.contains(&op) {
            debug!(op = %op, "Injected engine failure");
            bail!("simulated {} failure", op);
        }
        Ok(())
    }

    fn run(&self, op: EngineOp, f: impl FnOnce(&mut EngineState) -> Result<()>) -> Result<()> {
        let _guard = self.enter(op);
        let mut state = self.state();
        Self::record(&mut state, op)?;
        f(&mut state)
    }
}

impl TrackingEngine for SimulatedEngine {
    fn engine_init_step(&self) -> InitProgress {
        let _guard = self.enter(EngineOp::EngineInit);
        let mut state = self.state();
        if Self::record(&mut state, EngineOp::EngineInit).is_err() {
            return InitProgress::Failed(InitErrorCode::Unknown);
        }
        state
            .init_script
            .pop_front()
            .unwrap_or(InitProgress::Progress(100))
    }

    fn engine_deinit(&self) -> Result<()> {
        self.run(EngineOp::EngineDeinit, |state| {
            state.hook = None;
            Ok(())
        })
    }

    fn engine_pause(&self) -> Result<()> {
        self.run(EngineOp::EnginePause, |_| Ok(()))
    }

    fn engine_resume(&self) -> Result<()> {
        self.run(EngineOp::EngineResume, |_| Ok(()))
    }

    fn set_screen_orientation(&self, orientation: ScreenOrientation) {
        debug!(?orientation, "Simulated screen orientation locked");
        self.state().orientation = Some(orientation);
    }

    fn surface_created(&self) {
        debug!("Simulated surface created");
    }

    fn surface_changed(&self, width: u32, height: u32) {
        debug!(width, height, "Simulated surface changed");
    }

    fn configuration_changed(&self) {
        debug!("Simulated configuration changed");
    }

    fn camera_open(&self, facing: CameraFacing) -> Result<()> {
        self.run(EngineOp::CameraOpen, |state| {
            if state.camera_open {
                bail!("camera device is already open");
            }
            state.camera_open = true;
            state.facing = facing;
            Ok(())
        })
    }

    fn camera_select_mode(&self, mode: VideoMode) -> Result<()> {
        self.run(EngineOp::CameraSelectMode, |state| {
            if !state.camera_open {
                bail!("cannot select video mode {:?} on a closed camera", mode);
            }
            Ok(())
        })
    }

    fn camera_start(&self) -> Result<()> {
        self.run(EngineOp::CameraStart, |state| {
            if !state.camera_open {
                bail!("camera device is not open");
            }
            state.camera_running = true;
            Ok(())
        })
    }

    fn camera_stop(&self) -> Result<()> {
        self.run(EngineOp::CameraStop, |state| {
            state.camera_running = false;
            Ok(())
        })
    }

    fn camera_deinit(&self) -> Result<()> {
        self.run(EngineOp::CameraDeinit, |state| {
            state.camera_open = false;
            Ok(())
        })
    }

    fn set_focus_mode(&self, _mode: FocusMode) -> Result<()> {
        self.run(EngineOp::SetFocusMode, |_| Ok(()))
    }

    fn tracker_init(&self) -> Result<()> {
        self.run(EngineOp::TrackerInit, |state| {
            state.tracker_ready = true;
            Ok(())
        })
    }

    fn tracker_start(&self) -> Result<()> {
        self.run(EngineOp::TrackerStart, |state| {
            if !state.tracker_ready {
                bail!("object tracker is not initialized");
            }
            state.tracker_running = true;
            Ok(())
        })
    }

    fn tracker_stop(&self) -> Result<()> {
        self.run(EngineOp::TrackerStop, |state| {
            state.tracker_running = false;
            Ok(())
        })
    }

    fn tracker_deinit(&self) -> Result<()> {
        self.run(EngineOp::TrackerDeinit, |state| {
            state.tracker_ready = false;
            state.tracker_running = false;
            Ok(())
        })
    }

    fn set_max_simultaneous_targets(&self, count: u32) -> Result<()> {
        self.run(EngineOp::SetMaxTargets, |state| {
            state.max_targets = count;
            Ok(())
        })
    }

    fn dataset_create(&self) -> Result<DatasetHandle> {
        let _guard = self.enter(EngineOp::DatasetCreate);
        let mut state = self.state();
        Self::record(&mut state, EngineOp::DatasetCreate)?;
        if !state.tracker_ready {
            bail!("object tracker is not initialized");
        }
        let id = state.next_dataset;
        state.next_dataset += 1;
        state.datasets.insert(id);
        Ok(DatasetHandle(id))
    }

    fn dataset_load(&self, handle: DatasetHandle, name: &str) -> Result<()> {
        self.run(EngineOp::DatasetLoad, |state| {
            if !state.datasets.contains(&handle.0) {
                bail!("unknown dataset handle {}", handle.0);
            }
            if name.is_empty() {
                bail!("dataset name is empty");
            }
            Ok(())
        })
    }

    fn dataset_activate(&self, handle: DatasetHandle) -> Result<()> {
        self.run(EngineOp::DatasetActivate, |state| {
            if !state.datasets.contains(&handle.0) {
                bail!("unknown dataset handle {}", handle.0);
            }
            state.active = Some(handle);
            Ok(())
        })
    }

    fn dataset_is_active(&self, handle: DatasetHandle) -> bool {
        self.state().active == Some(handle)
    }

    fn dataset_deactivate(&self, handle: DatasetHandle) -> Result<()> {
        self.run(EngineOp::DatasetDeactivate, |state| {
            if state.active != Some(handle) {
                bail!("dataset {} is not active", handle.0);
            }
            state.active = None;
            Ok(())
        })
    }

    fn dataset_destroy(&self, handle: DatasetHandle) -> Result<()> {
        self.run(EngineOp::DatasetDestroy, |state| {
            if !state.datasets.remove(&handle.0) {
                bail!("unknown dataset handle {}", handle.0);
            }
            if state.active == Some(handle) {
                state.active = None;
            }
            Ok(())
        })
    }

    fn query_trackables(&self) -> Vec<PoseSample> {
        let (samples, hook, frame_state) = {
            let mut state = self.state();
            // Queries never fail; the count is all that matters
            let _ = Self::record(&mut state, EngineOp::QueryTrackables);
            state.frame += 1;

            let samples: Vec<PoseSample> = if state.camera_running && state.tracker_running {
                let mirrored = state.facing.is_mirrored();
                state
                    .trackables
                    .iter()
                    .cloned()
                    .map(|s| s.with_reflection(mirrored))
                    .collect()
            } else {
                Vec::new()
            };

            let frame_state = FrameState {
                frame: state.frame,
                trackable_count: samples.len(),
                last_trackable: samples.last().map(|s| s.name.clone()),
            };
            (samples, state.hook.clone(), frame_state)
        };

        if let Some(hook) = hook {
            hook(&frame_state);
        }
        samples
    }

    fn camera_calibration(&self) -> Option<CameraCalibration> {
        let state = self.state();
        if state.camera_open {
            state.calibration
        } else {
            None
        }
    }

    fn register_update_callback(&self, hook: FrameUpdateHook) {
        let mut state = self.state();
        let _ = Self::record(&mut state, EngineOp::RegisterCallback);
        state.hook = Some(hook);
    }
}
