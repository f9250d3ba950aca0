//! Tracker gateway
//!
//! Composite tracker and data-set operations built from engine primitives.
//! Holds the handle of the loaded data set so teardown can release it.

use crate::config::SessionConfig;
use crate::engine::{DatasetHandle, TrackingEngine};
use crate::pose::{CameraCalibration, TrackableResult};
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub struct TrackerGateway {
    engine: Arc<dyn TrackingEngine>,
    dataset_name: String,
    max_targets: u32,
    dataset: Mutex<Option<DatasetHandle>>,
}

impl TrackerGateway {
    pub fn new(engine: Arc<dyn TrackingEngine>, config: &SessionConfig) -> Self {
        Self {
            engine,
            dataset_name: config.dataset.clone(),
            max_targets: config.max_simultaneous_targets,
            dataset: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<dyn TrackingEngine> {
        &self.engine
    }

    pub fn init_trackers(&self) -> Result<()> {
        self.engine
            .tracker_init()
            .context("Failed to initialize object tracker")?;
        info!("Object tracker initialized");
        Ok(())
    }

    /// Create, load and activate the configured data set
    pub fn load_data(&self) -> Result<()> {
        let handle = self
            .engine
            .dataset_create()
            .context("Failed to create a new tracking data set")?;
        // Keep the handle even if loading fails so unload can destroy it
        *self.dataset() = Some(handle);

        self.engine
            .dataset_load(handle, &self.dataset_name)
            .with_context(|| format!("Failed to load data set {}", self.dataset_name))?;
        self.engine
            .dataset_activate(handle)
            .with_context(|| format!("Failed to activate data set {}", self.dataset_name))?;

        info!(dataset = %self.dataset_name, "Successfully loaded and activated data set");
        Ok(())
    }

    /// Start the object tracker, then apply the simultaneous-target hint
    pub fn start_trackers(&self) -> Result<()> {
        self.engine
            .tracker_start()
            .context("Failed to start object tracker")?;

        if let Err(e) = self.engine.set_max_simultaneous_targets(self.max_targets) {
            warn!(max_targets = self.max_targets, "Unable to set tracker hint: {:#}", e);
        }
        Ok(())
    }

    pub fn stop_trackers(&self) -> Result<()> {
        self.engine
            .tracker_stop()
            .context("Failed to stop object tracker")
    }

    /// Deactivate (if active) and destroy the loaded data set.
    ///
    /// The stored handle is cleared whether or not the engine calls succeed.
    pub fn unload_data(&self) -> Result<()> {
        let Some(handle) = self.dataset().take() else {
            debug!("No data set loaded, nothing to unload");
            return Ok(());
        };

        if self.engine.dataset_is_active(handle) {
            self.engine
                .dataset_deactivate(handle)
                .with_context(|| format!("Failed to deactivate data set {}", self.dataset_name))?;
        }
        self.engine
            .dataset_destroy(handle)
            .with_context(|| format!("Failed to destroy data set {}", self.dataset_name))?;

        info!(dataset = %self.dataset_name, "Data set unloaded");
        Ok(())
    }

    pub fn deinit_trackers(&self) -> Result<()> {
        self.engine
            .tracker_deinit()
            .context("Failed to deinitialize object tracker")
    }

    pub fn has_dataset(&self) -> bool {
        self.dataset().is_some()
    }

    /// Per-frame trackable query, safe to call during lifecycle phases
    pub fn query(&self) -> TrackableResult {
        TrackableResult::new(self.engine.query_trackables())
    }

    pub fn calibration(&self) -> Option<CameraCalibration> {
        self.engine.camera_calibration()
    }

    fn dataset(&self) -> MutexGuard<'_, Option<DatasetHandle>> {
        self.dataset.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineOp, SimulatedEngine};

    fn gateway(engine: SimulatedEngine) -> (Arc<SimulatedEngine>, TrackerGateway) {
        let engine = Arc::new(engine);
        let gateway = TrackerGateway::new(engine.clone(), &SessionConfig::default());
        (engine, gateway)
    }

    #[test]
    fn test_load_then_unload() {
        let (engine, gateway) = gateway(SimulatedEngine::new());
        gateway.init_trackers().unwrap();
        gateway.load_data().unwrap();
        assert!(gateway.has_dataset());
        assert!(engine.active_dataset().is_some());

        gateway.unload_data().unwrap();
        assert!(!gateway.has_dataset());
        assert_eq!(engine.loaded_datasets(), 0);
        assert_eq!(engine.call_count(EngineOp::DatasetDeactivate), 1);
    }

    #[test]
    fn test_unload_skips_deactivate_when_inactive() {
        let (engine, gateway) =
            gateway(SimulatedEngine::new().fail_on(EngineOp::DatasetActivate));
        gateway.init_trackers().unwrap();
        assert!(gateway.load_data().is_err());
        assert!(gateway.has_dataset());

        gateway.unload_data().unwrap();
        assert_eq!(engine.call_count(EngineOp::DatasetDeactivate), 0);
        assert_eq!(engine.call_count(EngineOp::DatasetDestroy), 1);
    }

    #[test]
    fn test_failed_unload_still_clears_handle() {
        let (_engine, gateway) =
            gateway(SimulatedEngine::new().fail_on(EngineOp::DatasetDestroy));
        gateway.init_trackers().unwrap();
        gateway.load_data().unwrap();

        let err = gateway.unload_data().unwrap_err();
        assert!(format!("{:#}", err).contains("destroy"));
        assert!(!gateway.has_dataset());
    }

    #[test]
    fn test_start_sets_target_hint() {
        let (engine, gateway) = gateway(SimulatedEngine::new());
        gateway.init_trackers().unwrap();
        gateway.start_trackers().unwrap();
        assert_eq!(engine.max_targets(), 1);
    }

    #[test]
    fn test_hint_failure_is_not_fatal() {
        let (_engine, gateway) = gateway(SimulatedEngine::new().fail_on(EngineOp::SetMaxTargets));
        gateway.init_trackers().unwrap();
        assert!(gateway.start_trackers().is_ok());
    }
}
