//! Error taxonomy for session lifecycle operations.

use serde::{Deserialize, Serialize};

/// Kind of failure raised by the session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Initialization requested while a prior one is outstanding or done
    AlreadyInitialized,
    /// Tracking engine failed to initialize
    EngineInitFailure,
    /// Object tracker failed to initialize
    TrackerInitFailure,
    /// Tracker data set could not be created, loaded or activated
    DataLoadFailure,
    /// Tracker data set could not be deactivated or destroyed
    DataUnloadFailure,
    /// Object tracker failed to deinitialize
    TrackerDeinitFailure,
    /// Camera device could not be opened, configured or started
    CameraInitFailure,
    /// Start requested while the camera device is already active
    CameraAlreadyRunning,
    /// Operation not valid from the current session state
    InvalidStateTransition,
    /// Camera calibration missing for a frame (non-fatal)
    CalibrationUnavailable,
    /// Initialization chain dropped by a stop request
    Cancelled,
    /// Session configuration rejected at construction
    InvalidConfiguration,
}

impl ErrorKind {
    pub(crate) const ALL: [ErrorKind; 12] = [
        ErrorKind::AlreadyInitialized,
        ErrorKind::EngineInitFailure,
        ErrorKind::TrackerInitFailure,
        ErrorKind::DataLoadFailure,
        ErrorKind::DataUnloadFailure,
        ErrorKind::TrackerDeinitFailure,
        ErrorKind::CameraInitFailure,
        ErrorKind::CameraAlreadyRunning,
        ErrorKind::InvalidStateTransition,
        ErrorKind::CalibrationUnavailable,
        ErrorKind::Cancelled,
        ErrorKind::InvalidConfiguration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AlreadyInitialized => "already_initialized",
            ErrorKind::EngineInitFailure => "engine_init_failure",
            ErrorKind::TrackerInitFailure => "tracker_init_failure",
            ErrorKind::DataLoadFailure => "data_load_failure",
            ErrorKind::DataUnloadFailure => "data_unload_failure",
            ErrorKind::TrackerDeinitFailure => "tracker_deinit_failure",
            ErrorKind::CameraInitFailure => "camera_init_failure",
            ErrorKind::CameraAlreadyRunning => "camera_already_running",
            ErrorKind::InvalidStateTransition => "invalid_state_transition",
            ErrorKind::CalibrationUnavailable => "calibration_unavailable",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InvalidConfiguration => "invalid_configuration",
        }
    }

    /// Whether this kind means engine work failed.
    ///
    /// Rejected requests and cancellations leave the session as it was, and
    /// calibration gaps are recovered per frame.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ErrorKind::CalibrationUnavailable
                | ErrorKind::Cancelled
                | ErrorKind::AlreadyInitialized
                | ErrorKind::CameraAlreadyRunning
                | ErrorKind::InvalidStateTransition
        )
    }

    pub(crate) fn code(self) -> u8 {
        Self::ALL
            .iter()
            .position(|kind| *kind == self)
            .unwrap_or_default() as u8
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle failure with a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SessionError {
    kind: ErrorKind,
    message: String,
}

impl SessionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Wrap an opaque collaborator failure, keeping its cause chain in the message.
    pub fn from_engine(kind: ErrorKind, context: &str, source: &anyhow::Error) -> Self {
        Self::new(kind, format!("{}: {:#}", context, source))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
