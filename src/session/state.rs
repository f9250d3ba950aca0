//! Session state and its lock-free snapshot

use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::watch;

/// Lifecycle state of a tracking session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Initializing,
    TrackerInitializing,
    DataLoading,
    Ready,
    Starting,
    Running,
    Pausing,
    Paused,
    Resuming,
    Stopping,
    Stopped,
    Failed(ErrorKind),
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initializing => "initializing",
            SessionState::TrackerInitializing => "tracker_initializing",
            SessionState::DataLoading => "data_loading",
            SessionState::Ready => "ready",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Pausing => "pausing",
            SessionState::Paused => "paused",
            SessionState::Resuming => "resuming",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
            SessionState::Failed(_) => "failed",
        }
    }

    /// One of the three initialization phases
    pub fn is_initializing(&self) -> bool {
        matches!(
            self,
            SessionState::Initializing | SessionState::TrackerInitializing | SessionState::DataLoading
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SessionState::Failed(_))
    }

    fn encode(self) -> u32 {
        let (tag, payload) = match self {
            SessionState::Uninitialized => (0, 0),
            SessionState::Initializing => (1, 0),
            SessionState::TrackerInitializing => (2, 0),
            SessionState::DataLoading => (3, 0),
            SessionState::Ready => (4, 0),
            SessionState::Starting => (5, 0),
            SessionState::Running => (6, 0),
            SessionState::Pausing => (7, 0),
            SessionState::Paused => (8, 0),
            SessionState::Resuming => (9, 0),
            SessionState::Stopping => (10, 0),
            SessionState::Stopped => (11, 0),
            SessionState::Failed(kind) => (12, kind.code() as u32),
        };
        tag | (payload << 8)
    }

    fn decode(raw: u32) -> Self {
        match raw & 0xff {
            0 => SessionState::Uninitialized,
            1 => SessionState::Initializing,
            2 => SessionState::TrackerInitializing,
            3 => SessionState::DataLoading,
            4 => SessionState::Ready,
            5 => SessionState::Starting,
            6 => SessionState::Running,
            7 => SessionState::Pausing,
            8 => SessionState::Paused,
            9 => SessionState::Resuming,
            10 => SessionState::Stopping,
            11 => SessionState::Stopped,
            _ => SessionState::Failed(
                ErrorKind::from_code((raw >> 8) as u8).unwrap_or(ErrorKind::InvalidStateTransition),
            ),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Failed(kind) => write!(f, "failed({})", kind),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Committed session state.
///
/// Readers take a snapshot with a single atomic load and never block. Writes
/// are crate-private so only the controller can move the state.
pub struct StateCell {
    value: AtomicU32,
    tx: watch::Sender<SessionState>,
}

impl StateCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::Uninitialized);
        Self {
            value: AtomicU32::new(SessionState::Uninitialized.encode()),
            tx,
        }
    }

    pub fn load(&self) -> SessionState {
        SessionState::decode(self.value.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: SessionState) {
        self.value.store(state.encode(), Ordering::Release);
        self.tx.send_replace(state);
    }

    /// Receiver notified on every committed transition
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateCell").field(&self.load()).finish()
    }
}
