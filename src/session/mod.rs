//! Tracking session lifecycle
//!
//! State machine, background phases, reporting and the controller that ties
//! them together.

mod controller;
mod reporter;
mod state;
mod task;

pub use controller::SessionController;
pub use reporter::{ChannelReporter, ErrorReporter, LifecycleOp, LifecycleReport, LogReporter};
pub use state::{SessionState, StateCell};
pub use task::{CancelToken, PhaseTask};
