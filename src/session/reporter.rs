//! Lifecycle outcome reporting

use crate::error::SessionError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Lifecycle operations that produce a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleOp {
    Initialize,
    Start,
    Pause,
    Resume,
    Stop,
}

impl LifecycleOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleOp::Initialize => "initialize",
            LifecycleOp::Start => "start",
            LifecycleOp::Pause => "pause",
            LifecycleOp::Resume => "resume",
            LifecycleOp::Stop => "stop",
        }
    }
}

impl fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one lifecycle operation
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleReport {
    pub session_id: Uuid,
    pub op: LifecycleOp,
    /// `None` on success
    pub error: Option<SessionError>,
    pub at: DateTime<Utc>,
}

impl LifecycleReport {
    pub fn new(session_id: Uuid, op: LifecycleOp, error: Option<SessionError>) -> Self {
        Self {
            session_id,
            op,
            error,
            at: Utc::now(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Receives exactly one report per lifecycle operation.
///
/// Per-frame fallbacks are never reported here.
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    async fn report(&self, report: LifecycleReport);
}

/// Writes reports to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

#[async_trait]
impl ErrorReporter for LogReporter {
    async fn report(&self, report: LifecycleReport) {
        match &report.error {
            None => info!(session = %report.session_id, op = %report.op, "Lifecycle operation completed"),
            Some(e) if !e.kind().is_fatal() => warn!(
                session = %report.session_id,
                op = %report.op,
                kind = %e.kind(),
                "Lifecycle operation not applied: {}",
                e
            ),
            Some(e) => error!(
                session = %report.session_id,
                op = %report.op,
                kind = %e.kind(),
                "Lifecycle operation failed: {}",
                e
            ),
        }
    }
}

/// Forwards reports to a channel
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<LifecycleReport>,
}

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LifecycleReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ErrorReporter for ChannelReporter {
    async fn report(&self, report: LifecycleReport) {
        if self.tx.send(report).is_err() {
            tracing::debug!("Report receiver dropped");
        }
    }
}
