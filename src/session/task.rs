//! Background phase tasks

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::error;

/// Shared cancellation flag checked between phase steps.
///
/// Cancelling never interrupts a step that is already running.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A spawned phase with its cancellation token.
pub struct PhaseTask<T> {
    handle: JoinHandle<T>,
    token: CancelToken,
}

impl<T: Send + 'static> PhaseTask<T> {
    /// Spawn `f` on the runtime, handing it a fresh token
    pub fn spawn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancelToken) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let token = CancelToken::new();
        let handle = tokio::spawn(f(token.clone()));
        Self { handle, token }
    }

    /// Still running or not yet started
    pub fn is_outstanding(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Wait for the task; `None` if it panicked
    pub async fn join(self) -> Option<T> {
        match self.handle.await {
            Ok(value) => Some(value),
            Err(e) => {
                error!("Phase task did not complete: {}", e);
                None
            }
        }
    }
}
