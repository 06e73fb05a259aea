//! [`Scheduler`] backed by a tokio runtime.

use std::time::Duration;

use tokio::runtime::Handle;

use crate::ports::{Scheduler, Task};

/// Runs scheduled tasks on the blocking pool of a tokio runtime.
///
/// Tasks drain device executors synchronously, so they are moved off the
/// async workers with [`tokio::task::spawn_blocking`] once their delay has
/// elapsed.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Scheduler on the runtime the caller is running in.
    ///
    /// # Errors
    ///
    /// Returns an error when called outside of a tokio runtime.
    pub fn current() -> Result<Self, tokio::runtime::TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_delayed(&self, task: Task, delay: Duration) {
        self.handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(error) = tokio::task::spawn_blocking(task).await {
                tracing::error!(%error, "scheduled task failed");
            }
        });
    }
}
