use std::time::Duration;

/// Errors surfaced to callers of a device executor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// The queue already holds `capacity` events. Indicates systemic overload.
    #[error("executor backlog exceeded ({capacity} events queued)")]
    BacklogExceeded { capacity: usize },

    /// Waiting on an unfinished event from the thread that would have to
    /// deliver it.
    #[error("cannot block on an event from its own executor thread")]
    BlockingOnExecutorThread,

    #[error("event was cancelled before delivery")]
    Cancelled,

    #[error("event not delivered within {0:?}")]
    Timeout(Duration),
}
