//! Completion tracking for queued and scheduled events.
//!
//! Every submission gets an [`EventCell`] shared between the queue entry (or
//! the scheduled task), the named-event index, and the [`EventFuture`] handed
//! back to the caller. The cell moves from pending to exactly one terminal
//! state and wakes every waiter when it does.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::time::Duration;

use super::error::ExecutorError;
use super::lock::ExecutionLock;

/// Completion state of a submitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    /// Queued or scheduled, not yet picked up.
    Pending,
    /// Popped and being delivered; can no longer be cancelled.
    Running,
    /// Delivered; the handler returned successfully.
    Delivered,
    /// Delivered; the handler failed or panicked and the failure was logged.
    Failed,
    /// Cancelled, or dropped by a stopped executor, before delivery.
    Cancelled,
    /// Refused at enqueue time because the backlog was full.
    Rejected { capacity: usize },
}

impl EventState {
    /// Whether the state is final.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    fn outcome(self) -> Option<Result<(), ExecutorError>> {
        match self {
            Self::Pending | Self::Running => None,
            Self::Delivered | Self::Failed => Some(Ok(())),
            Self::Cancelled => Some(Err(ExecutorError::Cancelled)),
            Self::Rejected { capacity } => Some(Err(ExecutorError::BacklogExceeded { capacity })),
        }
    }
}

pub(crate) struct EventCell {
    state: Mutex<EventState>,
    done: Condvar,
}

impl EventCell {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(EventState::Pending),
            done: Condvar::new(),
        })
    }

    pub(crate) fn state(&self) -> EventState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the event for delivery. Fails when it was cancelled first.
    pub(crate) fn begin(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != EventState::Pending {
            return false;
        }
        *state = EventState::Running;
        true
    }

    /// Move to `outcome` unless already terminal.
    pub(crate) fn resolve(&self, outcome: EventState) {
        debug_assert!(outcome.is_terminal());
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.is_terminal() {
            return;
        }
        *state = outcome;
        self.done.notify_all();
    }

    /// Cancel if still pending; returns whether this call cancelled it.
    pub(crate) fn cancel(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != EventState::Pending {
            return false;
        }
        *state = EventState::Cancelled;
        self.done.notify_all();
        true
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.state() == EventState::Cancelled
    }

    fn wait(&self) -> EventState {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = self
            .done
            .wait_while(state, |state| !state.is_terminal())
            .unwrap_or_else(PoisonError::into_inner);
        *state
    }

    fn wait_timeout(&self, timeout: Duration) -> EventState {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (state, _) = self
            .done
            .wait_timeout_while(state, timeout, |state| !state.is_terminal())
            .unwrap_or_else(PoisonError::into_inner);
        *state
    }
}

/// Handle on the outcome of a submitted event.
///
/// Resolves successfully once the event has been delivered, whether or not
/// the handler succeeded. Blocking on an unfinished future from the thread
/// currently draining the same executor fails immediately with
/// [`ExecutorError::BlockingOnExecutorThread`]: that thread is the only one
/// that could complete it.
#[derive(Clone)]
pub struct EventFuture {
    cell: Arc<EventCell>,
    lock: Weak<ExecutionLock>,
}

impl EventFuture {
    pub(crate) fn new(cell: Arc<EventCell>, lock: &Arc<ExecutionLock>) -> Self {
        Self {
            cell,
            lock: Arc::downgrade(lock),
        }
    }

    /// Current state without blocking.
    #[must_use]
    pub fn state(&self) -> EventState {
        self.cell.state()
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cell.is_cancelled()
    }

    /// Cancel the event if it has not been picked up for delivery yet.
    ///
    /// Returns whether this call cancelled it.
    pub fn cancel(&self) -> bool {
        self.cell.cancel()
    }

    /// Block until the event reaches a terminal state.
    ///
    /// # Errors
    ///
    /// - [`ExecutorError::BlockingOnExecutorThread`] when called, unfinished,
    ///   from the executor's owner thread.
    /// - [`ExecutorError::Cancelled`] when the event was cancelled or dropped.
    /// - [`ExecutorError::BacklogExceeded`] when the event was rejected.
    pub fn wait(&self) -> Result<(), ExecutorError> {
        if let Some(outcome) = self.state().outcome() {
            return outcome;
        }
        self.ensure_not_executor_thread()?;
        self.cell
            .wait()
            .outcome()
            .unwrap_or(Err(ExecutorError::Cancelled))
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// As [`wait`](Self::wait), plus [`ExecutorError::Timeout`] when the
    /// event is still unfinished after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<(), ExecutorError> {
        if let Some(outcome) = self.state().outcome() {
            return outcome;
        }
        self.ensure_not_executor_thread()?;
        self.cell
            .wait_timeout(timeout)
            .outcome()
            .unwrap_or(Err(ExecutorError::Timeout(timeout)))
    }

    fn ensure_not_executor_thread(&self) -> Result<(), ExecutorError> {
        match self.lock.upgrade() {
            Some(lock) if lock.is_owned_by_current_thread() => {
                Err(ExecutorError::BlockingOnExecutorThread)
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for EventFuture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFuture")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn future(cell: &Arc<EventCell>) -> (EventFuture, Arc<ExecutionLock>) {
        let lock = Arc::new(ExecutionLock::new(None));
        (EventFuture::new(Arc::clone(cell), &lock), lock)
    }

    #[test]
    fn should_start_pending() {
        let cell = EventCell::new();
        let (future, _lock) = future(&cell);
        assert_eq!(future.state(), EventState::Pending);
        assert!(!future.is_done());
    }

    #[test]
    fn should_not_begin_cancelled_event() {
        let cell = EventCell::new();
        assert!(cell.cancel());
        assert!(!cell.begin());
        assert!(cell.is_cancelled());
    }

    #[test]
    fn should_not_cancel_running_event() {
        let cell = EventCell::new();
        assert!(cell.begin());
        assert!(!cell.cancel());
        assert_eq!(cell.state(), EventState::Running);
    }

    #[test]
    fn should_keep_first_terminal_state() {
        let cell = EventCell::new();
        cell.resolve(EventState::Delivered);
        cell.resolve(EventState::Cancelled);
        assert_eq!(cell.state(), EventState::Delivered);
    }

    #[test]
    fn should_succeed_when_handler_failed() {
        let cell = EventCell::new();
        let (future, _lock) = future(&cell);
        cell.begin();
        cell.resolve(EventState::Failed);
        assert_eq!(future.wait(), Ok(()));
    }

    #[test]
    fn should_report_rejection_as_backlog_exceeded() {
        let cell = EventCell::new();
        let (future, _lock) = future(&cell);
        cell.resolve(EventState::Rejected { capacity: 2 });
        assert_eq!(
            future.wait(),
            Err(ExecutorError::BacklogExceeded { capacity: 2 })
        );
    }

    #[test]
    fn should_wake_waiter_on_other_thread() {
        let cell = EventCell::new();
        let (future, _lock) = future(&cell);
        let waiter = thread::spawn(move || future.wait());
        thread::sleep(Duration::from_millis(20));
        cell.begin();
        cell.resolve(EventState::Delivered);
        assert_eq!(waiter.join().unwrap(), Ok(()));
    }

    #[test]
    fn should_time_out_when_never_resolved() {
        let cell = EventCell::new();
        let (future, _lock) = future(&cell);
        let timeout = Duration::from_millis(10);
        assert_eq!(
            future.wait_timeout(timeout),
            Err(ExecutorError::Timeout(timeout))
        );
    }

    #[test]
    fn should_refuse_to_block_on_owner_thread() {
        let cell = EventCell::new();
        let (future, lock) = future(&cell);
        assert!(lock.try_own());
        assert_eq!(future.wait(), Err(ExecutorError::BlockingOnExecutorThread));
        lock.release_if_owner();
    }

    #[test]
    fn should_return_finished_outcome_even_on_owner_thread() {
        let cell = EventCell::new();
        let (future, lock) = future(&cell);
        assert!(lock.try_own());
        cell.resolve(EventState::Delivered);
        assert_eq!(future.wait(), Ok(()));
        lock.release_if_owner();
    }
}
