//! The ownership protocol: one owner thread drains, everybody else enqueues.
//!
//! The owner slot, the queue and the stopped flag live under one mutex, so
//! "enqueue, then claim if unowned" and "pop, or release if blocked" are each
//! a single atomic step. A non-`None` owner is the only thread allowed to
//! dequeue.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use driverhub_domain::event::ExecutorEvent;

use super::admission::{self, Admission};
use super::error::ExecutorError;
use super::queue::{EventQueue, QueuedEvent};
use crate::config::ExecutorConfig;
use crate::ports::DriverContext;

/// What the owner should do with the event it just took.
pub(crate) enum Dispatch {
    /// Hand it to the driver.
    Deliver(QueuedEvent),
    /// Stopped with a request still in flight: answer its sender with a
    /// cancellation.
    CancelRequest(QueuedEvent),
    /// Cancelled while queued, or dropped by a stopped executor.
    Discard(QueuedEvent),
}

/// An event refused because the backlog is full.
///
/// When nobody owned the lock the caller claimed it anyway and re-checked the
/// head, so a device whose blocking request has expired still drains.
/// `dispatch` is what the caller must then deliver.
pub(crate) struct Rejected {
    pub(crate) queued: QueuedEvent,
    pub(crate) error: ExecutorError,
    pub(crate) dispatch: Option<Dispatch>,
}

struct LockState {
    owner: Option<ThreadId>,
    queue: EventQueue,
    stopped: bool,
}

pub(crate) struct ExecutionLock {
    state: Mutex<LockState>,
    max_backlog: Option<usize>,
}

impl ExecutionLock {
    #[cfg(test)]
    pub(crate) fn new(max_backlog: Option<usize>) -> Self {
        Self {
            state: Mutex::new(LockState {
                owner: None,
                queue: EventQueue::default(),
                stopped: false,
            }),
            max_backlog,
        }
    }

    pub(crate) fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            state: Mutex::new(LockState {
                owner: None,
                queue: EventQueue::with_capacity(config.queue_backlog),
                stopped: false,
            }),
            max_backlog: config.max_backlog,
        }
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail when one more event would exceed the backlog. Barriers and
    /// request timeouts are exempt.
    fn check_backlog(&self, state: &LockState, queued: &QueuedEvent) -> Result<(), ExecutorError> {
        let exempt = queued.event.is_barrier()
            || matches!(queued.event, ExecutorEvent::RequestTimeout(_));
        match self.max_backlog {
            Some(capacity) if !exempt && state.queue.len() >= capacity => {
                Err(ExecutorError::BacklogExceeded { capacity })
            }
            _ => Ok(()),
        }
    }

    /// Enqueue `queued`; when nobody owns the lock, claim it and return the
    /// first event to handle.
    ///
    /// `Ok(None)` means either another thread owns the lock, or the head is
    /// blocked and the claim was released again.
    pub(crate) fn enqueue_and_maybe_own<C: DriverContext + ?Sized>(
        &self,
        queued: QueuedEvent,
        context: &C,
    ) -> Result<Option<Dispatch>, Rejected> {
        let mut state = self.state();
        if let Err(error) = self.check_backlog(&state, &queued) {
            let dispatch = Self::claim(&mut state, context);
            return Err(Rejected {
                queued,
                error,
                dispatch,
            });
        }
        state.queue.push(queued);
        Ok(Self::claim(&mut state, context))
    }

    fn claim<C: DriverContext + ?Sized>(state: &mut LockState, context: &C) -> Option<Dispatch> {
        if state.owner.is_some() {
            return None;
        }
        state.owner = Some(thread::current().id());
        Self::take(state, context)
    }

    /// Enqueue `queued` only when the calling thread owns the lock; the
    /// owner's drain loop picks it up. Gives the event back otherwise.
    pub(crate) fn enqueue_if_owner(
        &self,
        queued: QueuedEvent,
    ) -> Result<Option<QueuedEvent>, ExecutorError> {
        let mut state = self.state();
        if state.owner != Some(thread::current().id()) {
            return Ok(Some(queued));
        }
        self.check_backlog(&state, &queued)?;
        state.queue.push(queued);
        Ok(None)
    }

    /// Backlog check without enqueueing, for events routed through the
    /// scheduler.
    pub(crate) fn ensure_capacity(&self, queued: &QueuedEvent) -> Result<(), ExecutorError> {
        self.check_backlog(&self.state(), queued)
    }

    /// Pop the next event to handle, or release ownership when the queue is
    /// empty or its head is blocked.
    ///
    /// # Panics
    ///
    /// When the calling thread does not own the lock.
    pub(crate) fn take_or_release<C: DriverContext + ?Sized>(&self, context: &C) -> Option<Dispatch> {
        let mut state = self.state();
        let current = thread::current().id();
        assert!(
            state.owner == Some(current),
            "take_or_release called from {current:?}, lock owned by {:?}",
            state.owner
        );
        Self::take(&mut state, context)
    }

    fn take<C: DriverContext + ?Sized>(state: &mut LockState, context: &C) -> Option<Dispatch> {
        let stopped = state.stopped;
        let verdict = match state.queue.head() {
            None => None,
            Some(head) if head.cell.is_cancelled() => Some(Admission::Drop),
            Some(head) => Some(admission::admit(&head.event, stopped, context)),
        };
        let dispatch = match verdict {
            Some(Admission::Deliver) => state.queue.pop().map(Dispatch::Deliver),
            Some(Admission::CancelRequest) => state.queue.pop().map(Dispatch::CancelRequest),
            Some(Admission::Drop) => state.queue.pop().map(Dispatch::Discard),
            // A blocked head only yields to the timeout that may unblock it.
            Some(Admission::Block) => state.queue.take_request_timeout().map(|timeout| {
                if timeout.cell.is_cancelled() {
                    Dispatch::Discard(timeout)
                } else {
                    Dispatch::Deliver(timeout)
                }
            }),
            None => None,
        };
        if dispatch.is_none() {
            state.owner = None;
        }
        dispatch
    }

    #[cfg(test)]
    pub(crate) fn try_own(&self) -> bool {
        let mut state = self.state();
        if state.owner.is_some() {
            return false;
        }
        state.owner = Some(thread::current().id());
        true
    }

    /// Release the lock when held by the calling thread.
    pub(crate) fn release_if_owner(&self) {
        let mut state = self.state();
        if state.owner == Some(thread::current().id()) {
            state.owner = None;
        }
    }

    pub(crate) fn owner(&self) -> Option<ThreadId> {
        self.state().owner
    }

    pub(crate) fn is_owned_by_current_thread(&self) -> bool {
        self.owner() == Some(thread::current().id())
    }

    pub(crate) fn mark_stopped(&self) {
        self.state().stopped = true;
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.state().stopped
    }

    pub(crate) fn len(&self) -> usize {
        self.state().queue.len()
    }
}
