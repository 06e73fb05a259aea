//! Per-device driver executor.
//!
//! Each device gets the illusion of a dedicated single-threaded mailbox
//! without owning a thread: whichever thread submits an event while nobody
//! is draining becomes the owner, delivers events until the queue is empty
//! or its head is blocked, then lets go. Other producers only enqueue.
//!
//! ```text
//! fire(event) ──► enqueue ──► unowned? ──yes──► own ──► deliver ──► take_or_release ─┐
//!                                │                         ▲                          │
//!                                no                        └──────── next event ◄─────┘
//!                                ▼
//!                       owner picks it up
//! ```
//!
//! A platform message is held at the head while the device context reports
//! a request in flight, and nothing behind it is delivered until it moves.

mod admission;
mod deferred;
mod dispatch;
mod error;
mod lock;
mod named;
mod queue;

use std::fmt;
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use driverhub_domain::address::Address;
use driverhub_domain::driver::DriverId;
use driverhub_domain::event::{DriverEvent, ExecutorEvent};
use driverhub_domain::message::{MessageBody, PlatformMessage};
use driverhub_domain::time::Timestamp;

pub use deferred::{EventFuture, EventState};
pub use dispatch::{DispatchScope, REQUEST_TIMEOUT_KEY};
pub use error::ExecutorError;

use crate::config::ExecutorConfig;
use crate::ports::{DriverContext, DriverHandler, Scheduler};
use lock::{Dispatch, ExecutionLock, Rejected};
use named::NamedEvents;
use queue::QueuedEvent;

/// Message type of the request asking the platform to remove a tombstoned
/// device.
pub const FORCE_REMOVE: &str = "dev:ForceRemove";

/// Object-safe view of an executor, handed to drivers through
/// [`DispatchScope`].
pub trait ExecutorHandle: Send + Sync {
    /// Driver address of the device this executor serves.
    fn address(&self) -> &Address;

    /// Submit `event`, draining on the calling thread if nobody else is.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::BacklogExceeded`] when the queue is full.
    fn fire(&self, event: ExecutorEvent) -> Result<EventFuture, ExecutorError>;

    /// Submit `event` without draining on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::BacklogExceeded`] when the queue is full.
    fn defer(&self, event: ExecutorEvent) -> Result<EventFuture, ExecutorError>;

    /// Submit `event` at or after `at`.
    fn defer_at(&self, event: ExecutorEvent, at: Timestamp) -> EventFuture;

    /// Submit `event` at or after `at` under `key`, cancelling whatever was
    /// registered under `key` before.
    fn defer_named(&self, key: &str, event: ExecutorEvent, at: Timestamp) -> EventFuture;

    /// Cancel the event registered under `key`. Returns whether one was.
    fn cancel(&self, key: &str) -> bool;

    /// Whether the calling thread is currently draining this executor.
    fn is_executor_thread(&self) -> bool;
}

struct Shared<H, C> {
    handler: H,
    context: Arc<C>,
    scheduler: Arc<dyn Scheduler>,
    lock: Arc<ExecutionLock>,
    named: NamedEvents,
}

/// Executor for one device/driver binding. Cheap to clone.
pub struct DriverExecutor<H, C> {
    shared: Arc<Shared<H, C>>,
}

impl<H, C> Clone for DriverExecutor<H, C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Releases ownership if the drain loop unwinds.
struct OwnerGuard<'a>(&'a ExecutionLock);

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        self.0.release_if_owner();
    }
}

impl<H, C> DriverExecutor<H, C>
where
    H: DriverHandler<C>,
    C: DriverContext,
{
    #[must_use]
    pub fn new(
        handler: H,
        context: Arc<C>,
        scheduler: Arc<dyn Scheduler>,
        config: &ExecutorConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                handler,
                context,
                scheduler,
                lock: Arc::new(ExecutionLock::from_config(config)),
                named: NamedEvents::default(),
            }),
        }
    }

    /// Submit `event`. If no thread is draining this executor, the calling
    /// thread drains it before returning; the returned future is never
    /// waited on here.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::BacklogExceeded`] when the queue is full.
    pub fn fire(&self, event: impl Into<ExecutorEvent>) -> Result<EventFuture, ExecutorError> {
        let queued = QueuedEvent::new(event.into());
        let future = self.future_of(&queued);
        self.submit(queued).map_err(|(_, error)| error)?;
        Ok(future)
    }

    /// Submit `event` without draining on the calling thread.
    ///
    /// On the owner thread the event is simply queued; elsewhere it is handed
    /// to the scheduler so some pool thread ends up draining it.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::BacklogExceeded`] when the queue is full.
    pub fn defer(&self, event: impl Into<ExecutorEvent>) -> Result<EventFuture, ExecutorError> {
        let queued = QueuedEvent::new(event.into());
        let future = self.future_of(&queued);
        if let Some(queued) = self.shared.lock.enqueue_if_owner(queued)? {
            self.shared.lock.ensure_capacity(&queued)?;
            self.schedule(queued, Duration::ZERO);
        }
        Ok(future)
    }

    /// Submit `event` at or after `at`.
    pub fn defer_at(&self, event: impl Into<ExecutorEvent>, at: Timestamp) -> EventFuture {
        let queued = QueuedEvent::new(event.into());
        let future = self.future_of(&queued);
        self.schedule_at(queued, at);
        future
    }

    /// Submit `event` at or after `at` under `key`. An earlier event under
    /// the same key is cancelled unless it is already being delivered.
    pub fn defer_named(&self, key: &str, event: impl Into<ExecutorEvent>, at: Timestamp) -> EventFuture {
        let queued = QueuedEvent::named(key, event.into());
        let future = self.future_of(&queued);
        if self.shared.named.replace(key, Arc::clone(&queued.cell)) {
            tracing::trace!(key, "replaced named event");
        }
        self.schedule_at(queued, at);
        future
    }

    /// Cancel the named event under `key`. Returns whether one was registered.
    pub fn cancel(&self, key: &str) -> bool {
        self.shared.named.cancel(key)
    }

    /// Deliver the started event, or ask the platform to remove the device
    /// when it is tombstoned (returns `None` then).
    pub fn start(&self) -> Option<EventFuture> {
        let context = &self.shared.context;
        if context.is_tombstoned() {
            tracing::debug!(address = %context.address(), "sending force-remove for tombstoned device");
            self.request_force_remove();
            return None;
        }
        tracing::debug!(driver = %self.shared.handler.driver_id(), "starting driver");
        Some(self.fire_lifecycle(DriverEvent::Started))
    }

    /// Deliver the upgraded event after everything already queued.
    pub fn upgraded(&self, previous: Option<DriverId>) -> EventFuture {
        tracing::debug!(driver = %self.shared.handler.driver_id(), "driver upgraded");
        self.fire_lifecycle(DriverEvent::Upgraded { previous })
    }

    /// Cancel named events, switch to stopped mode and deliver the stopped
    /// event.
    ///
    /// In stopped mode queued platform requests that cannot be delivered are
    /// answered with `request.cancelled`, and protocol messages are dropped.
    pub fn stop(&self) -> EventFuture {
        tracing::debug!(driver = %self.shared.handler.driver_id(), "stopping driver");
        let cancelled = self.shared.named.cancel_all();
        if !cancelled.is_empty() {
            tracing::warn!(events = ?cancelled, "cancelling scheduled events");
        }
        self.shared.lock.mark_stopped();
        self.fire_lifecycle(DriverEvent::Stopped)
    }

    #[must_use]
    pub fn handler(&self) -> &H {
        &self.shared.handler
    }

    #[must_use]
    pub fn context(&self) -> &Arc<C> {
        &self.shared.context
    }

    #[must_use]
    pub fn address(&self) -> &Address {
        self.shared.context.address()
    }

    /// Whether some thread is draining the executor right now.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.lock.owner().is_some()
    }

    #[must_use]
    pub fn executor_thread(&self) -> Option<ThreadId> {
        self.shared.lock.owner()
    }

    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.shared.lock.len()
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.lock.is_stopped()
    }

    fn future_of(&self, queued: &QueuedEvent) -> EventFuture {
        EventFuture::new(Arc::clone(&queued.cell), &self.shared.lock)
    }

    fn submit(&self, queued: QueuedEvent) -> Result<(), (QueuedEvent, ExecutorError)> {
        match self
            .shared
            .lock
            .enqueue_and_maybe_own(queued, self.shared.context.as_ref())
        {
            Ok(first) => {
                self.drain(first);
                Ok(())
            }
            Err(Rejected {
                queued,
                error,
                dispatch,
            }) => {
                self.drain(dispatch);
                Err((queued, error))
            }
        }
    }

    fn fire_lifecycle(&self, event: DriverEvent) -> EventFuture {
        let queued = QueuedEvent::new(event.into());
        let future = self.future_of(&queued);
        if let Err((queued, error)) = self.submit(queued) {
            self.reject(&queued, &error);
        }
        future
    }

    fn schedule(&self, queued: QueuedEvent, delay: Duration) {
        let executor = self.clone();
        self.shared
            .scheduler
            .schedule_delayed(Box::new(move || executor.run_scheduled(queued)), delay);
    }

    fn schedule_at(&self, queued: QueuedEvent, at: Timestamp) {
        let executor = self.clone();
        self.shared
            .scheduler
            .schedule_at(Box::new(move || executor.run_scheduled(queued)), at);
    }

    fn run_scheduled(&self, queued: QueuedEvent) {
        if queued.cell.state().is_terminal() {
            tracing::trace!(event = %queued.event.describe(), "skipping cancelled event");
            self.forget(&queued);
            return;
        }
        if let Err((queued, error)) = self.submit(queued) {
            self.reject(&queued, &error);
        }
    }

    fn reject(&self, queued: &QueuedEvent, error: &ExecutorError) {
        tracing::warn!(event = %queued.event.describe(), %error, "event rejected");
        let state = match error {
            ExecutorError::BacklogExceeded { capacity } => EventState::Rejected {
                capacity: *capacity,
            },
            _ => EventState::Cancelled,
        };
        queued.cell.resolve(state);
        self.forget(queued);
    }

    fn drain(&self, first: Option<Dispatch>) {
        let Some(mut next) = first else {
            return;
        };
        let _owner = OwnerGuard(&self.shared.lock);
        loop {
            self.handle(next);
            match self.shared.lock.take_or_release(self.shared.context.as_ref()) {
                Some(dispatch) => next = dispatch,
                None => return,
            }
        }
    }

    fn handle(&self, next: Dispatch) {
        match next {
            Dispatch::Deliver(queued) => {
                if queued.cell.begin() {
                    let scope = DispatchScope::new(self.shared.context.as_ref(), self);
                    let succeeded = dispatch::deliver(&self.shared.handler, &queued.event, &scope);
                    queued.cell.resolve(if succeeded {
                        EventState::Delivered
                    } else {
                        EventState::Failed
                    });
                }
                self.forget(&queued);
            }
            Dispatch::CancelRequest(queued) => {
                if let ExecutorEvent::Platform(message) = &queued.event {
                    self.send_cancellation(message);
                }
                queued.cell.resolve(EventState::Cancelled);
                self.forget(&queued);
            }
            Dispatch::Discard(queued) => {
                tracing::trace!(event = %queued.event.describe(), "dropping event");
                queued.cell.resolve(EventState::Cancelled);
                self.forget(&queued);
            }
        }
    }

    fn forget(&self, queued: &QueuedEvent) {
        if let Some(name) = &queued.name {
            self.shared.named.forget(name, &queued.cell);
        }
    }

    fn send_cancellation(&self, message: &PlatformMessage) {
        if !message.request {
            tracing::trace!(message_type = message.message_type(), "dropping platform event");
            return;
        }
        let context = &self.shared.context;
        tracing::debug!(
            message_type = message.message_type(),
            to = %message.source,
            "cancelling queued request"
        );
        context.send_to_platform(
            message.response(context.address().clone(), MessageBody::request_cancelled()),
        );
    }

    fn request_force_remove(&self) {
        let context = &self.shared.context;
        let mut builder = PlatformMessage::builder()
            .from(Address::service("dev"))
            .to(context.address().clone())
            .payload(MessageBody::new(FORCE_REMOVE))
            .request();
        if let Some(place_id) = context.place_id() {
            builder = builder.place_id(place_id);
        }
        match builder.build() {
            Ok(request) => context.send_to_platform(request),
            Err(error) => tracing::error!(%error, "failed to build force-remove request"),
        }
    }
}

impl<H, C> ExecutorHandle for DriverExecutor<H, C>
where
    H: DriverHandler<C>,
    C: DriverContext,
{
    fn address(&self) -> &Address {
        Self::address(self)
    }

    fn fire(&self, event: ExecutorEvent) -> Result<EventFuture, ExecutorError> {
        Self::fire(self, event)
    }

    fn defer(&self, event: ExecutorEvent) -> Result<EventFuture, ExecutorError> {
        Self::defer(self, event)
    }

    fn defer_at(&self, event: ExecutorEvent, at: Timestamp) -> EventFuture {
        Self::defer_at(self, event, at)
    }

    fn defer_named(&self, key: &str, event: ExecutorEvent, at: Timestamp) -> EventFuture {
        Self::defer_named(self, key, event, at)
    }

    fn cancel(&self, key: &str) -> bool {
        Self::cancel(self, key)
    }

    fn is_executor_thread(&self) -> bool {
        self.shared.lock.is_owned_by_current_thread()
    }
}

impl<H, C> fmt::Debug for DriverExecutor<H, C>
where
    C: DriverContext,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverExecutor")
            .field("address", self.shared.context.address())
            .field("running", &self.shared.lock.owner())
            .field("backlog", &self.shared.lock.len())
            .field("named", &self.shared.named.len())
            .finish_non_exhaustive()
    }
}
