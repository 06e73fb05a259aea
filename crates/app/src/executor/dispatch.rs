//! Dispatch hand-off: route a popped event to the driver, never letting a
//! handler failure escape.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{self, Ordering};

use driverhub_domain::address::Address;
use driverhub_domain::event::{DriverEvent, ExecutorEvent};
use driverhub_domain::message::{MessageBody, PlatformMessage};
use driverhub_domain::time::Timestamp;

use super::ExecutorHandle;
use super::deferred::EventFuture;
use super::error::ExecutorError;
use crate::ports::{DriverContext, DriverHandler, HandlerResult};

/// Named-event key of the pending timeout for the request in flight.
pub const REQUEST_TIMEOUT_KEY: &str = "driverhub.request-timeout";

/// What a handler sees of the executor currently delivering to it.
///
/// Passed explicitly to every handler entry point for the duration of one
/// delivery.
pub struct DispatchScope<'a, C: ?Sized> {
    context: &'a C,
    executor: &'a dyn ExecutorHandle,
}

impl<'a, C: DriverContext + ?Sized> DispatchScope<'a, C> {
    #[must_use]
    pub fn new(context: &'a C, executor: &'a dyn ExecutorHandle) -> Self {
        Self { context, executor }
    }

    #[must_use]
    pub fn context(&self) -> &'a C {
        self.context
    }

    #[must_use]
    pub fn executor(&self) -> &'a dyn ExecutorHandle {
        self.executor
    }

    #[must_use]
    pub fn address(&self) -> &'a Address {
        self.context.address()
    }

    /// Queue `event` behind the current delivery.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::BacklogExceeded`] when the queue is full.
    pub fn defer(&self, event: impl Into<ExecutorEvent>) -> Result<EventFuture, ExecutorError> {
        self.executor.defer(event.into())
    }

    /// Schedule `event` under `key`, replacing any earlier event with that key.
    pub fn defer_named(&self, key: &str, event: impl Into<ExecutorEvent>, at: Timestamp) -> EventFuture {
        self.executor.defer_named(key, event.into(), at)
    }

    /// Cancel the named event registered under `key`.
    pub fn cancel(&self, key: &str) -> bool {
        self.executor.cancel(key)
    }

    /// Mark `request` as in flight and arm its timeout.
    ///
    /// Further platform messages stay queued until the driver answers with
    /// [`respond`](Self::respond) or the timeout fires. The timeout is let
    /// past a platform message blocked at the head, and is never refused by
    /// the backlog limit.
    pub fn track_request(&self, request: &PlatformMessage) -> EventFuture {
        let deadline = self.context.begin_request(request);
        self.executor.defer_named(
            REQUEST_TIMEOUT_KEY,
            ExecutorEvent::RequestTimeout(request.clone()),
            deadline,
        )
    }

    /// Answer the request in flight and disarm its timeout.
    pub fn respond(&self, response: MessageBody) {
        self.executor.cancel(REQUEST_TIMEOUT_KEY);
        self.context.respond_to_platform(response);
    }
}

fn route<C, H>(handler: &H, event: &ExecutorEvent, scope: &DispatchScope<'_, C>) -> HandlerResult
where
    C: DriverContext,
    H: DriverHandler<C> + ?Sized,
{
    match event {
        ExecutorEvent::Platform(message) => handler.handle_platform_message(message, scope),
        ExecutorEvent::Protocol(message) => handler.handle_protocol_message(message, scope),
        ExecutorEvent::RequestTimeout(request) => handler.handle_request_timeout(request, scope),
        ExecutorEvent::Driver(DriverEvent::Started) => handler.on_started(scope),
        ExecutorEvent::Driver(DriverEvent::Upgraded { previous }) => {
            handler.on_upgraded(previous.as_ref(), scope)
        }
        ExecutorEvent::Driver(DriverEvent::Stopped) => handler.on_stopped(scope),
        ExecutorEvent::Driver(DriverEvent::AttributesUpdated {
            attributes,
            from_device,
        }) => handler.on_attributes_updated(attributes, *from_device, scope),
        ExecutorEvent::Driver(other) => handler.handle_driver_event(other, scope),
        ExecutorEvent::Error(error) => handler.handle_error(error, scope),
        ExecutorEvent::Unclassified { kind, payload } => {
            handler.handle_unclassified(kind, payload, scope)
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}

/// Deliver `event` to `handler`. Returns whether the handler succeeded;
/// errors and panics are logged here and go no further.
pub(crate) fn deliver<C, H>(
    handler: &H,
    event: &ExecutorEvent,
    scope: &DispatchScope<'_, C>,
) -> bool
where
    C: DriverContext,
    H: DriverHandler<C> + ?Sized,
{
    let _span = scope.context().span().entered();
    // The previous owner may have run on another thread.
    atomic::fence(Ordering::Acquire);
    let result = panic::catch_unwind(AssertUnwindSafe(|| route(handler, event, scope)));
    atomic::fence(Ordering::Release);

    match result {
        Ok(Ok(())) => {
            tracing::trace!(event = %event.describe(), "delivered");
            true
        }
        Ok(Err(error)) => {
            let error = format!("{error:#}");
            tracing::warn!(event = %event.describe(), %error, "error processing event");
            false
        }
        Err(panic) => {
            tracing::warn!(
                event = %event.describe(),
                panic = panic_message(panic.as_ref()),
                "driver panicked processing event"
            );
            false
        }
    }
}
