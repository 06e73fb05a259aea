//! Whether the event at the head of the queue may be delivered now.

use driverhub_domain::event::ExecutorEvent;

use crate::ports::DriverContext;

/// Decision for the event at the head of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Deliver it.
    Deliver,
    /// Leave it at the head and stop draining.
    Block,
    /// Stopped: answer the requester with a cancellation instead.
    CancelRequest,
    /// Stopped: discard it.
    Drop,
}

pub(crate) fn admit<C: DriverContext + ?Sized>(
    event: &ExecutorEvent,
    stopped: bool,
    context: &C,
) -> Admission {
    match (event, stopped) {
        (ExecutorEvent::Platform(_), false) if context.has_request_in_flight() => {
            tracing::debug!(
                correlation_id = ?context.correlation_id(),
                "blocking on pending platform request"
            );
            Admission::Block
        }
        (ExecutorEvent::Platform(_), true) if context.has_request_in_flight() => {
            Admission::CancelRequest
        }
        (ExecutorEvent::Protocol(_), true) => Admission::Drop,
        _ => Admission::Deliver,
    }
}
