//! Driver handler port: how a device driver reacts to events.

use driverhub_domain::driver::DriverId;
use driverhub_domain::event::{DriverEvent, ErrorEvent};
use driverhub_domain::message::{PlatformMessage, ProtocolMessage};

use crate::executor::DispatchScope;
use crate::ports::DriverContext;

/// Outcome of a handler entry point.
///
/// Errors are logged by the executor and otherwise ignored: the event still
/// counts as delivered and the queue keeps draining.
pub type HandlerResult = anyhow::Result<()>;

/// A device driver, seen from the executor.
///
/// Every entry point runs on whichever pool thread currently owns the
/// device's executor, never concurrently with another entry point for the
/// same device. Panics are caught and logged like errors.
pub trait DriverHandler<C: DriverContext>: Send + Sync + 'static {
    /// Identity of the driver, used for logs and upgrades.
    fn driver_id(&self) -> DriverId;

    /// Handle a message from the platform.
    ///
    /// # Errors
    ///
    /// Any error is logged and swallowed by the executor.
    fn handle_platform_message(
        &self,
        message: &PlatformMessage,
        scope: &DispatchScope<'_, C>,
    ) -> HandlerResult;

    /// Handle raw traffic from the device.
    ///
    /// # Errors
    ///
    /// Any error is logged and swallowed by the executor.
    fn handle_protocol_message(
        &self,
        message: &ProtocolMessage,
        scope: &DispatchScope<'_, C>,
    ) -> HandlerResult;

    /// The response window for `request` elapsed. Times the request out on
    /// the context by default.
    ///
    /// # Errors
    ///
    /// Any error is logged and swallowed by the executor.
    fn handle_request_timeout(
        &self,
        request: &PlatformMessage,
        scope: &DispatchScope<'_, C>,
    ) -> HandlerResult {
        scope.context().cancel_request(request);
        Ok(())
    }

    /// The driver was started or restored.
    ///
    /// # Errors
    ///
    /// Any error is logged and swallowed by the executor.
    fn on_started(&self, _scope: &DispatchScope<'_, C>) -> HandlerResult {
        Ok(())
    }

    /// The driver replaced `previous` for this device.
    ///
    /// # Errors
    ///
    /// Any error is logged and swallowed by the executor.
    fn on_upgraded(
        &self,
        _previous: Option<&DriverId>,
        _scope: &DispatchScope<'_, C>,
    ) -> HandlerResult {
        Ok(())
    }

    /// The driver is shutting down.
    ///
    /// Events submitted afterwards are still delivered when dispatchable:
    /// platform messages while no request is in flight, driver events and
    /// request timeouts. Protocol messages are dropped.
    ///
    /// # Errors
    ///
    /// Any error is logged and swallowed by the executor.
    fn on_stopped(&self, _scope: &DispatchScope<'_, C>) -> HandlerResult {
        Ok(())
    }

    /// Attributes were changed outside of the driver.
    ///
    /// # Errors
    ///
    /// Any error is logged and swallowed by the executor.
    fn on_attributes_updated(
        &self,
        _attributes: &serde_json::Map<String, serde_json::Value>,
        _from_device: bool,
        _scope: &DispatchScope<'_, C>,
    ) -> HandlerResult {
        Ok(())
    }

    /// Any other driver event (connected, disconnected, scheduled).
    ///
    /// # Errors
    ///
    /// Any error is logged and swallowed by the executor.
    fn handle_driver_event(
        &self,
        _event: &DriverEvent,
        _scope: &DispatchScope<'_, C>,
    ) -> HandlerResult {
        Ok(())
    }

    /// An explicit error reported to the driver.
    ///
    /// # Errors
    ///
    /// Any error is logged and swallowed by the executor.
    fn handle_error(&self, error: &ErrorEvent, _scope: &DispatchScope<'_, C>) -> HandlerResult {
        tracing::warn!(code = %error.code, message = %error.message, "driver received error");
        Ok(())
    }

    /// Fallback for events no other entry point covers.
    ///
    /// # Errors
    ///
    /// Any error is logged and swallowed by the executor.
    fn handle_unclassified(
        &self,
        kind: &str,
        _payload: &serde_json::Value,
        _scope: &DispatchScope<'_, C>,
    ) -> HandlerResult {
        tracing::debug!(kind, "ignoring unclassified event");
        Ok(())
    }
}

impl<C, T> DriverHandler<C> for std::sync::Arc<T>
where
    C: DriverContext,
    T: DriverHandler<C> + ?Sized,
{
    fn driver_id(&self) -> DriverId {
        (**self).driver_id()
    }

    fn handle_platform_message(
        &self,
        message: &PlatformMessage,
        scope: &DispatchScope<'_, C>,
    ) -> HandlerResult {
        (**self).handle_platform_message(message, scope)
    }

    fn handle_protocol_message(
        &self,
        message: &ProtocolMessage,
        scope: &DispatchScope<'_, C>,
    ) -> HandlerResult {
        (**self).handle_protocol_message(message, scope)
    }

    fn handle_request_timeout(
        &self,
        request: &PlatformMessage,
        scope: &DispatchScope<'_, C>,
    ) -> HandlerResult {
        (**self).handle_request_timeout(request, scope)
    }

    fn on_started(&self, scope: &DispatchScope<'_, C>) -> HandlerResult {
        (**self).on_started(scope)
    }

    fn on_upgraded(
        &self,
        previous: Option<&DriverId>,
        scope: &DispatchScope<'_, C>,
    ) -> HandlerResult {
        (**self).on_upgraded(previous, scope)
    }

    fn on_stopped(&self, scope: &DispatchScope<'_, C>) -> HandlerResult {
        (**self).on_stopped(scope)
    }

    fn on_attributes_updated(
        &self,
        attributes: &serde_json::Map<String, serde_json::Value>,
        from_device: bool,
        scope: &DispatchScope<'_, C>,
    ) -> HandlerResult {
        (**self).on_attributes_updated(attributes, from_device, scope)
    }

    fn handle_driver_event(
        &self,
        event: &DriverEvent,
        scope: &DispatchScope<'_, C>,
    ) -> HandlerResult {
        (**self).handle_driver_event(event, scope)
    }

    fn handle_error(&self, error: &ErrorEvent, scope: &DispatchScope<'_, C>) -> HandlerResult {
        (**self).handle_error(error, scope)
    }

    fn handle_unclassified(
        &self,
        kind: &str,
        payload: &serde_json::Value,
        scope: &DispatchScope<'_, C>,
    ) -> HandlerResult {
        (**self).handle_unclassified(kind, payload, scope)
    }
}
