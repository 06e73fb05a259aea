//! Virtual light: switched on and off by `swit:SetState` requests.
//!
//! A set-state request is acknowledged by the simulated device with a
//! protocol message (`ON` / `OFF`); the platform response is only sent once
//! that acknowledgement arrives, so the request stays in flight meanwhile.

use driverhub_app::context::DeviceDriverContext;
use driverhub_app::executor::DispatchScope;
use driverhub_app::ports::{DriverContext, DriverHandler, HandlerResult, PlatformBus};
use driverhub_domain::address::Address;
use driverhub_domain::driver::DriverId;
use driverhub_domain::error::ValidationError;
use driverhub_domain::message::{MessageBody, PlatformMessage, ProtocolMessage};

use super::{GET_ATTRIBUTES, INVALID_ARGUMENT, PROTOCOL, reply, reply_attributes, reply_unsupported};

/// Platform request switching the light.
pub const SET_STATE: &str = "swit:SetState";

/// Attribute holding the switch state, `ON` or `OFF`.
pub const STATE: &str = "swit:state";

pub const ON: &str = "ON";
pub const OFF: &str = "OFF";

/// A simulated light driver.
pub struct VirtualLight {
    id: DriverId,
}

impl VirtualLight {
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyName`] if the driver name is empty.
    pub fn new() -> Result<Self, ValidationError> {
        Ok(Self {
            id: DriverId::new("VirtualLight", "1.0")?,
        })
    }

    fn set_state<B: PlatformBus + 'static>(
        message: &PlatformMessage,
        scope: &DispatchScope<'_, DeviceDriverContext<B>>,
    ) -> HandlerResult {
        let requested = message
            .payload
            .attribute(STATE)
            .and_then(serde_json::Value::as_str);
        let payload = match requested {
            Some(ON) => ON,
            Some(OFF) => OFF,
            other => {
                reply(
                    message,
                    scope,
                    MessageBody::error(INVALID_ARGUMENT, format!("invalid {STATE}: {other:?}")),
                );
                return Ok(());
            }
        };
        if message.request {
            scope.track_request(message);
        }
        let command = ProtocolMessage::new(
            Address::protocol(PROTOCOL, "light"),
            scope.address().clone(),
            PROTOCOL,
            payload.as_bytes(),
        )?;
        scope.defer(command)?;
        Ok(())
    }
}

impl<B: PlatformBus + 'static> DriverHandler<DeviceDriverContext<B>> for VirtualLight {
    fn driver_id(&self) -> DriverId {
        self.id.clone()
    }

    fn handle_platform_message(
        &self,
        message: &PlatformMessage,
        scope: &DispatchScope<'_, DeviceDriverContext<B>>,
    ) -> HandlerResult {
        match message.message_type() {
            SET_STATE => Self::set_state(message, scope)?,
            GET_ATTRIBUTES => reply_attributes(message, scope),
            _ => reply_unsupported(message, scope),
        }
        Ok(())
    }

    fn handle_protocol_message(
        &self,
        message: &ProtocolMessage,
        scope: &DispatchScope<'_, DeviceDriverContext<B>>,
    ) -> HandlerResult {
        let state = match message.payload.as_slice() {
            b"ON" => ON,
            b"OFF" => OFF,
            other => anyhow::bail!(
                "unexpected light payload {:?}",
                String::from_utf8_lossy(other)
            ),
        };
        let context = scope.context();
        let mut changes = serde_json::Map::new();
        changes.insert(STATE.to_string(), state.into());
        context.update_attributes(changes);
        if context.has_request_in_flight() {
            scope.respond(MessageBody::empty());
        }
        Ok(())
    }

    fn on_started(&self, scope: &DispatchScope<'_, DeviceDriverContext<B>>) -> HandlerResult {
        let context = scope.context();
        if context.attribute(STATE).is_none() {
            let mut initial = serde_json::Map::new();
            initial.insert(STATE.to_string(), OFF.into());
            context.update_attributes(initial);
        }
        context.set_connected(true);
        Ok(())
    }

    fn on_stopped(&self, scope: &DispatchScope<'_, DeviceDriverContext<B>>) -> HandlerResult {
        scope.context().set_connected(false);
        Ok(())
    }
}
