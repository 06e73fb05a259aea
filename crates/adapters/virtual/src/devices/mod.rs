//! Virtual device drivers: a switchable light and a polled temperature
//! sensor.
//!
//! Both drivers run against [`DeviceDriverContext`] and keep their state in
//! the context's attributes, so every change is broadcast as a value change.

mod light;
mod sensor;

pub use light::VirtualLight;
pub use sensor::VirtualSensor;

use driverhub_app::context::DeviceDriverContext;
use driverhub_app::executor::DispatchScope;
use driverhub_app::ports::{DriverContext, PlatformBus};
use driverhub_domain::message::{MessageBody, PlatformMessage};

/// Protocol namespace used by simulated device traffic.
pub const PROTOCOL: &str = "VIRT";

/// Platform message asking a driver for its current attributes.
pub const GET_ATTRIBUTES: &str = "base:GetAttributes";

/// Response to [`GET_ATTRIBUTES`].
pub const GET_ATTRIBUTES_RESPONSE: &str = "base:GetAttributesResponse";

/// Error code for platform messages a driver does not understand.
pub const UNSUPPORTED_MESSAGE: &str = "UnsupportedMessageType";

/// Error code for requests with missing or malformed arguments.
pub const INVALID_ARGUMENT: &str = "InvalidArgument";

/// Send `body` back to the sender of `message`, when it expects a response.
fn reply<B: PlatformBus + 'static>(
    message: &PlatformMessage,
    scope: &DispatchScope<'_, DeviceDriverContext<B>>,
    body: MessageBody,
) {
    if !message.request {
        return;
    }
    scope
        .context()
        .send_to_platform(message.response(scope.address().clone(), body));
}

fn reply_attributes<B: PlatformBus + 'static>(
    message: &PlatformMessage,
    scope: &DispatchScope<'_, DeviceDriverContext<B>>,
) {
    let body = MessageBody {
        message_type: GET_ATTRIBUTES_RESPONSE.to_string(),
        attributes: scope.context().attributes(),
    };
    reply(message, scope, body);
}

fn reply_unsupported<B: PlatformBus + 'static>(
    message: &PlatformMessage,
    scope: &DispatchScope<'_, DeviceDriverContext<B>>,
) {
    tracing::debug!(message_type = message.message_type(), "unsupported platform message");
    reply(
        message,
        scope,
        MessageBody::error(
            UNSUPPORTED_MESSAGE,
            format!("{} is not supported", message.message_type()),
        ),
    );
}
