//! Platform bus port: where drivers send platform messages.

use driverhub_domain::message::PlatformMessage;

/// Delivers platform messages (responses, events, requests) to the platform.
///
/// Sending never blocks and never fails from the caller's point of view;
/// transports that can fail are expected to log and drop.
pub trait PlatformBus: Send + Sync {
    /// Send a message to the platform.
    fn send(&self, message: PlatformMessage);
}

impl<T: PlatformBus + ?Sized> PlatformBus for std::sync::Arc<T> {
    fn send(&self, message: PlatformMessage) {
        (**self).send(message);
    }
}
