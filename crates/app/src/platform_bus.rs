//! In-process platform bus backed by a tokio broadcast channel.

use tokio::sync::broadcast;

use driverhub_domain::message::PlatformMessage;

use crate::ports::PlatformBus;

/// In-process platform bus using a tokio [`broadcast`] channel.
///
/// Sending succeeds even when there are no active subscribers
/// (the message is simply dropped).
#[derive(Clone)]
pub struct InProcessPlatformBus {
    sender: broadcast::Sender<PlatformMessage>,
}

impl InProcessPlatformBus {
    /// Create a new bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to messages on this bus.
    ///
    /// Returns a receiver that will get all messages sent *after*
    /// the subscription is created.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PlatformMessage> {
        self.sender.subscribe()
    }
}

impl PlatformBus for InProcessPlatformBus {
    fn send(&self, message: PlatformMessage) {
        tracing::trace!(
            message_type = message.message_type(),
            from = %message.source,
            to = %message.destination,
            "platform message"
        );
        // Fails only when there are zero receivers.
        let _ = self.sender.send(message);
    }
}

#[cfg(test)]
mod tests {
    use driverhub_domain::address::Address;
    use driverhub_domain::message::MessageBody;

    use super::*;

    fn value_change() -> PlatformMessage {
        PlatformMessage::broadcast(
            Address::service("dev"),
            None,
            MessageBody::new("base:ValueChange").with("swit:state", "ON"),
        )
    }

    #[tokio::test]
    async fn should_deliver_message_to_subscriber() {
        let bus = InProcessPlatformBus::new(16);
        let mut rx = bus.subscribe();

        let message = value_change();
        let message_id = message.id;

        bus.send(message);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, message_id);
    }

    #[tokio::test]
    async fn should_deliver_message_to_multiple_subscribers() {
        let bus = InProcessPlatformBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let message = value_change();
        let message_id = message.id;

        bus.send(message);

        assert_eq!(rx1.recv().await.unwrap().id, message_id);
        assert_eq!(rx2.recv().await.unwrap().id, message_id);
    }

    #[test]
    fn should_not_fail_without_subscribers() {
        let bus = InProcessPlatformBus::new(16);
        bus.send(value_change());
    }

    #[tokio::test]
    async fn should_not_deliver_messages_sent_before_subscription() {
        let bus = InProcessPlatformBus::new(16);
        bus.send(value_change());

        let mut rx = bus.subscribe();

        let later = value_change();
        let later_id = later.id;
        bus.send(later);

        assert_eq!(rx.recv().await.unwrap().id, later_id);
    }
}
