//! Subscription handles, options, and queued subscriptions.

use tokio::sync::mpsc;

use super::event_bus::EventBus;
use crate::message::Message;

/// Identifies one registered listener. Usable for removal.
///
/// Removing an already-removed handle is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub(crate) id: u64,
    pub(crate) channel: String,
}

impl SubscriptionHandle {
    /// The channel this listener is registered on.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

/// Options controlling how a listener receives messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Remove the listener after its first delivery.
    pub once: bool,
    /// Only deliver messages carrying this correlation id.
    pub correlation_id: Option<String>,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove the listener after its first (matching) delivery.
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    /// Restrict the listener to messages carrying `correlation_id`.
    pub fn correlated(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub(crate) fn accepts(&self, message: &Message) -> bool {
        match &self.correlation_id {
            Some(expected) => expected == message.correlation_id(),
            None => true,
        }
    }
}

/// A listener whose deliveries are queued instead of handled inline.
///
/// Messages are buffered in an unbounded channel in publish order and
/// read with [`recv`](Self::recv). Dropping the subscription unsubscribes.
pub struct QueuedSubscription {
    handle: SubscriptionHandle,
    bus: EventBus,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl QueuedSubscription {
    pub(crate) fn new(
        handle: SubscriptionHandle,
        bus: EventBus,
        rx: mpsc::UnboundedReceiver<Message>,
    ) -> Self {
        Self { handle, bus, rx }
    }

    /// Wait for the next queued message.
    ///
    /// Returns `None` once the listener has been removed (or the bus closed)
    /// and the buffer is drained.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    /// Take a queued message without waiting.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }
}

impl Drop for QueuedSubscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.handle);
    }
}
