//! The in-process event bus.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;

use super::error::BusError;
use super::subscription::{QueuedSubscription, SubscribeOptions, SubscriptionHandle};
use crate::message::Message;

thread_local! {
    /// Channels this thread is delivering on, with the messages published
    /// to them from inside that delivery.
    static IN_DELIVERY: RefCell<HashMap<DeliveryKey, VecDeque<Message>>> = RefCell::new(HashMap::new());
}

type DeliveryKey = (usize, String);

/// Marks a channel as being delivered on by this thread until dropped.
struct DeliveryGuard {
    key: DeliveryKey,
}

impl DeliveryGuard {
    /// `None` if this thread is already delivering on the channel, in which
    /// case `message` has been queued behind the current delivery.
    fn enter(key: DeliveryKey, message: &Message) -> Option<Self> {
        IN_DELIVERY.with(|delivering| {
            let mut delivering = delivering.borrow_mut();
            match delivering.get_mut(&key) {
                Some(pending) => {
                    pending.push_back(message.clone());
                    None
                }
                None => {
                    delivering.insert(key.clone(), VecDeque::new());
                    Some(Self { key })
                }
            }
        })
    }

    fn next_pending(&self) -> Option<Message> {
        IN_DELIVERY.with(|delivering| {
            delivering
                .borrow_mut()
                .get_mut(&self.key)
                .and_then(VecDeque::pop_front)
        })
    }
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        // try_with: the thread-local may already be gone during thread exit.
        let _ = IN_DELIVERY.try_with(|delivering| delivering.borrow_mut().remove(&self.key));
    }
}

/// A synchronous listener callback.
pub type Handler = Arc<dyn Fn(&Message) + Send + Sync>;

struct Listener {
    id: u64,
    options: SubscribeOptions,
    handler: Handler,
    active: AtomicBool,
}

#[derive(Default)]
struct Registry {
    channels: HashMap<String, Vec<Arc<Listener>>>,
    closed: bool,
}

struct Inner {
    registry: RwLock<Registry>,
    next_id: AtomicU64,
}

/// Process-local publish/subscribe bus.
///
/// Cheap to clone; every clone shares the same channels. Thread-safe, and
/// listeners may publish, subscribe, or unsubscribe (themselves included)
/// from inside a delivery.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.read();
        f.debug_struct("EventBus")
            .field("channels", &registry.channels.len())
            .field("closed", &registry.closed)
            .finish()
    }
}

impl EventBus {
    /// Create an empty, open bus.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: RwLock::new(Registry::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Registry> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Registry> {
        self.inner
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` on `channel`.
    pub fn subscribe<F>(&self, channel: &str, handler: F) -> Result<SubscriptionHandle, BusError>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.subscribe_with(channel, SubscribeOptions::default(), handler)
    }

    /// Register `handler` on `channel` with delivery options.
    pub fn subscribe_with<F>(
        &self,
        channel: &str,
        options: SubscribeOptions,
        handler: F,
    ) -> Result<SubscriptionHandle, BusError>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let listener = Arc::new(Listener {
            id,
            options,
            handler: Arc::new(handler),
            active: AtomicBool::new(true),
        });

        let mut registry = self.write();
        if registry.closed {
            return Err(BusError::Closed {
                channel: channel.to_string(),
            });
        }
        registry
            .channels
            .entry(channel.to_string())
            .or_default()
            .push(listener);

        tracing::trace!(channel, listener_id = id, "listener registered");
        Ok(SubscriptionHandle {
            id,
            channel: channel.to_string(),
        })
    }

    /// Register a listener whose deliveries are buffered for async reading.
    pub fn subscribe_queued(
        &self,
        channel: &str,
        options: SubscribeOptions,
    ) -> Result<QueuedSubscription, BusError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.subscribe_with(channel, options, move |message| {
            // Receiver gone means the subscription is being dropped.
            let _ = tx.send(message.clone());
        })?;
        Ok(QueuedSubscription::new(handle, self.clone(), rx))
    }

    /// Remove one listener. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let removed = self.remove(&handle.channel, handle.id);
        if removed {
            tracing::trace!(channel = %handle.channel, listener_id = handle.id, "listener removed");
        }
        removed
    }

    /// Remove every listener on `channel`. Returns how many were removed.
    pub fn unsubscribe_all(&self, channel: &str) -> usize {
        let removed = self.write().channels.remove(channel).unwrap_or_default();
        for listener in &removed {
            listener.active.store(false, Ordering::Release);
        }
        removed.len()
    }

    fn remove(&self, channel: &str, id: u64) -> bool {
        let mut registry = self.write();
        let Some(listeners) = registry.channels.get_mut(channel) else {
            return false;
        };
        let Some(index) = listeners.iter().position(|l| l.id == id) else {
            return false;
        };

        let listener = listeners.remove(index);
        listener.active.store(false, Ordering::Release);
        if listeners.is_empty() {
            registry.channels.remove(channel);
        }
        true
    }

    /// Deliver `message` to every current listener of `channel`, in
    /// registration order. Returns the number of listeners invoked.
    ///
    /// The listener list is snapshotted before delivery and no lock is held
    /// while handlers run. Publishing on another channel from inside a
    /// handler is delivered immediately. Publishing on the channel being
    /// delivered is queued until the current delivery finishes, so every
    /// listener sees one channel's messages in publish order; such a
    /// publish returns `Ok(0)`.
    pub fn publish(&self, channel: &str, message: &Message) -> Result<usize, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed {
                channel: channel.to_string(),
            });
        }

        let key = (Arc::as_ptr(&self.inner) as usize, channel.to_string());
        let Some(guard) = DeliveryGuard::enter(key, message) else {
            tracing::trace!(
                channel,
                correlation_id = message.correlation_id(),
                "message queued behind current delivery"
            );
            return Ok(0);
        };

        let delivered = self.deliver(channel, message)?;
        while let Some(pending) = guard.next_pending() {
            if let Err(err) = self.deliver(channel, &pending) {
                tracing::warn!(
                    channel,
                    correlation_id = pending.correlation_id(),
                    error = %err,
                    "queued message dropped"
                );
                break;
            }
        }
        Ok(delivered)
    }

    fn deliver(&self, channel: &str, message: &Message) -> Result<usize, BusError> {
        let snapshot: Vec<Arc<Listener>> = {
            let registry = self.read();
            if registry.closed {
                return Err(BusError::Closed {
                    channel: channel.to_string(),
                });
            }
            registry.channels.get(channel).cloned().unwrap_or_default()
        };

        if snapshot.is_empty() {
            tracing::debug!(
                channel,
                correlation_id = message.correlation_id(),
                "no listeners, message dropped"
            );
            return Ok(0);
        }

        let mut delivered = 0;
        for listener in snapshot {
            if !listener.options.accepts(message) {
                continue;
            }

            if listener.options.once {
                // Claim the single delivery; another thread may race us.
                if listener
                    .active
                    .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    continue;
                }
                self.remove(channel, listener.id);
            } else if !listener.active.load(Ordering::Acquire) {
                continue;
            }

            (listener.handler)(message);
            delivered += 1;
        }

        tracing::trace!(
            channel,
            correlation_id = message.correlation_id(),
            delivered,
            "message published"
        );
        Ok(delivered)
    }

    /// Number of listeners currently registered on `channel`.
    pub fn listener_count(&self, channel: &str) -> usize {
        self.read().channels.get(channel).map_or(0, Vec::len)
    }

    /// Dispose of the bus: drop every listener and reject further use.
    pub fn close(&self) {
        let channels = {
            let mut registry = self.write();
            registry.closed = true;
            std::mem::take(&mut registry.channels)
        };
        for listener in channels.values().flatten() {
            listener.active.store(false, Ordering::Release);
        }
        tracing::info!(channels = channels.len(), "event bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.read().closed
    }
}
