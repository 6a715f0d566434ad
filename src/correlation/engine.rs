//! The correlation engine — bridges one External request to one Internal
//! dispatch/completion round trip and back.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use serde_json::json;
use tokio::sync::oneshot;

use super::error::EngineError;
use crate::bus::{EventBus, SubscribeOptions, SubscriptionHandle};
use crate::channels::{ChannelDescriptor, ChannelRegistry};
use crate::config::GatewayConfig;
use crate::message::{Action, CompletionPayload, Message, MessageType};

/// The temporary completion listeners of one request.
///
/// Released as a unit: the instant any member fires, when the waiter
/// finishes, or when the waiter is dropped.
struct ListenerGroup {
    bus: EventBus,
    handles: Mutex<Vec<SubscriptionHandle>>,
}

impl ListenerGroup {
    fn new(bus: EventBus) -> Self {
        Self {
            bus,
            handles: Mutex::new(Vec::new()),
        }
    }

    fn push(&self, handle: SubscriptionHandle) {
        self.lock().push(handle);
    }

    fn release(&self) {
        let handles = std::mem::take(&mut *self.lock());
        for handle in &handles {
            self.bus.unsubscribe(handle);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SubscriptionHandle>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type CompletionSlot = Arc<Mutex<Option<oneshot::Sender<(Action, Message)>>>>;

/// Turns the fire-and-forget bus into a per-request request/response channel.
///
/// For an inbound request on a family's External event channel the engine:
///
/// 1. resolves the family's channels,
/// 2. subscribes to all five Internal completion channels, filtered on the
///    request's correlation id,
/// 3. forwards the request onto the Internal dispatch channel of its action,
/// 4. takes the first matching completion as the answer,
/// 5. republishes it on the External completion channel with the same
///    correlation id and the dispatched action,
/// 6. removes the five listeners on every exit path.
///
/// Steps 1–3 run synchronously in [`begin`](Self::begin), so a handler that
/// completes inline during dispatch is still observed.
pub struct CorrelationEngine {
    bus: EventBus,
    registry: Arc<ChannelRegistry>,
    dispatch_timeout: Duration,
}

impl CorrelationEngine {
    pub fn new(bus: EventBus, registry: Arc<ChannelRegistry>) -> Self {
        Self::with_config(bus, registry, &GatewayConfig::default())
    }

    pub fn with_config(bus: EventBus, registry: Arc<ChannelRegistry>, config: &GatewayConfig) -> Self {
        Self {
            bus,
            registry,
            dispatch_timeout: config.dispatch_timeout(),
        }
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn dispatch_timeout(&self) -> Duration {
        self.dispatch_timeout
    }

    /// Register completion listeners and dispatch `request` internally.
    ///
    /// The family is resolved from the request's External event channel.
    pub fn begin(&self, request: Message) -> Result<PendingDispatch, EngineError> {
        let descriptor = self.registry.descriptor_for_event(request.channel())?;
        self.begin_for(descriptor, request)
    }

    /// Like [`begin`](Self::begin), for a request already known to belong
    /// to `descriptor`'s family. The envelope channel is not consulted.
    pub fn begin_for(
        &self,
        descriptor: &ChannelDescriptor,
        request: Message,
    ) -> Result<PendingDispatch, EngineError> {
        let family = descriptor.family().to_string();
        let action = request.action();
        let correlation_id = request.correlation_id().to_string();

        let (tx, rx) = oneshot::channel();
        let slot: CompletionSlot = Arc::new(Mutex::new(Some(tx)));
        let group = Arc::new(ListenerGroup::new(self.bus.clone()));

        // The waiter owns cleanup from here on, including the error paths below.
        let pending = PendingDispatch {
            bus: self.bus.clone(),
            family,
            action,
            message_type: request.message_type(),
            correlation_id: correlation_id.clone(),
            completed_channel: descriptor.external.completed_event.clone(),
            timeout: self.dispatch_timeout,
            rx,
            group: Arc::clone(&group),
        };

        for (completed_action, channel) in descriptor.completion_channels() {
            let slot = Arc::clone(&slot);
            let group_ref = Arc::downgrade(&group);
            let handle = self.bus.subscribe_with(
                channel,
                SubscribeOptions::new().correlated(correlation_id.as_str()),
                move |message| on_completion(&slot, &group_ref, completed_action, message),
            )?;
            group.push(handle);
        }

        let dispatch_channel = descriptor.dispatch_channel(action);
        let delivered = self
            .bus
            .publish(dispatch_channel, &request.forwarded(dispatch_channel))?;

        if delivered == 0 {
            tracing::warn!(
                family = %pending.family,
                %action,
                correlation_id = %pending.correlation_id,
                channel = dispatch_channel,
                "no service handler on dispatch channel"
            );
        } else {
            tracing::debug!(
                family = %pending.family,
                %action,
                correlation_id = %pending.correlation_id,
                "request dispatched"
            );
        }

        Ok(pending)
    }

    /// Run a full round trip for `request` and return the External
    /// completion message that was published.
    pub async fn bridge(&self, request: Message) -> Result<Message, EngineError> {
        self.begin(request)?.complete().await
    }

    /// Subscribe the engine to `family`'s External event channel.
    ///
    /// Each inbound CRUD message is dispatched synchronously and its
    /// completion awaited on a spawned tokio task. The listener holds a weak
    /// reference: it stops bridging once the engine is dropped.
    pub fn attach(self: &Arc<Self>, family: &str) -> Result<SubscriptionHandle, EngineError> {
        let descriptor = self.registry.descriptor(family)?.clone();
        let channel = descriptor.external.event.clone();
        let engine: Weak<Self> = Arc::downgrade(self);

        let handle = self.bus.subscribe(&channel, move |message| {
            let Some(engine) = engine.upgrade() else {
                return;
            };
            engine.accept(&descriptor, message);
        })?;

        tracing::info!(family, %channel, "correlation engine attached");
        Ok(handle)
    }

    /// Attach to every family in the registry.
    pub fn attach_all(self: &Arc<Self>) -> Result<Vec<SubscriptionHandle>, EngineError> {
        self.registry
            .families()
            .into_iter()
            .map(|family| self.attach(family))
            .collect()
    }

    /// Handle a message delivered on `descriptor`'s External event channel.
    /// The arrival channel decides the family; a differing envelope channel
    /// is re-addressed.
    fn accept(&self, descriptor: &ChannelDescriptor, message: &Message) {
        if message.message_type() != MessageType::Crud {
            tracing::debug!(
                channel = message.channel(),
                message_type = ?message.message_type(),
                "ignoring non-CRUD message"
            );
            return;
        }

        let arrival = descriptor.external.event.as_str();
        let request = if message.channel() == arrival {
            message.clone()
        } else {
            tracing::debug!(
                envelope = message.channel(),
                %arrival,
                correlation_id = message.correlation_id(),
                "envelope channel differs from arrival channel"
            );
            message.forwarded(arrival)
        };

        let pending = match self.begin_for(descriptor, request) {
            Ok(pending) => pending,
            Err(err) => {
                tracing::error!(
                    correlation_id = message.correlation_id(),
                    error = %err,
                    "failed to dispatch request"
                );
                return;
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(err) = pending.complete().await {
                        tracing::warn!(error = %err, "request did not complete");
                    }
                });
            }
            // Dropping `pending` removes its listeners.
            Err(_) => tracing::error!(
                correlation_id = message.correlation_id(),
                "no tokio runtime available, request abandoned"
            ),
        }
    }
}

fn on_completion(
    slot: &CompletionSlot,
    group: &Weak<ListenerGroup>,
    action: Action,
    message: &Message,
) {
    let sender = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(group) = group.upgrade() {
        group.release();
    }
    match sender {
        Some(sender) => {
            // Receiver gone means the waiter was dropped; nothing to deliver to.
            let _ = sender.send((action, message.clone()));
        }
        None => tracing::warn!(
            correlation_id = message.correlation_id(),
            %action,
            "duplicate completion ignored"
        ),
    }
}

/// A dispatched request waiting for its completion.
///
/// Dropping it before [`complete`](Self::complete) resolves cancels the
/// request and removes its listeners.
pub struct PendingDispatch {
    bus: EventBus,
    family: String,
    action: Action,
    message_type: MessageType,
    correlation_id: String,
    completed_channel: String,
    timeout: Duration,
    rx: oneshot::Receiver<(Action, Message)>,
    group: Arc<ListenerGroup>,
}

impl PendingDispatch {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    /// Wait for the completion and republish it on the External completion
    /// channel.
    ///
    /// # Errors
    ///
    /// `DispatchTimeout` if nothing arrives within the deadline; a `504`
    /// completion is still published so the caller is released.
    pub async fn complete(mut self) -> Result<Message, EngineError> {
        let outcome = tokio::time::timeout(self.timeout, &mut self.rx).await;
        self.group.release();

        match outcome {
            Ok(Ok((completed_action, response))) => {
                if completed_action != self.action {
                    tracing::warn!(
                        family = %self.family,
                        dispatched = %self.action,
                        completed = %completed_action,
                        correlation_id = %self.correlation_id,
                        "completion arrived on another action's channel"
                    );
                }
                let completion = self.completion(response.into_payload());
                self.bus.publish(&self.completed_channel, &completion)?;
                tracing::debug!(
                    family = %self.family,
                    action = %self.action,
                    correlation_id = %self.correlation_id,
                    "request completed"
                );
                Ok(completion)
            }
            Ok(Err(_)) => Err(EngineError::Cancelled {
                correlation_id: self.correlation_id.clone(),
            }),
            Err(_) => {
                tracing::warn!(
                    family = %self.family,
                    action = %self.action,
                    correlation_id = %self.correlation_id,
                    timeout = ?self.timeout,
                    "dispatch timed out"
                );
                let payload = CompletionPayload::status(
                    504,
                    json!({
                        "message": "The service did not respond in time.",
                        "correlationId": self.correlation_id,
                    }),
                );
                let completion = self.completion(payload.into_value());
                if let Err(err) = self.bus.publish(&self.completed_channel, &completion) {
                    tracing::error!(error = %err, "failed to publish timeout completion");
                }
                Err(EngineError::DispatchTimeout {
                    family: self.family.clone(),
                    action: self.action,
                    correlation_id: self.correlation_id.clone(),
                    timeout: self.timeout,
                })
            }
        }
    }

    fn completion(&self, payload: serde_json::Value) -> Message {
        Message::with_correlation_id(
            self.completed_channel.as_str(),
            self.message_type,
            self.action,
            payload,
            self.correlation_id.as_str(),
        )
    }
}

impl Drop for PendingDispatch {
    fn drop(&mut self) {
        self.group.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChannelDescriptor;
    use serde_json::json;

    fn engine(timeout_ms: u64) -> (EventBus, CorrelationEngine, ChannelDescriptor) {
        let bus = EventBus::new();
        let registry = Arc::new(ChannelRegistry::conventional(["User"]).unwrap());
        let descriptor = registry.descriptor("User").unwrap().clone();
        let engine = CorrelationEngine::new(bus.clone(), registry)
            .with_dispatch_timeout(Duration::from_millis(timeout_ms));
        (bus, engine, descriptor)
    }

    fn request(action: Action, correlation_id: &str) -> Message {
        Message::with_correlation_id("UserEvent", MessageType::Crud, action, json!({}), correlation_id)
    }

    fn completion_listeners(bus: &EventBus, d: &ChannelDescriptor) -> usize {
        d.completion_channels()
            .iter()
            .map(|(_, c)| bus.listener_count(c))
            .sum()
    }

    #[tokio::test]
    async fn begin_registers_five_listeners_then_drop_removes_them() {
        let (bus, engine, d) = engine(1000);
        let pending = engine.begin(request(Action::Create, "c1")).unwrap();
        assert_eq!(completion_listeners(&bus, &d), 5);

        drop(pending);
        assert_eq!(completion_listeners(&bus, &d), 0);
    }

    #[tokio::test]
    async fn completion_with_other_correlation_id_is_ignored() {
        let (bus, engine, d) = engine(1000);
        let pending = engine.begin(request(Action::Create, "mine")).unwrap();

        let stranger = request(Action::Create, "theirs");
        bus.publish(
            d.completion_channel(Action::Create),
            &Message::reply(&stranger, "x", json!({ "statusCode": 201 })),
        )
        .unwrap();
        assert_eq!(completion_listeners(&bus, &d), 5);

        let mine = request(Action::Create, "mine");
        bus.publish(
            d.completion_channel(Action::Create),
            &Message::reply(&mine, "x", json!({ "statusCode": 201, "body": "ok" })),
        )
        .unwrap();
        assert_eq!(completion_listeners(&bus, &d), 0);

        let completion = pending.complete().await.unwrap();
        assert_eq!(completion.correlation_id(), "mine");
        assert_eq!(completion.completion_payload().body, json!("ok"));
    }

    #[tokio::test]
    async fn unknown_event_channel() {
        let (_bus, engine, _) = engine(1000);
        let msg = Message::with_correlation_id("ChatEvent", MessageType::Crud, Action::Create, json!({}), "c");
        assert!(matches!(
            engine.begin(msg),
            Err(EngineError::UnknownChannelFamily(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_publishes_504_and_cleans_up() {
        let (bus, engine, d) = engine(50);
        let mut completed = bus
            .subscribe_queued(&d.external.completed_event, SubscribeOptions::new())
            .unwrap();

        let err = engine.bridge(request(Action::GetAll, "slow")).await.unwrap_err();
        assert!(matches!(err, EngineError::DispatchTimeout { .. }));
        assert_eq!(err.status_code(), 504);
        assert_eq!(completion_listeners(&bus, &d), 0);

        let msg = completed.recv().await.unwrap();
        assert_eq!(msg.correlation_id(), "slow");
        assert_eq!(msg.completion_payload().status_code, 504);
    }

    #[tokio::test]
    async fn closed_bus_fails_begin_without_leaking() {
        let (bus, engine, d) = engine(1000);
        bus.close();
        assert!(matches!(
            engine.begin(request(Action::Create, "c")),
            Err(EngineError::Bus(_))
        ));
        assert_eq!(completion_listeners(&bus, &d), 0);
    }

    #[tokio::test]
    async fn closing_the_bus_cancels_a_waiting_dispatch() {
        let (bus, engine, d) = engine(60_000);
        let pending = engine.begin(request(Action::Delete, "gone")).unwrap();
        assert_eq!(completion_listeners(&bus, &d), 5);

        bus.close();

        let err = pending.complete().await.unwrap_err();
        assert_eq!(
            err,
            EngineError::Cancelled {
                correlation_id: "gone".into()
            }
        );
        assert_eq!(err.status_code(), 503);
        assert_eq!(completion_listeners(&bus, &d), 0);
    }
}
