//! CrudService — per-family handler registry attached to the internal
//! dispatch channels.
//!
//! ## Example
//!
//! ```ignore
//! let handle = CrudService::new("User")
//!     .on(Action::GetAll, |_ctx| Ok(CompletionPayload::no_content()))
//!     .on_async(Action::Create, move |ctx| async move {
//!         let user: NewUser = ctx.input()?;
//!         Ok(CompletionPayload::created(json!(user)))
//!     })
//!     .attach(&bus, &registry)?;
//!
//! // ... later
//! let stats = handle.stop();
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use super::context::Context;
use super::error::HandlerError;
use crate::bus::{EventBus, SubscriptionHandle};
use crate::channels::{ChannelDescriptor, ChannelRegistry};
use crate::correlation::EngineError;
use crate::message::{Action, CompletionPayload, Message};

/// Result of a CRUD handler.
pub type HandlerResult = Result<CompletionPayload, HandlerError>;

type SyncHandler = Arc<dyn Fn(&Context) -> HandlerResult + Send + Sync>;
type AsyncHandler = Arc<dyn Fn(Context) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

#[derive(Clone)]
enum CrudHandler {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

/// Counters for an attached service.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStats {
    /// Dispatches answered with a success status.
    pub messages_handled: usize,
    /// Dispatches answered with an error status.
    pub messages_failed: usize,
}

#[derive(Default)]
struct StatCounters {
    handled: AtomicUsize,
    failed: AtomicUsize,
}

impl StatCounters {
    fn record(&self, completion: &CompletionPayload) {
        if completion.is_success() {
            self.handled.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> ServiceStats {
        ServiceStats {
            messages_handled: self.handled.load(Ordering::Relaxed),
            messages_failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Handlers for one family's CRUD actions.
///
/// Every dispatched message is answered with exactly one completion on the
/// matching internal completion channel, carrying the dispatched correlation
/// id. Actions without a registered handler are not subscribed.
pub struct CrudService {
    family: String,
    handlers: HashMap<Action, CrudHandler>,
}

impl CrudService {
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            handlers: HashMap::new(),
        }
    }

    /// Register a synchronous handler. Its completion is published inline,
    /// inside the dispatch delivery.
    pub fn on<F>(mut self, action: Action, handler: F) -> Self
    where
        F: Fn(&Context) -> HandlerResult + Send + Sync + 'static,
    {
        self.handlers.insert(action, CrudHandler::Sync(Arc::new(handler)));
        self
    }

    /// Register an asynchronous handler. It runs on a spawned tokio task.
    pub fn on_async<F, Fut>(mut self, action: Action, handler: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: AsyncHandler = Arc::new(move |ctx| handler(ctx).boxed());
        self.handlers.insert(action, CrudHandler::Async(handler));
        self
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    /// Registered actions, in `Action::ALL` order.
    pub fn actions(&self) -> Vec<Action> {
        Action::ALL
            .into_iter()
            .filter(|action| self.handlers.contains_key(action))
            .collect()
    }

    /// Subscribe every registered handler to its internal dispatch channel.
    ///
    /// # Errors
    ///
    /// `UnknownChannelFamily` if the registry has no descriptor for this
    /// family, `Bus` if the bus is closed. No subscription survives a failed
    /// attach.
    pub fn attach(self, bus: &EventBus, registry: &ChannelRegistry) -> Result<ServiceHandle, EngineError> {
        let descriptor = registry.descriptor(&self.family)?.clone();
        let stats = Arc::new(StatCounters::default());
        let mut service = ServiceHandle {
            family: self.family.clone(),
            bus: bus.clone(),
            handles: Vec::new(),
            stats: stats.clone(),
        };

        for action in self.actions() {
            let Some(handler) = self.handlers.get(&action).cloned() else {
                continue;
            };
            let dispatch = Dispatch {
                family: self.family.clone(),
                completion_channel: descriptor.completion_channel(action).to_string(),
                bus: bus.clone(),
                stats: stats.clone(),
            };
            // A failed subscribe drops `service`, which releases the
            // subscriptions already made.
            let handle = bus.subscribe(descriptor.dispatch_channel(action), move |message| {
                dispatch.handle(&handler, message);
            })?;
            service.handles.push(handle);
        }

        tracing::debug!(
            family = %self.family,
            actions = service.handles.len(),
            "crud service attached"
        );
        log_unhandled(&descriptor, &self.actions());
        Ok(service)
    }
}

fn log_unhandled(descriptor: &ChannelDescriptor, handled: &[Action]) {
    for action in Action::ALL {
        if !handled.contains(&action) {
            tracing::trace!(
                family = descriptor.family(),
                %action,
                channel = descriptor.dispatch_channel(action),
                "no handler registered"
            );
        }
    }
}

/// Everything a subscription closure needs to answer one dispatch.
#[derive(Clone)]
struct Dispatch {
    family: String,
    completion_channel: String,
    bus: EventBus,
    stats: Arc<StatCounters>,
}

impl Dispatch {
    fn handle(&self, handler: &CrudHandler, message: &Message) {
        let ctx = Context::from_message(&self.family, message);
        match handler {
            CrudHandler::Sync(handler) => {
                let completion = complete(handler(&ctx), &ctx);
                self.reply(message, completion);
            }
            CrudHandler::Async(handler) => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let future = handler(ctx.clone());
                    let reply = self.clone();
                    let request = message.clone();
                    runtime.spawn(async move {
                        let completion = complete(future.await, &ctx);
                        reply.reply(&request, completion);
                    });
                }
                Err(_) => {
                    let err = HandlerError::Other("no async runtime available".to_string());
                    let completion = complete(Err(err), &ctx);
                    self.reply(message, completion);
                }
            },
        }
    }

    fn reply(&self, request: &Message, completion: CompletionPayload) {
        self.stats.record(&completion);
        let reply = Message::reply(request, self.completion_channel.as_str(), completion.into_value());
        if let Err(err) = self.bus.publish(&self.completion_channel, &reply) {
            tracing::warn!(
                channel = %self.completion_channel,
                correlation_id = reply.correlation_id(),
                error = %err,
                "failed to publish completion"
            );
        }
    }
}

fn complete(result: HandlerResult, ctx: &Context) -> CompletionPayload {
    match result {
        Ok(completion) => completion,
        Err(err) => {
            tracing::debug!(
                family = ctx.family(),
                action = %ctx.action(),
                correlation_id = ctx.correlation_id(),
                error = %err,
                "handler failed"
            );
            err.to_completion()
        }
    }
}

/// A running service. Dropping it (or calling `stop`) unsubscribes every
/// handler.
pub struct ServiceHandle {
    family: String,
    bus: EventBus,
    handles: Vec<SubscriptionHandle>,
    stats: Arc<StatCounters>,
}

impl ServiceHandle {
    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn stats(&self) -> ServiceStats {
        self.stats.snapshot()
    }

    /// Unsubscribe every handler and return the final counters.
    pub fn stop(mut self) -> ServiceStats {
        self.release();
        self.stats.snapshot()
    }

    fn release(&mut self) {
        for handle in self.handles.drain(..) {
            self.bus.unsubscribe(&handle);
        }
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        self.release();
    }
}
