pub mod bus;
pub mod channels;
pub mod config;
pub mod correlation;
#[cfg(feature = "http")]
pub mod http;
pub mod message;
pub mod service;
pub mod users;
pub mod validation;

pub use bus::{BusError, EventBus, QueuedSubscription, SubscribeOptions, SubscriptionHandle};
pub use channels::{ChannelDescriptor, ChannelError, ChannelRegistry, ExternalChannels, InternalChannels};
pub use config::{ConfigError, GatewayConfig};
pub use correlation::{CorrelationEngine, EngineError, Gateway, PendingDispatch};
pub use message::{Action, CompletionPayload, Message, MessageType};
pub use service::{Context, CrudService, HandlerError, HandlerResult, ServiceHandle, ServiceStats};
pub use validation::{ErrorEntry, RuleOptions, ValidationChain, ValidationError, ValidationMode};
