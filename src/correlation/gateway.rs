//! Gateway — the transport layer's client for the bus.
//!
//! Publishes a request on a family's External event channel and waits for
//! the correlated message on its External completion channel.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::error::EngineError;
use crate::bus::{EventBus, SubscribeOptions};
use crate::channels::ChannelRegistry;
use crate::config::GatewayConfig;
use crate::message::{Action, Message};

/// Request/response client over the External channels.
///
/// ## Example
///
/// ```ignore
/// let gateway = Gateway::new(bus.clone(), registry.clone());
/// let completion = gateway
///     .request("User", Action::Create, json!({ "msisdn": "123" }))
///     .await?;
/// let payload = completion.completion_payload();
/// assert_eq!(payload.status_code, 201);
/// ```
#[derive(Clone)]
pub struct Gateway {
    bus: EventBus,
    registry: Arc<ChannelRegistry>,
    request_timeout: Duration,
}

impl Gateway {
    pub fn new(bus: EventBus, registry: Arc<ChannelRegistry>) -> Self {
        Self::with_config(bus, registry, &GatewayConfig::default())
    }

    pub fn with_config(bus: EventBus, registry: Arc<ChannelRegistry>, config: &GatewayConfig) -> Self {
        Self {
            bus,
            registry,
            request_timeout: config.request_timeout(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Send a CRUD request for `family` and wait for its completion.
    ///
    /// The completion listener is registered (once, filtered on the new
    /// correlation id) before the request is published, and removed on
    /// every exit path.
    pub async fn request(
        &self,
        family: &str,
        action: Action,
        payload: Value,
    ) -> Result<Message, EngineError> {
        let descriptor = self.registry.descriptor(family)?;
        let request = Message::crud(descriptor.external.event.as_str(), action, payload);
        let correlation_id = request.correlation_id().to_string();

        let mut completion = self.bus.subscribe_queued(
            &descriptor.external.completed_event,
            SubscribeOptions::new().correlated(correlation_id.as_str()).once(),
        )?;

        let delivered = self.bus.publish(&descriptor.external.event, &request)?;
        if delivered == 0 {
            tracing::warn!(family, %action, %correlation_id, "no engine attached to family");
        }

        match tokio::time::timeout(self.request_timeout, completion.recv()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(EngineError::Cancelled { correlation_id }),
            Err(_) => {
                tracing::warn!(family, %action, %correlation_id, "gateway request timed out");
                Err(EngineError::DispatchTimeout {
                    family: family.to_string(),
                    action,
                    correlation_id,
                    timeout: self.request_timeout,
                })
            }
        }
    }
}
