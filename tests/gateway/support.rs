//! Shared wiring: one bus, one registry, an attached engine and a gateway.

use std::sync::{Arc, Once};
use std::time::Duration;

use civitas_gateway::{ChannelRegistry, CorrelationEngine, EventBus, Gateway, SubscriptionHandle};

static TRACING: Once = Once::new();

/// Install a test subscriber once. `RUST_LOG` controls the filter.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub struct Harness {
    pub bus: EventBus,
    pub registry: Arc<ChannelRegistry>,
    pub engine: Arc<CorrelationEngine>,
    pub gateway: Gateway,
    _attached: Vec<SubscriptionHandle>,
}

impl Harness {
    pub fn new(families: &[&str]) -> Self {
        Self::with_timeouts(families, Duration::from_secs(5), Duration::from_secs(6))
    }

    pub fn with_timeouts(families: &[&str], dispatch: Duration, request: Duration) -> Self {
        init_tracing();
        let bus = EventBus::new();
        let registry = Arc::new(ChannelRegistry::conventional(families.iter().copied()).unwrap());
        let engine = Arc::new(
            CorrelationEngine::new(bus.clone(), registry.clone()).with_dispatch_timeout(dispatch),
        );
        let attached = engine.attach_all().unwrap();
        let gateway = Gateway::new(bus.clone(), registry.clone()).with_request_timeout(request);
        Self {
            bus,
            registry,
            engine,
            gateway,
            _attached: attached,
        }
    }

    /// Listeners currently registered on every channel of `family`.
    pub fn listeners(&self, family: &str) -> usize {
        let descriptor = self.registry.descriptor(family).unwrap();
        descriptor
            .channel_names()
            .into_iter()
            .map(|channel| self.bus.listener_count(channel))
            .sum()
    }
}
