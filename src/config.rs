//! Gateway configuration.
//!
//! Defaults, overridable from a JSON document or the environment:
//!
//! | key                  | env                           | default  |
//! |----------------------|-------------------------------|----------|
//! | `dispatchTimeoutMs`  | `GATEWAY_DISPATCH_TIMEOUT_MS` | `30000`  |
//! | `requestTimeoutMs`   | `GATEWAY_REQUEST_TIMEOUT_MS`  | `35000`  |
//! | `families`           | `GATEWAY_FAMILIES` (`a,b,c`)  | `["User"]` |

use std::time::Duration;

use serde::Deserialize;

use crate::channels::{ChannelError, ChannelRegistry};

pub const ENV_DISPATCH_TIMEOUT_MS: &str = "GATEWAY_DISPATCH_TIMEOUT_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "GATEWAY_REQUEST_TIMEOUT_MS";
pub const ENV_FAMILIES: &str = "GATEWAY_FAMILIES";

/// Errors raised while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error(transparent)]
    Channels(#[from] ChannelError),
}

/// Timeouts and the set of entity families the gateway serves.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GatewayConfig {
    /// How long the correlation engine waits for a service completion.
    pub dispatch_timeout_ms: u64,
    /// How long a gateway caller waits for the External completion.
    pub request_timeout_ms: u64,
    /// Families to register with conventional channel names.
    pub families: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout_ms: 30_000,
            request_timeout_ms: 35_000,
            families: vec!["User".to_string()],
        }
    }
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document; missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Defaults overridden by whichever `GATEWAY_*` variables are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().merge_vars(|key| std::env::var(key).ok())
    }

    fn merge_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(value) = var(ENV_DISPATCH_TIMEOUT_MS) {
            self.dispatch_timeout_ms = parse_millis(ENV_DISPATCH_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = var(ENV_REQUEST_TIMEOUT_MS) {
            self.request_timeout_ms = parse_millis(ENV_REQUEST_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = var(ENV_FAMILIES) {
            let families: Vec<String> = value
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect();
            if families.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: ENV_FAMILIES.to_string(),
                    value,
                });
            }
            self.families = families;
        }
        Ok(self)
    }

    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout_ms = duration_millis(timeout);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = duration_millis(timeout);
        self
    }

    pub fn with_families<I, S>(mut self, families: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.families = families.into_iter().map(Into::into).collect();
        self
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Build the conventional channel registry for the configured families.
    pub fn channel_registry(&self) -> Result<ChannelRegistry, ConfigError> {
        Ok(ChannelRegistry::conventional(&self.families)?)
    }
}

fn parse_millis(key: &str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(ms),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
