//! Context passed to CRUD handlers.
//!
//! Carries the dispatched payload plus the family, action and correlation id
//! of the request being served.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::HandlerError;
use crate::message::{Action, Message};

/// The context passed to every CRUD handler.
#[derive(Debug, Clone)]
pub struct Context {
    family: String,
    action: Action,
    correlation_id: String,
    input: Value,
}

impl Context {
    pub(crate) fn from_message(family: &str, message: &Message) -> Self {
        Self {
            family: family.to_string(),
            action: message.action(),
            correlation_id: message.correlation_id().to_string(),
            input: message.payload().clone(),
        }
    }

    /// Deserialize the input payload into a typed struct.
    pub fn input<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        serde_json::from_value(self.input.clone()).map_err(|e| HandlerError::DecodeFailed(e.to_string()))
    }

    /// Get the raw JSON input.
    pub fn raw_input(&self) -> &Value {
        &self.input
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Check if the raw input contains a field.
    pub fn has_field(&self, field: &str) -> bool {
        self.input.get(field).is_some()
    }

    /// Read a string field, failing with `DecodeFailed` if absent.
    pub fn required_str(&self, field: &str) -> Result<&str, HandlerError> {
        self.input
            .get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::DecodeFailed(format!("missing field `{field}`")))
    }
}
