//! The message envelope carried on the bus.
//!
//! A `Message` describes one unit of work: the channel it was published
//! under, its category, the CRUD verb, an opaque JSON payload, and the
//! correlation id linking a request to its completion.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Message category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// A CRUD request or its completion.
    Crud,
    /// Fire-and-forget notification. Not routed by the correlation engine.
    Notification,
}

/// The CRUD verb a message carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Create,
    Update,
    Delete,
    GetSingle,
    GetAll,
}

impl Action {
    /// Every action, in channel-registration order.
    pub const ALL: [Action; 5] = [
        Action::Create,
        Action::Update,
        Action::Delete,
        Action::GetSingle,
        Action::GetAll,
    ];

    /// Wire name (`"getSingle"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::GetSingle => "getSingle",
            Action::GetAll => "getAll",
        }
    }

    /// Name fragment used when building channel names (`"GetSingle"`).
    pub fn channel_fragment(&self) -> &'static str {
        match self {
            Action::Create => "Create",
            Action::Update => "Update",
            Action::Delete => "Delete",
            Action::GetSingle => "GetSingle",
            Action::GetAll => "GetAll",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown action name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// An envelope published on the bus.
///
/// The correlation id is fixed at construction. Completions are built with
/// [`Message::reply`], which copies it from the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    channel: String,
    #[serde(rename = "type")]
    message_type: MessageType,
    action: Action,
    payload: Value,
    correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
}

impl Message {
    /// Create an inbound message with a freshly generated correlation id.
    pub fn new(
        channel: impl Into<String>,
        message_type: MessageType,
        action: Action,
        payload: Value,
    ) -> Self {
        Self::with_correlation_id(channel, message_type, action, payload, new_correlation_id())
    }

    /// Create a message carrying an explicit correlation id.
    pub fn with_correlation_id(
        channel: impl Into<String>,
        message_type: MessageType,
        action: Action,
        payload: Value,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            message_type,
            action,
            payload,
            correlation_id: correlation_id.into(),
            timestamp: Some(Utc::now()),
        }
    }

    /// Shorthand for a CRUD message with a fresh correlation id.
    pub fn crud(channel: impl Into<String>, action: Action, payload: Value) -> Self {
        Self::new(channel, MessageType::Crud, action, payload)
    }

    /// Build the completion for `request` on `channel`.
    ///
    /// Type, action and correlation id are copied from the request.
    pub fn reply(request: &Message, channel: impl Into<String>, payload: Value) -> Self {
        Self::with_correlation_id(
            channel,
            request.message_type,
            request.action,
            payload,
            request.correlation_id.clone(),
        )
    }

    /// Re-address this message to another channel, keeping everything else.
    pub(crate) fn forwarded(&self, channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            ..self.clone()
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Consume the message and return its payload.
    pub fn into_payload(self) -> Value {
        self.payload
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Read the payload as a completion (`{statusCode, body}`).
    pub fn completion_payload(&self) -> CompletionPayload {
        CompletionPayload::from_value(self.payload.clone())
    }
}

/// Generate a new unique correlation token.
pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// The payload every completion message carries: a status and a body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionPayload {
    pub status_code: u16,
    #[serde(default)]
    pub body: Value,
}

impl CompletionPayload {
    pub fn status(status_code: u16, body: Value) -> Self {
        Self { status_code, body }
    }

    /// `200` with the given body.
    pub fn ok(body: Value) -> Self {
        Self::status(200, body)
    }

    /// `201` with the given body.
    pub fn created(body: Value) -> Self {
        Self::status(201, body)
    }

    /// `204` with a null body.
    pub fn no_content() -> Self {
        Self::status(204, Value::Null)
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Parse a completion payload out of a raw message payload.
    ///
    /// Payloads that are not in `{statusCode, body}` form are passed through
    /// as a `200` body so a handler's response is never swallowed.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<CompletionPayload>(value.clone()) {
            Ok(payload) => payload,
            Err(_) => Self::ok(value),
        }
    }

    pub fn into_value(self) -> Value {
        serde_json::json!({ "statusCode": self.status_code, "body": self.body })
    }
}
