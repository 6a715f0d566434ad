//! Errors surfaced by the correlation engine and gateway.

use std::time::Duration;

use crate::bus::BusError;
use crate::channels::ChannelError;
use crate::message::Action;

/// Error type for request/response bridging.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The request named a family with no registered channels.
    #[error("unknown channel family: {0}")]
    UnknownChannelFamily(String),
    /// The channel registry rejected the lookup for another reason.
    #[error(transparent)]
    Registry(ChannelError),
    /// No completion arrived before the deadline.
    #[error("no completion for {family}.{action} ({correlation_id}) within {timeout:?}")]
    DispatchTimeout {
        family: String,
        action: Action,
        correlation_id: String,
        timeout: Duration,
    },
    /// The bus refused the publish or subscription.
    #[error(transparent)]
    Bus(#[from] BusError),
    /// The completion listener went away without answering (bus closed).
    #[error("request {correlation_id} was cancelled before completing")]
    Cancelled { correlation_id: String },
}

impl From<ChannelError> for EngineError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::UnknownChannelFamily(family) => EngineError::UnknownChannelFamily(family),
            other => EngineError::Registry(other),
        }
    }
}

impl EngineError {
    /// Map this error to an HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::UnknownChannelFamily(_) => 404,
            EngineError::Registry(_) => 500,
            EngineError::DispatchTimeout { .. } => 504,
            EngineError::Bus(_) => 503,
            EngineError::Cancelled { .. } => 503,
        }
    }
}
