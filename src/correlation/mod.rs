//! Correlation — request/response over the fire-and-forget bus.
//!
//! ```text
//! caller ──► Gateway::request ──► External.Event ──► CorrelationEngine
//!                                                       │ 1. listen on 5 Internal completions
//!                                                       │ 2. publish Internal.<Action>Event
//!                                                       ▼
//!                                              service handler
//!                                                       │ Internal.<Action>CompletedEvent
//!                                                       ▼
//! caller ◄── completion ◄── External.CompletedEvent ◄── engine (same correlation id)
//! ```
//!
//! Every listener on the return path filters on the request's correlation
//! id, so concurrent requests for the same family never answer each other.

mod engine;
mod error;
mod gateway;

pub use engine::{CorrelationEngine, PendingDispatch};
pub use error::EngineError;
pub use gateway::Gateway;
