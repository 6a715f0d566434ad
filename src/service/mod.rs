//! Service handlers — the side of the bus that does the work.
//!
//! A `CrudService` holds one handler per CRUD action for a family. Once
//! attached it listens on the family's internal dispatch channels and
//! answers each dispatch with exactly one completion:
//!
//! ```text
//! Internal.CreateEvent ──► handler(ctx) ──► Ok(CompletionPayload)  ──► Internal.CreateCompletedEvent
//!                                       └─► Err(HandlerError)      ──► {statusCode, body} with mapped status
//! ```
//!
//! Handlers receive a [`Context`] carrying the payload, family, action and
//! correlation id of the dispatch.

mod context;
mod crud_service;
mod error;

pub use context::Context;
pub use crud_service::{CrudService, HandlerResult, ServiceHandle, ServiceStats};
pub use error::HandlerError;
