//! Users — the reference family wired onto the bus.
//!
//! [`user_service`] registers the five CRUD handlers for the `User` family
//! against an in-memory [`UserStore`]. Create and update run through
//! [`UserValidator`] before touching the store.

pub mod codes;
mod model;
mod service;
mod store;
mod validator;

pub use model::{NewUser, UpdateUser, User};
pub use service::{user_service, FAMILY};
pub use store::UserStore;
pub use validator::UserValidator;
