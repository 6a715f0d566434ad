//! Gateway integration tests.

mod support;
mod correlation;
mod users;

#[cfg(feature = "http")]
mod http;
