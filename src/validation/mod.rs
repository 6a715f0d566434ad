//! Validation chains — ordered, structured pre-condition checks.
//!
//! A [`ValidationChain`] is an ordered list of rules. Each rule pairs a
//! predicate (synchronous or asynchronous) and its parameters, captured when
//! the rule is added, with the [`ValidationError`] reported if the predicate
//! returns `false`.
//!
//! Rules are evaluated one at a time in declaration order, so the order of
//! reported errors is deterministic.
//!
//! ```
//! use civitas_gateway::validation::{ErrorEntry, RuleOptions, ValidationChain, ValidationError, ValidationMode};
//!
//! # futures::executor::block_on(async {
//! let existing: Option<String> = Some("u1".into());
//!
//! let result = ValidationChain::new()
//!     .add(
//!         |user: &Option<String>| user.is_none(),
//!         RuleOptions::new(
//!             existing,
//!             ValidationError::single(ErrorEntry::new(
//!                 "NUMBER_ALREADY_EXISTS",
//!                 "A user with number [123] already exists.",
//!                 ["msisdn"],
//!             )),
//!         ),
//!     )
//!     .validate(ValidationMode::ExitOnError)
//!     .await;
//!
//! assert_eq!(result.unwrap_err().errors[0].code, "NUMBER_ALREADY_EXISTS");
//! # });
//! ```

mod chain;
mod error;

pub use chain::{ChainState, RuleOptions, ValidationChain, ValidationMode};
pub use error::{ErrorEntry, ValidationError, DEFAULT_MESSAGE};
