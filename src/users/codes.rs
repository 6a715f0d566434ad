//! Stable error codes reported by the user validators.

pub const NUMBER_ALREADY_EXISTS: &str = "NUMBER_ALREADY_EXISTS";
pub const AT_LEAST_ONE_ADDRESS_MUST_BE_SET: &str = "AT_LEAST_ONE_ADDRESS_MUST_BE_SET";
pub const USER_NOT_FOUND: &str = "USER_NOT_FOUND";
