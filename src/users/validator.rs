use super::codes;
use super::model::{NewUser, UpdateUser, User};
use crate::validation::{ErrorEntry, RuleOptions, ValidationChain, ValidationError, ValidationMode};

/// Pre-condition checks for user writes. Both chains stop at the first
/// failing rule.
pub struct UserValidator;

impl UserValidator {
    /// `existing` is the user already holding `request.msisdn`, if any.
    pub async fn validate_create(existing: Option<&User>, request: &NewUser) -> Result<(), ValidationError> {
        let mut chain = ValidationChain::new()
            .add(
                |user: &Option<User>| user.is_none(),
                RuleOptions::new(existing.cloned(), Self::number_taken(&request.msisdn)),
            )
            .add(
                |addresses: &Vec<serde_json::Value>| !addresses.is_empty(),
                RuleOptions::new(
                    request.addresses.clone(),
                    ValidationError::single(ErrorEntry::new(
                        codes::AT_LEAST_ONE_ADDRESS_MUST_BE_SET,
                        "At least one address must be set for the user",
                        ["addresses"],
                    )),
                ),
            );

        chain.validate(ValidationMode::ExitOnError).await
    }

    /// `NUMBER_ALREADY_EXISTS` at `["msisdn"]`.
    pub fn number_taken(msisdn: &str) -> ValidationError {
        ValidationError::single(ErrorEntry::new(
            codes::NUMBER_ALREADY_EXISTS,
            format!("A user with number [{msisdn}] already exists."),
            ["msisdn"],
        ))
    }

    /// `existing` is the stored user with `request.id`, if any.
    pub async fn validate_update(existing: Option<&User>, request: &UpdateUser) -> Result<(), ValidationError> {
        Self::validate_exists(existing, &request.id).await
    }

    /// Fails with `USER_NOT_FOUND` at `["id"]` when `existing` is `None`.
    pub async fn validate_exists(existing: Option<&User>, id: &str) -> Result<(), ValidationError> {
        let mut chain = ValidationChain::new().add(
            |user: &Option<User>| user.is_some(),
            RuleOptions::new(
                existing.cloned(),
                ValidationError::single(ErrorEntry::new(
                    codes::USER_NOT_FOUND,
                    format!("No user with id [{id}] was found."),
                    ["id"],
                )),
            ),
        );

        chain.validate(ValidationMode::ExitOnError).await
    }
}
