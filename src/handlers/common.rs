use serde::Deserialize;
use validator::Validate;

use crate::errors::ServiceError;

/// Validate request input
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ServiceError> {
    input
        .validate()
        .map_err(|e| ServiceError::ValidationError(format!("Validation failed: {}", e)))
}

/// Body of an operator action that must name who took it.
#[derive(Debug, Deserialize, Validate)]
pub struct ActorRequest {
    #[validate(length(min = 1, max = 128))]
    pub actor: String,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

pub const DEFAULT_LIMIT: u64 = 100;
pub const MAX_LIMIT: u64 = 1000;

pub fn clamp_limit(limit: Option<u64>) -> u64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}
