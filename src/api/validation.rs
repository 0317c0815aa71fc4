use thiserror::Error;

use super::models::{DeleteRequest, NavigateRequest, SubmitRequest};
use crate::store::RetentionPolicy;

pub const MAX_ARGS: usize = 64;
pub const MAX_DELETE_IDS: usize = 10_000;
pub const MAX_PAGE_SIZE: usize = 1_000;

#[derive(Debug, Error)]
pub enum RequestValidationError {
    #[error("args must contain at most 64 entries")]
    TooManyArgs,
    #[error("ids must contain between 1 and 10000 entries")]
    InvalidIdCount,
    #[error("limit must be at most 1000")]
    LimitTooLarge,
    #[error("url is required")]
    MissingUrl,
    #[error("{0} must not be negative")]
    NegativeLimit(&'static str),
}

/// Level, message and context are checked by the service itself
pub fn validate_submit(request: &SubmitRequest) -> Result<(), RequestValidationError> {
    if request.args.len() > MAX_ARGS {
        return Err(RequestValidationError::TooManyArgs);
    }
    Ok(())
}

pub fn validate_delete(request: &DeleteRequest) -> Result<(), RequestValidationError> {
    if !(1..=MAX_DELETE_IDS).contains(&request.ids.len()) {
        return Err(RequestValidationError::InvalidIdCount);
    }
    Ok(())
}

pub fn validate_limit(limit: usize) -> Result<(), RequestValidationError> {
    if limit > MAX_PAGE_SIZE {
        return Err(RequestValidationError::LimitTooLarge);
    }
    Ok(())
}

pub fn validate_navigate(request: &NavigateRequest) -> Result<(), RequestValidationError> {
    if request.url.trim().is_empty() {
        return Err(RequestValidationError::MissingUrl);
    }
    Ok(())
}

pub fn validate_cleanup(policy: &RetentionPolicy) -> Result<(), RequestValidationError> {
    if policy.max_age_ms.is_some_and(|age| age < 0) {
        return Err(RequestValidationError::NegativeLimit("maxAgeMs"));
    }
    Ok(())
}
