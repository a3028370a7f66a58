use thiserror::Error;

/// Rep program runtime errors.
#[derive(Debug, Error)]
pub enum RepError {
    #[error("Missing required fields: {0}")]
    MissingFields(String),

    #[error("Too many requests from this address")]
    RateLimited,

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("An application for handle '{0}' is already on file")]
    DuplicateHandle(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Notification error: {0}")]
    Notification(String),
}
