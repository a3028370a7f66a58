//! External-service seams for the intake pipeline.
//!
//! Implementations live in `repteam-adapters`; the pipeline only sees these
//! traits so tests can swap in deterministic doubles.

use async_trait::async_trait;

use crate::error::RepError;
use crate::intake::ApplicationRecord;

/// Redeems a one-time client-supplied verification token against the
/// human-verification service.
///
/// `Ok(false)` is an explicit "not successful" verdict; transport and
/// service failures are errors. Both reject the submission.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<bool, RepError>;
}

/// Forwards an accepted application to the downstream workflow webhook.
///
/// Delivery is best-effort: the pipeline dispatches it detached and logs
/// failures without surfacing them to the caller.
#[async_trait]
pub trait ApplicationNotifier: Send + Sync {
    async fn notify(&self, application: &ApplicationRecord) -> Result<(), RepError>;
}
