//! Connector adapters for the rep program service.
//!
//! Production adapters speak to Cloudflare Turnstile and the workflow
//! webhook over HTTP; the deterministic doubles at the bottom back the
//! engine and router tests.

#![deny(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use repteam_core::connectors::{ApplicationNotifier, TokenVerifier};
use repteam_core::error::RepError;
use repteam_core::intake::ApplicationRecord;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const DEFAULT_SITEVERIFY_ENDPOINT: &str =
    "https://challenges.cloudflare.com/turnstile/v0/siteverify";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

fn build_client() -> Result<reqwest::Client, RepError> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| RepError::Notification(format!("http client init failed: {e}")))
}

#[derive(Debug, Serialize)]
struct SiteverifyRequest<'a> {
    secret: &'a str,
    response: &'a str,
}

#[derive(Debug, Deserialize)]
struct SiteverifyResponse {
    success: bool,
}

/// Cloudflare Turnstile verifier.
///
/// Submits `{secret, response}` to the siteverify endpoint and reads the
/// `success` flag. Transport failures are errors; an explicit
/// `success=false` is a clean negative verdict.
pub struct TurnstileVerifier {
    client: reqwest::Client,
    endpoint: String,
    secret: String,
}

impl TurnstileVerifier {
    pub fn new(secret: impl Into<String>) -> Result<Self, RepError> {
        Ok(Self {
            client: build_client()?,
            endpoint: DEFAULT_SITEVERIFY_ENDPOINT.to_string(),
            secret: secret.into(),
        })
    }

    /// Point at a non-default endpoint (local verification stub).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl TokenVerifier for TurnstileVerifier {
    async fn verify(&self, token: &str) -> Result<bool, RepError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SiteverifyRequest {
                secret: &self.secret,
                response: token,
            })
            .send()
            .await
            .map_err(|e| RepError::VerificationFailed(format!("siteverify request failed: {e}")))?;

        let body: SiteverifyResponse = response
            .json()
            .await
            .map_err(|e| RepError::VerificationFailed(format!("siteverify decode failed: {e}")))?;

        Ok(body.success)
    }
}

/// Fail-closed verifier used when no Turnstile secret is configured.
///
/// Every submission is rejected rather than silently skipping the bot gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredVerifier;

#[async_trait]
impl TokenVerifier for UnconfiguredVerifier {
    async fn verify(&self, _token: &str) -> Result<bool, RepError> {
        error!("turnstile secret not configured; rejecting submission");
        Ok(false)
    }
}

/// Workflow-automation webhook notifier.
///
/// Posts the accepted application's fields plus its timestamp; the response
/// body is ignored. Callers dispatch this best-effort and only log failures.
pub struct WorkflowWebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WorkflowWebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, RepError> {
        Ok(Self {
            client: build_client()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ApplicationNotifier for WorkflowWebhookNotifier {
    async fn notify(&self, application: &ApplicationRecord) -> Result<(), RepError> {
        let response = self
            .client
            .post(&self.url)
            .json(application)
            .send()
            .await
            .map_err(|e| RepError::Notification(format!("webhook request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(RepError::Notification(format!(
                "webhook returned status {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// No-op notifier used when no webhook URL is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl ApplicationNotifier for NoopNotifier {
    async fn notify(&self, application: &ApplicationRecord) -> Result<(), RepError> {
        debug!(handle = %application.handle, "no webhook configured, dropping notification");
        Ok(())
    }
}

/// Deterministic verifier returning a fixed verdict; counts its calls.
pub struct StaticVerifier {
    verdict: bool,
    calls: AtomicUsize,
}

impl StaticVerifier {
    pub fn new(verdict: bool) -> Self {
        Self {
            verdict,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, _token: &str) -> Result<bool, RepError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.verdict)
    }
}

/// Verifier that always fails at the transport level, for chaos paths.
#[derive(Debug, Clone)]
pub struct FailingVerifier {
    reason: String,
}

impl FailingVerifier {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl TokenVerifier for FailingVerifier {
    async fn verify(&self, _token: &str) -> Result<bool, RepError> {
        Err(RepError::VerificationFailed(self.reason.clone()))
    }
}

/// Notifier that records every delivery, for asserting webhook payloads.
#[derive(Default)]
pub struct RecordingNotifier {
    deliveries: Mutex<Vec<ApplicationRecord>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliveries(&self) -> Vec<ApplicationRecord> {
        self.deliveries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ApplicationNotifier for RecordingNotifier {
    async fn notify(&self, application: &ApplicationRecord) -> Result<(), RepError> {
        self.deliveries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(application.clone());
        Ok(())
    }
}

/// Notifier that always fails, for verifying failures stay swallowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingNotifier;

#[async_trait]
impl ApplicationNotifier for FailingNotifier {
    async fn notify(&self, _application: &ApplicationRecord) -> Result<(), RepError> {
        Err(RepError::Notification("webhook unreachable".to_string()))
    }
}
