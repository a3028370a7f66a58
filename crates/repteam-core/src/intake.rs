//! Application intake pipeline.
//!
//! One submission runs through a strict sequential pipeline with early exit
//! at each gate:
//!
//! 1. shape validation (no rate-limit cost, no verifier call)
//! 2. rate check (precedes verification to bound verifier cost)
//! 3. token verification (must complete before any mutation)
//! 4. rate-limit consumption (only after successful verification)
//! 5. handle normalization
//! 6. duplicate pre-check (soft success, not an error)
//! 7. persistence (store-level unique violation is the duplicate signal)
//! 8. detached best-effort webhook notification
//! 9. accepted outcome

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::connectors::{ApplicationNotifier, TokenVerifier};
use crate::error::RepError;
use crate::handle::normalize_handle;
use crate::rate_limit::RateLimiter;
use crate::storage::RepStore;
use crate::types::{Experience, NewRep, Rep};

/// Raw submission as it arrives from the form.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationForm {
    pub full_name: String,
    pub phone: String,
    pub handle: String,
    pub university: Option<String>,
    pub promo_plan: String,
    pub prev_experience: Experience,
    pub turnstile_token: String,
}

/// Accepted application as forwarded to the downstream workflow webhook.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationRecord {
    #[serde(rename = "ig_handle")]
    pub handle: String,
    pub full_name: String,
    pub phone: String,
    pub university: String,
    pub promo_plan: String,
    pub prev_experience: Experience,
    pub applied_at: DateTime<Utc>,
}

impl ApplicationRecord {
    fn from_rep(rep: &Rep) -> Self {
        Self {
            handle: rep.handle.clone(),
            full_name: rep.full_name.clone(),
            phone: rep.phone.clone(),
            university: rep.university.clone().unwrap_or_default(),
            promo_plan: rep.promo_plan.clone(),
            prev_experience: rep.prev_experience,
            applied_at: rep.applied_at,
        }
    }
}

/// Terminal pipeline outcomes that are not errors. Both are HTTP-style
/// successes; `AlreadyApplied` deliberately avoids alarming legitimate
/// repeat submitters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    Accepted { message: String },
    AlreadyApplied { message: String },
}

/// User-facing copy for the terminal outcomes.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub accepted_message: String,
    pub duplicate_message: String,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            accepted_message:
                "Application received! You'll get a text within 12 hours with your rep dashboard link."
                    .to_string(),
            duplicate_message:
                "Looks like you've already applied! Check your texts for your dashboard link."
                    .to_string(),
        }
    }
}

/// Orchestrates one application submission end to end.
pub struct IntakeEngine {
    store: Arc<dyn RepStore>,
    verifier: Arc<dyn TokenVerifier>,
    notifier: Arc<dyn ApplicationNotifier>,
    limiter: RateLimiter,
    config: IntakeConfig,
}

impl IntakeEngine {
    pub fn new(
        store: Arc<dyn RepStore>,
        verifier: Arc<dyn TokenVerifier>,
        notifier: Arc<dyn ApplicationNotifier>,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            store,
            verifier,
            notifier,
            limiter,
            config: IntakeConfig::default(),
        }
    }

    pub fn with_config(mut self, config: IntakeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Run the pipeline for one submission from `source_addr`.
    pub async fn submit(
        &self,
        form: ApplicationForm,
        source_addr: &str,
    ) -> Result<IntakeOutcome, RepError> {
        let missing = missing_fields(&form);
        if !missing.is_empty() {
            return Err(RepError::MissingFields(missing.join(", ")));
        }

        if !self.limiter.check(source_addr).allowed {
            return Err(RepError::RateLimited);
        }

        match self.verifier.verify(form.turnstile_token.trim()).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(RepError::VerificationFailed(
                    "token was not accepted".to_string(),
                ));
            }
            Err(err) => {
                warn!(error = %err, "verification service call failed");
                return Err(RepError::VerificationFailed(err.to_string()));
            }
        }

        // Successful verifications count against the budget even when the
        // application turns out to be a duplicate; failed ones never do.
        self.limiter.consume(source_addr);

        let handle = normalize_handle(&form.handle);

        if self.store.find_rep(&handle).await?.is_some() {
            return Ok(IntakeOutcome::AlreadyApplied {
                message: self.config.duplicate_message.clone(),
            });
        }

        let new_rep = NewRep {
            handle,
            full_name: form.full_name.trim().to_string(),
            phone: form.phone.trim().to_string(),
            university: form
                .university
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            promo_plan: form.promo_plan.trim().to_string(),
            prev_experience: form.prev_experience,
        };

        let rep = match self.store.insert_rep(new_rep).await {
            Ok(rep) => rep,
            // Lost the race against a concurrent submission for the same
            // handle; the unique constraint is the authoritative signal.
            Err(RepError::DuplicateHandle(_)) => {
                return Ok(IntakeOutcome::AlreadyApplied {
                    message: self.config.duplicate_message.clone(),
                });
            }
            Err(err) => return Err(err),
        };

        self.dispatch_notification(&rep);

        Ok(IntakeOutcome::Accepted {
            message: self.config.accepted_message.clone(),
        })
    }

    /// Fire-and-forget webhook dispatch. Failure is logged and swallowed;
    /// it never alters the outcome already decided for the caller.
    fn dispatch_notification(&self, rep: &Rep) {
        let record = ApplicationRecord::from_rep(rep);
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(err) = notifier.notify(&record).await {
                warn!(
                    error = %err,
                    handle = %record.handle,
                    "application webhook delivery failed"
                );
            }
        });
    }
}

fn missing_fields(form: &ApplicationForm) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if form.full_name.trim().is_empty() {
        missing.push("fullName");
    }
    if form.phone.trim().is_empty() {
        missing.push("phone");
    }
    if form.handle.trim().is_empty() {
        missing.push("igHandle");
    }
    if form.promo_plan.trim().is_empty() {
        missing.push("promoPlan");
    }
    if form.turnstile_token.trim().is_empty() {
        missing.push("turnstileToken");
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::RateLimitConfig;
    use crate::storage::MemoryRepStore;
    use crate::types::RepStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct StubVerifier {
        verdict: Result<bool, ()>,
        calls: AtomicUsize,
    }

    impl StubVerifier {
        fn passing() -> Self {
            Self {
                verdict: Ok(true),
                calls: AtomicUsize::new(0),
            }
        }

        fn rejecting() -> Self {
            Self {
                verdict: Ok(false),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                verdict: Err(()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenVerifier for StubVerifier {
        async fn verify(&self, _token: &str) -> Result<bool, RepError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.verdict {
                Ok(verdict) => Ok(verdict),
                Err(()) => Err(RepError::VerificationFailed(
                    "siteverify unreachable".to_string(),
                )),
            }
        }
    }

    #[derive(Default)]
    struct RecordingStubNotifier {
        deliveries: Mutex<Vec<ApplicationRecord>>,
    }

    impl RecordingStubNotifier {
        fn delivered_handles(&self) -> Vec<String> {
            self.deliveries
                .lock()
                .unwrap()
                .iter()
                .map(|record| record.handle.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ApplicationNotifier for RecordingStubNotifier {
        async fn notify(&self, application: &ApplicationRecord) -> Result<(), RepError> {
            self.deliveries.lock().unwrap().push(application.clone());
            Ok(())
        }
    }

    fn form(handle: &str) -> ApplicationForm {
        ApplicationForm {
            full_name: "Jordan Walsh".to_string(),
            phone: "555-0134".to_string(),
            handle: handle.to_string(),
            university: Some("UNR".to_string()),
            promo_plan: "Story posts three times a week plus group chats".to_string(),
            prev_experience: Experience::Some,
            turnstile_token: "tok-1".to_string(),
        }
    }

    struct Harness {
        engine: IntakeEngine,
        store: Arc<MemoryRepStore>,
        verifier: Arc<StubVerifier>,
        notifier: Arc<RecordingStubNotifier>,
    }

    fn harness_with(verifier: StubVerifier, max_requests: u32) -> Harness {
        let store = Arc::new(MemoryRepStore::new());
        let verifier = Arc::new(verifier);
        let notifier = Arc::new(RecordingStubNotifier::default());
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests,
            window: Duration::from_secs(600),
        });
        let engine = IntakeEngine::new(
            store.clone(),
            verifier.clone(),
            notifier.clone(),
            limiter,
        );
        Harness {
            engine,
            store,
            verifier,
            notifier,
        }
    }

    #[tokio::test]
    async fn fresh_application_is_accepted_and_persisted_pending() {
        let h = harness_with(StubVerifier::passing(), 3);

        let outcome = h.engine.submit(form("@NewRep"), "1.2.3.4").await.unwrap();
        assert!(matches!(outcome, IntakeOutcome::Accepted { .. }));

        let rep = h.store.find_rep("newrep").await.unwrap().unwrap();
        assert_eq!(rep.status, RepStatus::Pending);
        assert_eq!(rep.handle, "newrep");
        assert_eq!(rep.full_name, "Jordan Walsh");
    }

    #[tokio::test]
    async fn duplicate_submission_is_a_soft_success_without_second_record() {
        let h = harness_with(StubVerifier::passing(), 5);

        h.engine.submit(form("foo"), "1.2.3.4").await.unwrap();
        let outcome = h.engine.submit(form("@FOO"), "1.2.3.4").await.unwrap();

        assert!(matches!(outcome, IntakeOutcome::AlreadyApplied { .. }));
        assert_eq!(h.store.rep_count().await, 1);
    }

    #[tokio::test]
    async fn missing_fields_reject_before_rate_limit_or_verification() {
        let h = harness_with(StubVerifier::passing(), 1);

        let mut incomplete = form("foo");
        incomplete.promo_plan = "   ".to_string();

        for _ in 0..3 {
            let err = h
                .engine
                .submit(incomplete.clone(), "1.2.3.4")
                .await
                .unwrap_err();
            assert!(matches!(err, RepError::MissingFields(ref fields) if fields.contains("promoPlan")));
        }

        // No verifier calls and no budget consumed: a valid submission from
        // the same address still goes through with a ceiling of one.
        assert_eq!(h.verifier.calls(), 0);
        let outcome = h.engine.submit(form("foo"), "1.2.3.4").await.unwrap();
        assert!(matches!(outcome, IntakeOutcome::Accepted { .. }));
    }

    #[tokio::test]
    async fn rejected_token_creates_nothing_and_consumes_nothing() {
        let h = harness_with(StubVerifier::rejecting(), 1);

        for _ in 0..3 {
            let err = h.engine.submit(form("foo"), "1.2.3.4").await.unwrap_err();
            assert!(matches!(err, RepError::VerificationFailed(_)));
        }

        assert_eq!(h.store.rep_count().await, 0);
        // Budget untouched: the check still reports the full allowance.
        assert_eq!(h.engine.limiter().check("1.2.3.4").remaining, 1);
    }

    #[tokio::test]
    async fn verifier_transport_failure_rejects_the_attempt() {
        let h = harness_with(StubVerifier::failing(), 3);

        let err = h.engine.submit(form("foo"), "1.2.3.4").await.unwrap_err();
        assert!(matches!(err, RepError::VerificationFailed(_)));
        assert_eq!(h.store.rep_count().await, 0);
    }

    #[tokio::test]
    async fn ceiling_plus_one_is_rate_limited_regardless_of_validity() {
        let h = harness_with(StubVerifier::passing(), 3);

        for i in 0..3 {
            h.engine
                .submit(form(&format!("rep{i}")), "1.2.3.4")
                .await
                .unwrap();
        }

        let err = h.engine.submit(form("rep4"), "1.2.3.4").await.unwrap_err();
        assert!(matches!(err, RepError::RateLimited));
        // A different address is unaffected.
        h.engine.submit(form("rep4"), "5.6.7.8").await.unwrap();
    }

    #[tokio::test]
    async fn duplicates_still_consume_verification_budget() {
        let h = harness_with(StubVerifier::passing(), 2);

        h.engine.submit(form("foo"), "1.2.3.4").await.unwrap();
        let outcome = h.engine.submit(form("foo"), "1.2.3.4").await.unwrap();
        assert!(matches!(outcome, IntakeOutcome::AlreadyApplied { .. }));

        let err = h.engine.submit(form("bar"), "1.2.3.4").await.unwrap_err();
        assert!(matches!(err, RepError::RateLimited));
    }

    /// Store whose duplicate pre-check always misses, simulating the race
    /// where a concurrent submission inserts between check and insert. The
    /// unique constraint at insert time must still yield the duplicate
    /// outcome.
    struct BlindPreCheckStore(MemoryRepStore);

    #[async_trait]
    impl RepStore for BlindPreCheckStore {
        fn backend(&self) -> &'static str {
            self.0.backend()
        }

        async fn find_rep(&self, _handle: &str) -> Result<Option<Rep>, RepError> {
            Ok(None)
        }

        async fn insert_rep(&self, new_rep: NewRep) -> Result<Rep, RepError> {
            self.0.insert_rep(new_rep).await
        }

        async fn find_approved_rep(&self, handle: &str) -> Result<Option<Rep>, RepError> {
            self.0.find_approved_rep(handle).await
        }

        async fn sales_for(&self, handle: &str) -> Result<Vec<crate::types::Sale>, RepError> {
            self.0.sales_for(handle).await
        }

        async fn approved_reps(&self) -> Result<Vec<Rep>, RepError> {
            self.0.approved_reps().await
        }

        async fn all_sales(&self) -> Result<Vec<crate::types::Sale>, RepError> {
            self.0.all_sales().await
        }
    }

    #[tokio::test]
    async fn store_level_duplicate_maps_to_the_duplicate_outcome() {
        let store = Arc::new(BlindPreCheckStore(MemoryRepStore::new()));
        let engine = IntakeEngine::new(
            store.clone(),
            Arc::new(StubVerifier::passing()),
            Arc::new(RecordingStubNotifier::default()),
            RateLimiter::new(RateLimitConfig {
                max_requests: 5,
                window: Duration::from_secs(600),
            }),
        );

        let first = engine.submit(form("foo"), "1.2.3.4").await.unwrap();
        assert!(matches!(first, IntakeOutcome::Accepted { .. }));

        let second = engine.submit(form("@Foo"), "1.2.3.4").await.unwrap();
        assert!(matches!(second, IntakeOutcome::AlreadyApplied { .. }));
        assert_eq!(store.0.rep_count().await, 1);
    }

    #[tokio::test]
    async fn accepted_application_is_forwarded_downstream() {
        let h = harness_with(StubVerifier::passing(), 3);

        h.engine.submit(form("@NewRep"), "1.2.3.4").await.unwrap();

        // The dispatch is detached; give the spawned task a beat to land.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(h.notifier.delivered_handles(), vec!["newrep".to_string()]);
    }
}
