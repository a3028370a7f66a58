//! REST surface for the rep program.
//!
//! `POST /api/apply` runs
//! the intake pipeline, `GET /api/dashboard/:handle` and
//! `GET /api/leaderboard` serve the derived read views, and
//! `GET /api/health` reports the configured store backend.

#![deny(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use repteam_core::{
    dashboard, leaderboard, ApplicationForm, ApplicationNotifier, Experience, IntakeConfig,
    IntakeEngine, IntakeOutcome, RateLimitConfig, RateLimiter, RepError, RepStore, RepStoreConfig,
    ScoringConfig, TokenVerifier, ViewConfig,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tracing::error;

/// Everything the service needs that is not an external connector.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub store: RepStoreConfig,
    pub rate_limit: RateLimitConfig,
    pub scoring: ScoringConfig,
    pub views: ViewConfig,
    pub intake: IntakeConfig,
}

#[derive(Clone)]
pub struct ServiceState {
    pub engine: Arc<IntakeEngine>,
    pub store: Arc<dyn RepStore>,
    pub scoring: Arc<ScoringConfig>,
    pub views: Arc<ViewConfig>,
}

impl ServiceState {
    /// Bootstrap the configured store and assemble the intake engine.
    pub async fn bootstrap(
        config: ServiceConfig,
        verifier: Arc<dyn TokenVerifier>,
        notifier: Arc<dyn ApplicationNotifier>,
    ) -> Result<Self, RepError> {
        let store = config.store.clone().bootstrap().await?;
        Ok(Self::from_parts(store, verifier, notifier, config))
    }

    /// Assemble state around an existing store (tests inject a seeded one).
    pub fn from_parts(
        store: Arc<dyn RepStore>,
        verifier: Arc<dyn TokenVerifier>,
        notifier: Arc<dyn ApplicationNotifier>,
        config: ServiceConfig,
    ) -> Self {
        let limiter = RateLimiter::new(config.rate_limit);
        let engine = IntakeEngine::new(store.clone(), verifier, notifier, limiter)
            .with_config(config.intake);
        Self {
            engine: Arc::new(engine),
            store,
            scoring: Arc::new(config.scoring),
            views: Arc::new(config.views),
        }
    }
}

pub fn build_router(state: ServiceState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/apply", post(apply))
        .route("/api/dashboard/:handle", get(dashboard_page))
        .route("/api/leaderboard", get(leaderboard_page))
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Rep(#[from] RepError),
    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

fn error_body(code: &str, message: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "error": code, "message": message }))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, error_body("not_found", &message)).into_response()
            }
            ApiError::Rep(err) => match err {
                RepError::MissingFields(fields) => (
                    StatusCode::BAD_REQUEST,
                    error_body(
                        "missing_fields",
                        &format!("Missing required fields: {fields}"),
                    ),
                )
                    .into_response(),
                RepError::RateLimited => (
                    StatusCode::TOO_MANY_REQUESTS,
                    error_body("rate_limited", "Too many requests. Please try again later."),
                )
                    .into_response(),
                RepError::VerificationFailed(reason) => {
                    error!(reason = %reason, "submission failed verification");
                    (
                        StatusCode::BAD_REQUEST,
                        error_body(
                            "verification_failed",
                            "Verification failed. Please try again.",
                        ),
                    )
                        .into_response()
                }
                // Internal detail stays in the logs, never in the response.
                other => {
                    error!(error = %other, "request failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        error_body("server_error", "Something went wrong. Please try again."),
                    )
                        .into_response()
                }
            },
        }
    }
}

/// Submission payload as the landing form sends it. Absent fields
/// deserialize empty so the pipeline owns all required-field decisions.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApplyRequest {
    full_name: String,
    phone: String,
    ig_handle: String,
    university: Option<String>,
    promo_plan: String,
    prev_experience: Experience,
    turnstile_token: String,
}

impl From<ApplyRequest> for ApplicationForm {
    fn from(request: ApplyRequest) -> Self {
        Self {
            full_name: request.full_name,
            phone: request.phone,
            handle: request.ig_handle,
            university: request.university,
            promo_plan: request.promo_plan,
            prev_experience: request.prev_experience,
            turnstile_token: request.turnstile_token,
        }
    }
}

/// Source address for rate limiting: first forwarded hop, then the
/// real-ip header, then the socket peer for direct traffic, then a shared
/// bucket when no source can be established at all.
fn client_address(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    for name in ["x-forwarded-for", "x-real-ip"] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            if let Some(first) = value.split(',').next().map(str::trim) {
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
    }
    match peer {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}

async fn apply(
    State(state): State<ServiceState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<ApplyRequest>,
) -> Result<Response, ApiError> {
    let address = client_address(&headers, peer.map(|ConnectInfo(addr)| addr));

    match state.engine.submit(request.into(), &address).await? {
        IntakeOutcome::Accepted { message } => Ok((
            StatusCode::OK,
            Json(serde_json::json!({ "success": true, "message": message })),
        )
            .into_response()),
        // Repeat submitters get a 200 with guidance, not a failure status.
        IntakeOutcome::AlreadyApplied { message } => Ok((
            StatusCode::OK,
            Json(serde_json::json!({ "error": "duplicate", "message": message })),
        )
            .into_response()),
    }
}

async fn dashboard_page(
    State(state): State<ServiceState>,
    Path(handle): Path<String>,
) -> Result<Response, ApiError> {
    let view = dashboard(state.store.as_ref(), &state.scoring, &state.views, &handle).await?;

    match view {
        Some(view) => Ok(Json(view).into_response()),
        None => Err(ApiError::not_found(
            "This dashboard doesn't exist or your application is still pending approval.",
        )),
    }
}

#[derive(Debug, Serialize)]
struct LeaderboardResponse {
    count: usize,
    entries: Vec<repteam_core::LeaderboardRow>,
}

async fn leaderboard_page(State(state): State<ServiceState>) -> Result<Response, ApiError> {
    let entries = leaderboard(state.store.as_ref(), &state.scoring).await?;
    Ok(Json(LeaderboardResponse {
        count: entries.len(),
        entries,
    })
    .into_response())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    store_backend: &'static str,
}

async fn health(State(state): State<ServiceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "repteam-service",
        store_backend: state.store.backend(),
    })
}
