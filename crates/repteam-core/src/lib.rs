//! Core domain logic for the rep program service.
//!
//! This crate implements the application intake pipeline with explicit stage
//! gating (shape validation, rate limiting, human verification, duplicate
//! detection, persistence, best-effort notification), the derived dashboard
//! and leaderboard views, and the storage backends that persist reps and
//! sales.

#![deny(unsafe_code)]

pub mod connectors;
pub mod error;
pub mod handle;
pub mod intake;
pub mod rate_limit;
pub mod scoring;
pub mod storage;
pub mod types;
pub mod views;

pub use connectors::{ApplicationNotifier, TokenVerifier};
pub use error::RepError;
pub use handle::normalize_handle;
pub use intake::{ApplicationForm, ApplicationRecord, IntakeConfig, IntakeEngine, IntakeOutcome};
pub use rate_limit::{Clock, RateLimitConfig, RateLimitStatus, RateLimiter, SystemClock};
pub use scoring::{BonusTier, SalesTotals, ScoringConfig, TierProgress};
pub use storage::{MemoryRepStore, PostgresRepStore, RepStore, RepStoreConfig};
pub use types::{DashboardView, Experience, LeaderboardRow, NewRep, Rep, RepStatus, Sale, SaleKind};
pub use views::{dashboard, leaderboard, ViewConfig};
