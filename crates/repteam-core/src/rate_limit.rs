//! Per-address submission rate limiting.
//!
//! Fixed-window counter keyed by source address: each address gets at most
//! `max_requests` consumed slots per `window`. State is process-local and
//! in-memory only; entries are reset lazily when their window elapses, and
//! nothing evicts idle addresses beyond that.
//!
//! `check` is read-only with respect to the budget; `consume` spends one
//! slot and must be called at most once per accepted request, after the
//! verification call succeeds. The split keeps verification failures from
//! counting against the caller while still bounding verifier cost.
//!
//! The clock is injectable so tests can advance time without sleeping.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Time source for window arithmetic.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock-backed default clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Consumed slots allowed per address per window.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 3,
            window: Duration::from_secs(10 * 60),
        }
    }
}

/// Result of a read-only rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub allowed: bool,
    pub remaining: u32,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    resets_at: Instant,
}

/// In-memory per-address fixed-window rate limiter.
///
/// Interior state is behind a `Mutex` because axum handlers run concurrently;
/// check-then-consume must not lose updates across threads.
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check whether the address has budget left in the current window.
    ///
    /// An elapsed window is reset here (lazy reset-on-read); the budget
    /// itself is never consumed by a check.
    pub fn check(&self, address: &str) -> RateLimitStatus {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let window = state.entry(address.to_string()).or_insert(Window {
            count: 0,
            resets_at: now + self.config.window,
        });

        if now >= window.resets_at {
            window.count = 0;
            window.resets_at = now + self.config.window;
        }

        if window.count >= self.config.max_requests {
            tracing::warn!(
                address,
                count = window.count,
                max = self.config.max_requests,
                "rate limit exceeded"
            );
            return RateLimitStatus {
                allowed: false,
                remaining: 0,
            };
        }

        RateLimitStatus {
            allowed: true,
            remaining: self.config.max_requests - window.count,
        }
    }

    /// Spend one slot for the address. Call only after `check` allowed the
    /// request, and at most once per request.
    pub fn consume(&self, address: &str) {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let window = state.entry(address.to_string()).or_insert(Window {
            count: 0,
            resets_at: now + self.config.window,
        });

        if now >= window.resets_at {
            window.count = 0;
            window.resets_at = now + self.config.window;
        }

        window.count += 1;
    }

    /// Drop all tracked windows.
    pub fn reset(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
