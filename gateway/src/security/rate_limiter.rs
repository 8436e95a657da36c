//! Rate limiter for query submissions
//!
//! Each identity owns a rolling window of accepted submission instants. A call
//! is admitted while fewer than `max_requests` instants fall inside the window.
//! Refused calls are not recorded, so hammering a full window does not push the
//! identity's recovery further out.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{GatewayError, Result};
use crate::security::clock::{Clock, SystemClock};

/// Configuration for rate limiting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Whether rate limiting is enabled
    pub enabled: bool,

    /// Queries admitted per identity within one window
    pub max_requests: u32,

    /// Window length in seconds
    pub window_secs: u64,

    /// Identities that are never limited
    pub exempt_identities: Vec<String>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 30,
            window_secs: 60,
            exempt_identities: Vec::new(),
        }
    }
}

impl RateLimiterConfig {
    /// Window length
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.enabled && self.max_requests == 0 {
            return Err(GatewayError::Config(
                "rate limiter max_requests must be positive".to_string(),
            ));
        }
        if self.enabled && self.window_secs == 0 {
            return Err(GatewayError::Config(
                "rate limiter window_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Admitted and recorded
    Allowed {
        /// Slots left in the window after this one
        remaining: u32,
    },

    /// Refused; nothing was recorded
    Limited {
        /// Time until the oldest counted submission leaves the window
        retry_after: Duration,
    },
}

impl RateDecision {
    /// Whether the call was admitted
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Accepted submission instants for one identity
#[derive(Debug, Default)]
struct RateWindow {
    accepted: VecDeque<Instant>,
}

impl RateWindow {
    /// Drop instants that are a full window old or older
    fn evict(&mut self, now: Instant, window: Duration) {
        self.accepted
            .retain(|t| now.saturating_duration_since(*t) < window);
    }

    fn oldest(&self) -> Option<Instant> {
        self.accepted.iter().min().copied()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Guarded state is valid after every statement
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-identity rolling-window rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    /// Limiter configuration
    config: RateLimiterConfig,

    /// Window length
    window: Duration,

    /// Time source
    clock: Arc<dyn Clock>,

    /// Windows by identity; the map lock is held only for lookup
    windows: Mutex<HashMap<String, Arc<Mutex<RateWindow>>>>,
}

impl RateLimiter {
    /// Create a new rate limiter on the system clock
    pub fn new(config: RateLimiterConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Create a new rate limiter on the given clock
    pub fn with_clock(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            window: config.window(),
            config,
            clock,
            windows: Mutex::new(HashMap::new()),
        })
    }

    /// Limiter configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    fn is_exempt(&self, identity: &str) -> bool {
        !self.config.enabled || self.config.exempt_identities.iter().any(|e| e == identity)
    }

    fn window_for(&self, identity: &str) -> Arc<Mutex<RateWindow>> {
        let mut windows = lock(&self.windows);
        windows
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(RateWindow::default())))
            .clone()
    }

    /// Admit or refuse one submission for `identity`
    pub fn allow(&self, identity: &str) -> bool {
        self.check(identity).is_allowed()
    }

    /// Admit or refuse one submission, reporting the retry estimate on refusal
    pub fn check(&self, identity: &str) -> RateDecision {
        if self.is_exempt(identity) {
            return RateDecision::Allowed {
                remaining: self.config.max_requests,
            };
        }

        let entry = self.window_for(identity);
        let mut window = lock(&entry);
        let now = self.clock.now();
        window.evict(now, self.window);

        let used = window.accepted.len() as u32;
        if used >= self.config.max_requests {
            let retry_after = window
                .oldest()
                .map(|oldest| (oldest + self.window).saturating_duration_since(now))
                .unwrap_or(self.window);
            debug!(
                "Identity {} reached {} queries per {}s",
                identity, self.config.max_requests, self.config.window_secs
            );
            return RateDecision::Limited { retry_after };
        }

        window.accepted.push_back(now);
        RateDecision::Allowed {
            remaining: self.config.max_requests - used - 1,
        }
    }

    /// Slots left for `identity` without recording anything
    pub fn remaining(&self, identity: &str) -> u32 {
        if self.is_exempt(identity) {
            return self.config.max_requests;
        }
        let entry = match lock(&self.windows).get(identity) {
            Some(entry) => entry.clone(),
            None => return self.config.max_requests,
        };
        let mut window = lock(&entry);
        window.evict(self.clock.now(), self.window);
        self.config
            .max_requests
            .saturating_sub(window.accepted.len() as u32)
    }

    /// Forget all submissions of `identity`.
    ///
    /// The window is cleared in place; `cleanup` drops the entry once idle.
    pub fn reset(&self, identity: &str) {
        let entry = match lock(&self.windows).get(identity) {
            Some(entry) => entry.clone(),
            None => return,
        };
        lock(&entry).accepted.clear();
    }

    /// Drop identities whose window has emptied; returns how many were dropped
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let mut windows = lock(&self.windows);
        let before = windows.len();
        windows.retain(|_, entry| {
            // An entry someone else holds is in use right now
            if Arc::strong_count(entry) > 1 {
                return true;
            }
            let mut window = lock(&**entry);
            window.evict(now, self.window);
            !window.accepted.is_empty()
        });
        before - windows.len()
    }

    /// Number of identities currently tracked
    pub fn tracked_identities(&self) -> usize {
        lock(&self.windows).len()
    }
}
