//! Security features for the gateway
//!
//! This module contains the per-identity rate limiter and the clock it reads time from.

/// Clock port and implementations
pub mod clock;

/// Rolling-window rate limiter
pub mod rate_limiter;

// Re-export important types
pub use clock::{Clock, ManualClock, SystemClock};
pub use rate_limiter::{RateDecision, RateLimiter, RateLimiterConfig};
