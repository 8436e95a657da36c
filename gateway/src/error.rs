//! Error types for the query gateway
//!
//! Every per-query failure maps onto the closed set of rejection codes so the
//! caller can branch on a stable machine-readable value.

use std::io;
use std::time::Duration;

use query_guard_core::{CoreError, Rejection, RejectionCode};
use thiserror::Error;

/// Result type for the gateway
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Code reported for failures that are not per-query rejections
pub const INTERNAL_CODE: &str = "INTERNAL";

/// Error type for the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The validator refused the query
    #[error("{0}")]
    Rejected(Rejection),

    /// The identity exhausted its rolling window
    #[error("Rate limit exceeded, retry after {}s", retry_after_secs(.retry_after))]
    RateLimited {
        /// Time until the oldest counted query leaves the window
        retry_after: Duration,
    },

    /// The warehouse did not answer in time
    #[error("Warehouse call timed out after {}s", .0.as_secs())]
    UpstreamTimeout(Duration),

    /// The warehouse connector failed
    #[error("Warehouse error: {0}")]
    Upstream(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error from the core crate
    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

/// Whole seconds to wait, rounded up so a client never retries too early
pub fn retry_after_secs(retry_after: &Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

impl GatewayError {
    /// Rejection code, or `None` for internal failures
    pub fn code(&self) -> Option<RejectionCode> {
        match self {
            GatewayError::Rejected(rejection) => Some(rejection.code),
            GatewayError::RateLimited { .. } => Some(RejectionCode::RateLimited),
            GatewayError::UpstreamTimeout(_) | GatewayError::Upstream(_) => {
                Some(RejectionCode::UpstreamError)
            }
            _ => None,
        }
    }

    /// Code as reported to callers
    pub fn code_str(&self) -> &'static str {
        self.code().map_or(INTERNAL_CODE, |code| code.as_str())
    }

    /// Message that is safe to show to the user
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Rejected(rejection) => rejection.message.clone(),
            GatewayError::RateLimited { retry_after } => format!(
                "Too many queries. Please wait {} seconds before running another query.",
                retry_after_secs(retry_after)
            ),
            GatewayError::UpstreamTimeout(timeout) => format!(
                "The warehouse did not respond within {} seconds. Try a narrower query.",
                timeout.as_secs()
            ),
            GatewayError::Upstream(message) => message.clone(),
            _ => "Internal error. Please contact the administrator.".to_string(),
        }
    }

    /// Retry estimate for rate-limited rejections
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<Rejection> for GatewayError {
    fn from(rejection: Rejection) -> Self {
        GatewayError::Rejected(rejection)
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Upstream(format!("request timed out: {}", err))
        } else {
            GatewayError::Upstream(err.to_string())
        }
    }
}

impl From<config::ConfigError> for GatewayError {
    fn from(err: config::ConfigError) -> Self {
        GatewayError::Config(err.to_string())
    }
}
