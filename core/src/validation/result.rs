//! Validation outcomes and the closed set of rejection codes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, machine-readable rejection category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionCode {
    /// Query text exceeds the length bound
    QueryTooLong,

    /// Query exceeds a structural bound (nesting, joins, heavy features)
    QueryTooComplex,

    /// A mutating or system-access keyword matched
    ForbiddenKeyword,

    /// Comment splicing, multi-statement, external reference or injection signature
    ForbiddenPattern,

    /// Rolling-window ceiling exceeded
    RateLimited,

    /// The warehouse connector failed or timed out
    UpstreamError,
}

impl RejectionCode {
    /// Get string representation of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionCode::QueryTooLong => "QUERY_TOO_LONG",
            RejectionCode::QueryTooComplex => "QUERY_TOO_COMPLEX",
            RejectionCode::ForbiddenKeyword => "FORBIDDEN_KEYWORD",
            RejectionCode::ForbiddenPattern => "FORBIDDEN_PATTERN",
            RejectionCode::RateLimited => "RATE_LIMITED",
            RejectionCode::UpstreamError => "UPSTREAM_ERROR",
        }
    }
}

impl fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejection: category plus a user-safe message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Category
    pub code: RejectionCode,

    /// Message safe to show to the user; never contains query text
    pub message: String,
}

impl Rejection {
    /// Create a new rejection
    pub fn new(code: RejectionCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Outcome of validating one query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the query may proceed
    pub allowed: bool,

    /// Why the query was rejected, when it was
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Rejection>,
}

impl ValidationResult {
    /// An accepted query
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    /// A rejected query
    pub fn deny(code: RejectionCode, message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(Rejection::new(code, message)),
        }
    }

    /// Rejection code, if rejected
    pub fn code(&self) -> Option<RejectionCode> {
        self.reason.as_ref().map(|r| r.code)
    }

    /// Convert into a `Result`, for `?` at call sites
    pub fn into_result(self) -> std::result::Result<(), Rejection> {
        match self.reason {
            Some(rejection) if !self.allowed => Err(rejection),
            _ => Ok(()),
        }
    }
}
