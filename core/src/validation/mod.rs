//! Query validation
//!
//! The validator decides, without touching the warehouse, whether a query is
//! a single read-only statement within the configured bounds.

pub mod lexer;
pub mod result;
pub mod rules;
pub mod validator;

pub use result::{Rejection, RejectionCode, ValidationResult};
pub use rules::{BlockedPattern, Blocklist, MatchInput, MatchScope};
pub use validator::QueryValidator;
