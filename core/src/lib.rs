//! # Query Guard Core
//!
//! Validation building blocks for the warehouse query guard: the keyword and
//! pattern blocklist, the SQL lexer, and the query validator.
//! This crate performs no I/O; the gateway crate wires it to a warehouse.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod utils;
pub mod validation;

/// Re-export common types for ease of use
pub use config::{ValidatorConfig, HARD_MAX_ROWS};
pub use error::{CoreError, Result};
pub use validation::{QueryValidator, Rejection, RejectionCode, ValidationResult};

/// Version of the core crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
