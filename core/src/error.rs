//! Error types for the core crate
//!
//! Rejections of a query are *not* errors: they are returned as
//! [`ValidationResult`](crate::validation::ValidationResult) values. The errors
//! here cover building the validator itself (bad configuration, bad rules).

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    /// A blocklist rule could not be compiled
    #[error("Invalid rule '{name}': {source}")]
    InvalidRule {
        /// Name of the rule that failed to compile
        name: String,
        /// Underlying regex error
        #[source]
        source: regex::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for the core crate
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::ConfigError("bad limit".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad limit");

        let source = regex::Regex::new("(").unwrap_err();
        let err = CoreError::InvalidRule {
            name: "broken".to_string(),
            source,
        };
        assert!(err.to_string().starts_with("Invalid rule 'broken'"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
