//! Configuration for the core crate
//!
//! This module provides the limits and allowlists used by the query validator.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Hard ceiling on rows a single query may return, whatever the configuration says
pub const HARD_MAX_ROWS: usize = 10_000;

/// Query validator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Maximum query length in characters
    pub max_query_length: usize,

    /// Maximum parenthesis nesting depth
    pub max_nesting_depth: usize,

    /// Maximum number of JOIN clauses
    pub max_joins: usize,

    /// Maximum rows an accepted query may return
    pub max_rows: usize,

    /// Databases (first part of a qualified name) that queries may read from
    pub allowed_databases: Vec<String>,

    /// Additional whole-word keywords to reject on top of the built-in blocklist
    pub extra_forbidden_keywords: Vec<String>,

    /// Whether to confirm the statement shape with the SQL parser
    pub parser_check: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_query_length: 10_000,
            max_nesting_depth: 10,
            max_joins: 5,
            max_rows: HARD_MAX_ROWS,
            allowed_databases: vec![
                "SNOWFLAKE_SAMPLE_DATA".to_string(),
                "INFORMATION_SCHEMA".to_string(),
            ],
            extra_forbidden_keywords: Vec::new(),
            parser_check: true,
        }
    }
}

impl ValidatorConfig {
    /// Create a new validator configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for local development: same rules, more headroom
    pub fn for_development() -> Self {
        Self {
            max_query_length: 20_000,
            ..Default::default()
        }
    }

    /// Configuration for tests: small bounds so limits are easy to hit
    pub fn for_testing() -> Self {
        Self {
            max_query_length: 500,
            max_nesting_depth: 3,
            max_joins: 2,
            max_rows: 100,
            ..Default::default()
        }
    }

    /// Effective row cap, never above [`HARD_MAX_ROWS`]
    pub fn effective_max_rows(&self) -> usize {
        self.max_rows.min(HARD_MAX_ROWS)
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.max_query_length == 0 {
            return Err(CoreError::ConfigError(
                "max_query_length must be positive".to_string(),
            ));
        }
        if self.max_rows == 0 {
            return Err(CoreError::ConfigError("max_rows must be positive".to_string()));
        }
        if let Some(bad) = self
            .extra_forbidden_keywords
            .iter()
            .find(|kw| kw.trim().is_empty())
        {
            return Err(CoreError::ConfigError(format!(
                "extra_forbidden_keywords contains an empty entry ({:?})",
                bad
            )));
        }
        Ok(())
    }

    /// Whether `database` is in the allowlist (case-insensitive)
    pub fn is_database_allowed(&self, database: &str) -> bool {
        self.allowed_databases
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(database))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ValidatorConfig::default();
        assert_eq!(config.max_query_length, 10_000);
        assert_eq!(config.max_nesting_depth, 10);
        assert_eq!(config.max_joins, 5);
        assert_eq!(config.effective_max_rows(), HARD_MAX_ROWS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_row_cap_is_hard() {
        let config = ValidatorConfig {
            max_rows: 50_000,
            ..Default::default()
        };
        assert_eq!(config.effective_max_rows(), HARD_MAX_ROWS);
    }

    #[test]
    fn test_database_allowlist_is_case_insensitive() {
        let config = ValidatorConfig::default();
        assert!(config.is_database_allowed("snowflake_sample_data"));
        assert!(config.is_database_allowed("Information_Schema"));
        assert!(!config.is_database_allowed("production"));
    }

    #[test]
    fn test_invalid_config() {
        let config = ValidatorConfig {
            max_query_length: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ValidatorConfig {
            extra_forbidden_keywords: vec!["  ".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: ValidatorConfig =
            serde_json::from_str(r#"{ "max_joins": 8, "allowed_databases": ["ANALYTICS"] }"#)
                .unwrap();
        assert_eq!(config.max_joins, 8);
        assert_eq!(config.allowed_databases, vec!["ANALYTICS".to_string()]);
        assert_eq!(config.max_query_length, 10_000);
    }
}
