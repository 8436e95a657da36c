//! Utility functions and helpers
//!
//! This module provides string normalization and timing helpers used throughout the codebase.

pub mod string;
pub mod timer;

pub use string::StringUtils;
pub use timer::Timer;

/// Short, log-safe preview of a query (first 100 characters)
pub fn query_preview(query: &str) -> String {
    StringUtils::truncate(&StringUtils::collapse_whitespace(query), 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_preview() {
        assert_eq!(query_preview("SELECT\n  1"), "SELECT 1");

        let long = format!("SELECT {} FROM t", "a, ".repeat(100));
        let preview = query_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 103);
    }
}
