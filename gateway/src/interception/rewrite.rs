//! Row-cap enforcement for accepted queries
//!
//! Every query that reaches the warehouse carries a top-level `LIMIT` no larger
//! than the configured row cap. Trailing semicolons and comments are dropped so
//! the appended clause is never swallowed by a line comment.

use query_guard_core::validation::lexer::{self, Token, TokenKind};
use std::fmt;

/// What the rewriter did to a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitAction {
    /// The query had no `LIMIT`; one was appended
    Added,

    /// An existing `LIMIT` above the cap was lowered
    Reduced {
        /// Limit originally requested
        from: u64,
    },

    /// An existing `LIMIT` was already within the cap
    Kept,

    /// The query was wrapped in an outer `SELECT` carrying the limit
    Wrapped,
}

impl fmt::Display for LimitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitAction::Added => write!(f, "limit added"),
            LimitAction::Reduced { from } => write!(f, "limit reduced from {}", from),
            LimitAction::Kept => write!(f, "limit kept"),
            LimitAction::Wrapped => write!(f, "query wrapped with limit"),
        }
    }
}

/// A query ready to be sent to the warehouse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenQuery {
    /// SQL text to execute
    pub sql: String,

    /// What was changed
    pub action: LimitAction,
}

/// Top-level row-limiting clause found in a query
enum TopLevelLimit<'a> {
    None,
    Numeric { value: u64, token: &'a Token<'a> },
    Other,
}

fn find_top_level_limit<'a>(code: &[&'a Token<'a>]) -> TopLevelLimit<'a> {
    let mut depth: usize = 0;
    let mut found = TopLevelLimit::None;

    for (i, token) in code.iter().enumerate() {
        if token.is_symbol('(') {
            depth += 1;
        } else if token.is_symbol(')') {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && token.is_keyword("LIMIT") {
            found = match code.get(i + 1) {
                Some(next) if next.kind == TokenKind::Number => match next.text.parse::<u64>() {
                    Ok(value) => TopLevelLimit::Numeric { value, token: next },
                    Err(_) => TopLevelLimit::Other,
                },
                _ => TopLevelLimit::Other,
            };
        } else if depth == 0 && (token.is_keyword("TOP") || token.is_keyword("FETCH")) {
            found = TopLevelLimit::Other;
        }
    }
    found
}

/// Make sure `query` returns at most `max_rows` rows
pub fn enforce_row_limit(query: &str, max_rows: usize) -> RewrittenQuery {
    let tokens = lexer::tokenize(query);
    let code: Vec<&Token<'_>> = tokens
        .iter()
        .filter(|t| t.is_code())
        .collect();

    let end = code
        .iter()
        .rev()
        .find(|t| !t.is_symbol(';'))
        .map_or(0, |t| t.end);
    let body = query[..end].trim();
    let code: Vec<&Token<'_>> = code.into_iter().filter(|t| t.end <= end).collect();

    match find_top_level_limit(&code) {
        TopLevelLimit::Numeric { value, token } if value > max_rows as u64 => RewrittenQuery {
            sql: format!("{}{}{}", &query[..token.start], max_rows, &query[token.end..end])
                .trim()
                .to_string(),
            action: LimitAction::Reduced { from: value },
        },
        TopLevelLimit::Numeric { .. } => RewrittenQuery {
            sql: body.to_string(),
            action: LimitAction::Kept,
        },
        TopLevelLimit::Other => RewrittenQuery {
            sql: format!("SELECT * FROM (\n{}\n) LIMIT {}", body, max_rows),
            action: LimitAction::Wrapped,
        },
        TopLevelLimit::None => RewrittenQuery {
            sql: format!("{} LIMIT {}", body, max_rows),
            action: LimitAction::Added,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("SELECT * FROM orders", "SELECT * FROM orders LIMIT 100", LimitAction::Added)]
    #[case("SELECT * FROM orders;", "SELECT * FROM orders LIMIT 100", LimitAction::Added)]
    #[case("SELECT * FROM orders ;; ", "SELECT * FROM orders LIMIT 100", LimitAction::Added)]
    #[case("SELECT * FROM orders LIMIT 10", "SELECT * FROM orders LIMIT 10", LimitAction::Kept)]
    #[case(
        "SELECT * FROM orders LIMIT 5000 OFFSET 10;",
        "SELECT * FROM orders LIMIT 100 OFFSET 10",
        LimitAction::Reduced { from: 5000 }
    )]
    #[case(
        "select * from orders limit 5000",
        "select * from orders limit 100",
        LimitAction::Reduced { from: 5000 }
    )]
    fn test_enforce_row_limit(
        #[case] query: &str,
        #[case] expected: &str,
        #[case] action: LimitAction,
    ) {
        let rewritten = enforce_row_limit(query, 100);
        assert_eq!(rewritten.sql, expected);
        assert_eq!(rewritten.action, action);
    }

    #[test]
    fn test_trailing_comment_is_dropped() {
        let rewritten = enforce_row_limit("SELECT * FROM orders -- latest", 100);
        assert_eq!(rewritten.sql, "SELECT * FROM orders LIMIT 100");
    }

    #[test]
    fn test_subquery_limit_is_not_top_level() {
        let rewritten = enforce_row_limit("SELECT * FROM (SELECT * FROM t LIMIT 5000) s", 100);
        assert_eq!(rewritten.action, LimitAction::Added);
        assert!(rewritten.sql.contains("LIMIT 5000) s LIMIT 100"));
    }

    #[test]
    fn test_limit_inside_literal_is_ignored() {
        let rewritten = enforce_row_limit("SELECT 'LIMIT 99999' AS note FROM t", 100);
        assert_eq!(rewritten.action, LimitAction::Added);
    }

    #[test]
    fn test_top_is_wrapped() {
        let rewritten = enforce_row_limit("SELECT TOP 5 * FROM orders", 100);
        assert_eq!(rewritten.action, LimitAction::Wrapped);
        assert_eq!(rewritten.sql, "SELECT * FROM (\nSELECT TOP 5 * FROM orders\n) LIMIT 100");
    }

    #[test]
    fn test_action_display() {
        assert_eq!(LimitAction::Reduced { from: 5 }.to_string(), "limit reduced from 5");
    }
}
