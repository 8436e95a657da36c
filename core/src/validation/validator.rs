//! Query validator
//!
//! Decides whether a single analytics query may be sent to the warehouse.
//! Checks run in a fixed order: size bounds first (cheap, and they protect
//! everything after them), then normalization and lexing, structural bounds,
//! statement count, keywords, structural red flags, statement shape, object
//! allowlist and finally a parser confirmation.

use log::debug;
use sqlparser::ast::Statement;
use sqlparser::dialect::SnowflakeDialect;
use sqlparser::parser::Parser;

use crate::config::ValidatorConfig;
use crate::error::Result;
use crate::utils::StringUtils;
use crate::validation::lexer::{self, Token, TokenKind};
use crate::validation::result::{Rejection, RejectionCode, ValidationResult};
use crate::validation::rules::{Blocklist, MatchInput};

const EMPTY_QUERY: &str = "Empty query provided.";
const UNTERMINATED: &str =
    "Query contains an unterminated string, quoted identifier or comment.";
const MULTI_STATEMENT: &str =
    "Multiple statements are not allowed. Submit one SELECT statement at a time.";
const COMMENT_SPLICE: &str =
    "Query appears to use comments to hide or split SQL keywords. This is not allowed.";
const LOOKALIKE: &str =
    "Query contains lookalike Unicode characters in SQL keywords. ASCII-only SQL keywords are required.";
const TAUTOLOGY: &str =
    "Query contains potentially malicious pattern. SQL injection attempts are not allowed.";
const SELECT_ONLY: &str =
    "Query must start with SELECT. Data modification statements are not allowed.";

/// Words that are checked for lookalike characters on top of the blocklist
const STRUCTURAL_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "UNION", "ORDER", "GROUP", "HAVING", "JOIN", "WITH", "LIMIT",
];

/// Words after which `(` opens a subquery or list rather than a function call
const NON_FUNCTION_WORDS: &[&str] = &[
    "FROM", "JOIN", "IN", "AS", "EXISTS", "ANY", "ALL", "SOME", "ON", "WHERE", "AND", "OR", "NOT",
    "SELECT", "UNION", "INTERSECT", "EXCEPT", "MINUS", "LATERAL", "USING", "VALUES", "THEN",
    "ELSE", "WHEN", "BY", "HAVING",
];

/// Words that end the relation list of a FROM clause
const RELATION_LIST_END: &[&str] = &[
    "WHERE", "GROUP", "ORDER", "HAVING", "QUALIFY", "LIMIT", "OFFSET", "FETCH", "UNION",
    "INTERSECT", "EXCEPT", "MINUS", "WINDOW",
];

/// Query validator
#[derive(Debug, Clone)]
pub struct QueryValidator {
    config: ValidatorConfig,
    blocklist: Blocklist,
}

impl QueryValidator {
    /// Create a validator with the built-in blocklist plus configured keywords
    pub fn new(config: ValidatorConfig) -> Result<Self> {
        config.validate()?;
        let blocklist =
            Blocklist::builtin()?.with_extra_keywords(&config.extra_forbidden_keywords)?;
        Ok(Self { config, blocklist })
    }

    /// Validator configuration
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Compiled blocklist
    pub fn blocklist(&self) -> &Blocklist {
        &self.blocklist
    }

    /// Normalized form of `query`: the text that is checked and, once
    /// accepted, the text that should be executed
    pub fn normalize(&self, query: &str) -> String {
        StringUtils::normalize_unicode(query.trim())
    }

    /// Validate one query. Pure: no state is read or written besides `self`.
    pub fn validate(&self, query: &str) -> ValidationResult {
        match self.check(query) {
            Ok(()) => ValidationResult::allow(),
            Err(rejection) => ValidationResult {
                allowed: false,
                reason: Some(rejection),
            },
        }
    }

    fn check(&self, query: &str) -> std::result::Result<(), Rejection> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(Rejection::new(RejectionCode::ForbiddenPattern, EMPTY_QUERY));
        }
        self.check_length(trimmed)?;

        let normalized = self.normalize(trimmed);
        // NFKC can expand some characters, so the bound applies again
        self.check_length(&normalized)?;

        let tokens = lexer::tokenize(&normalized);
        if tokens.iter().any(Token::is_unterminated) {
            return Err(Rejection::new(RejectionCode::ForbiddenPattern, UNTERMINATED));
        }
        let code: Vec<&Token<'_>> = tokens.iter().filter(|t| t.is_code()).collect();

        let code_text = lexer::code_text(&tokens);
        let raw_text = StringUtils::fold_confusables(&normalized).to_uppercase();
        let input = MatchInput {
            code: &code_text,
            raw: &raw_text,
        };

        self.check_structure_bounds(&code)?;
        if let Some(rule) = self.blocklist.find_complexity(&input) {
            debug!("Query rejected by complexity rule {}", rule.name());
            return Err(Rejection::new(rule.code(), rule.reason()));
        }

        check_single_statement(&code)?;
        if let Some(rule) = self.blocklist.find_keyword(&input) {
            debug!("Query rejected by keyword rule {}", rule.name());
            return Err(Rejection::new(rule.code(), rule.reason()));
        }

        self.check_comments(&tokens)?;
        self.check_lookalikes(&code)?;
        check_tautologies(&code)?;
        if let Some(rule) = self.blocklist.find_pattern(&input) {
            debug!("Query rejected by pattern rule {}", rule.name());
            return Err(Rejection::new(rule.code(), rule.reason()));
        }

        check_select_only(&code)?;
        self.check_object_allowlist(&code)?;

        if self.config.parser_check {
            check_with_parser(&normalized)?;
        }

        Ok(())
    }

    fn check_length(&self, text: &str) -> std::result::Result<(), Rejection> {
        if text.chars().count() > self.config.max_query_length {
            return Err(Rejection::new(
                RejectionCode::QueryTooLong,
                format!(
                    "Query is too long. Maximum query length is {} characters.",
                    self.config.max_query_length
                ),
            ));
        }
        Ok(())
    }

    fn check_structure_bounds(&self, code: &[&Token<'_>]) -> std::result::Result<(), Rejection> {
        let mut depth: usize = 0;
        let mut max_depth: usize = 0;
        for token in code {
            if token.is_symbol('(') {
                depth += 1;
                max_depth = max_depth.max(depth);
            } else if token.is_symbol(')') {
                depth = depth.saturating_sub(1);
            }
        }
        if max_depth > self.config.max_nesting_depth {
            return Err(Rejection::new(
                RejectionCode::QueryTooComplex,
                format!(
                    "Query has too many nested parentheses. Maximum nesting depth is {}.",
                    self.config.max_nesting_depth
                ),
            ));
        }

        let joins = code.iter().filter(|t| t.is_keyword("JOIN")).count();
        if joins > self.config.max_joins {
            return Err(Rejection::new(
                RejectionCode::QueryTooComplex,
                format!(
                    "Query has too many JOINs ({}). Maximum allowed is {}.",
                    joins, self.config.max_joins
                ),
            ));
        }
        Ok(())
    }

    fn check_comments(&self, tokens: &[Token<'_>]) -> std::result::Result<(), Rejection> {
        for (i, token) in tokens.iter().enumerate() {
            if !token.is_comment() {
                continue;
            }
            let prev = i.checked_sub(1).and_then(|p| tokens.get(p));
            let next = tokens.get(i + 1);

            // `'--` and `'/*`: a literal closed only to open a comment
            if matches!(prev, Some(t) if matches!(t.kind, TokenKind::StringLit { .. })) {
                return Err(Rejection::new(RejectionCode::ForbiddenPattern, TAUTOLOGY));
            }

            let glued = |t: Option<&Token<'_>>| {
                matches!(t, Some(t) if matches!(t.kind, TokenKind::Word | TokenKind::Number))
            };
            if matches!(token.kind, TokenKind::BlockComment { .. }) && glued(prev) && glued(next) {
                return Err(Rejection::new(RejectionCode::ForbiddenPattern, COMMENT_SPLICE));
            }

            let body = StringUtils::fold_confusables(token.comment_body()).to_uppercase();
            if body.contains(';') || self.blocklist.contains_keyword(&body) {
                return Err(Rejection::new(RejectionCode::ForbiddenPattern, COMMENT_SPLICE));
            }
        }
        Ok(())
    }

    fn check_lookalikes(&self, code: &[&Token<'_>]) -> std::result::Result<(), Rejection> {
        for token in code {
            if token.kind != TokenKind::Word || token.text.is_ascii() {
                continue;
            }
            let folded = token.normalized();
            if !folded.is_ascii() {
                continue;
            }
            if STRUCTURAL_KEYWORDS.contains(&folded.as_str())
                || self.blocklist.is_blocked_word(&folded)
            {
                return Err(Rejection::new(RejectionCode::ForbiddenPattern, LOOKALIKE));
            }
        }
        Ok(())
    }

    fn check_object_allowlist(&self, code: &[&Token<'_>]) -> std::result::Result<(), Rejection> {
        let mut function_parens: Vec<bool> = Vec::new();

        for (i, token) in code.iter().enumerate() {
            if token.is_symbol('(') {
                let is_call = i
                    .checked_sub(1)
                    .and_then(|p| code.get(p))
                    .map(|prev| match prev.kind {
                        TokenKind::Word => {
                            !NON_FUNCTION_WORDS.contains(&prev.normalized().as_str())
                        }
                        TokenKind::QuotedIdent { .. } => true,
                        _ => false,
                    })
                    .unwrap_or(false);
                function_parens.push(is_call);
                continue;
            }
            if token.is_symbol(')') {
                function_parens.pop();
                continue;
            }

            // FROM inside a call is EXTRACT(YEAR FROM ...) and friends
            let inside_call = function_parens.last().copied().unwrap_or(false);
            if !inside_call && token.is_keyword("FROM") {
                self.check_relation_list(&code[i + 1..])?;
            }
        }
        Ok(())
    }

    /// Check every relation of the list starting at `code`, up to the end of
    /// the FROM clause. Parenthesized subqueries are skipped; their own FROM
    /// is checked separately.
    fn check_relation_list(&self, code: &[&Token<'_>]) -> std::result::Result<(), Rejection> {
        let mut expect_relation = true;
        let mut i = 0;

        while let Some(token) = code.get(i) {
            if token.is_symbol(')')
                || token.is_symbol(';')
                || RELATION_LIST_END.iter().any(|kw| token.is_keyword(kw))
            {
                break;
            }
            if token.is_symbol(',') || token.is_keyword("JOIN") {
                expect_relation = true;
                i += 1;
                continue;
            }
            if token.is_symbol('(') {
                let opens_subquery = code
                    .get(i + 1)
                    .map_or(false, |next| next.is_keyword("SELECT") || next.is_keyword("WITH"));
                if expect_relation && !opens_subquery {
                    // Parenthesized join: (a JOIN b ON ...)
                    self.check_relation_list(&code[i + 1..])?;
                }
                i = closing_paren(code, i) + 1;
                expect_relation = false;
                continue;
            }
            if !expect_relation || token.is_keyword("LATERAL") {
                i += 1;
                continue;
            }

            let parts = object_name_parts(&code[i..]);
            if parts.is_empty() {
                i += 1;
                expect_relation = false;
                continue;
            }
            let after = i + parts.len() * 2 - 1;
            if code.get(after).map_or(false, |t| t.is_symbol('(')) {
                // Table function; TABLE(...) names its object in the argument
                if parts.len() == 1 && parts[0] == "TABLE" {
                    self.check_object(&object_name_parts(&code[after + 1..]))?;
                } else {
                    self.check_object(&parts)?;
                }
                i = closing_paren(code, after) + 1;
            } else {
                self.check_object(&parts)?;
                i = after;
            }
            expect_relation = false;
        }
        Ok(())
    }

    fn check_object(&self, parts: &[String]) -> std::result::Result<(), Rejection> {
        match parts.first() {
            Some(database) if parts.len() >= 2 && !self.config.is_database_allowed(database) => {
                Err(Rejection::new(
                    RejectionCode::ForbiddenKeyword,
                    format!(
                        "Access to this database or schema is not allowed. Only {} are permitted.",
                        self.config.allowed_databases.join(", ")
                    ),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Index of the `)` matching the `(` at `open`, or the end of `code`
fn closing_paren(code: &[&Token<'_>], open: usize) -> usize {
    let mut depth: usize = 0;
    for (i, token) in code.iter().enumerate().skip(open) {
        if token.is_symbol('(') {
            depth += 1;
        } else if token.is_symbol(')') {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return i;
            }
        }
    }
    code.len()
}

/// Parts of a dotted object name at the start of `tokens` (quotes stripped)
fn object_name_parts(tokens: &[&Token<'_>]) -> Vec<String> {
    let mut parts = Vec::new();
    let mut expect_part = true;
    for token in tokens {
        match (expect_part, token.kind) {
            (true, TokenKind::Word) => parts.push(token.normalized()),
            (true, TokenKind::QuotedIdent { .. }) => parts.push(token.unquoted()),
            (false, TokenKind::Symbol('.')) => {}
            _ => break,
        }
        expect_part = !expect_part;
    }
    parts
}

fn check_single_statement(code: &[&Token<'_>]) -> std::result::Result<(), Rejection> {
    if let Some(pos) = code.iter().position(|t| t.is_symbol(';')) {
        if code[pos + 1..].iter().any(|t| !t.is_symbol(';')) {
            return Err(Rejection::new(RejectionCode::ForbiddenPattern, MULTI_STATEMENT));
        }
    }
    Ok(())
}

fn check_tautologies(code: &[&Token<'_>]) -> std::result::Result<(), Rejection> {
    for window in code.windows(3) {
        let (left, op, right) = (window[0], window[1], window[2]);
        if !op.is_symbol('=') || !left.is_literal() || !right.is_literal() {
            continue;
        }
        let both_numbers = left.kind == TokenKind::Number && right.kind == TokenKind::Number;
        if both_numbers || left.normalized() == right.normalized() {
            return Err(Rejection::new(RejectionCode::ForbiddenPattern, TAUTOLOGY));
        }
    }
    Ok(())
}

fn check_select_only(code: &[&Token<'_>]) -> std::result::Result<(), Rejection> {
    let first = code.iter().find(|t| !t.is_symbol('('));
    match first {
        Some(t) if t.is_keyword("SELECT") || t.is_keyword("WITH") => Ok(()),
        _ => Err(Rejection::new(RejectionCode::ForbiddenKeyword, SELECT_ONLY)),
    }
}

fn check_with_parser(sql: &str) -> std::result::Result<(), Rejection> {
    let statements = match Parser::parse_sql(&SnowflakeDialect {}, sql) {
        Ok(statements) => statements,
        Err(e) => {
            // The warehouse accepts more syntax than the parser does
            debug!("Parser could not confirm query shape: {}", e);
            return Ok(());
        }
    };
    if statements.len() > 1 {
        return Err(Rejection::new(RejectionCode::ForbiddenPattern, MULTI_STATEMENT));
    }
    if statements.iter().any(|s| !matches!(s, Statement::Query(_))) {
        return Err(Rejection::new(RejectionCode::ForbiddenKeyword, SELECT_ONLY));
    }
    Ok(())
}
