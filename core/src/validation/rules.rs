//! Keyword and pattern blocklist
//!
//! Every rule is compiled once when the [`Blocklist`] is built and shared
//! read-only afterwards. Rules carry a fixed, user-safe reason; the matched
//! text is never part of it.

use regex::Regex;

use crate::error::{CoreError, Result};
use crate::validation::result::RejectionCode;

/// Which rendering of the query a rule is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchScope {
    /// Upper-cased code with literals, quoted identifiers and comments blanked
    Code,

    /// Upper-cased normalized text, literals and comments included
    Raw,
}

/// Both renderings of a query that rules can be matched against
#[derive(Debug, Clone, Copy)]
pub struct MatchInput<'a> {
    /// See [`MatchScope::Code`]
    pub code: &'a str,

    /// See [`MatchScope::Raw`]
    pub raw: &'a str,
}

/// A keyword or regular expression plus the reason it is blocked
#[derive(Debug, Clone)]
pub struct BlockedPattern {
    name: String,
    code: RejectionCode,
    reason: &'static str,
    scope: MatchScope,
    matcher: Regex,
}

impl BlockedPattern {
    /// Whole-word, case-insensitive keyword rule.
    ///
    /// Multi-word keywords match across any whitespace. A keyword ending in `$`
    /// (e.g. `SYSTEM$`) matches as a prefix of a longer word.
    pub fn keyword(keyword: &str, code: RejectionCode, reason: &'static str) -> Result<Self> {
        let keyword = keyword.trim().to_uppercase();
        let body = keyword
            .split_whitespace()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"\s+");
        let trailing = if keyword.ends_with('$') { "" } else { r"(?:[^\w$]|$)" };
        let expr = format!(r"(?i)(?:^|[^\w$]){}{}", body, trailing);
        Self::compile(keyword, &expr, code, reason, MatchScope::Code)
    }

    /// Regular-expression rule
    pub fn pattern(
        name: &str,
        expr: &str,
        code: RejectionCode,
        reason: &'static str,
        scope: MatchScope,
    ) -> Result<Self> {
        Self::compile(name.to_string(), &format!("(?i){}", expr), code, reason, scope)
    }

    fn compile(
        name: String,
        expr: &str,
        code: RejectionCode,
        reason: &'static str,
        scope: MatchScope,
    ) -> Result<Self> {
        let matcher = Regex::new(expr).map_err(|source| CoreError::InvalidRule {
            name: name.clone(),
            source,
        })?;
        Ok(Self {
            name,
            code,
            reason,
            scope,
            matcher,
        })
    }

    /// Rule name, for logs and tests
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rejection category
    pub fn code(&self) -> RejectionCode {
        self.code
    }

    /// User-safe reason
    pub fn reason(&self) -> &'static str {
        self.reason
    }

    /// Text rendering the rule applies to
    pub fn scope(&self) -> MatchScope {
        self.scope
    }

    /// Match against the rendering selected by the rule's scope
    pub fn is_match(&self, input: &MatchInput<'_>) -> bool {
        match self.scope {
            MatchScope::Code => self.matcher.is_match(input.code),
            MatchScope::Raw => self.matcher.is_match(input.raw),
        }
    }

    /// Match against an arbitrary piece of text (e.g. a comment body)
    pub fn is_match_text(&self, text: &str) -> bool {
        self.matcher.is_match(text)
    }
}

const DML_REASON: &str =
    "Data modification statements are not allowed. Only SELECT queries can be run.";
const DDL_REASON: &str = "Schema changes are not allowed. Only SELECT queries can be run.";
const ACCESS_REASON: &str =
    "Privilege, session and procedure commands are not allowed. Only SELECT queries can be run.";
const TRANSACTION_REASON: &str = "Transaction control statements are not allowed.";
const FILE_REASON: &str = "File operations and external references are not allowed.";
const SYSTEM_REASON: &str = "Access to system functions and account metadata is not allowed.";
const INJECTION_REASON: &str =
    "Query contains potentially malicious pattern. SQL injection attempts are not allowed.";
const COMPLEXITY_REASON: &str =
    "Query uses a restricted SQL feature. Recursive, hierarchical and cross-product operations are not allowed.";

/// Reason used for keywords added through configuration
pub const CUSTOM_KEYWORD_REASON: &str = "Query contains a keyword that is blocked by policy.";

const KEYWORD_GROUPS: &[(&[&str], RejectionCode, &str)] = &[
    (
        &["INSERT", "UPDATE", "DELETE", "MERGE", "TRUNCATE"],
        RejectionCode::ForbiddenKeyword,
        DML_REASON,
    ),
    (
        &["CREATE", "ALTER", "DROP", "UNDROP", "SWAP"],
        RejectionCode::ForbiddenKeyword,
        DDL_REASON,
    ),
    (
        &[
            "GRANT",
            "REVOKE",
            "USE ROLE",
            "USE WAREHOUSE",
            "USE DATABASE",
            "USE SCHEMA",
            "SET",
            "UNSET",
            "EXECUTE",
            "EXEC",
            "CALL",
            "PROCEDURE",
            "TASK",
            "PIPE",
            "DESCRIBE",
        ],
        RejectionCode::ForbiddenKeyword,
        ACCESS_REASON,
    ),
    (
        &["BEGIN", "COMMIT", "ROLLBACK"],
        RejectionCode::ForbiddenKeyword,
        TRANSACTION_REASON,
    ),
    (
        // COPY also covers COPY INTO
        &["COPY", "PUT", "GET", "REMOVE", "LIST", "LOAD", "UNLOAD", "STAGE"],
        RejectionCode::ForbiddenKeyword,
        FILE_REASON,
    ),
    (
        &[
            "SYSTEM$",
            "CURRENT_ROLE",
            "CURRENT_USER",
            "ACCOUNT_USAGE",
            "SHOW GRANTS",
            "SHOW ROLES",
            "USER_PRIVILEGES",
            "ROLE_GRANTS",
            "APPLICABLE_ROLES",
            "ENABLED_ROLES",
        ],
        RejectionCode::ForbiddenKeyword,
        SYSTEM_REASON,
    ),
];

const COMPLEXITY_PATTERNS: &[(&str, &str)] = &[
    ("recursive_cte", r"\bRECURSIVE\b"),
    ("hierarchical_query", r"\bCONNECT\s+BY\b"),
    ("cross_join", r"\bCROSS\s+JOIN\b"),
    ("match_recognize", r"\bMATCH_RECOGNIZE\b"),
    ("row_generator", r"\bGENERATOR\s*\("),
];

const EXTERNAL_PATTERNS: &[(&str, &str, MatchScope)] = &[
    ("stage_reference", r"@[~%\w]", MatchScope::Code),
    ("stage_literal", r"'@[~%\w]", MatchScope::Raw),
    (
        "url_scheme",
        r"\b(?:S3|S3GOV|AZURE|GCS|HTTPS?|FTP|FILE)://",
        MatchScope::Raw,
    ),
    ("file_format", r"\bFILE_FORMAT\b", MatchScope::Code),
    ("external_object", r"\bEXTERNAL\b", MatchScope::Code),
];

const INJECTION_PATTERNS: &[(&str, &str)] = &[
    ("union_select", r"\bUNION\s+SELECT\b"),
    (
        "union_credentials",
        r"\bUNION\b.*\b(?:PASSWORDS?|CREDENTIALS?|SECRETS?|TOKENS?)\b",
    ),
    ("sleep_function", r"\b(?:SLEEP|PG_SLEEP|BENCHMARK)\s*\("),
    ("waitfor_delay", r"\bWAITFOR\s+DELAY\b"),
    ("file_output", r"\bINTO\s+(?:OUTFILE|DUMPFILE)\b"),
    ("load_file", r"\bLOAD_FILE\s*\("),
    ("shell_procedure", r"\b(?:XP_CMDSHELL|SP_EXECUTESQL)\b"),
    ("dynamic_exec", r"\bEXEC\s*\(\s*@"),
    ("variable_declaration", r"\bDECLARE\s+@"),
    ("char_code_concat", r"\b(?:CHAR|CHR)\s*\(\s*\d+\s*\)\s*\|\|"),
    (
        "blind_extraction",
        r"\b(?:ASCII|SUBSTRING|SUBSTR)\s*\(\s*\(\s*SELECT\b",
    ),
    ("ascii_substring", r"\bASCII\s*\(\s*SUBSTR(?:ING)?\b"),
];

/// The compiled set of blocked keywords and patterns
#[derive(Debug, Clone)]
pub struct Blocklist {
    complexity: Vec<BlockedPattern>,
    patterns: Vec<BlockedPattern>,
    keywords: Vec<BlockedPattern>,
}

impl Blocklist {
    /// Compile the built-in rule set
    pub fn builtin() -> Result<Self> {
        let complexity = COMPLEXITY_PATTERNS
            .iter()
            .map(|(name, expr)| {
                BlockedPattern::pattern(
                    name,
                    expr,
                    RejectionCode::QueryTooComplex,
                    COMPLEXITY_REASON,
                    MatchScope::Code,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let mut patterns = EXTERNAL_PATTERNS
            .iter()
            .map(|(name, expr, scope)| {
                BlockedPattern::pattern(
                    name,
                    expr,
                    RejectionCode::ForbiddenPattern,
                    FILE_REASON,
                    *scope,
                )
            })
            .collect::<Result<Vec<_>>>()?;
        for (name, expr) in INJECTION_PATTERNS {
            patterns.push(BlockedPattern::pattern(
                name,
                expr,
                RejectionCode::ForbiddenPattern,
                INJECTION_REASON,
                MatchScope::Code,
            )?);
        }

        let mut keywords = Vec::new();
        for (group, code, reason) in KEYWORD_GROUPS {
            for keyword in group.iter() {
                keywords.push(BlockedPattern::keyword(keyword, *code, *reason)?);
            }
        }

        Ok(Self {
            complexity,
            patterns,
            keywords,
        })
    }

    /// Add configured keywords on top of the current set
    pub fn with_extra_keywords<S: AsRef<str>>(mut self, extra: &[S]) -> Result<Self> {
        for keyword in extra {
            let keyword = keyword.as_ref();
            if keyword.trim().is_empty() {
                return Err(CoreError::ConfigError(
                    "blocked keyword must not be empty".to_string(),
                ));
            }
            self.keywords.push(BlockedPattern::keyword(
                keyword,
                RejectionCode::ForbiddenKeyword,
                CUSTOM_KEYWORD_REASON,
            )?);
        }
        Ok(self)
    }

    /// First restricted-feature rule that matches
    pub fn find_complexity(&self, input: &MatchInput<'_>) -> Option<&BlockedPattern> {
        self.complexity.iter().find(|rule| rule.is_match(input))
    }

    /// First external-reference or injection rule that matches
    pub fn find_pattern(&self, input: &MatchInput<'_>) -> Option<&BlockedPattern> {
        self.patterns.iter().find(|rule| rule.is_match(input))
    }

    /// First keyword rule that matches
    pub fn find_keyword(&self, input: &MatchInput<'_>) -> Option<&BlockedPattern> {
        self.keywords.iter().find(|rule| rule.is_match(input))
    }

    /// Whether any keyword rule matches free text (already upper-cased)
    pub fn contains_keyword(&self, text: &str) -> bool {
        self.keywords.iter().any(|rule| rule.is_match_text(text))
    }

    /// Whether `word` (upper-cased) is itself a single blocked keyword
    pub fn is_blocked_word(&self, word: &str) -> bool {
        self.keywords.iter().any(|rule| {
            let name = rule.name();
            name == word || (name.ends_with('$') && word.starts_with(name))
        })
    }

    /// Iterate over all rules in evaluation order
    pub fn iter(&self) -> impl Iterator<Item = &BlockedPattern> {
        self.complexity
            .iter()
            .chain(self.patterns.iter())
            .chain(self.keywords.iter())
    }

    /// Total number of rules
    pub fn len(&self) -> usize {
        self.complexity.len() + self.patterns.len() + self.keywords.len()
    }

    /// Whether the blocklist has no rules
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
