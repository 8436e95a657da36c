//! SQL tokenizer
//!
//! A deliberately small lexer: it only needs to know where string literals,
//! quoted identifiers and comments begin and end, so that the rules downstream
//! never match keywords inside data and always see comments for what they are.

use crate::utils::StringUtils;

/// Kind of a lexical token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare identifier or keyword (letters, digits, `_`, `$`)
    Word,

    /// Double-quoted identifier
    QuotedIdent {
        /// Whether the closing quote was found
        terminated: bool,
    },

    /// Single-quoted or `$$`-quoted string literal
    StringLit {
        /// Whether the closing quote was found
        terminated: bool,
    },

    /// Numeric literal
    Number,

    /// `--` or `//` comment running to the end of the line
    LineComment,

    /// `/* ... */` comment
    BlockComment {
        /// Whether the closing `*/` was found
        terminated: bool,
    },

    /// Run of whitespace
    Whitespace,

    /// Any other single character
    Symbol(char),
}

/// A token borrowing its text from the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    /// Kind of token
    pub kind: TokenKind,

    /// Exact source text, delimiters included
    pub text: &'a str,

    /// Byte offset of the first character
    pub start: usize,

    /// Byte offset one past the last character
    pub end: usize,
}

impl<'a> Token<'a> {
    /// Whether the token is SQL code (not whitespace, not a comment)
    pub fn is_code(&self) -> bool {
        !matches!(
            self.kind,
            TokenKind::Whitespace | TokenKind::LineComment | TokenKind::BlockComment { .. }
        )
    }

    /// Whether the token is a comment
    pub fn is_comment(&self) -> bool {
        matches!(self.kind, TokenKind::LineComment | TokenKind::BlockComment { .. })
    }

    /// Whether the token is a literal value
    pub fn is_literal(&self) -> bool {
        matches!(self.kind, TokenKind::StringLit { .. } | TokenKind::Number)
            || self.is_keyword("TRUE")
            || self.is_keyword("FALSE")
            || self.is_keyword("NULL")
    }

    /// Whether the token is an unterminated literal, identifier or comment
    pub fn is_unterminated(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::StringLit { terminated: false }
                | TokenKind::QuotedIdent { terminated: false }
                | TokenKind::BlockComment { terminated: false }
        )
    }

    /// Upper-cased word with lookalike characters folded onto ASCII
    pub fn normalized(&self) -> String {
        StringUtils::fold_confusables(self.text).to_uppercase()
    }

    /// Case-insensitive keyword comparison for word tokens
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.normalized() == keyword
    }

    /// Whether the token is the given symbol
    pub fn is_symbol(&self, symbol: char) -> bool {
        self.kind == TokenKind::Symbol(symbol)
    }

    /// Body of a comment without its delimiters
    pub fn comment_body(&self) -> &'a str {
        match self.kind {
            TokenKind::LineComment => &self.text[2..],
            TokenKind::BlockComment { terminated } => {
                let end = if terminated { self.text.len() - 2 } else { self.text.len() };
                &self.text[2..end.max(2)]
            }
            _ => "",
        }
    }

    /// Content of a quoted identifier without quotes (escaped quotes collapsed)
    pub fn unquoted(&self) -> String {
        match self.kind {
            TokenKind::QuotedIdent { terminated } => {
                let end = if terminated { self.text.len() - 1 } else { self.text.len() };
                self.text[1..end.max(1)].replace("\"\"", "\"")
            }
            _ => self.text.to_string(),
        }
    }
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Tokenize a query. Never fails: malformed input yields unterminated tokens.
pub fn tokenize(input: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        let rest = &input[start..];

        let (kind, len) = if c.is_whitespace() {
            let len = rest
                .char_indices()
                .find(|(_, ch)| !ch.is_whitespace())
                .map_or(rest.len(), |(i, _)| i);
            (TokenKind::Whitespace, len)
        } else if rest.starts_with("--") || rest.starts_with("//") {
            let len = rest.find('\n').unwrap_or(rest.len());
            (TokenKind::LineComment, len)
        } else if rest.starts_with("/*") {
            match rest[2..].find("*/") {
                Some(i) => (TokenKind::BlockComment { terminated: true }, i + 4),
                None => (TokenKind::BlockComment { terminated: false }, rest.len()),
            }
        } else if rest.starts_with("$$") {
            match rest[2..].find("$$") {
                Some(i) => (TokenKind::StringLit { terminated: true }, i + 4),
                None => (TokenKind::StringLit { terminated: false }, rest.len()),
            }
        } else if c == '\'' {
            let (terminated, len) = scan_quoted(rest, '\'', true);
            (TokenKind::StringLit { terminated }, len)
        } else if c == '"' {
            let (terminated, len) = scan_quoted(rest, '"', false);
            (TokenKind::QuotedIdent { terminated }, len)
        } else if c.is_ascii_digit() {
            (TokenKind::Number, scan_number(rest))
        } else if is_word_start(c) {
            let len = rest
                .char_indices()
                .find(|(_, ch)| !is_word_char(*ch))
                .map_or(rest.len(), |(i, _)| i);
            (TokenKind::Word, len)
        } else {
            (TokenKind::Symbol(c), c.len_utf8())
        };

        let end = start + len;
        tokens.push(Token {
            kind,
            text: &input[start..end],
            start,
            end,
        });
        while matches!(chars.peek(), Some(&(i, _)) if i < end) {
            chars.next();
        }
    }

    tokens
}

/// Scan a quoted run starting at the opening quote; doubled quotes are escapes.
/// Returns (terminated, byte length).
fn scan_quoted(rest: &str, quote: char, backslash_escapes: bool) -> (bool, usize) {
    let mut iter = rest.char_indices().skip(1).peekable();
    while let Some((i, ch)) = iter.next() {
        if backslash_escapes && ch == '\\' {
            iter.next();
        } else if ch == quote {
            if matches!(iter.peek(), Some(&(_, next)) if next == quote) {
                iter.next();
            } else {
                return (true, i + ch.len_utf8());
            }
        }
    }
    (false, rest.len())
}

fn scan_number(rest: &str) -> usize {
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
        i += 1;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            while j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            i = j;
        }
    }
    i
}

/// Render tokens as upper-cased code with data and comments blanked out.
///
/// String literals become `''`, quoted identifiers `""`, comments a single
/// space. Keyword rules run against this text only.
pub fn code_text(tokens: &[Token<'_>]) -> String {
    let mut out = String::new();
    for token in tokens {
        match token.kind {
            TokenKind::Word => out.push_str(&token.normalized()),
            TokenKind::Number => out.push_str(token.text),
            TokenKind::StringLit { .. } => out.push_str("''"),
            TokenKind::QuotedIdent { .. } => out.push_str("\"\""),
            TokenKind::Symbol(c) => out.push(c),
            TokenKind::Whitespace | TokenKind::LineComment | TokenKind::BlockComment { .. } => {
                out.push(' ')
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .into_iter()
            .filter(|t| t.kind != TokenKind::Whitespace)
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_select() {
        let tokens: Vec<_> = tokenize("SELECT a, 1.5 FROM t")
            .into_iter()
            .filter(|t| t.is_code())
            .map(|t| t.text)
            .collect();
        assert_eq!(tokens, vec!["SELECT", "a", ",", "1.5", "FROM", "t"]);
    }

    #[test]
    fn test_tokens_cover_input() {
        let input = "SELECT 'it''s' /* c */ \"Col\" -- tail\nFROM t;";
        let rebuilt: String = tokenize(input).iter().map(|t| t.text).collect();
        assert_eq!(rebuilt, input);
    }

    #[test]
    fn test_string_literals() {
        let tokens = tokenize("'it''s' 'a\\'b' $$raw ' text$$");
        let literals: Vec<_> = tokens
            .iter()
            .filter(|t| matches!(t.kind, TokenKind::StringLit { terminated: true }))
            .map(|t| t.text)
            .collect();
        assert_eq!(literals, vec!["'it''s'", "'a\\'b'", "$$raw ' text$$"]);
    }

    #[test]
    fn test_unterminated_tokens() {
        assert!(tokenize("SELECT 'abc").iter().any(|t| t.is_unterminated()));
        assert!(tokenize("SELECT /* abc").iter().any(|t| t.is_unterminated()));
        assert!(tokenize("SELECT \"abc").iter().any(|t| t.is_unterminated()));
        assert!(!tokenize("SELECT 'abc'").iter().any(|t| t.is_unterminated()));
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            kinds("a -- x\nb /* y */ c // z"),
            vec![
                TokenKind::Word,
                TokenKind::LineComment,
                TokenKind::Word,
                TokenKind::BlockComment { terminated: true },
                TokenKind::Word,
                TokenKind::LineComment,
            ]
        );

        let tokens = tokenize("/* DROP */");
        assert_eq!(tokens[0].comment_body(), " DROP ");
        let tokens = tokenize("-- DROP");
        assert_eq!(tokens[0].comment_body(), " DROP");
    }

    #[test]
    fn test_words_include_dollar_and_underscore() {
        let tokens = tokenize("SYSTEM$WHITELIST created_at");
        assert_eq!(tokens[0].text, "SYSTEM$WHITELIST");
        assert_eq!(tokens[2].text, "created_at");
    }

    #[test]
    fn test_number_exponent() {
        let tokens = tokenize("1e12 3.14E-2 7e");
        assert_eq!(tokens[0].text, "1e12");
        assert_eq!(tokens[2].text, "3.14E-2");
        assert_eq!(tokens[4].text, "7");
    }

    #[test]
    fn test_quoted_identifier() {
        let tokens = tokenize("\"My \"\"Table\"\"\"");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].unquoted(), "My \"Table\"");
    }

    #[test]
    fn test_code_text_blanks_data() {
        let tokens = tokenize("select 'drop table' from \"delete\" -- update\n");
        assert_eq!(code_text(&tokens), "SELECT '' FROM \"\"   ");
    }

    #[test]
    fn test_normalized_folds_lookalikes() {
        let tokens = tokenize("dr\u{043E}p");
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].is_keyword("DROP"));
    }
}
