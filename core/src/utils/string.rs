//! String utility functions
//!
//! Normalization helpers used before any pattern matching, plus log-safe truncation.

use unicode_normalization::UnicodeNormalization;

/// String utility functions
#[derive(Debug)]
pub struct StringUtils;

impl StringUtils {
    /// Truncate a string to a maximum number of characters with ellipsis
    pub fn truncate(s: &str, max_chars: usize) -> String {
        match s.char_indices().nth(max_chars) {
            None => s.to_string(),
            Some((cut, _)) => {
                let mut result = s[..cut].to_string();
                result.push_str("...");
                result
            }
        }
    }

    /// Collapse runs of whitespace into a single space and trim the ends
    pub fn collapse_whitespace(s: &str) -> String {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// NFKC-normalize and drop invisible formatting characters.
    ///
    /// NFKC folds full-width and mathematical letter forms onto ASCII, so
    /// `ＤＲＯＰ` and `𝐃𝐑𝐎𝐏` both come out as `DROP`.
    pub fn normalize_unicode(s: &str) -> String {
        s.chars()
            .filter(|c| !Self::is_invisible(*c))
            .nfkc()
            .filter(|c| !Self::is_invisible(*c))
            .collect()
    }

    /// Map every known lookalike character onto its ASCII counterpart
    pub fn fold_confusables(s: &str) -> String {
        s.chars().map(|c| Self::fold_confusable(c).unwrap_or(c)).collect()
    }

    /// Whether `c` renders as nothing and can be used to split a token
    pub fn is_invisible(c: char) -> bool {
        matches!(
            c,
            '\u{00AD}'
                | '\u{034F}'
                | '\u{180E}'
                | '\u{200B}'..='\u{200F}'
                | '\u{202A}'..='\u{202E}'
                | '\u{2060}'..='\u{2064}'
                | '\u{FEFF}'
        )
    }

    /// ASCII counterpart of a lookalike letter that NFKC leaves alone
    pub fn fold_confusable(c: char) -> Option<char> {
        let folded = match c {
            // Cyrillic
            'А' => 'A',
            'В' => 'B',
            'С' => 'C',
            'Е' => 'E',
            'Н' => 'H',
            'І' => 'I',
            'Ј' => 'J',
            'К' => 'K',
            'М' => 'M',
            'О' => 'O',
            'Р' => 'P',
            'Ѕ' => 'S',
            'Т' => 'T',
            'Х' => 'X',
            'У' | 'Ү' => 'Y',
            'а' => 'a',
            'с' => 'c',
            'ԁ' => 'd',
            'е' => 'e',
            'һ' => 'h',
            'і' => 'i',
            'ј' => 'j',
            'о' => 'o',
            'р' => 'p',
            'ԛ' => 'q',
            'ѕ' => 's',
            'ԝ' => 'w',
            'х' => 'x',
            'у' => 'y',
            // Greek
            'Α' => 'A',
            'Β' => 'B',
            'Ε' => 'E',
            'Ζ' => 'Z',
            'Η' => 'H',
            'Ι' => 'I',
            'Κ' => 'K',
            'Μ' => 'M',
            'Ν' => 'N',
            'Ο' => 'O',
            'Ρ' => 'P',
            'Τ' => 'T',
            'Υ' => 'Y',
            'Χ' => 'X',
            'ο' => 'o',
            'ν' => 'v',
            // Cherokee
            'Ꭰ' => 'D',
            'Ꭱ' => 'R',
            'Ꭲ' => 'T',
            'Ꭺ' => 'A',
            'Ꭼ' => 'E',
            'Ꮃ' => 'W',
            'Ꮇ' => 'M',
            'Ꮋ' => 'H',
            'Ꮎ' => 'O',
            'Ꮐ' => 'G',
            'Ꮪ' => 'S',
            'Ꮮ' => 'L',
            'Ꮯ' => 'C',
            'Ꮲ' => 'P',
            'Ꮶ' => 'K',
            // Latin small capitals
            'ᴀ' => 'A',
            'ʙ' => 'B',
            'ᴄ' => 'C',
            'ᴅ' => 'D',
            'ᴇ' => 'E',
            'ɢ' => 'G',
            'ʜ' => 'H',
            'ɪ' => 'I',
            'ᴊ' => 'J',
            'ᴋ' => 'K',
            'ʟ' => 'L',
            'ᴍ' => 'M',
            'ɴ' => 'N',
            'ᴏ' => 'O',
            'ᴘ' => 'P',
            'ʀ' => 'R',
            'ꜱ' => 'S',
            'ᴛ' => 'T',
            'ᴜ' => 'U',
            'ᴠ' => 'V',
            'ᴡ' => 'W',
            'ʏ' => 'Y',
            'ᴢ' => 'Z',
            _ => return None,
        };
        Some(folded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(StringUtils::truncate("SELECT 1", 100), "SELECT 1");
        assert_eq!(StringUtils::truncate("SELECT 1", 6), "SELECT...");
        assert_eq!(StringUtils::truncate("ééééé", 2), "éé...");
    }

    #[test]
    fn test_whitespace_helpers() {
        assert_eq!(StringUtils::collapse_whitespace("  SELECT \n\t *  FROM t "), "SELECT * FROM t");
    }

    #[test]
    fn test_nfkc_folds_fullwidth_and_math_letters() {
        assert_eq!(StringUtils::normalize_unicode("ＤＲＯＰ"), "DROP");
        assert_eq!(StringUtils::normalize_unicode("𝐃𝐑𝐎𝐏"), "DROP");
    }

    #[test]
    fn test_invisible_characters_are_removed() {
        assert_eq!(StringUtils::normalize_unicode("DR\u{200B}OP"), "DROP");
        assert_eq!(StringUtils::normalize_unicode("\u{FEFF}SELECT"), "SELECT");
        assert_eq!(StringUtils::normalize_unicode("DE\u{00AD}LETE"), "DELETE");
    }

    #[test]
    fn test_confusables_fold_to_ascii() {
        // Cyrillic О and Е
        assert_eq!(StringUtils::fold_confusables("DR\u{041E}P"), "DROP");
        assert_eq!(StringUtils::fold_confusables("S\u{0415}LECT"), "SELECT");
        // Small capitals
        assert_eq!(StringUtils::fold_confusables("ᴅʀᴏᴘ"), "DROP");
        // Ordinary non-Latin text passes through untouched
        assert_eq!(StringUtils::fold_confusables("東京"), "東京");
    }
}
