//! Free-text cleanup for values interpolated into model prompts.
//!
//! Not an SQL escaping routine: generated SQL still goes through the validator.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    static ref QUOTE_CHARS: Regex = Regex::new(r#"[;'"\\]"#).unwrap();
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
}

/// Remove `;`, `'`, `"` and `\`, collapse whitespace runs to one space, trim.
pub fn sanitize(raw: &str) -> String {
    if raw.is_empty() {
        debug!("Empty input to sanitize");
        return String::new();
    }

    let stripped = QUOTE_CHARS.replace_all(raw, "");
    let collapsed = WHITESPACE_RUN.replace_all(&stripped, " ");
    let sanitized = collapsed.trim().to_string();

    debug!("Sanitized input: {}", sanitized.chars().take(50).collect::<String>());
    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_quote_characters() {
        assert_eq!(sanitize(r#"O'Brien; "drop" \ table"#), "OBrien drop table");
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(sanitize("  show\t\tall \n employees  "), "show all employees");
    }

    #[test]
    fn test_empty_and_blank() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize(" ; ' \" "), "");
    }
}
