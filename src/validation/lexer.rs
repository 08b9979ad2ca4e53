//! Token helpers shared by the validator and limit enforcement.

use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer, TokenizerError, Whitespace};

/// Tokenize `sql` and drop plain whitespace. Comments are kept as tokens.
pub(crate) fn significant_tokens(sql: &str) -> Result<Vec<Token>, TokenizerError> {
    let dialect = PostgreSqlDialect {};
    let tokens = Tokenizer::new(&dialect, sql).tokenize()?;

    Ok(tokens
        .into_iter()
        .filter(|token| {
            !matches!(
                token,
                Token::Whitespace(Whitespace::Space | Whitespace::Newline | Whitespace::Tab)
            )
        })
        .collect())
}

/// Lowercased text of an unquoted word, `None` for anything else.
pub(crate) fn bare_word(token: &Token) -> Option<String> {
    match token {
        Token::Word(word) if word.quote_style.is_none() => Some(word.value.to_ascii_lowercase()),
        _ => None,
    }
}

/// Lowercased text of any word, quoted identifiers included.
pub(crate) fn any_word(token: &Token) -> Option<String> {
    match token {
        Token::Word(word) => Some(word.value.to_ascii_lowercase()),
        _ => None,
    }
}

pub(crate) fn is_keyword(token: &Token, keyword: &str) -> bool {
    matches!(token, Token::Word(word) if word.quote_style.is_none() && word.value.eq_ignore_ascii_case(keyword))
}

/// Keyword operators that chain into nested expressions.
const WORD_OPERATORS: &[&str] = &["and", "or", "not", "is", "like", "ilike", "between", "in", "collate", "at"];

/// Infix, prefix and cast operators. `*` counts too, projection or not.
pub(crate) fn is_operator(token: &Token) -> bool {
    match token {
        Token::Eq
        | Token::DoubleEq
        | Token::Neq
        | Token::Lt
        | Token::Gt
        | Token::LtEq
        | Token::GtEq
        | Token::Spaceship
        | Token::Plus
        | Token::Minus
        | Token::Mul
        | Token::Div
        | Token::Mod
        | Token::StringConcat
        | Token::Caret
        | Token::Ampersand
        | Token::Pipe
        | Token::Tilde
        | Token::ShiftLeft
        | Token::ShiftRight
        | Token::DoubleColon
        | Token::Arrow
        | Token::LongArrow
        | Token::HashArrow
        | Token::HashLongArrow => true,
        Token::Word(_) => WORD_OPERATORS.iter().any(|op| is_keyword(token, op)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_dropped_comments_kept() {
        let tokens = significant_tokens("select  id\n from t -- note").unwrap();
        assert!(is_keyword(&tokens[0], "select"));
        assert_eq!(bare_word(&tokens[1]).as_deref(), Some("id"));
        assert!(is_keyword(&tokens[2], "FROM"));
        assert!(matches!(
            tokens.last(),
            Some(Token::Whitespace(Whitespace::SingleLineComment { .. }))
        ));
    }

    #[test]
    fn test_quoted_identifier_is_not_bare() {
        let tokens = significant_tokens(r#"select "drop" from t"#).unwrap();
        assert_eq!(bare_word(&tokens[1]), None);
        assert_eq!(any_word(&tokens[1]).as_deref(), Some("drop"));
    }

    #[test]
    fn test_string_literal_is_not_a_word() {
        let tokens = significant_tokens("select 'delete me'").unwrap();
        assert!(matches!(tokens[1], Token::SingleQuotedString(_)));
    }

    #[test]
    fn test_operator_tokens() {
        let tokens = significant_tokens("select a + b::int from t where x = 1 and y -> 'k' is not null").unwrap();
        let operators = tokens.iter().filter(|t| is_operator(t)).count();
        // + :: = and -> is not
        assert_eq!(operators, 7);
        assert!(!is_operator(&tokens[1]));
    }

    #[test]
    fn test_unterminated_string_fails() {
        assert!(significant_tokens("select 'oops").is_err());
    }
}
