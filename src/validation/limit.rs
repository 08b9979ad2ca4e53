//! Row limit enforcement for accepted queries.

use super::lexer::{is_keyword, significant_tokens};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use sqlparser::tokenizer::{Token, Whitespace};
use tracing::{debug, info};

/// Row cap applied when the caller does not choose one.
pub const DEFAULT_MAX_LIMIT: usize = 1000;

lazy_static! {
    static ref LIMIT_WORD: Regex = Regex::new(r"(?i)\blimit\b").unwrap();
    static ref LIMIT_CLAUSE: Regex = Regex::new(r"(?i)\blimit\s+(\d+|all|null)\b").unwrap();
}

/// Bound the number of rows a query can return.
///
/// - every `LIMIT n` with `n > max_limit` (and `LIMIT ALL` / `LIMIT NULL`) becomes `LIMIT max_limit`
/// - a query with no top-level LIMIT gets ` LIMIT max_limit` appended
/// - a top-level LIMIT whose argument is not a plain integer, or a top-level
///   FETCH, is wrapped as `SELECT * FROM (...) AS bounded LIMIT max_limit`
/// - anything else is returned unchanged
///
/// Idempotent: `enforce_limit(&enforce_limit(q, n), n) == enforce_limit(q, n)`.
pub fn enforce_limit(sql: &str, max_limit: usize) -> String {
    debug!("Validating LIMIT clause for query");

    let clamped = LIMIT_CLAUSE.replace_all(sql, |caps: &Captures| {
        // Anything that does not fit in u128 is certainly too large
        let too_large = caps[1].parse::<u128>().map_or(true, |n| n > max_limit as u128);
        if too_large {
            info!("Limit {} exceeds max, replacing with {}", &caps[1], max_limit);
            format!("LIMIT {}", max_limit)
        } else {
            caps[0].to_string()
        }
    });

    match scan_limit(&clamped) {
        LimitScan::TopLevel => clamped.into_owned(),
        LimitScan::Missing { trailing_line_comment } => {
            info!("No LIMIT found, adding default LIMIT {}", max_limit);
            append_limit(&clamped, max_limit, trailing_line_comment)
        }
        LimitScan::Unbounded { trailing_line_comment } => {
            info!("LIMIT argument is not a plain integer, wrapping with LIMIT {}", max_limit);
            wrap_limit(&clamped, max_limit, trailing_line_comment)
        }
    }
}

enum LimitScan {
    /// Top-level `LIMIT <integer>`
    TopLevel,
    Missing { trailing_line_comment: bool },
    /// Top-level LIMIT with an expression argument, or a top-level FETCH
    Unbounded { trailing_line_comment: bool },
}

fn scan_limit(sql: &str) -> LimitScan {
    let tokens = match significant_tokens(sql) {
        Ok(tokens) => tokens,
        // Text we cannot lex is judged by a plain word search
        Err(_) if LIMIT_WORD.is_match(sql) => return LimitScan::TopLevel,
        Err(_) => {
            return LimitScan::Missing {
                trailing_line_comment: false,
            }
        }
    };

    let trailing_line_comment = matches!(
        tokens.last(),
        Some(Token::Whitespace(Whitespace::SingleLineComment { .. }))
    );

    let mut depth = 0usize;
    for (idx, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            _ if depth == 0 && is_keyword(token, "limit") => {
                return if is_plain_count(&tokens[idx + 1..]) {
                    LimitScan::TopLevel
                } else {
                    LimitScan::Unbounded { trailing_line_comment }
                };
            }
            _ if depth == 0 && is_keyword(token, "fetch") => {
                return LimitScan::Unbounded { trailing_line_comment };
            }
            _ => {}
        }
    }

    LimitScan::Missing { trailing_line_comment }
}

/// `rest` starts right after LIMIT: one integer, then the end of the clause.
fn is_plain_count(rest: &[Token]) -> bool {
    match rest {
        [Token::Number(..)] => true,
        [Token::Number(..), next, ..] => {
            matches!(next, Token::SemiColon | Token::RParen | Token::Whitespace(_))
                || ["offset", "for"].iter().any(|kw| is_keyword(next, kw))
        }
        _ => false,
    }
}

fn wrap_limit(sql: &str, max_limit: usize, trailing_line_comment: bool) -> String {
    let body = sql.trim();
    let (body, terminator) = match body.strip_suffix(';') {
        Some(rest) if !trailing_line_comment => (rest.trim_end(), ";"),
        _ => (body, ""),
    };
    let close = if trailing_line_comment { "\n)" } else { ")" };

    format!(
        "SELECT * FROM ({}{} AS bounded LIMIT {}{}",
        body, close, max_limit, terminator
    )
}

fn append_limit(sql: &str, max_limit: usize, trailing_line_comment: bool) -> String {
    let body = sql.trim_end();

    if trailing_line_comment {
        return format!("{}\nLIMIT {}", body, max_limit);
    }

    match body.strip_suffix(';') {
        Some(rest) => format!("{} LIMIT {};", rest.trim_end(), max_limit),
        None => format!("{} LIMIT {}", body, max_limit),
    }
}
