//! SQL Safety Validator
//!
//! Static gate between model-generated SQL and the database. A candidate must be a
//! single, bounded SELECT over known tables; anything else is rejected with a reason.
//!
//! Layers run in order and the first failure wins:
//! 1. empty / non-string input, then size caps (bytes, tokens, operators)
//! 2. forbidden verbs (mutating, DDL, DCL)
//! 3. statement must start with SELECT
//! 4. injection fragments (stacked verbs, UNION SELECT, comments, `xp_` / `sp_`)
//! 5. at most [`MAX_SELECT_COUNT`] SELECT keywords
//! 6. exactly one parsed statement
//! 7. every referenced relation is a known table or alias
//!
//! The size caps run before anything is parsed. sqlparser builds an operator
//! chain as one nested node per operator, and both visiting and dropping that
//! tree recurse, so expression depth has to be bounded up front.
//!
//! Lexical layers work on sqlparser tokens, so words inside string literals and
//! comments never count as keywords. Table references come from the parsed AST.

use super::lexer::{any_word, bare_word, is_keyword, is_operator, significant_tokens};
use crate::schema::SchemaDescriptor;
use serde::Serialize;
use sqlparser::ast::{visit_relations, Query, SetExpr, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Whitespace};
use std::ops::ControlFlow;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Mutating, DDL and DCL verbs that may not appear anywhere in a candidate.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "drop", "delete", "truncate", "alter", "create", "insert", "update", "grant", "revoke",
    "exec", "execute", "shutdown", "restore", "backup",
];

/// Ceiling on SELECT keywords (outer query plus nested subqueries).
pub const MAX_SELECT_COUNT: usize = 5;

/// Longest candidate, in bytes, that is tokenized at all.
pub const MAX_QUERY_LENGTH: usize = 16 * 1024;

/// Ceiling on significant tokens.
pub const MAX_TOKEN_COUNT: usize = 1024;

/// Ceiling on operator tokens; bounds the depth of parsed expressions.
pub const MAX_OPERATOR_COUNT: usize = 128;

const STACKED_VERB_PREFIXES: &[&str] = &["drop", "delete", "insert", "update", "exec"];
const PRIVILEGED_PREFIXES: &[&str] = &["xp_", "sp_"];
const LOG_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionPattern {
    /// `;` followed by a mutating verb or `exec`
    StackedStatement,
    /// `UNION [ALL | DISTINCT] SELECT`
    UnionSelect,
    LineComment,
    BlockComment,
    /// `xp_` / `sp_` stored procedure names
    PrivilegedProcedure,
}

/// Why a candidate was refused. `Display` is the user-facing reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("Query is empty or invalid")]
    Empty,

    #[error("Dangerous operation detected: {0}. Only SELECT queries are allowed")]
    DangerousKeyword(String),

    #[error("Only SELECT queries are allowed")]
    NotSelect,

    #[error("Potential SQL injection detected")]
    Injection(InjectionPattern),

    #[error("Invalid SQL syntax: {0}")]
    Unlexable(String),

    #[error("Invalid SQL syntax")]
    NoStatement,

    #[error("Multiple statements not allowed")]
    MultipleStatements(usize),

    #[error("SQL parsing error: {0}")]
    Parse(String),

    #[error("Query too complex (too many subqueries)")]
    TooComplex(usize),

    #[error("Query too complex (too long)")]
    TooLong(usize),

    #[error("Query too complex (too many tokens)")]
    TooManyTokens(usize),

    #[error("Query too complex (too many operators)")]
    TooManyOperators(usize),

    #[error("Unknown table referenced: {0}")]
    UnknownTable(String),
}

/// Accept/reject decision. `reason` is present exactly when the query is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    is_valid: bool,
    reason: Option<String>,
}

impl Verdict {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.into()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

impl From<Result<(), Rejection>> for Verdict {
    fn from(result: Result<(), Rejection>) -> Self {
        match result {
            Ok(()) => Verdict::valid(),
            Err(rejection) => Verdict::invalid(rejection.to_string()),
        }
    }
}

/// Validates candidate SQL against a fixed schema allow-list.
///
/// Holds no mutable state; share one instance across tasks.
#[derive(Debug, Clone)]
pub struct SqlValidator {
    schema: Arc<SchemaDescriptor>,
}

impl SqlValidator {
    pub fn new(schema: Arc<SchemaDescriptor>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    /// Validate a candidate query. Never panics and never returns an error.
    pub fn validate(&self, sql: &str) -> Verdict {
        info!("Validating SQL query: {}", preview(sql));

        let verdict = Verdict::from(self.check(sql));
        match verdict.reason() {
            Some(reason) => warn!("SQL query rejected: {}", reason),
            None => info!("SQL query validation passed"),
        }
        verdict
    }

    /// Validate an untyped value (e.g. a JSON request field). Non-strings are rejected.
    pub fn validate_value(&self, value: &serde_json::Value) -> Verdict {
        match value.as_str() {
            Some(sql) => self.validate(sql),
            None => {
                warn!("Query is not a string: {}", value);
                Verdict::invalid(Rejection::Empty.to_string())
            }
        }
    }

    /// Run every layer, stopping at the first rejection.
    pub fn check(&self, sql: &str) -> Result<(), Rejection> {
        check_not_empty(sql)?;
        check_length(sql)?;

        let tokens = significant_tokens(sql).map_err(|e| Rejection::Unlexable(e.to_string()))?;
        check_token_budget(&tokens)?;

        check_forbidden_keywords(&tokens)?;
        check_starts_with_select(&tokens)?;
        check_injection_patterns(&tokens)?;
        check_complexity(&tokens)?;
        let statement = parse_single_statement(sql)?;
        self.check_tables(&statement)
    }

    fn check_tables(&self, statement: &Statement) -> Result<(), Rejection> {
        let outcome = visit_relations(statement, |relation| {
            // PostgreSQL folds unquoted names only; "Employees" is a different relation
            let quoted_with_case = relation
                .0
                .iter()
                .any(|ident| ident.quote_style.is_some() && ident.value != ident.value.to_lowercase());
            if quoted_with_case {
                return ControlFlow::Break(relation.to_string());
            }

            let name = relation
                .0
                .iter()
                .map(|ident| ident.value.to_lowercase())
                .collect::<Vec<_>>()
                .join(".");

            if self.schema.is_known(&name) {
                ControlFlow::Continue(())
            } else {
                ControlFlow::Break(name)
            }
        });

        match outcome {
            ControlFlow::Break(name) => Err(Rejection::UnknownTable(name)),
            ControlFlow::Continue(()) => Ok(()),
        }
    }
}

fn preview(sql: &str) -> String {
    if sql.is_empty() {
        return "Empty query".to_string();
    }
    sql.chars().take(LOG_PREVIEW_CHARS).collect()
}

fn check_not_empty(sql: &str) -> Result<(), Rejection> {
    if sql.trim().is_empty() {
        return Err(Rejection::Empty);
    }
    Ok(())
}

fn check_length(sql: &str) -> Result<(), Rejection> {
    if sql.len() > MAX_QUERY_LENGTH {
        return Err(Rejection::TooLong(sql.len()));
    }
    Ok(())
}

fn check_token_budget(tokens: &[Token]) -> Result<(), Rejection> {
    if tokens.len() > MAX_TOKEN_COUNT {
        return Err(Rejection::TooManyTokens(tokens.len()));
    }

    let operators = tokens.iter().filter(|t| is_operator(t)).count();
    if operators > MAX_OPERATOR_COUNT {
        return Err(Rejection::TooManyOperators(operators));
    }
    Ok(())
}

fn check_forbidden_keywords(tokens: &[Token]) -> Result<(), Rejection> {
    let words: Vec<String> = tokens.iter().filter_map(bare_word).collect();

    // Keyword list order decides which verb is reported
    for keyword in FORBIDDEN_KEYWORDS {
        if words.iter().any(|w| w.as_str() == *keyword) {
            return Err(Rejection::DangerousKeyword(keyword.to_uppercase()));
        }
    }
    Ok(())
}

fn check_starts_with_select(tokens: &[Token]) -> Result<(), Rejection> {
    match tokens.first() {
        Some(first) if is_keyword(first, "select") => Ok(()),
        _ => Err(Rejection::NotSelect),
    }
}

fn check_injection_patterns(tokens: &[Token]) -> Result<(), Rejection> {
    for (idx, token) in tokens.iter().enumerate() {
        let next = tokens.get(idx + 1);

        match token {
            Token::SemiColon => {
                if let Some(verb) = next.and_then(bare_word) {
                    if STACKED_VERB_PREFIXES.iter().any(|p| verb.starts_with(p)) {
                        return Err(Rejection::Injection(InjectionPattern::StackedStatement));
                    }
                }
            }
            Token::Whitespace(Whitespace::SingleLineComment { .. }) => {
                return Err(Rejection::Injection(InjectionPattern::LineComment));
            }
            Token::Whitespace(Whitespace::MultiLineComment(_)) => {
                return Err(Rejection::Injection(InjectionPattern::BlockComment));
            }
            Token::Word(_) => {
                if is_keyword(token, "union") && is_union_select(&tokens[idx + 1..]) {
                    return Err(Rejection::Injection(InjectionPattern::UnionSelect));
                }
                if let Some(word) = any_word(token) {
                    if PRIVILEGED_PREFIXES.iter().any(|p| word.starts_with(p)) {
                        return Err(Rejection::Injection(InjectionPattern::PrivilegedProcedure));
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// `rest` starts right after a UNION keyword.
fn is_union_select(rest: &[Token]) -> bool {
    let mut iter = rest.iter().skip_while(|t| is_keyword(t, "all") || is_keyword(t, "distinct"));
    match iter.next() {
        Some(token) => is_keyword(token, "select") || matches!(token, Token::LParen),
        None => false,
    }
}

fn parse_single_statement(sql: &str) -> Result<Statement, Rejection> {
    let dialect = PostgreSqlDialect {};
    let mut statements = Parser::parse_sql(&dialect, sql).map_err(|e| Rejection::Parse(e.to_string()))?;

    match statements.len() {
        0 => return Err(Rejection::NoStatement),
        1 => {}
        n => return Err(Rejection::MultipleStatements(n)),
    }

    let statement = statements.remove(0);
    match &statement {
        Statement::Query(query) if !selects_into(query) => Ok(statement),
        _ => Err(Rejection::NotSelect),
    }
}

/// `SELECT ... INTO new_table` creates a table in PostgreSQL.
fn selects_into(query: &Query) -> bool {
    fn body_selects_into(body: &SetExpr) -> bool {
        match body {
            SetExpr::Select(select) => select.into.is_some(),
            SetExpr::Query(query) => selects_into(query),
            SetExpr::SetOperation { left, right, .. } => body_selects_into(left) || body_selects_into(right),
            _ => false,
        }
    }
    body_selects_into(&query.body)
}

fn check_complexity(tokens: &[Token]) -> Result<(), Rejection> {
    let selects = tokens.iter().filter(|t| is_keyword(t, "select")).count();
    if selects > MAX_SELECT_COUNT {
        return Err(Rejection::TooComplex(selects));
    }
    Ok(())
}
