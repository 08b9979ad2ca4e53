//! Query safety: validation, row limits and prompt-input cleanup.

mod lexer;
pub mod limit;
pub mod sanitize;
pub mod sql_validator;

pub use limit::{enforce_limit, DEFAULT_MAX_LIMIT};
pub use sanitize::sanitize;
pub use sql_validator::{
    InjectionPattern, Rejection, SqlValidator, Verdict, FORBIDDEN_KEYWORDS, MAX_OPERATOR_COUNT, MAX_QUERY_LENGTH,
    MAX_SELECT_COUNT, MAX_TOKEN_COUNT,
};
