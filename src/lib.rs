//! Natural-language search over PostgreSQL.
//!
//! Questions become SQL through a language model. Every generated query is
//! checked by [`validation::SqlValidator`] and bounded by
//! [`validation::enforce_limit`] before it reaches the database.

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod export;
pub mod llm;
pub mod logging;
pub mod query_generator;
pub mod schema;
pub mod search;
pub mod validation;

pub use config::Config;
pub use error::{Result, SearchError};
pub use schema::SchemaDescriptor;
pub use search::{SearchResult, SearchService, SearchType};
pub use validation::{enforce_limit, sanitize, SqlValidator, Verdict};
