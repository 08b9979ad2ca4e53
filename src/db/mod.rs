//! Database module for PostgreSQL connection and bootstrap

pub mod connection;
pub mod setup;

pub use connection::{init_pool, Database, DbPool, SqlParam};
