//! Database connection management using sqlx

use crate::error::Result;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, error, info};

pub type DbPool = PgPool;

const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Positional parameter for internally built queries.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
}

fn pool_options() -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
}

/// Initialize the database connection pool
pub async fn init_pool(database_url: &str) -> std::result::Result<PgPool, sqlx::Error> {
    let pool = pool_options().connect(database_url).await?;

    // Test the connection
    sqlx::query("SELECT 1").execute(&pool).await?;

    Ok(pool)
}

/// Wrap a query so every row comes back as one JSON object.
fn as_json_rows(sql: &str) -> String {
    let body = sql.trim().trim_end_matches(';').trim_end();
    format!("SELECT row_to_json(q) FROM ({}) AS q", body)
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    query_timeout: Duration,
}

impl Database {
    /// Connect and probe the server.
    pub async fn connect(database_url: &str, query_timeout: Duration) -> Result<Self> {
        info!("Creating database connection");
        let pool = init_pool(database_url).await.map_err(|e| {
            error!("Database connection failed: {}", e);
            e
        })?;
        info!("Database connection established successfully");
        Ok(Self { pool, query_timeout })
    }

    /// Build a pool without connecting; the first query opens a connection.
    pub fn connect_lazy(database_url: &str, query_timeout: Duration) -> Result<Self> {
        let pool = pool_options().connect_lazy(database_url)?;
        Ok(Self { pool, query_timeout })
    }

    pub fn from_pool(pool: PgPool, query_timeout: Duration) -> Self {
        Self { pool, query_timeout }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Run an accepted, untrusted query in a read-only transaction with a statement timeout.
    pub async fn fetch_read_only(&self, sql: &str) -> Result<Vec<Value>> {
        debug!("Executing read-only query | timeout={:?}", self.query_timeout);

        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY").execute(&mut *tx).await?;
        sqlx::query(&format!(
            "SET LOCAL statement_timeout = {}",
            self.query_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;

        let rows: Vec<Value> = sqlx::query_scalar(&as_json_rows(sql))
            .fetch_all(&mut *tx)
            .await?;

        tx.rollback().await?;

        info!("Query executed successfully | rows={}", rows.len());
        Ok(rows)
    }

    /// Run an internally built, parameterised query and return JSON rows.
    pub async fn fetch_json(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Value>> {
        debug!("Executing query | params={}", params.len());

        let wrapped = as_json_rows(sql);
        let mut query = sqlx::query_scalar::<_, Value>(&wrapped);
        for param in params {
            query = match param {
                SqlParam::Text(text) => query.bind(text.clone()),
                SqlParam::Int(value) => query.bind(*value),
            };
        }

        let rows = query.fetch_all(&self.pool).await?;
        info!("Query executed successfully | rows={}", rows.len());
        Ok(rows)
    }

    /// Execute one statement per parameter set inside a single transaction.
    pub async fn execute_many(&self, sql: &str, rows: &[Vec<SqlParam>]) -> Result<u64> {
        info!("Executing batch query | rows={}", rows.len());

        let mut tx = self.pool.begin().await?;
        let mut affected = 0;
        for params in rows {
            let mut query = sqlx::query(sql);
            for param in params {
                query = match param {
                    SqlParam::Text(text) => query.bind(text.clone()),
                    SqlParam::Int(value) => query.bind(*value),
                };
            }
            affected += query.execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        info!("Batch query executed successfully");
        Ok(affected)
    }

    pub async fn test_connection(&self) -> bool {
        info!("Testing database connection");
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => {
                info!("Database connection test successful");
                true
            }
            Err(e) => {
                error!("Database connection test failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_json_rows_strips_terminator() {
        assert_eq!(
            as_json_rows("select * from products LIMIT 5; "),
            "SELECT row_to_json(q) FROM (select * from products LIMIT 5) AS q"
        );
    }

    #[tokio::test]
    async fn test_connect_lazy_does_not_touch_network() {
        let db = Database::connect_lazy("postgresql://user:pw@127.0.0.1:1/none", Duration::from_secs(1));
        assert!(db.is_ok());
    }

    #[tokio::test]
    async fn test_connect_lazy_rejects_bad_url() {
        assert!(Database::connect_lazy("not a url", Duration::from_secs(1)).is_err());
    }
}
