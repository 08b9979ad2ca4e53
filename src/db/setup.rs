//! Database bootstrap: create the database, enable pgvector, apply schema and seed data.

use crate::config::Config;
use crate::db::Database;
use crate::embedding::{EmbeddingClient, EmbeddingService};
use crate::error::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::Executor;
use tracing::{info, warn};

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");
const SEED_SQL: &str = include_str!("../../sql/seed_data.sql");

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Create the application database through the maintenance database if it does not exist.
pub async fn create_database(config: &Config) -> Result<()> {
    info!("Checking database '{}'", config.db_name);

    let admin = PgPoolOptions::new()
        .max_connections(1)
        .connect(&config.admin_database_url())
        .await?;

    let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM pg_database WHERE datname = $1")
        .bind(&config.db_name)
        .fetch_optional(&admin)
        .await?;

    if exists.is_some() {
        info!("Database '{}' already exists", config.db_name);
    } else {
        admin
            .execute(format!("CREATE DATABASE {}", quote_identifier(&config.db_name)).as_str())
            .await?;
        info!("Database '{}' created", config.db_name);
    }

    admin.close().await;
    Ok(())
}

pub async fn ensure_pgvector_extension(db: &Database) -> Result<()> {
    let version: String = sqlx::query_scalar("SHOW server_version")
        .fetch_one(db.pool())
        .await?;
    info!("PostgreSQL server version: {}", version);

    db.pool().execute("CREATE EXTENSION IF NOT EXISTS vector").await?;
    info!("pgvector extension enabled");
    Ok(())
}

pub async fn apply_schema(db: &Database) -> Result<()> {
    info!("Applying schema");
    db.pool().execute(SCHEMA_SQL).await?;
    info!("Schema applied");
    Ok(())
}

/// Insert the sample rows unless the database already has departments.
pub async fn seed_sample_data(db: &Database) -> Result<bool> {
    let existing: i64 = sqlx::query_scalar("SELECT count(*) FROM departments")
        .fetch_one(db.pool())
        .await?;
    if existing > 0 {
        info!("Sample data already present | departments={}", existing);
        return Ok(false);
    }

    info!("Seeding sample data");
    db.pool().execute(SEED_SQL).await?;
    info!("Sample data inserted");
    Ok(true)
}

/// Full bootstrap. Embedding failures are logged; the database stays usable for SQL search.
pub async fn run_setup(config: &Config) -> Result<()> {
    info!("Starting database setup");

    create_database(config).await?;

    let db = Database::connect(&config.database_url(), config.query_timeout).await?;
    ensure_pgvector_extension(&db).await?;
    apply_schema(&db).await?;
    seed_sample_data(&db).await?;

    let client = EmbeddingClient::new(
        config.embedding_api_key.clone(),
        config.embedding_base_url.clone(),
        config.embedding_model.clone(),
        config.embedding_dimensions,
    );
    let embeddings = EmbeddingService::new(client, db);
    if let Err(e) = embeddings.populate_all_embeddings().await {
        warn!("Embedding generation failed, semantic search will return no rows: {}", e);
    }

    info!("Database setup complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("nl_search_db"), "\"nl_search_db\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_scripts_cover_all_tables() {
        for table in ["departments", "employees", "products", "orders"] {
            assert!(SCHEMA_SQL.contains(&format!("CREATE TABLE IF NOT EXISTS {}", table)));
            assert!(SEED_SQL.contains(&format!("INSERT INTO {}", table)));
        }
        assert!(SCHEMA_SQL.contains("vector(384)"));
    }
}
