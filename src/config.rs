//! Configuration
//!
//! Reads connection, model and limit settings from the environment (and `.env`).

use crate::error::{Result, SearchError};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info};

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_LLM_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_EMBEDDING_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Clone)]
pub struct Config {
    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
    pub groq_api_key: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub embedding_api_key: String,
    pub embedding_base_url: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub max_result_rows: usize,
    pub query_timeout: Duration,
    pub schema_path: Option<PathBuf>,
    pub debug: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secrets stay out of logs
        f.debug_struct("Config")
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .field("llm_base_url", &self.llm_base_url)
            .field("llm_model", &self.llm_model)
            .field("embedding_base_url", &self.embedding_base_url)
            .field("embedding_model", &self.embedding_model)
            .field("embedding_dimensions", &self.embedding_dimensions)
            .field("max_result_rows", &self.max_result_rows)
            .field("query_timeout", &self.query_timeout)
            .field("schema_path", &self.schema_path)
            .field("debug", &self.debug)
            .finish()
    }
}

impl Config {
    /// Load `.env` (if present) and build the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let embedding_api_key = lookup("EMBEDDING_API_KEY")
            .or_else(|| lookup("OPENAI_API_KEY"))
            .unwrap_or_default();

        let config = Self {
            db_host: var("DB_HOST", "localhost"),
            db_port: parse_var(&lookup, "DB_PORT", 5432)?,
            db_name: var("DB_NAME", "nl_search_db"),
            db_user: var("DB_USER", "postgres"),
            db_password: var("DB_PASSWORD", ""),
            groq_api_key: var("GROQ_API_KEY", ""),
            llm_base_url: var("LLM_BASE_URL", DEFAULT_LLM_BASE_URL),
            llm_model: var("LLM_MODEL", DEFAULT_LLM_MODEL),
            embedding_api_key,
            embedding_base_url: var("EMBEDDING_BASE_URL", DEFAULT_EMBEDDING_BASE_URL),
            embedding_model: var("EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            embedding_dimensions: parse_var(&lookup, "EMBEDDING_DIMENSIONS", 384)?,
            max_result_rows: parse_var(&lookup, "MAX_RESULT_ROWS", crate::validation::DEFAULT_MAX_LIMIT)?,
            query_timeout: Duration::from_secs(parse_var(&lookup, "QUERY_TIMEOUT_SECS", 30)?),
            schema_path: lookup("SCHEMA_PATH").filter(|p| !p.trim().is_empty()).map(PathBuf::from),
            debug: var("DEBUG", "false").eq_ignore_ascii_case("true"),
        };

        debug!(
            "Config initialized | DB_HOST={} | DB_PORT={} | DB_NAME={} | DB_USER={} | DEBUG={}",
            config.db_host, config.db_port, config.db_name, config.db_user, config.debug
        );

        Ok(config)
    }

    /// Connection URL for the application database
    pub fn database_url(&self) -> String {
        self.url_for(&self.db_name)
    }

    /// Connection URL for the maintenance database on the same server
    pub fn admin_database_url(&self) -> String {
        self.url_for("postgres")
    }

    fn url_for(&self, database: &str) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.db_user, self.db_password, self.db_host, self.db_port, database
        )
    }

    /// Check that the settings required to answer questions are present.
    pub fn validate(&self) -> Result<()> {
        info!("Validating configuration");

        if self.groq_api_key.is_empty() {
            error!("GROQ_API_KEY is missing");
            return Err(SearchError::Config("GROQ_API_KEY is required in .env".to_string()));
        }

        if self.db_password.is_empty() {
            error!("DB_PASSWORD is missing");
            return Err(SearchError::Config("DB_PASSWORD is required".to_string()));
        }

        if self.max_result_rows == 0 {
            return Err(SearchError::Config("MAX_RESULT_ROWS must be greater than zero".to_string()));
        }

        info!("Configuration validation successful");
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| SearchError::Config(format!("{} must be a number, got '{}'", key, raw))),
        _ => Ok(default),
    }
}
