use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nl_search::config::Config;
use nl_search::db::{setup, Database};
use nl_search::embedding::{EmbeddingClient, EmbeddingService};
use nl_search::llm::{LlmClient, TextGenerator};
use nl_search::query_generator::QueryGenerator;
use nl_search::schema::SchemaDescriptor;
use nl_search::search::{SearchResult, SearchService};
use nl_search::validation::{enforce_limit, sanitize, SqlValidator};
use nl_search::{export, logging};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "nl-search")]
#[command(about = "Natural language search over PostgreSQL with validated, read-only SQL")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question in natural language
    Search {
        question: String,

        /// Combine SQL and semantic results
        #[arg(long)]
        hybrid: bool,

        /// Export rows to CSV (default file name when no path is given)
        #[arg(long, value_name = "PATH", num_args = 0..=1)]
        csv: Option<Option<PathBuf>>,

        /// Also suggest related questions
        #[arg(long)]
        suggest: bool,
    },
    /// Check a SQL query against the safety rules without running it
    Validate {
        sql: String,

        /// Row cap applied to accepted queries (default: MAX_RESULT_ROWS)
        #[arg(long)]
        max_limit: Option<usize>,
    },
    /// Clean free text the way prompt inputs are cleaned
    Sanitize { text: String },
    /// Create the database, schema, sample data and embeddings
    Setup,
    /// Generate missing embeddings
    Embed,
    /// Validate configuration and test the database connection
    Check,
}

fn load_schema(config: &Config) -> Result<Arc<SchemaDescriptor>> {
    let schema = match &config.schema_path {
        Some(path) => SchemaDescriptor::load(path)
            .with_context(|| format!("Failed to load schema from {}", path.display()))?,
        None => SchemaDescriptor::default(),
    };
    Ok(Arc::new(schema))
}

fn embedding_client(config: &Config) -> EmbeddingClient {
    EmbeddingClient::new(
        config.embedding_api_key.clone(),
        config.embedding_base_url.clone(),
        config.embedding_model.clone(),
        config.embedding_dimensions,
    )
}

async fn build_service(config: &Config) -> Result<SearchService> {
    let schema = load_schema(config)?;
    let llm: Arc<dyn TextGenerator> = Arc::new(LlmClient::new(
        config.groq_api_key.clone(),
        config.llm_model.clone(),
        config.llm_base_url.clone(),
    ));

    let db = Database::connect(&config.database_url(), config.query_timeout).await?;
    let embeddings = EmbeddingService::new(embedding_client(config), db.clone());

    Ok(SearchService::new(
        QueryGenerator::new(llm, schema.clone()),
        SqlValidator::new(schema),
        embeddings,
        db,
        config.max_result_rows,
    ))
}

fn print_result(result: &SearchResult) {
    if let Some(explanation) = &result.explanation {
        println!("{}\n", explanation);
    }
    if let Some(sql) = &result.sql_query {
        println!("SQL: {}\n", sql);
    }
    if let Some(e) = &result.error {
        println!("Error: {}", e);
        return;
    }
    if result.results.is_empty() {
        println!("No results found");
    } else {
        println!("{}", export::render_table(&result.results));
        println!("\n{} row(s)", result.results.len());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env()?;
    logging::init(config.debug);

    match args.command {
        Commands::Search {
            question,
            hybrid,
            csv,
            suggest,
        } => {
            config.validate()?;
            let service = build_service(&config).await?;

            let result = if hybrid {
                service.hybrid_search(&question).await
            } else {
                service.search(&question).await
            };
            print_result(&result);

            if let Some(path) = csv {
                if result.results.is_empty() {
                    info!("Nothing to export");
                } else {
                    let path = path.unwrap_or_else(|| PathBuf::from(export::default_csv_name()));
                    let rows = export::write_csv(&result.results, &path)?;
                    println!("Exported {} row(s) to {}", rows, path.display());
                }
            }

            if suggest {
                let suggestions = service.generator().suggest_related_queries(&question).await;
                if !suggestions.is_empty() {
                    println!("\nRelated questions:");
                    for suggestion in suggestions {
                        println!("  - {}", suggestion);
                    }
                }
            }

            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Validate { sql, max_limit } => {
            let validator = SqlValidator::new(load_schema(&config)?);
            let verdict = validator.validate(&sql);
            println!("{}", serde_json::to_string_pretty(&verdict)?);

            if !verdict.is_valid() {
                std::process::exit(1);
            }
            let max_limit = max_limit.unwrap_or(config.max_result_rows);
            println!("{}", enforce_limit(&sql, max_limit));
        }
        Commands::Sanitize { text } => {
            println!("{}", sanitize(&text));
        }
        Commands::Setup => {
            setup::run_setup(&config).await?;
            println!("Database setup complete");
        }
        Commands::Embed => {
            let db = Database::connect(&config.database_url(), config.query_timeout).await?;
            let updated = EmbeddingService::new(embedding_client(&config), db)
                .populate_all_embeddings()
                .await?;
            println!("Generated {} embedding(s)", updated);
        }
        Commands::Check => {
            config.validate()?;
            info!("Configuration: {:?}", config);
            let db = Database::connect(&config.database_url(), config.query_timeout).await?;
            if db.test_connection().await {
                println!("Configuration and database connection OK");
            } else {
                error!("Database connection test failed");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
