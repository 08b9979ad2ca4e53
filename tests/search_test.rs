use async_trait::async_trait;
use nl_search::db::Database;
use nl_search::embedding::{EmbeddingClient, EmbeddingService};
use nl_search::error::{Result, SearchError};
use nl_search::llm::{CompletionRequest, TextGenerator};
use nl_search::query_generator::QueryGenerator;
use nl_search::schema::SchemaDescriptor;
use nl_search::search::{SearchService, SearchType};
use nl_search::validation::SqlValidator;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Nothing listens here, so any database or embedding call fails fast.
const UNREACHABLE_DB: &str = "postgresql://user:pw@127.0.0.1:1/nl_search_test";
const UNREACHABLE_API: &str = "http://127.0.0.1:1/v1";

/// Always answers with the same text and counts calls.
struct FixedGenerator {
    reply: Option<String>,
    calls: Mutex<usize>,
}

impl FixedGenerator {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            calls: Mutex::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: Mutex::new(0),
        })
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl TextGenerator for FixedGenerator {
    async fn complete(&self, _request: CompletionRequest) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        self.reply
            .clone()
            .ok_or_else(|| SearchError::Llm("model unavailable".to_string()))
    }
}

fn service(llm: Arc<FixedGenerator>) -> SearchService {
    let schema = Arc::new(SchemaDescriptor::default());
    let db = Database::connect_lazy(UNREACHABLE_DB, Duration::from_secs(1)).unwrap();
    let embeddings = EmbeddingService::new(
        EmbeddingClient::new("key".to_string(), UNREACHABLE_API.to_string(), "m".to_string(), 384),
        db.clone(),
    );

    SearchService::new(
        QueryGenerator::new(llm, schema.clone()),
        SqlValidator::new(schema),
        embeddings,
        db,
        1000,
    )
}

#[tokio::test]
async fn test_rejected_sql_is_never_executed() {
    let llm = FixedGenerator::replying("select * from employees; drop table employees");
    let result = service(llm.clone()).search("show employees").await;

    assert_eq!(result.search_type, SearchType::Sql);
    assert!(!result.success);
    assert!(result.results.is_empty());
    assert!(result.error.unwrap().starts_with("Invalid query: Dangerous operation detected: DROP"));
    assert_eq!(
        result.sql_query.as_deref(),
        Some("select * from employees; drop table employees")
    );
    // Generation only; no explanation request after a rejection
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn test_non_select_reports_select_only() {
    let result = service(FixedGenerator::replying("update employees set salary = 0"))
        .sql_search("give everyone a raise")
        .await;

    assert_eq!(result.error.as_deref(), Some("Invalid query: Dangerous operation detected: UPDATE. Only SELECT queries are allowed"));
}

#[tokio::test]
async fn test_generation_failure_is_reported() {
    let result = service(FixedGenerator::failing()).search("top products").await;

    assert!(!result.success);
    assert!(result.sql_query.is_none());
    assert!(result.error.unwrap().contains("model unavailable"));
}

#[tokio::test]
async fn test_semantic_failure_is_reported() {
    let llm = FixedGenerator::replying("unused");
    let result = service(llm.clone()).search("find products similar to laptop").await;

    assert_eq!(result.search_type, SearchType::Semantic);
    assert!(!result.success);
    assert!(result.error.unwrap().starts_with("Semantic search failed"));
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_hybrid_search_always_succeeds() {
    let result = service(FixedGenerator::replying("delete from orders"))
        .hybrid_search("orders like acme")
        .await;

    assert_eq!(result.search_type, SearchType::Hybrid);
    assert!(result.success);
    assert!(result.error.is_none());
    assert!(result.results.is_empty());
    assert_eq!(result.sql_query.as_deref(), Some("delete from orders"));
    assert_eq!(
        result.explanation.as_deref(),
        Some("Hybrid search combining SQL and semantic similarity")
    );
}
