//! Search orchestration
//!
//! Routes a question to SQL generation or vector similarity search and
//! folds every failure into a `SearchResult` instead of an error.

use crate::db::Database;
use crate::embedding::EmbeddingService;
use crate::query_generator::QueryGenerator;
use crate::validation::{enforce_limit, SqlValidator};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn, Instrument};

const SEMANTIC_KEYWORDS: &[&str] = &[
    "similar",
    "like",
    "related to",
    "find products",
    "search for",
    "looking for",
    "type of",
];

const SEMANTIC_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Sql,
    Semantic,
    Hybrid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub success: bool,
    pub results: Vec<Value>,
    pub sql_query: Option<String>,
    pub explanation: Option<String>,
    pub search_type: SearchType,
    pub error: Option<String>,
}

impl SearchResult {
    fn new(search_type: SearchType) -> Self {
        Self {
            success: false,
            results: Vec::new(),
            sql_query: None,
            explanation: None,
            search_type,
            error: None,
        }
    }

    fn failed(mut self, error: String) -> Self {
        self.success = false;
        self.error = Some(error);
        self
    }
}

/// Case-insensitive keyword check for similarity-style questions.
pub fn is_semantic_query(question: &str) -> bool {
    let lower = question.to_lowercase();
    let semantic = SEMANTIC_KEYWORDS.iter().any(|keyword| lower.contains(keyword));
    debug!("Semantic query check for '{}': {}", preview(question), semantic);
    semantic
}

/// SQL rows first, then semantic rows; rows without a usable `id` are dropped and ids appear once.
pub fn merge_results(sql_rows: &[Value], semantic_rows: &[Value]) -> Vec<Value> {
    sql_rows
        .iter()
        .chain(semantic_rows.iter())
        .filter_map(|row| row_id(row).map(|id| (id, row)))
        .unique_by(|(id, _)| id.clone())
        .map(|(_, row)| row.clone())
        .collect()
}

fn row_id(row: &Value) -> Option<String> {
    match row.get("id")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        id => Some(id.to_string()),
    }
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

pub struct SearchService {
    generator: QueryGenerator,
    validator: SqlValidator,
    embeddings: EmbeddingService,
    db: Database,
    max_rows: usize,
}

impl SearchService {
    pub fn new(
        generator: QueryGenerator,
        validator: SqlValidator,
        embeddings: EmbeddingService,
        db: Database,
        max_rows: usize,
    ) -> Self {
        info!("Initializing SearchService | max_rows={}", max_rows);
        Self {
            generator,
            validator,
            embeddings,
            db,
            max_rows,
        }
    }

    pub fn generator(&self) -> &QueryGenerator {
        &self.generator
    }

    pub async fn search(&self, question: &str) -> SearchResult {
        let span = tracing::info_span!("search", request_id = %uuid::Uuid::new_v4());
        async {
            info!("Received search query: {}", preview(question));
            if is_semantic_query(question) {
                info!("Performing semantic search");
                self.semantic_search(question).await
            } else {
                info!("Performing SQL-based search");
                self.sql_search(question).await
            }
        }
        .instrument(span)
        .await
    }

    pub async fn sql_search(&self, question: &str) -> SearchResult {
        info!("Executing SQL search for query: {}", preview(question));
        let mut result = SearchResult::new(SearchType::Sql);

        let sql = match self.generator.generate_sql(question).await {
            Ok(sql) => sql,
            Err(e) => {
                error!("SQL generation failed: {}", e);
                return result.failed(format!("Query generation failed: {}", e));
            }
        };
        result.sql_query = Some(sql.clone());

        let verdict = self.validator.validate(&sql);
        if let Some(reason) = verdict.reason() {
            warn!("SQL validation failed: {}", reason);
            return result.failed(format!("Invalid query: {}", reason));
        }

        let sql = enforce_limit(&sql, self.max_rows);
        result.sql_query = Some(sql.clone());

        match self.db.fetch_read_only(&sql).await {
            Ok(rows) => {
                info!("SQL query executed successfully | rows={}", rows.len());
                result.results = rows;
                result.success = true;
            }
            Err(e) => {
                error!("SQL search failed: {}", e);
                return result.failed(format!("Query execution failed: {}", e));
            }
        }

        result.explanation = Some(self.generator.explain_query(&sql).await);
        result
    }

    pub async fn semantic_search(&self, question: &str) -> SearchResult {
        info!("Executing semantic search for query: {}", preview(question));
        let mut result = SearchResult::new(SearchType::Semantic);
        result.explanation = Some(format!("Performing semantic search for: {}", question));

        let lower = question.to_lowercase();
        let (rows, explanation) = if lower.contains("product") {
            (
                self.embeddings.search_similar_products(question, SEMANTIC_LIMIT).await,
                "Searching for similar products using AI embeddings",
            )
        } else if lower.contains("employee") {
            (
                self.embeddings.search_similar_employees(question, SEMANTIC_LIMIT).await,
                "Searching for similar employees using AI embeddings",
            )
        } else {
            (
                self.embeddings.search_similar_products(question, SEMANTIC_LIMIT).await,
                "Performing semantic search across products",
            )
        };

        match rows {
            Ok(rows) => {
                info!("Semantic search completed | results={}", rows.len());
                result.explanation = Some(explanation.to_string());
                result.results = rows;
                result.success = true;
                result
            }
            Err(e) => {
                error!("Semantic search failed: {}", e);
                result.failed(format!("Semantic search failed: {}", e))
            }
        }
    }

    /// Run SQL and semantic search together and merge their rows.
    pub async fn hybrid_search(&self, question: &str) -> SearchResult {
        let span = tracing::info_span!("hybrid_search", request_id = %uuid::Uuid::new_v4());
        async {
            info!("Performing hybrid search for query: {}", preview(question));
            let (sql_result, semantic_result) =
                tokio::join!(self.sql_search(question), self.semantic_search(question));

            if let Some(e) = &sql_result.error {
                warn!("SQL half of hybrid search failed: {}", e);
            }
            if let Some(e) = &semantic_result.error {
                warn!("Semantic half of hybrid search failed: {}", e);
            }

            let results = merge_results(&sql_result.results, &semantic_result.results);
            info!("Hybrid search completed | combined results={}", results.len());

            SearchResult {
                success: true,
                results,
                sql_query: sql_result.sql_query,
                explanation: Some("Hybrid search combining SQL and semantic similarity".to_string()),
                search_type: SearchType::Hybrid,
                error: None,
            }
        }
        .instrument(span)
        .await
    }
}
