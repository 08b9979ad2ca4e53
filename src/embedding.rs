//! Embedding Service
//!
//! Generates vector embeddings through an OpenAI-compatible embeddings API,
//! stores them in pgvector columns and answers similarity searches.

use crate::db::{Database, SqlParam};
use crate::error::{Result, SearchError};
use serde_json::Value;
use tracing::{debug, info, warn};

pub type Embedding = Vec<f32>;

/// Embedding client for `POST {base_url}/embeddings`
#[derive(Clone)]
pub struct EmbeddingClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
}

impl EmbeddingClient {
    pub fn new(api_key: String, base_url: String, model: String, dimensions: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn request_body(&self, inputs: &[String]) -> Value {
        serde_json::json!({
            "model": self.model,
            "input": inputs,
            "dimensions": self.dimensions,
        })
    }

    /// Embed every input, returned in input order.
    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Embedding>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(inputs))
            .send()
            .await
            .map_err(|e| SearchError::Embedding(format!("Embedding API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SearchError::Embedding(format!(
                "Embedding API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| SearchError::Embedding(format!("Failed to parse embedding response: {}", e)))?;

        let embeddings = parse_embeddings(&response_json)?;
        if embeddings.len() != inputs.len() {
            return Err(SearchError::Embedding(format!(
                "Expected {} embeddings, got {}",
                inputs.len(),
                embeddings.len()
            )));
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimensions) {
            return Err(SearchError::Embedding(format!(
                "Expected {} dimensions, got {}",
                self.dimensions,
                bad.len()
            )));
        }

        Ok(embeddings)
    }
}

/// Extract `data[*].embedding`, ordered by each item's `index`.
fn parse_embeddings(response: &Value) -> Result<Vec<Embedding>> {
    let data = response
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| SearchError::Embedding("No embedding data in response".to_string()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding: Embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| SearchError::Embedding("No embedding vector in response".to_string()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();
        indexed.push((index, embedding));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, embedding)| embedding).collect())
}

/// pgvector text form: `[0.1,0.2,0.3]`
pub fn to_vector_literal(embedding: &[f32]) -> String {
    let parts: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// A text column and the vector column that embeds it.
struct EmbeddedColumn {
    label: &'static str,
    table: &'static str,
    text_column: &'static str,
    embedding_column: &'static str,
}

const EMPLOYEE_NAMES: EmbeddedColumn = EmbeddedColumn {
    label: "employee",
    table: "employees",
    text_column: "name",
    embedding_column: "name_embedding",
};

const PRODUCT_NAMES: EmbeddedColumn = EmbeddedColumn {
    label: "product",
    table: "products",
    text_column: "name",
    embedding_column: "name_embedding",
};

const ORDER_CUSTOMERS: EmbeddedColumn = EmbeddedColumn {
    label: "order",
    table: "orders",
    text_column: "customer_name",
    embedding_column: "customer_name_embedding",
};

#[derive(sqlx::FromRow)]
struct PendingRow {
    id: i32,
    text: String,
}

pub struct EmbeddingService {
    client: EmbeddingClient,
    db: Database,
}

impl EmbeddingService {
    pub fn new(client: EmbeddingClient, db: Database) -> Self {
        info!("Initializing EmbeddingService");
        Self { client, db }
    }

    /// Embedding for one text; `None` for empty input.
    pub async fn generate_embedding(&self, text: &str) -> Result<Option<Embedding>> {
        if text.trim().is_empty() {
            warn!("Empty text received for embedding");
            return Ok(None);
        }

        let mut embeddings = self.client.embed(&[text.to_string()]).await?;
        debug!("Generated embedding for text: {}", text.chars().take(50).collect::<String>());
        Ok(embeddings.pop())
    }

    pub async fn generate_embeddings_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        info!("Generating embeddings batch | size={}", texts.len());
        let embeddings = self.client.embed(texts).await?;
        info!("Batch embeddings generated successfully");
        Ok(embeddings)
    }

    async fn populate(&self, column: &EmbeddedColumn) -> Result<u64> {
        info!("Populating {} embeddings", column.label);

        let select = format!(
            "SELECT id, {} AS text FROM {} WHERE {} IS NULL AND {} IS NOT NULL",
            column.text_column, column.table, column.embedding_column, column.text_column
        );
        let pending: Vec<PendingRow> = sqlx::query_as(&select).fetch_all(self.db.pool()).await?;

        if pending.is_empty() {
            info!("All {} embeddings already generated", column.label);
            return Ok(0);
        }

        info!("Generating embeddings for {} {} rows", pending.len(), column.label);
        let texts: Vec<String> = pending.iter().map(|row| row.text.clone()).collect();
        let embeddings = self.generate_embeddings_batch(&texts).await?;

        let update = format!(
            "UPDATE {} SET {} = $1::vector WHERE id = $2",
            column.table, column.embedding_column
        );
        let params: Vec<Vec<SqlParam>> = pending
            .iter()
            .zip(embeddings.iter())
            .map(|(row, embedding)| {
                vec![
                    SqlParam::Text(to_vector_literal(embedding)),
                    SqlParam::Int(i64::from(row.id)),
                ]
            })
            .collect();

        let updated = self.db.execute_many(&update, &params).await?;
        info!("Generated {} {} embeddings", updated, column.label);
        Ok(updated)
    }

    pub async fn populate_employee_embeddings(&self) -> Result<u64> {
        self.populate(&EMPLOYEE_NAMES).await
    }

    pub async fn populate_product_embeddings(&self) -> Result<u64> {
        self.populate(&PRODUCT_NAMES).await
    }

    pub async fn populate_order_embeddings(&self) -> Result<u64> {
        self.populate(&ORDER_CUSTOMERS).await
    }

    pub async fn populate_all_embeddings(&self) -> Result<u64> {
        info!("Populating vector embeddings for all tables");
        let total = self.populate_employee_embeddings().await?
            + self.populate_product_embeddings().await?
            + self.populate_order_embeddings().await?;
        info!("All embeddings generated successfully | updated={}", total);
        Ok(total)
    }

    /// Products nearest to the text by cosine distance, with `similarity = 1 - distance`.
    pub async fn search_similar_products(&self, query_text: &str, limit: usize) -> Result<Vec<Value>> {
        info!("Searching similar products for query: {}", query_text.chars().take(50).collect::<String>());

        let sql = "SELECT id, name, price, \
                   1 - (name_embedding <=> $1::vector) AS similarity \
                   FROM products \
                   WHERE name_embedding IS NOT NULL \
                   ORDER BY name_embedding <=> $1::vector \
                   LIMIT $2";

        let results = self.nearest(sql, query_text, limit).await?;
        info!("Found {} similar products", results.len());
        Ok(results)
    }

    /// Employees nearest to the text, with their department name.
    pub async fn search_similar_employees(&self, query_text: &str, limit: usize) -> Result<Vec<Value>> {
        info!("Searching similar employees for query: {}", query_text.chars().take(50).collect::<String>());

        let sql = "SELECT e.id, e.name, e.email, e.salary, d.name AS department, \
                   1 - (e.name_embedding <=> $1::vector) AS similarity \
                   FROM employees e \
                   LEFT JOIN departments d ON e.department_id = d.id \
                   WHERE e.name_embedding IS NOT NULL \
                   ORDER BY e.name_embedding <=> $1::vector \
                   LIMIT $2";

        let results = self.nearest(sql, query_text, limit).await?;
        info!("Found {} similar employees", results.len());
        Ok(results)
    }

    async fn nearest(&self, sql: &str, query_text: &str, limit: usize) -> Result<Vec<Value>> {
        let embedding = match self.generate_embedding(query_text).await? {
            Some(embedding) => embedding,
            None => return Ok(Vec::new()),
        };

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db
            .fetch_json(
                sql,
                &[SqlParam::Text(to_vector_literal(&embedding)), SqlParam::Int(limit)],
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_vector_literal() {
        assert_eq!(to_vector_literal(&[0.5, -1.0, 0.25]), "[0.5,-1,0.25]");
        assert_eq!(to_vector_literal(&[]), "[]");
    }

    #[test]
    fn test_parse_embeddings_orders_by_index() {
        let response = json!({
            "data": [
                {"index": 1, "embedding": [0.3, 0.4]},
                {"index": 0, "embedding": [0.1, 0.2]}
            ]
        });
        let embeddings = parse_embeddings(&response).unwrap();
        assert_eq!(embeddings, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[test]
    fn test_parse_embeddings_errors() {
        assert!(parse_embeddings(&json!({"error": "nope"})).is_err());
        assert!(parse_embeddings(&json!({"data": [{"index": 0}]})).is_err());
    }

    #[test]
    fn test_request_body_carries_dimensions() {
        let client = EmbeddingClient::new(
            "key".to_string(),
            "https://example.test/v1/".to_string(),
            "text-embedding-3-small".to_string(),
            384,
        );
        let body = client.request_body(&["laptop".to_string()]);
        assert_eq!(body["model"], "text-embedding-3-small");
        assert_eq!(body["input"][0], "laptop");
        assert_eq!(body["dimensions"], 384);
        assert_eq!(client.base_url, "https://example.test/v1");
    }

    #[tokio::test]
    async fn test_empty_text_has_no_embedding() {
        let client = EmbeddingClient::new("key".to_string(), "http://127.0.0.1:1".to_string(), "m".to_string(), 3);
        let db = Database::connect_lazy("postgresql://u:p@127.0.0.1:1/db", std::time::Duration::from_secs(1)).unwrap();
        let service = EmbeddingService::new(client, db);

        assert!(service.generate_embedding("   ").await.unwrap().is_none());
        assert!(service.search_similar_products("", 10).await.unwrap().is_empty());
        assert!(service.generate_embeddings_batch(&[]).await.unwrap().is_empty());
    }
}
