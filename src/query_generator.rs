//! Query Generator
//!
//! Turns a natural-language question into candidate SQL via the language model.
//! Output is untrusted and must pass the validator before execution.

use crate::error::Result;
use crate::llm::{ChatMessage, CompletionRequest, TextGenerator};
use crate::schema::SchemaDescriptor;
use crate::validation::sanitize;
use std::sync::Arc;
use tracing::{debug, info, warn};

const EXPLANATION_FALLBACK: &str = "Could not generate explanation";
const MAX_SUGGESTIONS: usize = 3;

pub struct QueryGenerator {
    llm: Arc<dyn TextGenerator>,
    schema_context: String,
}

impl QueryGenerator {
    pub fn new(llm: Arc<dyn TextGenerator>, schema: Arc<SchemaDescriptor>) -> Self {
        debug!("Building schema context");
        Self {
            llm,
            schema_context: schema.prompt_context(),
        }
    }

    fn sql_instruction(&self) -> String {
        format!(
            "You are a SQL expert. Convert natural language queries to PostgreSQL SQL queries.\n\
             {}\n\
             Rules:\n\
             1. Return ONLY the raw SQL query, no explanations, no markdown, no backticks\n\
             2. Use proper JOINs and lowercase keywords\n\
             3. Use table aliases (e.g., e for employees)\n\
             4. Use LIMIT 100 if no limit is specified\n\
             5. Do NOT include a semicolon at the end\n",
            self.schema_context
        )
    }

    /// Generate candidate SQL for a question.
    pub async fn generate_sql(&self, question: &str) -> Result<String> {
        info!("Generating SQL for user query: {}", preview(question, 50));

        let request = CompletionRequest::new(vec![
            ChatMessage::system(self.sql_instruction()),
            ChatMessage::user(question),
        ])
        .with_temperature(0.0);

        let raw = self.llm.complete(request).await?;
        let sql = clean_generated_sql(&raw);

        info!("SQL generated successfully");
        debug!("Generated SQL: {}", preview(&sql, 100));
        Ok(sql)
    }

    /// One-sentence explanation of a query. Never fails.
    pub async fn explain_query(&self, sql: &str) -> String {
        info!("Generating explanation for SQL query");

        let request = CompletionRequest::new(vec![
            ChatMessage::system("Explain SQL queries concisely in one sentence."),
            ChatMessage::user(format!("Explain this: {}", sql)),
        ]);

        match self.llm.complete(request).await {
            Ok(explanation) => explanation.trim().to_string(),
            Err(e) => {
                warn!("Could not generate explanation: {}", e);
                EXPLANATION_FALLBACK.to_string()
            }
        }
    }

    /// Up to three related questions. Empty on any failure.
    pub async fn suggest_related_queries(&self, question: &str) -> Vec<String> {
        info!("Suggesting related queries");

        let prompt = format!(
            "Based on this schema: {}\n\
             Suggest 3 related natural language queries for: \"{}\"\n\
             Return ONLY a JSON object with a \"queries\" array of strings. \
             Example: {{\"queries\": [\"query 1\", \"query 2\", \"query 3\"]}}",
            self.schema_context,
            sanitize(question)
        );

        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)]).json();

        match self.llm.complete(request).await {
            Ok(text) => parse_suggestions(&text).unwrap_or_else(|| {
                warn!("Could not parse related queries: {}", preview(&text, 100));
                Vec::new()
            }),
            Err(e) => {
                warn!("Could not suggest related queries: {}", e);
                Vec::new()
            }
        }
    }
}

/// Strip markdown fences and a trailing semicolon from model output.
pub fn clean_generated_sql(raw: &str) -> String {
    let sql = raw.trim().replace("```sql", "").replace("```", "");
    let sql = sql.trim();
    sql.strip_suffix(';').unwrap_or(sql).trim_end().to_string()
}

/// Accepts `["a", "b"]` or `{"anything": ["a", "b"]}`; keeps at most three strings.
pub fn parse_suggestions(text: &str) -> Option<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(text.trim()).ok()?;

    let items = match &value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(map) => map.values().find_map(|v| v.as_array())?,
        _ => return None,
    };

    Some(
        items
            .iter()
            .filter_map(|item| item.as_str())
            .map(str::to_string)
            .take(MAX_SUGGESTIONS)
            .collect(),
    )
}

fn preview(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays canned responses and records requests.
    struct Scripted {
        responses: Mutex<Vec<Result<String>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request);
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn generator(llm: Arc<Scripted>) -> QueryGenerator {
        QueryGenerator::new(llm, Arc::new(SchemaDescriptor::default()))
    }

    #[test]
    fn test_clean_generated_sql() {
        assert_eq!(clean_generated_sql("```sql\nselect * from employees;\n```"), "select * from employees");
        assert_eq!(clean_generated_sql("  select 1  "), "select 1");
        assert_eq!(clean_generated_sql("select 1 ;"), "select 1");
    }

    #[test]
    fn test_parse_suggestions() {
        assert_eq!(
            parse_suggestions(r#"["a", "b", "c", "d"]"#),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(
            parse_suggestions(r#"{"queries": ["x", "y"]}"#),
            Some(vec!["x".to_string(), "y".to_string()])
        );
        assert_eq!(parse_suggestions("not json"), None);
        assert_eq!(parse_suggestions(r#"{"count": 3}"#), None);
    }

    #[tokio::test]
    async fn test_generate_sql_uses_schema_and_zero_temperature() {
        let llm = Scripted::new(vec![Ok("```sql\nselect * from employees e limit 100;\n```".to_string())]);
        let sql = generator(llm.clone()).generate_sql("all employees").await.unwrap();
        assert_eq!(sql, "select * from employees e limit 100");

        let requests = llm.requests.lock().unwrap();
        assert_eq!(requests[0].temperature, Some(0.0));
        assert!(requests[0].messages[0].content.contains("employees table"));
        assert_eq!(requests[0].messages[1].content, "all employees");
    }

    #[tokio::test]
    async fn test_explain_falls_back_on_error() {
        let llm = Scripted::new(vec![Err(SearchError::Llm("down".to_string()))]);
        assert_eq!(generator(llm).explain_query("select 1").await, EXPLANATION_FALLBACK);
    }

    #[tokio::test]
    async fn test_suggestions_sanitize_question_and_use_json_mode() {
        let llm = Scripted::new(vec![Ok(r#"{"queries": ["q1", "q2"]}"#.to_string())]);
        let suggestions = generator(llm.clone()).suggest_related_queries("top \"sellers\"; please").await;
        assert_eq!(suggestions, vec!["q1".to_string(), "q2".to_string()]);

        let requests = llm.requests.lock().unwrap();
        assert!(requests[0].json_mode);
        assert!(requests[0].messages[0].content.contains("\"top sellers please\""));
    }
}
