//! Chat completion client for OpenAI-compatible endpoints (Groq by default).

use crate::error::{Result, SearchError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    /// Ask for `{"type": "json_object"}` output
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// Produces text for a chat request. The model behind it is untrusted.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }
        if request.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        body
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let body = self.request_body(&request);
        debug!("Calling {} with {} messages", self.model, request.messages.len());

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SearchError::Llm(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SearchError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        extract_content(&response_json)
    }
}

fn extract_content(response: &serde_json::Value) -> Result<String> {
    if let Some(error) = response.get("error") {
        return Err(SearchError::Llm(format!("LLM API error: {}", error)));
    }

    let choice = response
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| SearchError::Llm("No choices in LLM response".to_string()))?;

    match choice.get("finish_reason").and_then(|r| r.as_str()) {
        Some("length") => warn!("LLM response was truncated due to length limit"),
        Some("content_filter") => {
            return Err(SearchError::Llm("LLM response was filtered by content policy".to_string()))
        }
        _ => {}
    }

    let content = choice["message"]["content"]
        .as_str()
        .map(str::trim)
        .unwrap_or_default();

    if content.is_empty() {
        return Err(SearchError::Llm("Empty content in LLM response".to_string()));
    }

    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> LlmClient {
        LlmClient::new("key".to_string(), "llama".to_string(), "https://example.test/v1/".to_string())
    }

    #[test]
    fn test_request_body() {
        let request = CompletionRequest::new(vec![ChatMessage::system("sys"), ChatMessage::user("hi")])
            .with_temperature(0.0)
            .json();
        let body = client().request_body(&request);
        assert_eq!(body["model"], "llama");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_request_body_omits_unset_options() {
        let body = client().request_body(&CompletionRequest::new(vec![ChatMessage::user("hi")]));
        assert!(body.get("temperature").is_none());
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        assert_eq!(client().base_url, "https://example.test/v1");
    }

    #[test]
    fn test_extract_content() {
        let response = json!({"choices": [{"message": {"content": "  select 1  "}, "finish_reason": "stop"}]});
        assert_eq!(extract_content(&response).unwrap(), "select 1");

        let filtered = json!({"choices": [{"message": {"content": "x"}, "finish_reason": "content_filter"}]});
        assert!(extract_content(&filtered).is_err());

        assert!(extract_content(&json!({"choices": []})).is_err());
        assert!(extract_content(&json!({"error": {"message": "bad key"}})).is_err());
        assert!(extract_content(&json!({"choices": [{"message": {"content": ""}}]})).is_err());
    }
}
