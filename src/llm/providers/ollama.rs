use super::{status_error, LlmError, LlmProvider};
use crate::llm::ChatMessage;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/api/chat";

/// Provider implementation for Ollama's local API
#[derive(Debug)]
pub struct OllamaProvider {
    client: Client,
    url: String,
    /// Model identifier to use (e.g. "llama3.2:1b")
    model: String,
}

impl OllamaProvider {
    /// Creates a new Ollama provider instance
    ///
    /// # Arguments
    /// * `client` - Shared HTTP client
    /// * `url` - Optional chat endpoint override
    /// * `model` - The model identifier to use
    pub fn new(client: Client, url: Option<&str>, model: Option<&str>) -> Result<Self, LlmError> {
        let model = model.ok_or_else(|| LlmError::Config("llm.model is required for ollama".into()))?;
        Ok(OllamaProvider {
            client,
            url: url.unwrap_or(DEFAULT_OLLAMA_URL).to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    /// Calls Ollama's chat API
    async fn call_llm_api(
        &self,
        messages: Vec<ChatMessage>,
        model: Option<&str>,
    ) -> Result<String, LlmError> {
        let request_body = json!({
            "model": model.unwrap_or(self.model.as_str()),
            "stream": false,
            "messages": messages
        });

        let res = self
            .client
            .post(&self.url)
            .json(&request_body)
            .send()
            .await
            .map_err(LlmError::transport("ollama"))?;

        if !res.status().is_success() {
            return Err(status_error("ollama", res).await);
        }

        let json_resp: serde_json::Value =
            res.json().await.map_err(LlmError::transport("ollama"))?;
        if let Some(content) = json_resp["message"]["content"].as_str() {
            Ok(content.trim().to_string())
        } else {
            Err(LlmError::MissingContent("ollama"))
        }
    }
}
