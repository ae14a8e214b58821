use super::{status_error, LlmError, LlmProvider};
use crate::llm::ChatMessage;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Provider implementation for OpenAI's API
#[derive(Debug)]
pub struct OpenAiProvider {
    client: Client,
    url: String,
    /// OpenAI API key loaded from environment
    api_key: String,
    /// Model identifier to use (e.g. "gpt-4o-mini")
    model: String,
}

impl OpenAiProvider {
    /// Creates a new OpenAI provider instance
    ///
    /// # Returns
    /// * `Result<Self, LlmError>` - Provider instance or error if API key not found
    pub fn new(client: Client, url: Option<&str>, model: Option<&str>) -> Result<Self, LlmError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| LlmError::Config("OPENAI_API_KEY environment variable not set".into()))?;
        Ok(Self::with_api_key(client, url, model, api_key))
    }

    /// Creates a provider with an explicit API key
    pub fn with_api_key(
        client: Client,
        url: Option<&str>,
        model: Option<&str>,
        api_key: impl Into<String>,
    ) -> Self {
        OpenAiProvider {
            client,
            url: url.unwrap_or(DEFAULT_OPENAI_URL).to_string(),
            api_key: api_key.into(),
            model: model.unwrap_or(DEFAULT_OPENAI_MODEL).to_string(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    /// Calls OpenAI's chat completions API
    async fn call_llm_api(
        &self,
        messages: Vec<ChatMessage>,
        model: Option<&str>,
    ) -> Result<String, LlmError> {
        let request_body = json!({
          "model": model.unwrap_or(self.model.as_str()),
          "messages": messages,
          "temperature": 0.2
        });

        let res = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(LlmError::transport("openai"))?;

        if !res.status().is_success() {
            return Err(status_error("openai", res).await);
        }

        let json_resp: serde_json::Value =
            res.json().await.map_err(LlmError::transport("openai"))?;
        if let Some(content) = json_resp["choices"][0]["message"]["content"].as_str() {
            Ok(content.trim().to_string())
        } else {
            Err(LlmError::MissingContent("openai"))
        }
    }
}
