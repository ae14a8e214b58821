use super::{status_error, LlmError, LlmProvider};
use crate::llm::ChatMessage;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

pub const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:4004/api/chat";

/// Provider for the development chat gateway.
///
/// The gateway takes `{"messages": [...], "model": "..."}` and answers with
/// `{"reply": "...", "raw": {...}}`; the model is optional and defaults on the
/// gateway side.
#[derive(Debug)]
pub struct GatewayProvider {
    client: Client,
    url: String,
    default_model: Option<String>,
}

impl GatewayProvider {
    pub fn new(client: Client, url: Option<&str>, default_model: Option<&str>) -> Self {
        GatewayProvider {
            client,
            url: url.unwrap_or(DEFAULT_GATEWAY_URL).to_string(),
            default_model: default_model.map(str::to_string),
        }
    }
}

#[async_trait]
impl LlmProvider for GatewayProvider {
    async fn call_llm_api(
        &self,
        messages: Vec<ChatMessage>,
        model: Option<&str>,
    ) -> Result<String, LlmError> {
        let mut request_body = json!({ "messages": messages });
        if let Some(model) = model.or(self.default_model.as_deref()) {
            request_body["model"] = json!(model);
        }

        let res = self
            .client
            .post(&self.url)
            .json(&request_body)
            .send()
            .await
            .map_err(LlmError::transport("gateway"))?;

        if !res.status().is_success() {
            return Err(status_error("gateway", res).await);
        }

        let json_resp: serde_json::Value =
            res.json().await.map_err(LlmError::transport("gateway"))?;
        match json_resp["reply"].as_str() {
            Some(content) => Ok(content.trim().to_string()),
            None => Err(LlmError::MissingContent("gateway")),
        }
    }
}
