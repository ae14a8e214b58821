use crate::config::LlmConfig;
use crate::llm::providers::{gateway, ollama, openai, LlmError, LlmProvider};
use crate::llm::ChatMessage;
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

/// Generic LLM client that delegates work to a concrete provider.
#[derive(Debug)]
pub struct LlmClient {
    provider: Box<dyn LlmProvider>,
}

impl LlmClient {
    /// Creates a new LLM client from the `llm` section of the system config.
    ///
    /// # Arguments
    /// * `config` - Provider name ("gateway", "ollama" or "openai"), endpoint, model and timeout
    ///
    /// # Returns
    /// * `Result<LlmClient, LlmError>` - New LLM client instance or error
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let timeout = config
            .timeout()
            .map_err(|e| LlmError::Config(e.to_string()))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(LlmError::transport("http client"))?;

        let url = config.url.as_deref();
        let model = config.model.as_deref();
        let provider: Box<dyn LlmProvider> = match config.provider.as_str() {
            "gateway" => Box::new(gateway::GatewayProvider::new(client, url, model)),
            "ollama" => Box::new(ollama::OllamaProvider::new(client, url, model)?),
            "openai" => Box::new(openai::OpenAiProvider::new(client, url, model)?),
            other => return Err(LlmError::Config(format!("Unknown provider '{}'", other))),
        };

        info!("LLM client ready: provider={}, timeout={:?}", config.provider, timeout);
        Ok(LlmClient { provider })
    }
}

#[async_trait]
impl LlmProvider for LlmClient {
    async fn call_llm_api(
        &self,
        messages: Vec<ChatMessage>,
        model: Option<&str>,
    ) -> Result<String, LlmError> {
        debug!("Sending {} messages to the LLM", messages.len());
        let response = self.provider.call_llm_api(messages, model).await?;
        debug!("LLM response: {}", response);
        Ok(response)
    }
}
