use crate::llm::ChatMessage;
use async_trait::async_trait;
use std::fmt::Debug;

pub mod gateway;
pub mod ollama;
pub mod openai;

/// Failure of a generation backend call
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} error {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("No content in {0} LLM response")]
    MissingContent(&'static str),
    #[error("LLM configuration error: {0}")]
    Config(String),
}

impl LlmError {
    pub(crate) fn transport(provider: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| LlmError::Transport { provider, source }
    }
}

/// A generation backend able to answer a list of chat messages
#[async_trait]
pub trait LlmProvider: Debug + Send + Sync {
    /// Sends the messages and returns the assistant's reply text
    ///
    /// # Arguments
    /// * `messages` - Conversation to send, system message first
    /// * `model` - Optional model override, the provider's default is used otherwise
    async fn call_llm_api(
        &self,
        messages: Vec<ChatMessage>,
        model: Option<&str>,
    ) -> Result<String, LlmError>;
}

/// Turns a non-success HTTP response into an [`LlmError::Status`]
pub(crate) async fn status_error(provider: &'static str, res: reqwest::Response) -> LlmError {
    let status = res.status().as_u16();
    let body = match res.text().await {
        Ok(text) => text,
        Err(e) => format!("<unreadable body: {}>", e),
    };
    LlmError::Status {
        provider,
        status,
        body,
    }
}
