use crate::config::SystemConfigError;
use crate::llm::{EmbedderError, FormatError, LlmError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] SystemConfigError),
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error("Embedder error: {0}")]
    Embedder(#[from] EmbedderError),
    #[error("Routing schema error: {0}")]
    Format(#[from] FormatError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serde error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
