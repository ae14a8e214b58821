/// Module for OpenAI embedder implementation
pub mod openai_embedder;
/// Offline feature-hashing embedder
pub mod hashing_embedder;

use crate::config::EmbedderConfig;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

pub use hashing_embedder::*;
pub use openai_embedder::*;

/// Failure while turning text into a vector
#[derive(Debug, thiserror::Error)]
pub enum EmbedderError {
    #[error("embedding request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("embedding backend error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("No embedding in response")]
    MissingEmbedding,
    #[error("embedder configuration error: {0}")]
    Config(String),
}

/// Trait defining interface for text embedding functionality
#[async_trait]
pub trait Embedder: Debug + Send + Sync {
    /// Embeds the given text into a vector of floating point numbers
    ///
    /// # Arguments
    ///
    /// * `text` - The text to embed
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbedderError>;

    /// Name of the embedding model vectors are produced with
    fn model_name(&self) -> &str;
}

/// Builds the embedder named in the system config
pub fn build_embedder(config: &EmbedderConfig) -> Result<Arc<dyn Embedder>, EmbedderError> {
    match config.provider.as_str() {
        "hashing" => Ok(Arc::new(HashingEmbedder::new(config.dimensions)?)),
        "openai" => {
            let model = config.model.as_deref().unwrap_or(DEFAULT_EMBEDDER_MODEL);
            Ok(Arc::new(OpenAIEmbedder::new(model)?))
        }
        other => Err(EmbedderError::Config(format!(
            "Unknown embedder provider '{}'",
            other
        ))),
    }
}
