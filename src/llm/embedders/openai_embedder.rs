use super::{Embedder, EmbedderError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

pub const DEFAULT_EMBEDDER_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";

/// OpenAI embedder implementation that uses OpenAI's API to generate text embeddings
#[derive(Debug)]
pub struct OpenAIEmbedder {
    client: Client,
    /// Embeddings endpoint
    url: String,
    /// OpenAI API key used for authentication
    api_key: String,
    /// Name of the OpenAI model to use for embeddings
    pub model: String,
}

impl OpenAIEmbedder {
    /// Creates a new OpenAIEmbedder instance
    ///
    /// # Arguments
    ///
    /// * `model` - Name of the OpenAI model to use
    ///
    /// # Returns
    ///
    /// A Result containing either:
    /// * A new OpenAIEmbedder instance
    /// * An error if the OPENAI_API_KEY environment variable is not set
    pub fn new(model: &str) -> Result<Self, EmbedderError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            EmbedderError::Config("OPENAI_API_KEY environment variable not set".into())
        })?;
        Ok(Self::with_endpoint(DEFAULT_EMBEDDINGS_URL, api_key, model))
    }

    /// Embedder talking to an explicit endpoint with an explicit key
    pub fn with_endpoint(url: &str, api_key: impl Into<String>, model: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
            api_key: api_key.into(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbedderError> {
        let body = json!({
            "input": text,
            "model": self.model
        });

        let res = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await?;
            return Err(EmbedderError::Status { status, body });
        }

        let json_resp: serde_json::Value = res.json().await?;
        let arr = json_resp["data"][0]["embedding"]
            .as_array()
            .ok_or(EmbedderError::MissingEmbedding)?;
        let embedding: Vec<f32> = arr
            .iter()
            .filter_map(|x| x.as_f64())
            .map(|x| x as f32)
            .collect();
        Ok(embedding)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn embedder(server: &mockito::ServerGuard) -> OpenAIEmbedder {
        OpenAIEmbedder::with_endpoint(
            &format!("{}/v1/embeddings", server.url()),
            "test-key",
            DEFAULT_EMBEDDER_MODEL,
        )
    }

    #[tokio::test]
    async fn test_embed_text_returns_vector() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/embeddings")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::PartialJson(json!({
                "input": "access tickets",
                "model": "text-embedding-3-small",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":[{"embedding":[0.25,-0.5,1.0]}]}"#)
            .create_async()
            .await;

        let vector = embedder(&server).embed_text("access tickets").await.unwrap();
        assert_eq!(vector, vec![0.25, -0.5, 1.0]);
        assert_eq!(embedder(&server).model_name(), "text-embedding-3-small");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/embeddings")
            .with_status(500)
            .with_body("upstream down")
            .create_async()
            .await;

        match embedder(&server).embed_text("q").await {
            Err(EmbedderError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_data_is_missing_embedding() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":[]}"#)
            .create_async()
            .await;

        let result = embedder(&server).embed_text("q").await;
        assert!(matches!(result, Err(EmbedderError::MissingEmbedding)));
    }
}
