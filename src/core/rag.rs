use crate::config::{ChunkingStrategy, ReferenceDocument};
use crate::llm::{Embedder, EmbedderError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Failure of the retrieval backend
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedderError),
    #[error("collection `{0}` does not exist")]
    UnknownCollection(String),
}

/// Opaque reference to a materialized collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    pub name: String,
}

/// Nearest-neighbor matches as parallel vectors, ordered by ascending distance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub documents: Vec<String>,
    pub ids: Vec<String>,
    pub distances: Vec<f32>,
}

/// A chunk of a reference document with its embedding vector
#[derive(Clone, Debug)]
pub struct DocumentEmbedding {
    pub id: String,
    pub embedding: Vec<f32>,
    pub content: String,
}

/// Trait defining operations for a vector index holding named collections
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Returns the collection, creating and seeding it on first access.
    ///
    /// A collection that does not exist yet and has no seed documents cannot
    /// be resolved and yields `None`.
    async fn ensure_collection(
        &self,
        name: &str,
        seeds: &[ReferenceDocument],
        chunking: ChunkingStrategy,
    ) -> Result<Option<CollectionHandle>, RetrievalError>;

    /// Returns up to `n` nearest documents of a collection for `text`
    async fn query(
        &self,
        handle: &CollectionHandle,
        text: &str,
        n: usize,
    ) -> Result<QueryResult, RetrievalError>;

    /// Embedding model the index vectorizes documents and queries with
    fn embedding_model(&self) -> &str;
}

/// Splits a reference text according to the chunking strategy
pub fn chunk_text(strategy: ChunkingStrategy, text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let pieces: Vec<&str> = match strategy {
        ChunkingStrategy::Whole => vec![normalized.as_str()],
        ChunkingStrategy::Paragraph => normalized.split("\n\n").collect(),
        ChunkingStrategy::Sentence => normalized
            .split_inclusive(|c| matches!(c, '.' | '!' | '?'))
            .collect(),
    };
    pieces
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Cosine distance between two vectors, `1.0` when either is a zero vector
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        1.0
    } else {
        1.0 - dot / (norm_a * norm_b)
    }
}

/// In-memory implementation of a vector index
#[derive(Debug)]
pub struct InMemoryVectorIndex {
    collections: RwLock<HashMap<String, Arc<Vec<DocumentEmbedding>>>>,
    /// Embedder used to convert text to vectors
    embedder: Arc<dyn Embedder>,
}

impl InMemoryVectorIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            embedder,
        }
    }

    async fn embed_seeds(
        &self,
        seeds: &[ReferenceDocument],
        chunking: ChunkingStrategy,
    ) -> Result<Vec<DocumentEmbedding>, RetrievalError> {
        let mut documents = Vec::new();
        for seed in seeds {
            let chunks = chunk_text(chunking, &seed.text);
            let single = chunks.len() == 1;
            for (i, chunk) in chunks.into_iter().enumerate() {
                let id = if single {
                    seed.id.clone()
                } else {
                    format!("{}#{}", seed.id, i + 1)
                };
                let embedding = self.embedder.embed_text(&chunk).await?;
                documents.push(DocumentEmbedding {
                    id,
                    embedding,
                    content: chunk,
                });
            }
        }
        Ok(documents)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        seeds: &[ReferenceDocument],
        chunking: ChunkingStrategy,
    ) -> Result<Option<CollectionHandle>, RetrievalError> {
        let handle = CollectionHandle {
            name: name.to_string(),
        };
        if self.collections.read().await.contains_key(name) {
            return Ok(Some(handle));
        }
        if seeds.is_empty() {
            debug!("No seed documents for collection {}", name);
            return Ok(None);
        }

        // Embedding happens outside the lock; a concurrent seeding of the same
        // collection produces the same documents and the first insert wins.
        let documents = self.embed_seeds(seeds, chunking).await?;
        let count = documents.len();
        self.collections
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(documents));
        info!("Materialized collection {} with {} chunks", name, count);
        Ok(Some(handle))
    }

    async fn query(
        &self,
        handle: &CollectionHandle,
        text: &str,
        n: usize,
    ) -> Result<QueryResult, RetrievalError> {
        let documents = self
            .collections
            .read()
            .await
            .get(&handle.name)
            .cloned()
            .ok_or_else(|| RetrievalError::UnknownCollection(handle.name.clone()))?;

        debug!("Querying collection {} for {} results", handle.name, n);
        let query_embedding = self.embedder.embed_text(text).await?;
        let mut scored: Vec<(f32, &DocumentEmbedding)> = documents
            .iter()
            .map(|doc| (cosine_distance(&query_embedding, &doc.embedding), doc))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));

        let mut result = QueryResult::default();
        for (distance, doc) in scored.into_iter().take(n) {
            result.documents.push(doc.content.clone());
            result.ids.push(doc.id.clone());
            result.distances.push(distance);
        }
        Ok(result)
    }

    fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }
}
