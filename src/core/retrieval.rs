use crate::config::{ReferenceDocument, SearchConfig, SearchMode, SourcesMode, TaskDefinition};
use crate::core::rag::{RetrievalError, VectorIndex};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Default fragment count when a task has no active search sub-config
pub const DEFAULT_TOP_K: usize = 3;

/// A text fragment returned by the vector index for one query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedFragment {
    pub text: String,
    pub source_id: String,
    /// Cosine distance, lower is more similar
    pub score: f32,
}

/// The two content sources a task can search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Text,
    Tables,
}

impl SourceKind {
    pub fn collection_name(&self, task_id: &str) -> String {
        match self {
            SourceKind::Text => format!("{}_texts", task_id),
            SourceKind::Tables => format!("{}_tables", task_id),
        }
    }

    fn search_config<'a>(&self, task: &'a TaskDefinition) -> Option<&'a SearchConfig> {
        match self {
            SourceKind::Text => task.text_search.as_ref(),
            SourceKind::Tables => task.table_search.as_ref(),
        }
    }

    fn seeds<'a>(&self, task: &'a TaskDefinition) -> &'a [ReferenceDocument] {
        match self {
            SourceKind::Text => &task.reference_documents,
            SourceKind::Tables => &task.reference_rows,
        }
    }
}

/// Sources searched for a task along with their enabled sub-config
pub fn active_sources(task: &TaskDefinition) -> Vec<(SourceKind, &SearchConfig)> {
    let kinds: &[SourceKind] = match task.sources_mode {
        SourcesMode::Text => &[SourceKind::Text],
        SourcesMode::Tables => &[SourceKind::Tables],
        SourcesMode::TextAndTables => &[SourceKind::Text, SourceKind::Tables],
    };
    kinds
        .iter()
        .filter_map(|kind| {
            kind.search_config(task)
                .filter(|config| config.enabled)
                .map(|config| (*kind, config))
        })
        .collect()
}

/// Whether the task answers from retrieved context
pub fn is_context_driven(task: &TaskDefinition) -> bool {
    !active_sources(task).is_empty()
}

/// Fragment count for the first generation pass
pub fn base_top_k(task: &TaskDefinition) -> usize {
    active_sources(task)
        .iter()
        .map(|(_, config)| config.top_k)
        .max()
        .unwrap_or(DEFAULT_TOP_K)
}

/// Fragment count for the research pass, always strictly wider than `base`
pub fn research_candidate_count(base: usize) -> usize {
    base.saturating_mul(2).max(base.saturating_add(1))
}

fn by_distance(a: &RetrievedFragment, b: &RetrievedFragment) -> Ordering {
    a.score
        .total_cmp(&b.score)
        .then_with(|| a.source_id.cmp(&b.source_id))
}

/// Applies a retrieval mode to candidates sorted by ascending distance
pub fn select_candidates(
    mut candidates: Vec<RetrievedFragment>,
    mode: SearchMode,
    top_k: usize,
    threshold: f32,
) -> Vec<RetrievedFragment> {
    candidates.sort_by(by_distance);
    match mode {
        SearchMode::TopK => {
            candidates.truncate(top_k);
            candidates
        }
        SearchMode::Threshold => candidates
            .into_iter()
            .filter(|c| c.score <= threshold)
            .collect(),
        SearchMode::Hybrid => {
            let within: Vec<_> = candidates
                .iter()
                .filter(|c| c.score <= threshold)
                .take(top_k)
                .cloned()
                .collect();
            if within.is_empty() {
                candidates.truncate(top_k.min(1));
                candidates
            } else {
                within
            }
        }
    }
}

/// Retrieval engine over a vector index
pub struct Retriever {
    index: Arc<dyn VectorIndex>,
    /// Collections already reported for an embedding model mismatch
    mismatches: Mutex<HashSet<String>>,
}

impl Retriever {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self {
            index,
            mismatches: Mutex::new(HashSet::new()),
        }
    }

    /// Returns the fragments relevant to `query` under the task's retrieval modes.
    ///
    /// Each active source is searched with its own sub-config. Results from
    /// several sources are merged by ascending distance, and when every source
    /// runs in `top_k` mode the merged list is cut to `top_k` fragments.
    pub async fn retrieve(
        &self,
        task: &TaskDefinition,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedFragment>, RetrievalError> {
        self.search(task, query, top_k, |k| k).await
    }

    /// Wider retrieval pass used by research escalation, every source count
    /// and the merged cutoff widened from their first-pass values
    pub async fn retrieve_for_research(
        &self,
        task: &TaskDefinition,
        query: &str,
        base: usize,
    ) -> Result<Vec<RetrievedFragment>, RetrievalError> {
        self.search(
            task,
            query,
            research_candidate_count(base),
            research_candidate_count,
        )
        .await
    }

    async fn search(
        &self,
        task: &TaskDefinition,
        query: &str,
        limit: usize,
        widen: fn(usize) -> usize,
    ) -> Result<Vec<RetrievedFragment>, RetrievalError> {
        let sources = active_sources(task);
        let mut merged = Vec::new();
        for (kind, config) in &sources {
            let name = kind.collection_name(&task.id);
            self.report_model_mismatch(&name, config);
            let Some(handle) = self
                .index
                .ensure_collection(&name, kind.seeds(task), config.chunking_strategy)
                .await?
            else {
                debug!("Collection {} is not resolvable, skipping", name);
                continue;
            };

            let k = widen(config.top_k);
            let n = config.max_chunks.max(k);
            let result = self.index.query(&handle, query, n).await?;
            let candidates = result
                .documents
                .into_iter()
                .zip(result.ids)
                .zip(result.distances)
                .map(|((text, source_id), score)| RetrievedFragment {
                    text,
                    source_id,
                    score,
                })
                .collect();
            let selected = select_candidates(candidates, config.mode, k, config.similarity_threshold);
            debug!("{} fragments selected from {}", selected.len(), name);
            merged.extend(selected);
        }

        if sources.len() > 1 {
            merged.sort_by(by_distance);
        }
        if sources
            .iter()
            .all(|(_, config)| config.mode == SearchMode::TopK)
        {
            merged.truncate(limit);
        }
        Ok(merged)
    }

    /// Warns once per collection when its sub-config names an embedding model
    /// other than the one the index runs with. Returns whether it warned.
    fn report_model_mismatch(&self, collection: &str, config: &SearchConfig) -> bool {
        let active = self.index.embedding_model();
        if config.embedding_model == active {
            return false;
        }
        let first = self
            .mismatches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collection.to_string());
        if first {
            warn!(
                "Collection {} is configured for embedding_model={} but the index embeds with {}",
                collection, config.embedding_model, active
            );
        }
        first
    }
}
