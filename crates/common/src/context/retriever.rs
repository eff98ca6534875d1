//! Semantic retrieval: embed the query, then ask the vector store for neighbors

use crate::embeddings::Embedder;
use crate::errors::{AppError, Result, RetrievalStage};
use crate::metrics;
use crate::vector_store::{RetrievedSnippet, VectorStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument, warn};

pub struct SemanticRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    top_k: usize,
}

impl SemanticRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, top_k: usize) -> Self {
        Self {
            embedder,
            store,
            top_k,
        }
    }

    /// Default number of snippets per query
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Up to `k` snippets in backend order; an empty result is not an error
    #[instrument(skip(self, query), fields(backend = self.store.backend_name()))]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedSnippet>> {
        if query.trim().is_empty() {
            return Err(AppError::Validation {
                message: "query must not be empty".to_string(),
                field: Some("query".to_string()),
            });
        }

        let start = Instant::now();
        let embedding = self.embedder.embed(query).await;
        metrics::record_embedding(
            start.elapsed().as_secs_f64(),
            self.embedder.model_name(),
            embedding.is_ok(),
        );
        let embedding = embedding.map_err(|e| {
            warn!(error = %e, "Query embedding failed");
            AppError::Retrieval {
                stage: RetrievalStage::Embedding,
                message: e.to_string(),
            }
        })?;

        let rows = self.store.search(&embedding, k).await.map_err(|e| match e {
            AppError::Retrieval { .. } => e,
            other => AppError::Retrieval {
                stage: RetrievalStage::SimilaritySearch,
                message: other.to_string(),
            },
        })?;

        let snippets = rows
            .into_iter()
            .map(RetrievedSnippet::try_from)
            .collect::<Result<Vec<_>>>()?;

        debug!(count = snippets.len(), "Snippets retrieved");
        Ok(snippets)
    }

    /// Readiness check of the vector store
    pub async fn check_store(&self) -> Result<()> {
        self.store.ping().await
    }
}
