//! Nearest-neighbor search over embedded travel notes
//!
//! Rows come back from the store in whatever shape the backend produces and
//! are validated into [`RetrievedSnippet`] before anything else sees them.

use crate::config::VectorStoreConfig;
use crate::db::DbPool;
use crate::embeddings::Embedder;
use crate::errors::{AppError, Result, RetrievalStage};
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DbBackend, DbErr, QueryResult, Statement};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Raw row as returned by a vector store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorRow {
    pub content: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub similarity: Option<f64>,
}

/// A validated passage of unstructured text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedSnippet {
    pub source_label: String,
    pub text: String,
    pub similarity_score: f64,
}

impl TryFrom<VectorRow> for RetrievedSnippet {
    type Error = AppError;

    fn try_from(row: VectorRow) -> Result<Self> {
        let malformed = |what: &str| AppError::Retrieval {
            stage: RetrievalStage::SimilaritySearch,
            message: format!("malformed vector row: {}", what),
        };

        let text = row.content.ok_or_else(|| malformed("missing content"))?;

        let source_label = row
            .metadata
            .as_ref()
            .and_then(|m| m.get("source"))
            .and_then(|s| s.as_str())
            .ok_or_else(|| malformed("missing metadata.source"))?
            .to_string();

        let similarity_score = row
            .similarity
            .filter(|s| s.is_finite())
            .ok_or_else(|| malformed("missing similarity"))?;

        Ok(Self {
            source_label,
            text,
            similarity_score,
        })
    }
}

/// Similarity search backend
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Top-`k` rows for the query vector, in backend order
    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<VectorRow>>;

    /// Connectivity check for readiness probes
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str;
}

fn match_sql(match_function: &str) -> String {
    format!(
        "SELECT content, metadata, similarity \
         FROM {}(query_embedding => $1::vector, match_count => $2)",
        match_function
    )
}

/// pgvector store queried through a Postgres matching function
pub struct PgVectorStore {
    db: DbPool,
    match_function: String,
}

impl PgVectorStore {
    /// `match_function` must already be validated as a plain identifier
    pub fn new(db: DbPool, match_function: impl Into<String>) -> Self {
        Self {
            db,
            match_function: match_function.into(),
        }
    }

    fn build_statement(&self, embedding: &[f32], k: usize) -> Result<Statement> {
        // pgvector text format "[1.0,2.0,...]"
        let embedding_str = format!(
            "[{}]",
            embedding
                .iter()
                .map(|f| f.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );

        Ok(Statement::from_sql_and_values(
            DbBackend::Postgres,
            match_sql(&self.match_function),
            vec![embedding_str.into(), match_count(k)?.into()],
        ))
    }
}

/// `match_count` is an `int` argument of the matching function
fn match_count(k: usize) -> Result<i32> {
    i32::try_from(k).map_err(|_| AppError::Configuration {
        message: format!("top_k {} does not fit the match_count argument", k),
    })
}

fn column_error(e: DbErr) -> AppError {
    AppError::VectorSearch {
        message: format!("unexpected column type: {}", e),
    }
}

fn row_from_result(row: &QueryResult) -> Result<VectorRow> {
    Ok(VectorRow {
        content: row
            .try_get_by_index::<Option<String>>(0)
            .map_err(column_error)?,
        metadata: row
            .try_get_by_index::<Option<serde_json::Value>>(1)
            .map_err(column_error)?,
        similarity: row
            .try_get_by_index::<Option<f64>>(2)
            .map_err(column_error)?,
    })
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<VectorRow>> {
        let stmt = self.build_statement(embedding, k)?;

        let rows = self
            .db
            .conn()
            .query_all(stmt)
            .await
            .map_err(|e| AppError::VectorSearch {
                message: e.to_string(),
            })?;

        rows.iter().map(row_from_result).collect()
    }

    async fn ping(&self) -> Result<()> {
        self.db.ping().await
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

/// A document held by [`InMemoryVectorStore`]
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub content: String,
    pub metadata: serde_json::Value,
    pub embedding: Vec<f32>,
}

/// On-disk format for the memory provider
#[derive(Debug, Deserialize)]
struct SnippetFileEntry {
    content: String,
    source: String,
}

/// Cosine-similarity store kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    documents: Vec<StoredDocument>,
}

impl InMemoryVectorStore {
    pub fn new(documents: Vec<StoredDocument>) -> Self {
        Self { documents }
    }

    /// Load `[{content, source}]` from a JSON file and embed each entry
    pub async fn load(path: impl AsRef<Path>, embedder: &dyn Embedder) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| AppError::Configuration {
            message: format!("cannot read snippets file {}: {}", path.display(), e),
        })?;
        let entries: Vec<SnippetFileEntry> = serde_json::from_str(&json)?;

        let mut documents = Vec::with_capacity(entries.len());
        for entry in entries {
            let embedding = embedder.embed(&entry.content).await?;
            documents.push(StoredDocument {
                content: entry.content,
                metadata: serde_json::json!({ "source": entry.source }),
                embedding,
            });
        }

        info!(path = %path.display(), documents = documents.len(), "In-memory vector store loaded");
        Ok(Self::new(documents))
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    f64::from(dot / (norm_a * norm_b))
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<VectorRow>> {
        let mut scored: Vec<(f64, &StoredDocument)> = self
            .documents
            .iter()
            .map(|doc| (cosine_similarity(embedding, &doc.embedding), doc))
            .collect();

        // Stable sort: equal scores keep insertion order
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        debug!(candidates = self.documents.len(), returned = scored.len(), "In-memory search");

        Ok(scored
            .into_iter()
            .map(|(score, doc)| VectorRow {
                content: Some(doc.content.clone()),
                metadata: Some(doc.metadata.clone()),
                similarity: Some(score),
            })
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Create the vector store named by configuration
pub async fn create_vector_store(
    config: &VectorStoreConfig,
    embedder: &dyn Embedder,
) -> Result<Arc<dyn VectorStore>> {
    match config.provider.as_str() {
        "postgres" => {
            let db = DbPool::new(config).await?;
            Ok(Arc::new(PgVectorStore::new(db, config.match_function.clone())))
        }
        "memory" => {
            let store = match config.snippets_path.as_deref() {
                Some(path) => InMemoryVectorStore::load(path, embedder).await?,
                None => InMemoryVectorStore::default(),
            };
            Ok(Arc::new(store))
        }
        other => Err(AppError::Configuration {
            message: format!("Unknown vector store provider '{}'", other),
        }),
    }
}
