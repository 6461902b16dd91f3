//! Document store collaborator: vector ingestion and similarity retrieval.
//!
//! The agent feeds fetched page content in here during search ranking so
//! later turns can retrieve it. Real deployments back this with a SQL/vec
//! extension; the in-memory store keeps the same contract for tests and
//! single-session runs.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Default chunk sizing for page-content ingestion.
pub const DEFAULT_CHUNK_CHARS: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    Dimension { expected: usize, got: usize },

    #[error("vectors and documents must pair up: {vectors} vectors, {docs} documents")]
    Unpaired { vectors: usize, docs: usize },

    #[error("{0}")]
    Other(String),
}

/// A stored piece of content plus free-form metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    pub metadata: Value,
}

impl Document {
    pub fn new(page_content: impl Into<String>, metadata: Value) -> Self {
        Self {
            page_content: page_content.into(),
            metadata,
        }
    }
}

/// Produces embedding vectors for texts.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError>;

    fn dimensions(&self) -> usize;
}

/// Deterministic bag-of-characters embedder for tests and offline runs.
/// Similar texts land near each other; no model weights involved.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(8) }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(128)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; self.dims];
                for (i, ch) in text.chars().enumerate() {
                    let bucket = (ch as usize).wrapping_mul(31).wrapping_add(i / 7) % self.dims;
                    v[bucket] += 1.0;
                }
                let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for x in &mut v {
                        *x /= norm;
                    }
                }
                v
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// Vector store contract: pre-embedded writes, embedded-query reads.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store document/vector pairs; returns the assigned ids.
    async fn add_vectors(
        &self,
        vectors: Vec<Vec<f32>>,
        docs: Vec<Document>,
    ) -> Result<Vec<String>, StoreError>;

    /// Top-`k` documents by cosine similarity to `query`, best first,
    /// with their scores.
    async fn similarity_search_with_score(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(Document, f32)>, StoreError>;
}

struct StoredRow {
    id: String,
    vector: Vec<f32>,
    doc: Document,
}

/// In-memory [`DocumentStore`] with cosine scoring.
pub struct InMemoryVectorStore {
    dims: usize,
    rows: RwLock<Vec<StoredRow>>,
}

impl InMemoryVectorStore {
    pub fn new(dims: usize) -> Arc<Self> {
        Arc::new(Self {
            dims,
            rows: RwLock::new(Vec::new()),
        })
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStore for InMemoryVectorStore {
    async fn add_vectors(
        &self,
        vectors: Vec<Vec<f32>>,
        docs: Vec<Document>,
    ) -> Result<Vec<String>, StoreError> {
        if vectors.len() != docs.len() {
            return Err(StoreError::Unpaired {
                vectors: vectors.len(),
                docs: docs.len(),
            });
        }

        let mut ids = Vec::with_capacity(vectors.len());
        let mut rows = self.rows.write().await;
        for (vector, doc) in vectors.into_iter().zip(docs) {
            if vector.len() != self.dims {
                return Err(StoreError::Dimension {
                    expected: self.dims,
                    got: vector.len(),
                });
            }
            let id = Uuid::new_v4().to_string();
            ids.push(id.clone());
            rows.push(StoredRow { id, vector, doc });
        }
        debug!(added = ids.len(), total = rows.len(), "stored vectors");
        Ok(ids)
    }

    async fn similarity_search_with_score(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(Document, f32)>, StoreError> {
        if query.len() != self.dims {
            return Err(StoreError::Dimension {
                expected: self.dims,
                got: query.len(),
            });
        }

        let rows = self.rows.read().await;
        let mut scored: Vec<(f32, &StoredRow)> = rows
            .iter()
            .map(|row| (cosine(query, &row.vector), row))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, row)| (row.doc.clone(), score))
            .collect())
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Split text into overlapping character chunks for ingestion.
pub fn chunk_text(text: &str, chunk_chars: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || chunk_chars == 0 {
        return Vec::new();
    }
    let step = chunk_chars.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_chars).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}
