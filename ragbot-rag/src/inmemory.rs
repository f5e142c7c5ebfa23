//! In-memory document store using cosine similarity.
//!
//! [`InMemoryDocumentStore`] keeps chunks in a `HashMap` behind a
//! `tokio::sync::RwLock`. It is suitable for development, testing, and small
//! corpora.

use std::collections::HashMap;

use async_trait::async_trait;
use ragbot_core::{Chunk, RagError, Result, RetrievalResult, ScoredChunk};
use tokio::sync::RwLock;
use tracing::debug;

use crate::store::{DocumentStore, WritableDocumentStore};

const BACKEND: &str = "InMemory";

/// An in-memory document store of fixed embedding dimension.
///
/// # Example
///
/// ```rust,ignore
/// use ragbot_rag::{InMemoryDocumentStore, WritableDocumentStore};
///
/// let store = InMemoryDocumentStore::new(384);
/// store.insert(chunks).await?;
/// ```
#[derive(Debug)]
pub struct InMemoryDocumentStore {
    dimensions: usize,
    chunks: RwLock<HashMap<String, Chunk>>,
}

impl InMemoryDocumentStore {
    /// Create an empty store for embeddings of `dimensions` length.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, chunks: RwLock::new(HashMap::new()) }
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        if actual != self.dimensions {
            return Err(RagError::InvalidEmbeddingDimension { expected: self.dimensions, actual });
        }
        Ok(())
    }
}

/// Cosine similarity of two vectors; 0.0 if either has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn name(&self) -> &str {
        BACKEND
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn get_by_ids(&self, ids: &[&str]) -> Result<HashMap<String, Chunk>> {
        let chunks = self.chunks.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| chunks.get(*id).map(|chunk| (chunk.id.clone(), chunk.clone())))
            .collect())
    }

    async fn similarity_search(&self, embedding: &[f32], k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(RagError::Config("similarity_search requires k >= 1".to_string()));
        }
        self.check_dimension(embedding.len())?;

        let chunks = self.chunks.read().await;
        // Negative cosine similarity clamps to zero inside `ranked`.
        let scored = chunks.values().map(|chunk| ScoredChunk {
            chunk: chunk.clone(),
            score: cosine_similarity(&chunk.embedding, embedding),
        });
        let result = RetrievalResult::ranked(scored, k);
        debug!(backend = BACKEND, candidates = chunks.len(), hits = result.len(), "searched");
        Ok(result)
    }
}

#[async_trait]
impl WritableDocumentStore for InMemoryDocumentStore {
    async fn insert(&self, chunks: Vec<Chunk>) -> Result<()> {
        let mut stored = self.chunks.write().await;
        let mut batch_ids = std::collections::HashSet::with_capacity(chunks.len());
        for chunk in &chunks {
            self.check_dimension(chunk.embedding.len())?;
            if stored.contains_key(&chunk.id) || !batch_ids.insert(chunk.id.as_str()) {
                return Err(RagError::DuplicateChunk(chunk.id.clone()));
            }
        }
        for chunk in chunks {
            stored.insert(chunk.id.clone(), chunk);
        }
        Ok(())
    }

    async fn delete(&self, ids: &[&str]) -> Result<usize> {
        let mut stored = self.chunks.write().await;
        Ok(ids.iter().filter(|id| stored.remove(**id).is_some()).count())
    }

    async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }
}
