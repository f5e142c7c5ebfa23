//! Document store traits: the read side used by retrieval and the write side
//! used by ingestion.

use std::collections::HashMap;

use async_trait::async_trait;
use ragbot_core::{Chunk, Result, RetrievalResult};

/// Read access to an indexed corpus of chunks.
///
/// Implementations must be safe to call from many in-flight requests at once
/// and have no side effects beyond the read.
///
/// # Example
///
/// ```rust,ignore
/// let result = store.similarity_search(&query_embedding, 5).await?;
/// for hit in &result {
///     println!("{} {:.3}", hit.chunk.id, hit.score);
/// }
/// ```
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Backend label used in errors and logs.
    fn name(&self) -> &str;

    /// The embedding dimension the index was configured with.
    fn dimensions(&self) -> usize;

    /// Fetch chunks by ID. Unknown IDs are absent from the map.
    async fn get_by_ids(&self, ids: &[&str]) -> Result<HashMap<String, Chunk>>;

    /// Return the `k` chunks most similar to `embedding`.
    ///
    /// # Errors
    ///
    /// - [`RagError::StoreUnavailable`](ragbot_core::RagError::StoreUnavailable)
    ///   if the index cannot be reached
    /// - [`RagError::InvalidEmbeddingDimension`](ragbot_core::RagError::InvalidEmbeddingDimension)
    ///   if `embedding.len() != self.dimensions()`
    /// - [`RagError::Config`](ragbot_core::RagError::Config) if `k == 0`
    async fn similarity_search(&self, embedding: &[f32], k: usize) -> Result<RetrievalResult>;
}

/// Ingestion-side access to a store.
///
/// Stored chunks are never updated in place: inserting an existing ID is an
/// error, and removal is explicit.
#[async_trait]
pub trait WritableDocumentStore: DocumentStore {
    /// Insert chunks. Either all are stored or none are.
    async fn insert(&self, chunks: Vec<Chunk>) -> Result<()>;

    /// Delete chunks by ID, returning how many existed.
    async fn delete(&self, ids: &[&str]) -> Result<usize>;

    /// Number of stored chunks.
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
