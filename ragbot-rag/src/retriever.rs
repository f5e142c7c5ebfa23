//! Query → embedding → similarity search.

use std::collections::HashMap;
use std::sync::Arc;

use ragbot_core::{Chunk, Query, RagError, Result, RetrievalResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::cancel::run_cancellable;
use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::pool::ResourcePool;
use crate::store::DocumentStore;

/// Pool of embedding handles.
pub type EmbedderPool = ResourcePool<Arc<dyn EmbeddingProvider>>;
/// Pool of document store sessions.
pub type StorePool = ResourcePool<Arc<dyn DocumentStore>>;

/// Retrieves the top-K chunks for a query.
///
/// Each external call checks a handle out of its pool for the duration of
/// that call only. For a fixed embedding function and store state, the
/// result is deterministic.
pub struct Retriever {
    embedders: Arc<EmbedderPool>,
    stores: Arc<StorePool>,
    top_k: usize,
    min_relevance: f32,
}

impl Retriever {
    pub fn new(
        embedders: Arc<EmbedderPool>,
        stores: Arc<StorePool>,
        top_k: usize,
        min_relevance: f32,
    ) -> Self {
        Self { embedders, stores, top_k, min_relevance }
    }

    /// Build a retriever using `top_k` and `min_relevance` from `config`.
    pub fn from_config(
        embedders: Arc<EmbedderPool>,
        stores: Arc<StorePool>,
        config: &RagConfig,
    ) -> Self {
        Self::new(embedders, stores, config.top_k, config.min_relevance)
    }

    pub fn embedders(&self) -> &Arc<EmbedderPool> {
        &self.embedders
    }

    pub fn stores(&self) -> &Arc<StorePool> {
        &self.stores
    }

    /// Embed the query text and search the store.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmbeddingFailed`] if embedding fails
    /// - store errors, unchanged
    /// - [`RagError::ResourcePoolTimeout`] if a pool stays exhausted
    /// - [`RagError::Cancelled`] if `cancel` fires first
    pub async fn retrieve(
        &self,
        query: &Query,
        cancel: &CancellationToken,
    ) -> Result<RetrievalResult> {
        let embedding = self.embed(&query.text, cancel).await?;
        let result = self.search(&embedding, cancel).await?;
        debug!(
            request_id = %query.request_id,
            hits = result.len(),
            top_score = result.hits().first().map(|h| h.score),
            "retrieval completed"
        );
        Ok(result)
    }

    /// Search with a precomputed embedding, applying `top_k` and the
    /// relevance cutoff.
    pub async fn search(
        &self,
        embedding: &[f32],
        cancel: &CancellationToken,
    ) -> Result<RetrievalResult> {
        let store = run_cancellable(cancel, self.stores.acquire()).await?;
        let result = run_cancellable(cancel, store.similarity_search(embedding, self.top_k))
            .await
            .inspect_err(|e| {
                if !matches!(e, RagError::Cancelled) {
                    error!(backend = store.name(), error = %e, "similarity search failed");
                }
            })?;
        Ok(result.filter_min_score(self.min_relevance))
    }

    /// Fetch specific chunks through a pooled store session.
    pub async fn fetch(
        &self,
        ids: &[&str],
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, Chunk>> {
        let store = run_cancellable(cancel, self.stores.acquire()).await?;
        run_cancellable(cancel, store.get_by_ids(ids)).await
    }

    async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>> {
        let embedder = run_cancellable(cancel, self.embedders.acquire()).await?;
        run_cancellable(cancel, embedder.embed(text)).await.map_err(|e| match e {
            RagError::Cancelled | RagError::EmbeddingFailed { .. } => e,
            other => {
                error!(provider = embedder.name(), error = %other, "query embedding failed");
                RagError::EmbeddingFailed {
                    provider: embedder.name().to_string(),
                    message: other.to_string(),
                }
            }
        })
    }
}
