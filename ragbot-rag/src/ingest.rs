//! Document ingestion: chunk → embed → insert.

use std::sync::Arc;

use ragbot_core::{RagError, Result};
use tracing::{error, info};

use crate::chunking::{Chunker, Document};
use crate::embedding::EmbeddingProvider;
use crate::store::WritableDocumentStore;

/// Populates a [`WritableDocumentStore`] from source documents.
///
/// # Example
///
/// ```rust,ignore
/// let ingestor = Ingestor::new(embedder, store.clone(), Arc::new(FixedSizeChunker::new(512, 64)));
/// let ids = ingestor.ingest(&Document::new("faq", text)).await?;
/// ```
pub struct Ingestor {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn WritableDocumentStore>,
    chunker: Arc<dyn Chunker>,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn WritableDocumentStore>,
        chunker: Arc<dyn Chunker>,
    ) -> Self {
        Self { embedder, store, chunker }
    }

    /// Ingest a single document, returning the IDs of the stored chunks.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingFailed`] if embedding fails and
    /// propagates store errors (such as [`RagError::DuplicateChunk`] when the
    /// document was already ingested).
    pub async fn ingest(&self, document: &Document) -> Result<Vec<String>> {
        let mut chunks = self.chunker.chunk(document);
        if chunks.is_empty() {
            info!(document.id = %document.id, chunk_count = 0, "ingested document (empty)");
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await.map_err(|e| {
            error!(document.id = %document.id, error = %e, "embedding failed during ingestion");
            RagError::EmbeddingFailed {
                provider: self.embedder.name().to_string(),
                message: format!("document '{}': {e}", document.id),
            }
        })?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::EmbeddingFailed {
                provider: self.embedder.name().to_string(),
                message: format!(
                    "expected {} embeddings for document '{}', got {}",
                    chunks.len(),
                    document.id,
                    embeddings.len()
                ),
            });
        }

        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = embedding;
        }
        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();

        self.store.insert(chunks).await.inspect_err(|e| {
            error!(document.id = %document.id, error = %e, "insert failed during ingestion");
        })?;

        info!(document.id = %document.id, chunk_count = ids.len(), "ingested document");
        Ok(ids)
    }

    /// Ingest documents in order, stopping at the first failure.
    pub async fn ingest_batch(&self, documents: &[Document]) -> Result<Vec<String>> {
        let mut all_ids = Vec::new();
        for document in documents {
            all_ids.extend(self.ingest(document).await?);
        }
        Ok(all_ids)
    }
}
