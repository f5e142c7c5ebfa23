#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ragbot_core::{Chunk, RagError, Result, RetrievalResult, ScoredChunk, SourceRef};
use ragbot_rag::{DocumentStore, EmbeddingProvider, ResourcePool};

pub const DIM: usize = 8;

/// Deterministic hash-based embeddings.
pub struct HashEmbedder {
    pub dimensions: usize,
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // FNV-1a over the text, then a per-dimension mix.
        let hash = text
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325u64, |acc, b| (acc ^ b as u64).wrapping_mul(0x100_0000_01b3));
        let mut emb = vec![0.0f32; self.dimensions];
        for (i, v) in emb.iter_mut().enumerate() {
            let mixed = (hash ^ (i as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15))
                .wrapping_mul(0xbf58_476d_1ce4_e5b9);
            *v = ((mixed >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0;
        }
        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            emb.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(emb)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Always returns the same vector.
pub struct FixedEmbedder(pub Vec<f32>);

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }

    fn dimensions(&self) -> usize {
        self.0.len()
    }
}

/// Fails every call with a non-embedding error.
pub struct BrokenEmbedder;

#[async_trait]
impl EmbeddingProvider for BrokenEmbedder {
    fn name(&self) -> &str {
        "broken"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::Config("model not loaded".into()))
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// A store whose index cannot be reached.
pub struct UnreachableStore;

#[async_trait]
impl DocumentStore for UnreachableStore {
    fn name(&self) -> &str {
        "unreachable"
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    async fn get_by_ids(&self, _ids: &[&str]) -> Result<HashMap<String, Chunk>> {
        Err(RagError::store_unavailable("unreachable", "connection refused"))
    }

    async fn similarity_search(&self, _embedding: &[f32], _k: usize) -> Result<RetrievalResult> {
        Err(RagError::store_unavailable("unreachable", "connection refused"))
    }
}

/// A store that takes `delay` to answer a search and counts calls.
pub struct SlowStore {
    pub delay: Duration,
    pub searches: AtomicUsize,
}

#[async_trait]
impl DocumentStore for SlowStore {
    fn name(&self) -> &str {
        "slow"
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    async fn get_by_ids(&self, _ids: &[&str]) -> Result<HashMap<String, Chunk>> {
        Ok(HashMap::new())
    }

    async fn similarity_search(&self, _embedding: &[f32], _k: usize) -> Result<RetrievalResult> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(RetrievalResult::empty())
    }
}

pub fn chunk(id: &str, source: &str, text: &str, embedding: Vec<f32>) -> Chunk {
    Chunk {
        id: id.to_string(),
        text: text.to_string(),
        source: SourceRef::new(source, 0),
        embedding,
        version: None,
        metadata: HashMap::new(),
    }
}

pub fn scored(id: &str, source: &str, text: &str, score: f32) -> ScoredChunk {
    ScoredChunk { chunk: chunk(id, source, text, Vec::new()), score }
}

/// A unit vector along axis `i`.
pub fn axis(i: usize) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    v[i] = 1.0;
    v
}

pub fn pool<T: Clone>(name: &str, item: T, size: usize) -> Arc<ResourcePool<T>> {
    Arc::new(ResourcePool::replicated(name, item, size, Duration::from_secs(1)))
}
