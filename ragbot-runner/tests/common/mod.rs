#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use ragbot_core::{
    Chunk, GenerationEvent, RagError, Result, RetrievalResult, ScoredChunk, SourceRef,
};
use ragbot_model::MockInference;
use ragbot_rag::{
    DocumentStore, EmbedderPool, EmbeddingProvider, NoContextPolicy, RagConfig, ResourcePool,
    Retriever, StorePool,
};
use ragbot_runner::{AnswerStream, Orchestrator};

pub const DIM: usize = 4;

pub struct UnitEmbedder;

#[async_trait]
impl EmbeddingProvider for UnitEmbedder {
    fn name(&self) -> &str {
        "unit"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![0.5; DIM])
    }

    fn dimensions(&self) -> usize {
        DIM
    }
}

/// Returns the same ranked hits for every search.
pub struct ScriptedStore {
    pub hits: Vec<ScoredChunk>,
    pub delay: Duration,
    pub unavailable: bool,
}

impl ScriptedStore {
    pub fn new(hits: Vec<ScoredChunk>) -> Self {
        Self { hits, delay: Duration::ZERO, unavailable: false }
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    fn name(&self) -> &str {
        "scripted"
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    async fn get_by_ids(&self, ids: &[&str]) -> Result<HashMap<String, Chunk>> {
        Ok(self
            .hits
            .iter()
            .filter(|h| ids.contains(&h.chunk.id.as_str()))
            .map(|h| (h.chunk.id.clone(), h.chunk.clone()))
            .collect())
    }

    async fn similarity_search(&self, _embedding: &[f32], k: usize) -> Result<RetrievalResult> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.unavailable {
            return Err(RagError::store_unavailable("scripted", "index offline"));
        }
        Ok(RetrievalResult::ranked(self.hits.clone(), k))
    }
}

/// A hit of `size` characters from document `doc`.
pub fn hit(id: &str, doc: &str, size: usize, score: f32) -> ScoredChunk {
    ScoredChunk {
        chunk: Chunk {
            id: id.to_string(),
            text: "x".repeat(size),
            source: SourceRef::new(doc, 0),
            embedding: vec![0.5; DIM],
            version: None,
            metadata: HashMap::new(),
        },
        score,
    }
}

pub fn text_hit(id: &str, doc: &str, text: &str, score: f32) -> ScoredChunk {
    let mut hit = hit(id, doc, 0, score);
    hit.chunk.text = text.to_string();
    hit
}

pub fn config(budget: usize, policy: NoContextPolicy) -> RagConfig {
    RagConfig::builder()
        .context_budget(budget)
        .pool_size(1)
        .acquire_timeout(Duration::from_secs(30))
        .no_context_policy(policy)
        .build()
        .unwrap()
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub model: MockInference,
    pub embedders: Arc<EmbedderPool>,
    pub stores: Arc<StorePool>,
}

pub fn harness(store: ScriptedStore, model: MockInference, config: RagConfig) -> Harness {
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(UnitEmbedder);
    let store: Arc<dyn DocumentStore> = Arc::new(store);
    let embedders = Arc::new(ResourcePool::replicated(
        "embedder",
        embedder,
        config.pool_size,
        config.acquire_timeout,
    ));
    let stores =
        Arc::new(ResourcePool::replicated("store", store, config.pool_size, config.acquire_timeout));

    let orchestrator = Orchestrator::builder()
        .retriever(Retriever::from_config(embedders.clone(), stores.clone(), &config))
        .inference(Arc::new(model.clone()))
        .config(config)
        .build()
        .unwrap();
    Harness { orchestrator, model, embedders, stores }
}

pub async fn drain(stream: AnswerStream) -> (Vec<GenerationEvent>, AnswerStream) {
    let mut stream = stream;
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    (events, stream)
}

pub fn delta(text: &str) -> GenerationEvent {
    GenerationEvent::Delta { text: text.to_string() }
}
