//! # RAG Answer Demo
//!
//! Ingests a few product documents into an in-memory store, then streams a
//! grounded answer for a question given on the command line.
//!
//! Runs with a scripted model and **no external services** by default. With
//! the `openai` feature and `RAGBOT_MODEL` set, it streams from a local
//! OpenAI-compatible server instead (`RAGBOT_MODEL_URL`, default
//! `http://127.0.0.1:8080`).
//!
//! Run: `cargo run -p ragbot-demos --bin rag_answer -- "How long is the warranty?"`

use std::io::Write;
use std::sync::Arc;

use futures::StreamExt;
use ragbot_core::{GenerationEvent, InferenceClient, Query, Turn};
use ragbot_model::MockInference;
use ragbot_rag::{
    Document, DocumentStore, EmbeddingProvider, FixedSizeChunker, InMemoryDocumentStore,
    Ingestor, RagConfig, ResourcePool, Retriever,
};
use ragbot_runner::Orchestrator;
use ragbot_telemetry::{TelemetryConfig, init_telemetry};

const DIMENSIONS: usize = 64;

// ---------------------------------------------------------------------------
// Bag-of-words embeddings: each lowercase word lands in a hashed bucket, so
// texts sharing words point in similar directions.
// ---------------------------------------------------------------------------

struct BagOfWordsEmbedder;

#[async_trait::async_trait]
impl EmbeddingProvider for BagOfWordsEmbedder {
    fn name(&self) -> &str {
        "bag-of-words"
    }

    async fn embed(&self, text: &str) -> ragbot_core::Result<Vec<f32>> {
        let mut emb = vec![0.0f32; DIMENSIONS];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| w.len() > 2) {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            emb[(hash % DIMENSIONS as u64) as usize] += 1.0;
        }
        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            emb.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(emb)
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }
}

fn documents() -> Vec<Document> {
    vec![
        Document::new(
            "warranty",
            "Every Lumen desk lamp carries a two year warranty covering defects in materials \
             and workmanship. The warranty does not cover damage from drops or water.",
        )
        .with_metadata("section", "support"),
        Document::new(
            "shipping",
            "Orders ship within two business days. Shipping is free for orders over 50 euros; \
             smaller orders pay a flat 4 euro fee.",
        )
        .with_metadata("section", "sales"),
        Document::new(
            "returns",
            "Unused lamps can be returned within 30 days for a full refund. Return shipping \
             is paid by the customer unless the lamp arrived damaged.",
        )
        .with_metadata("section", "support"),
    ]
}

#[cfg(feature = "openai")]
fn local_model() -> Option<Arc<dyn InferenceClient>> {
    use ragbot_model::openai::{DEFAULT_BASE_URL, OpenAICompatibleClient, OpenAICompatibleConfig};

    let model = std::env::var("RAGBOT_MODEL").ok()?;
    let base_url = std::env::var("RAGBOT_MODEL_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    tracing::info!(%base_url, %model, "using local model");
    let client = OpenAICompatibleClient::new(OpenAICompatibleConfig::new(base_url, model));
    Some(Arc::new(client))
}

#[cfg(not(feature = "openai"))]
fn local_model() -> Option<Arc<dyn InferenceClient>> {
    None
}

fn inference() -> Arc<dyn InferenceClient> {
    local_model().unwrap_or_else(|| {
        tracing::info!("using scripted model");
        let model = MockInference::new([
            "Lumen lamps come with",
            " a two year warranty [1]",
            " covering defects in materials and workmanship.",
        ])
        .with_delay(std::time::Duration::from_millis(150));
        Arc::new(model) as Arc<dyn InferenceClient>
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry(TelemetryConfig::from_env().with_default_filter("warn,ragbot_runner=info"))?;

    let question = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "How long is the warranty on a Lumen lamp?".to_string());

    // -- 1. Configuration from RAGBOT_* variables ----------------------------
    let config = RagConfig::from_env()?;

    // -- 2. Ingest the documents ---------------------------------------------
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(BagOfWordsEmbedder);
    let store = Arc::new(InMemoryDocumentStore::new(DIMENSIONS));
    let ingestor =
        Ingestor::new(embedder.clone(), store.clone(), Arc::new(FixedSizeChunker::new(120, 20)));
    let ids = ingestor.ingest_batch(&documents()).await?;
    println!("Ingested {} chunks\n", ids.len());

    // -- 3. Pools, retriever, orchestrator -----------------------------------
    let store: Arc<dyn DocumentStore> = store;
    let embedders = Arc::new(ResourcePool::replicated(
        "embedder",
        embedder,
        config.pool_size,
        config.acquire_timeout,
    ));
    let stores =
        Arc::new(ResourcePool::replicated("store", store, config.pool_size, config.acquire_timeout));

    let orchestrator = Orchestrator::builder()
        .retriever(Retriever::from_config(embedders, stores, &config))
        .inference(inference())
        .config(config)
        .build()?;

    // -- 4. Stream the answer ------------------------------------------------
    let query = Query::new(question.clone())
        .with_history(vec![Turn::user("Hi!"), Turn::assistant("Hello, how can I help?")]);
    println!("Q: {question}");
    print!("A: ");

    let mut stream = orchestrator.answer(query, None);
    while let Some(event) = stream.next().await {
        match event {
            GenerationEvent::Delta { text } => {
                print!("{text}");
                std::io::stdout().flush()?;
            }
            GenerationEvent::Completed { usage, .. } => {
                println!();
                if let Some(total) = usage.total_tokens {
                    println!("({total} tokens)");
                }
            }
            GenerationEvent::Failed { kind, message } => {
                println!();
                eprintln!("request failed ({kind:?}): {message}");
            }
        }
    }

    if let Some(context) = stream.context() {
        println!("\nSources:");
        for (i, hit) in context.chunks.iter().enumerate() {
            println!("  [{}] {} (score {:.3})", i + 1, hit.chunk.source, hit.score);
        }
        if context.no_context_fit {
            println!("  (no retrieved chunk fit the context budget)");
        }
    }
    println!("States: {:?}", stream.visited());

    Ok(())
}
