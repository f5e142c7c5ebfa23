//! # ragbot-rag
//!
//! Retrieval side of the ragbot core: store and embedding boundaries, pooled
//! handles, the retriever and the context assembler.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ragbot_rag::{ContextAssembler, InMemoryDocumentStore, RagConfig, ResourcePool, Retriever};
//!
//! let config = RagConfig::builder().context_budget(2000).top_k(5).build()?;
//! let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new(64));
//! let stores = Arc::new(ResourcePool::replicated("store", store, config.pool_size, config.acquire_timeout));
//! let embedders = Arc::new(ResourcePool::replicated("embedder", embedder, config.pool_size, config.acquire_timeout));
//!
//! let retriever = Retriever::from_config(embedders, stores, &config);
//! let assembler = ContextAssembler::from_config(&config);
//! let context = assembler.assemble(&retriever.retrieve(&query, &cancel).await?);
//! ```
//!
//! Structured sources go through [`RecordSplitter`] (one document per JSON or
//! CSV record, sensitive names anonymised); free text can be anonymised at
//! chunking time with [`AnonymizingChunker`].
//!
//! ## Features
//!
//! - `openai`: [`openai::OpenAICompatibleEmbedder`] for `/v1/embeddings` servers

pub mod assembler;
pub mod cancel;
pub mod chunking;
pub mod config;
pub mod embedding;
pub mod ingest;
pub mod inmemory;
#[cfg(feature = "openai")]
pub mod openai;
pub mod pool;
pub mod privacy;
pub mod records;
pub mod retriever;
pub mod store;

pub use assembler::ContextAssembler;
pub use cancel::run_cancellable;
pub use chunking::{Chunker, Document, FixedSizeChunker};
pub use config::{NoContextPolicy, RagConfig, RagConfigBuilder};
pub use embedding::EmbeddingProvider;
pub use ingest::Ingestor;
pub use inmemory::InMemoryDocumentStore;
pub use pool::{PoolGuard, ResourcePool};
pub use privacy::{ANONYMIZED_PERSON, Anonymizer, AnonymizingChunker};
pub use records::RecordSplitter;
pub use retriever::{EmbedderPool, Retriever, StorePool};
pub use store::{DocumentStore, WritableDocumentStore};
