//! # ragbot-core
//!
//! Shared types for the ragbot retrieval-augmented generation core.
//!
//! ## Overview
//!
//! - [`Query`] - a question, its history and the request id
//! - [`Chunk`] / [`RetrievalResult`] - stored content and ranked hits
//! - [`AssembledContext`] - the budget-bounded context window
//! - [`GenerationRequest`] / [`GenerationEvent`] - the model call and its output
//! - [`InferenceClient`] - the language-model boundary
//! - [`RagError`] - the error taxonomy

pub mod context;
pub mod document;
pub mod error;
pub mod generation;
pub mod inference;
pub mod query;

pub use context::{AssembledContext, DropReason, DroppedChunk, SizeMetric};
pub use document::{Chunk, RetrievalResult, ScoredChunk, SourceRef};
pub use error::{ErrorKind, RagError, Result};
pub use generation::{Answer, GenerationEvent, GenerationParams, GenerationRequest, Message, Usage};
pub use inference::{InferenceClient, InferenceEvent, InferenceStream};
pub use query::{Query, RequestId, Role, Turn};
