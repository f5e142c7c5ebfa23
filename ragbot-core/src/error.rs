//! Error taxonomy shared by every ragbot crate.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while answering a query.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RagError {
    /// The embedding function failed to produce a vector for the query.
    #[error("Embedding failed ({provider}): {message}")]
    EmbeddingFailed {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The backing index of the document store could not be reached.
    #[error("Document store unavailable ({backend}): {message}")]
    StoreUnavailable {
        /// The store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A vector's length does not match the index's configured dimension.
    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    InvalidEmbeddingDimension {
        /// The dimension the index was configured with.
        expected: usize,
        /// The length of the offered vector.
        actual: usize,
    },

    /// Retrieval produced candidates but none fit into the context budget.
    ///
    /// This is a soft condition: it only aborts a request when the
    /// no-context-fit policy is `fail`.
    #[error("No retrieved chunk fits the context budget of {budget} ({candidates} candidates)")]
    NoContextFit {
        /// The configured context budget.
        budget: usize,
        /// How many candidates were considered.
        candidates: usize,
    },

    /// A pooled resource could not be checked out in time.
    #[error("Timed out after {waited:?} waiting for a '{pool}' pool slot")]
    ResourcePoolTimeout {
        /// The pool that was exhausted.
        pool: String,
        /// How long the caller waited.
        waited: Duration,
    },

    /// The inference backend reported an error or the transport failed.
    #[error("Inference backend error ({backend}): {message}")]
    InferenceBackendError {
        /// The backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The caller withdrew the request.
    #[error("Request cancelled")]
    Cancelled,

    /// A chunk with this identifier is already stored.
    #[error("Chunk '{0}' already exists in the store")]
    DuplicateChunk(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source material offered for ingestion could not be parsed.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

impl RagError {
    /// Return the serialisable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmbeddingFailed { .. } => ErrorKind::EmbeddingFailed,
            Self::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
            Self::InvalidEmbeddingDimension { .. } => ErrorKind::InvalidEmbeddingDimension,
            Self::NoContextFit { .. } => ErrorKind::NoContextFit,
            Self::ResourcePoolTimeout { .. } => ErrorKind::ResourcePoolTimeout,
            Self::InferenceBackendError { .. } => ErrorKind::InferenceBackendError,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::DuplicateChunk(_) => ErrorKind::DuplicateChunk,
            Self::Config(_) => ErrorKind::Config,
            Self::InvalidDocument(_) => ErrorKind::InvalidDocument,
        }
    }

    /// Shorthand for an [`RagError::InferenceBackendError`].
    pub fn inference(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InferenceBackendError { backend: backend.into(), message: message.into() }
    }

    /// Shorthand for a [`RagError::StoreUnavailable`].
    pub fn store_unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreUnavailable { backend: backend.into(), message: message.into() }
    }
}

/// The kind of a [`RagError`], as relayed to callers inside a terminal
/// error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmbeddingFailed,
    StoreUnavailable,
    InvalidEmbeddingDimension,
    NoContextFit,
    ResourcePoolTimeout,
    InferenceBackendError,
    Cancelled,
    DuplicateChunk,
    Config,
    InvalidDocument,
}

/// A convenience result type for ragbot operations.
pub type Result<T> = std::result::Result<T, RagError>;
