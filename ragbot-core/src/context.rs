//! The bounded context window handed to the model.

use serde::{Deserialize, Serialize};

use crate::document::{ScoredChunk, SourceRef};

/// How the size of a piece of context text is measured against the budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeMetric {
    /// Unicode scalar values.
    #[default]
    Chars,
    /// UTF-8 bytes.
    Bytes,
    /// A rough token estimate: one token per four characters, rounded up.
    ApproxTokens,
}

impl SizeMetric {
    /// Measure `text` in this metric's unit.
    pub fn measure(&self, text: &str) -> usize {
        match self {
            Self::Chars => text.chars().count(),
            Self::Bytes => text.len(),
            Self::ApproxTokens => text.chars().count().div_ceil(4),
        }
    }
}

/// Why a retrieved candidate was left out of the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Adding the chunk would have exceeded the budget.
    OverBudget,
    /// A higher-scoring chunk with the same source reference was kept.
    Duplicate,
}

/// A candidate that did not make it into the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedChunk {
    pub chunk_id: String,
    pub source: SourceRef,
    pub score: f32,
    pub size: usize,
    pub reason: DropReason,
}

/// Selected chunks in descending relevance order, plus bookkeeping about what
/// was left out.
///
/// `total_size <= budget` always holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledContext {
    pub chunks: Vec<ScoredChunk>,
    pub total_size: usize,
    pub budget: usize,
    pub metric: SizeMetric,
    pub dropped: Vec<DroppedChunk>,
    /// Candidates existed but none fit into the budget.
    pub no_context_fit: bool,
}

impl AssembledContext {
    /// An empty context for the given budget.
    pub fn empty(budget: usize, metric: SizeMetric) -> Self {
        Self {
            chunks: Vec::new(),
            total_size: 0,
            budget,
            metric,
            dropped: Vec::new(),
            no_context_fit: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Provenance of the selected chunks, in context order.
    pub fn sources(&self) -> Vec<SourceRef> {
        self.chunks.iter().map(|c| c.chunk.source.clone()).collect()
    }

    /// IDs of the selected chunks, in context order.
    pub fn chunk_ids(&self) -> Vec<&str> {
        self.chunks.iter().map(|c| c.chunk.id.as_str()).collect()
    }
}
