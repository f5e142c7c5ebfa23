//! Data types for stored chunks and retrieval results.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a chunk's text came from: a document and a character offset into it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceRef {
    /// The ID of the source document.
    pub document_id: String,
    /// Character offset of the chunk's first character within the document.
    pub offset: usize,
}

impl SourceRef {
    pub fn new(document_id: impl Into<String>, offset: usize) -> Self {
        Self { document_id: document_id.into(), offset }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.document_id, self.offset)
    }
}

/// A unit of retrievable content with its vector embedding.
///
/// Chunks are never mutated once stored; the store creates them on ingestion
/// and removes them only on explicit deletion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Identifier, unique within a store.
    pub id: String,
    /// The text body.
    pub text: String,
    /// Provenance of the text.
    pub source: SourceRef,
    /// The vector embedding of `text`.
    pub embedding: Vec<f32>,
    /// Optional freshness/version stamp of the source document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Key-value metadata inherited from the source document.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A retrieved [`Chunk`] paired with a relevance score in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Ranked retrieval hits: scores descending, ties broken by ascending chunk id.
///
/// The only way to build one is [`RetrievalResult::ranked`], so every value
/// upholds the ordering.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    /// Rank arbitrary hits and keep at most `k` of them.
    ///
    /// Non-finite scores are discarded and the rest are clamped to `[0, 1]`.
    pub fn ranked(hits: impl IntoIterator<Item = ScoredChunk>, k: usize) -> Self {
        let mut hits: Vec<ScoredChunk> = hits
            .into_iter()
            .filter(|hit| hit.score.is_finite())
            .map(|mut hit| {
                hit.score = hit.score.clamp(0.0, 1.0);
                hit
            })
            .collect();
        hits.sort_by(compare_hits);
        hits.truncate(k);
        Self { hits }
    }

    /// An empty result.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn hits(&self) -> &[ScoredChunk] {
        &self.hits
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredChunk> {
        self.hits.iter()
    }

    /// Drop every hit scoring below `min_score`. Order is preserved.
    pub fn filter_min_score(mut self, min_score: f32) -> Self {
        self.hits.retain(|hit| hit.score >= min_score);
        self
    }

    pub fn into_hits(self) -> Vec<ScoredChunk> {
        self.hits
    }
}

impl<'a> IntoIterator for &'a RetrievalResult {
    type Item = &'a ScoredChunk;
    type IntoIter = std::slice::Iter<'a, ScoredChunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

fn compare_hits(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.chunk.id.cmp(&b.chunk.id))
}
