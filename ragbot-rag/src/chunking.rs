//! Splitting source documents into chunks for ingestion.

use std::collections::HashMap;

use ragbot_core::{Chunk, SourceRef};
use serde::{Deserialize, Serialize};

/// A source document to be chunked and indexed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub text: String,
    /// Version stamp copied onto every chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), version: None, metadata: HashMap::new() }
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A strategy for splitting documents into chunks.
///
/// Produced chunks carry text, provenance and metadata but an empty
/// embedding; the ingestor attaches embeddings.
pub trait Chunker: Send + Sync {
    /// Split a document. Returns an empty `Vec` for empty text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text into windows of `chunk_size` characters, consecutive windows
/// sharing `chunk_overlap` characters.
///
/// Chunk IDs are `{document_id}_{chunk_index}`; the source offset is the
/// window's starting character. Each chunk inherits the document metadata
/// plus a `chunk_index` field.
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// A zero `chunk_size` is treated as one; an overlap that is not smaller
    /// than the chunk size is reduced to `chunk_size - 1`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self { chunk_size, chunk_overlap: chunk_overlap.min(chunk_size - 1) }
    }
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let chars: Vec<char> = document.text.chars().collect();
        let step = self.chunk_size - self.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            let index = chunks.len();

            let mut metadata = document.metadata.clone();
            metadata.insert("chunk_index".to_string(), index.to_string());

            chunks.push(Chunk {
                id: format!("{}_{index}", document.id),
                text: chars[start..end].iter().collect(),
                source: SourceRef::new(&document.id, start),
                embedding: Vec::new(),
                version: document.version,
                metadata,
            });

            if end == chars.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_overlap_and_track_offsets() {
        let doc = Document::new("d", "abcdefghij").with_version(3);
        let chunks = FixedSizeChunker::new(4, 1).chunk(&doc);
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["abcd", "defg", "ghij"]);
        let offsets: Vec<usize> = chunks.iter().map(|c| c.source.offset).collect();
        assert_eq!(offsets, [0, 3, 6]);
        assert_eq!(chunks[2].id, "d_2");
        assert_eq!(chunks[2].version, Some(3));
        assert_eq!(chunks[2].metadata["chunk_index"], "2");
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let doc = Document::new("d", "héllo wörld");
        let chunks = FixedSizeChunker::new(3, 0).chunk(&doc);
        assert_eq!(chunks.iter().map(|c| c.text.as_str()).collect::<String>(), "héllo wörld");
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        assert!(FixedSizeChunker::new(10, 2).chunk(&Document::new("d", "")).is_empty());
    }
}
