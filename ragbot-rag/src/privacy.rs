//! Name anonymisation applied to source text before it is chunked.

use std::sync::Arc;

use ragbot_core::{Chunk, RagError, Result};
use regex::{NoExpand, Regex, RegexBuilder};

use crate::chunking::{Chunker, Document};

/// Replacement for every anonymised name.
pub const ANONYMIZED_PERSON: &str = "[ANONYMIZED_PERSON]";

/// Replaces whole-word, case-insensitive occurrences of sensitive names.
///
/// All names are matched in a single pass, longest first, so a name that is
/// a prefix of another ("Bob" and "Bob Thebuilder") never splits the longer
/// one, and placeholders are never re-matched.
#[derive(Debug, Clone)]
pub struct Anonymizer {
    pattern: Option<Regex>,
    placeholder: String,
}

impl Anonymizer {
    /// Build an anonymiser for `names`. Blank names are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the combined pattern exceeds the
    /// regex size limit.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        names.sort_by_cached_key(|n| (std::cmp::Reverse(n.chars().count()), n.to_lowercase()));
        names.dedup_by(|a, b| a.to_lowercase() == b.to_lowercase());

        let pattern = if names.is_empty() {
            None
        } else {
            let alternation =
                names.iter().map(|n| regex::escape(n)).collect::<Vec<_>>().join("|");
            let regex = RegexBuilder::new(&format!(r"\b(?:{alternation})\b"))
                .case_insensitive(true)
                .build()
                .map_err(|e| RagError::Config(format!("cannot build anonymiser: {e}")))?;
            Some(regex)
        };

        Ok(Self { pattern, placeholder: ANONYMIZED_PERSON.to_string() })
    }

    /// Use `placeholder` instead of [`ANONYMIZED_PERSON`].
    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Whether any name is configured.
    pub fn is_empty(&self) -> bool {
        self.pattern.is_none()
    }

    pub fn anonymize(&self, text: &str) -> String {
        match &self.pattern {
            Some(pattern) => pattern.replace_all(text, NoExpand(&self.placeholder)).into_owned(),
            None => text.to_string(),
        }
    }
}

/// A [`Chunker`] that anonymises the document text and metadata values
/// before delegating to another chunker.
///
/// Offsets of the produced chunks refer to the anonymised text.
pub struct AnonymizingChunker {
    inner: Arc<dyn Chunker>,
    anonymizer: Anonymizer,
}

impl AnonymizingChunker {
    pub fn new(inner: Arc<dyn Chunker>, anonymizer: Anonymizer) -> Self {
        Self { inner, anonymizer }
    }
}

impl Chunker for AnonymizingChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if self.anonymizer.is_empty() {
            return self.inner.chunk(document);
        }
        let mut document = document.clone();
        document.text = self.anonymizer.anonymize(&document.text);
        for value in document.metadata.values_mut() {
            *value = self.anonymizer.anonymize(value);
        }
        self.inner.chunk(&document)
    }
}
