//! Generation request and response event types.

use serde::{Deserialize, Serialize};

use crate::context::AssembledContext;
use crate::document::SourceRef;
use crate::error::{ErrorKind, RagError};
use crate::query::{Query, RequestId, Role};

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Sequences that end generation when produced.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl GenerationParams {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }

    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop.push(stop.into());
        self
    }
}

/// One message of the rendered prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

/// The exact payload handed to an inference backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub request_id: RequestId,
    pub query: Query,
    pub context: AssembledContext,
    pub params: GenerationParams,
    /// The prompt rendered from `query` and `context`.
    pub messages: Vec<Message>,
}

/// Token accounting reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

/// One unit of a streamed answer.
///
/// A stream holds any number of `Delta`s followed by exactly one terminal
/// event. Concatenated deltas equal the `Completed` text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    /// A piece of generated text.
    Delta { text: String },
    /// Generation finished successfully.
    Completed { text: String, usage: Usage },
    /// Generation failed. Earlier deltas are an incomplete answer.
    Failed { kind: ErrorKind, message: String },
}

impl GenerationEvent {
    pub fn failed(error: &RagError) -> Self {
        Self::Failed { kind: error.kind(), message: error.to_string() }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Delta { .. })
    }
}

/// A whole, aggregated answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub request_id: RequestId,
    pub text: String,
    pub usage: Usage,
    /// Provenance of the context chunks the answer was grounded on.
    pub sources: Vec<SourceRef>,
    /// The answer was generated without context because nothing fit.
    pub no_context_fit: bool,
}
