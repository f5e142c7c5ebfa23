//! Streaming client for OpenAI-compatible `/v1/chat/completions` servers.
//!
//! Targets locally hosted models (llama.cpp server, Ollama, LM Studio, vLLM).
//! Only available when the `openai` feature is enabled.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use ragbot_core::{
    GenerationRequest, InferenceClient, InferenceEvent, InferenceStream, Message, RagError, Result,
    Usage,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Default base URL: a local llama.cpp / LM Studio style server.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

/// Configuration for [`OpenAICompatibleClient`].
#[derive(Debug, Clone)]
pub struct OpenAICompatibleConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl OpenAICompatibleConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), model: model.into(), api_key: None }
    }

    /// Local server at [`DEFAULT_BASE_URL`].
    pub fn local(model: impl Into<String>) -> Self {
        Self::new(DEFAULT_BASE_URL, model)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// An [`InferenceClient`] streaming chat completions over server-sent events.
///
/// Dropping the returned stream drops the HTTP response, which closes the
/// connection and lets the server stop generating.
///
/// # Example
///
/// ```rust,ignore
/// use ragbot_model::openai::{OpenAICompatibleClient, OpenAICompatibleConfig};
///
/// let client = OpenAICompatibleClient::new(OpenAICompatibleConfig::local("llama-3.1-8b-instruct"));
/// ```
#[derive(Debug, Clone)]
pub struct OpenAICompatibleClient {
    client: reqwest::Client,
    endpoint: String,
    config: OpenAICompatibleConfig,
}

impl OpenAICompatibleClient {
    pub fn new(config: OpenAICompatibleConfig) -> Self {
        let endpoint = format!("{}/v1/chat/completions", config.base_url.trim_end_matches('/'));
        Self { client: reqwest::Client::new(), endpoint, config }
    }

    /// Reuse an existing HTTP client (and its connection pool).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn error(message: impl Into<String>) -> RagError {
        RagError::inference("OpenAICompatible", message)
    }
}

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    stream_options: StreamOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a Message> for ChatMessage<'a> {
    fn from(message: &'a Message) -> Self {
        Self { role: message.role.as_str(), content: &message.content }
    }
}

#[derive(Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        Self {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

// ── SSE framing ────────────────────────────────────────────────────

/// Reassembles lines from arbitrarily split network chunks.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append bytes and return every line they complete.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            lines.push(line.trim_end_matches(['\r', '\n']).to_string());
        }
        lines
    }

    /// Take the unterminated tail left when the connection closes.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        let rest = String::from_utf8_lossy(&rest);
        let rest = rest.trim_end_matches(['\r', '\n']);
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

#[derive(Debug)]
pub(crate) enum SseData {
    Chunk(ChatChunk),
    Done,
}

/// Parse one SSE line. Comments, blank lines and non-data fields yield `None`.
pub(crate) fn parse_sse_line(line: &str) -> Result<Option<SseData>> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }
    if data == "[DONE]" {
        return Ok(Some(SseData::Done));
    }
    serde_json::from_str(data)
        .map(|chunk| Some(SseData::Chunk(chunk)))
        .map_err(|e| OpenAICompatibleClient::error(format!("malformed stream chunk: {e}")))
}

/// Accumulates one streamed completion line by line.
#[derive(Debug, Default)]
pub(crate) struct Completion {
    text: String,
    usage: Usage,
    finished: bool,
    done: bool,
}

impl Completion {
    /// Apply one SSE line and return the content deltas it carries.
    pub(crate) fn apply(&mut self, line: &str) -> Result<Vec<String>> {
        let mut deltas = Vec::new();
        match parse_sse_line(line)? {
            None => {}
            Some(SseData::Done) => self.done = true,
            Some(SseData::Chunk(chunk)) => {
                if let Some(wire) = chunk.usage {
                    self.usage = wire.into();
                }
                for choice in chunk.choices {
                    self.finished |= choice.finish_reason.is_some();
                    if let Some(delta) = choice.delta.content.filter(|d| !d.is_empty()) {
                        self.text.push_str(&delta);
                        deltas.push(delta);
                    }
                }
            }
        }
        Ok(deltas)
    }

    /// `[DONE]` was received.
    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    /// The terminal event once the server closed the stream.
    ///
    /// Some servers close without sending `[DONE]`; a `finish_reason` counts
    /// as completion too.
    pub(crate) fn into_finished(self) -> Result<InferenceEvent> {
        if self.done || self.finished {
            Ok(InferenceEvent::Finished { text: self.text, usage: self.usage })
        } else {
            Err(OpenAICompatibleClient::error("stream ended before completion"))
        }
    }
}

// ── InferenceClient implementation ─────────────────────────────────

#[async_trait]
impl InferenceClient for OpenAICompatibleClient {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<InferenceStream> {
        let body = ChatRequest {
            model: &self.config.model,
            messages: request.messages.iter().map(ChatMessage::from).collect(),
            stream: true,
            stream_options: StreamOptions { include_usage: true },
            temperature: request.params.temperature,
            max_tokens: request.params.max_output_tokens,
            stop: &request.params.stop,
        };

        debug!(
            request_id = %request.request_id,
            model = %self.config.model,
            messages = body.messages.len(),
            "starting chat completion stream"
        );

        let mut http = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.config.api_key {
            http = http.bearer_auth(api_key);
        }
        let response = http.send().await.map_err(|e| {
            error!(endpoint = %self.endpoint, error = %e, "inference request failed");
            Self::error(format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!(endpoint = %self.endpoint, %status, "inference API error");
            return Err(Self::error(format!("API returned {status}: {text}")));
        }

        let mut bytes = response.bytes_stream();
        let stream = try_stream! {
            let mut lines = LineBuffer::default();
            let mut completion = Completion::default();
            let mut closed = false;

            while !closed && !completion.is_done() {
                let batch = match bytes.next().await {
                    Some(item) => {
                        let item = item.map_err(|e| Self::error(format!("stream error: {e}")))?;
                        lines.push(&item)
                    }
                    None => {
                        closed = true;
                        lines.finish().into_iter().collect()
                    }
                };
                for line in batch {
                    for delta in completion.apply(&line)? {
                        yield InferenceEvent::Delta(delta);
                    }
                    if completion.is_done() {
                        break;
                    }
                }
            }

            yield completion.into_finished()?;
        };
        Ok(Box::pin(stream))
    }
}
