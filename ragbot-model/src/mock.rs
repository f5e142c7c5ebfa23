//! Scripted inference backend for tests and demos.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use ragbot_core::{
    GenerationRequest, InferenceClient, InferenceEvent, InferenceStream, RagError, Result, Usage,
};

#[derive(Debug, Clone)]
enum Ending {
    Finish { text: Option<String>, usage: Usage },
    Fail(String),
    /// The stream just stops, as a dropped connection would.
    Truncate,
}

#[derive(Debug, Default)]
struct Stats {
    calls: AtomicUsize,
    open_streams: AtomicUsize,
    last_request: Mutex<Option<GenerationRequest>>,
}

/// Decrements the open-stream count when the stream is dropped.
struct OpenStream(Arc<Stats>);

impl Drop for OpenStream {
    fn drop(&mut self) {
        self.0.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An [`InferenceClient`] that replays a fixed script of deltas.
///
/// # Example
///
/// ```rust,ignore
/// use ragbot_model::MockInference;
///
/// let model = MockInference::new(["Paris", " is the capital."]);
/// let failing = MockInference::new(["partial"]).fail_with("GPU fell over");
/// ```
#[derive(Debug, Clone)]
pub struct MockInference {
    name: String,
    deltas: Vec<String>,
    ending: Ending,
    start_error: Option<String>,
    delay: Duration,
    stats: Arc<Stats>,
}

impl MockInference {
    /// Stream `deltas`, then finish with their concatenation.
    pub fn new<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: "mock".to_string(),
            deltas: deltas.into_iter().map(Into::into).collect(),
            ending: Ending::Finish { text: None, usage: Usage::default() },
            start_error: None,
            delay: Duration::ZERO,
            stats: Arc::default(),
        }
    }

    /// Wait `delay` before producing each delta.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Report `text` as the final output instead of the concatenated deltas.
    pub fn with_final_text(mut self, text: impl Into<String>) -> Self {
        if let Ending::Finish { text: final_text, .. } = &mut self.ending {
            *final_text = Some(text.into());
        }
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        if let Ending::Finish { usage: final_usage, .. } = &mut self.ending {
            *final_usage = usage;
        }
        self
    }

    /// After the deltas, yield a backend error instead of finishing.
    pub fn fail_with(mut self, message: impl Into<String>) -> Self {
        self.ending = Ending::Fail(message.into());
        self
    }

    /// After the deltas, end the stream without a terminal event.
    pub fn truncated(mut self) -> Self {
        self.ending = Ending::Truncate;
        self
    }

    /// Refuse to start generating.
    pub fn fail_on_start(mut self, message: impl Into<String>) -> Self {
        self.start_error = Some(message.into());
        self
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.stats.calls.load(Ordering::SeqCst)
    }

    /// Number of streams handed out and not yet dropped.
    pub fn open_streams(&self) -> usize {
        self.stats.open_streams.load(Ordering::SeqCst)
    }

    /// The request of the most recent `generate` call.
    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.stats.last_request.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl InferenceClient for MockInference {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<InferenceStream> {
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        *self.stats.last_request.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(request.clone());

        if let Some(message) = &self.start_error {
            return Err(RagError::inference(&self.name, message.clone()));
        }

        self.stats.open_streams.fetch_add(1, Ordering::SeqCst);
        let open = OpenStream(self.stats.clone());
        let name = self.name.clone();
        let deltas = self.deltas.clone();
        let ending = self.ending.clone();
        let delay = self.delay;

        let stream = stream! {
            let _open = open;
            for delta in &deltas {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(InferenceEvent::Delta(delta.clone()));
            }
            match ending {
                Ending::Finish { text, usage } => {
                    let text = text.unwrap_or_else(|| deltas.concat());
                    yield Ok(InferenceEvent::Finished { text, usage });
                }
                Ending::Fail(message) => yield Err(RagError::inference(&name, message)),
                Ending::Truncate => {}
            }
        };
        Ok(Box::pin(stream))
    }
}
