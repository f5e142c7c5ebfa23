//! The language-model boundary.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;
use crate::generation::{GenerationRequest, Usage};

/// One item produced by an inference backend.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceEvent {
    /// Incremental text.
    Delta(String),
    /// Generation finished. `text` is the backend's full output.
    Finished { text: String, usage: Usage },
}

/// A lazy stream of backend output. Dropping it cancels generation and
/// releases whatever the backend holds for the call.
pub type InferenceStream = Pin<Box<dyn Stream<Item = Result<InferenceEvent>> + Send>>;

/// A language-model backend, local or remote.
///
/// # Example
///
/// ```rust,ignore
/// use futures::StreamExt;
///
/// let mut stream = client.generate(&request).await?;
/// while let Some(event) = stream.next().await {
///     match event? {
///         InferenceEvent::Delta(text) => print!("{text}"),
///         InferenceEvent::Finished { usage, .. } => println!("\n{usage:?}"),
///     }
/// }
/// ```
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Backend label used in errors and logs.
    fn name(&self) -> &str;

    /// Start generating a response for `request`.
    ///
    /// Errors returned here, or yielded by the stream, are
    /// [`RagError::InferenceBackendError`](crate::RagError::InferenceBackendError)s.
    async fn generate(&self, request: &GenerationRequest) -> Result<InferenceStream>;
}
