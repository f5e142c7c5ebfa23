//! End-to-end request lifecycle: retrieve, assemble, prompt, generate, relay.

use std::pin::Pin;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::task::{Context, Poll};

use async_stream::stream;
use futures::{Stream, StreamExt};
use ragbot_core::{
    AssembledContext, Answer, GenerationEvent, GenerationParams, GenerationRequest,
    InferenceClient, InferenceEvent, Query, RagError, RequestId, Result,
};
use ragbot_rag::{ContextAssembler, NoContextPolicy, RagConfig, Retriever, run_cancellable};
use tracing::{debug, error, info, warn};

use crate::prompt::PromptTemplate;
use crate::registry::{CancellationRegistry, Registration};
use crate::state::{RequestControl, RequestState};

struct Inner {
    retriever: Retriever,
    assembler: ContextAssembler,
    inference: Arc<dyn InferenceClient>,
    template: PromptTemplate,
    policy: NoContextPolicy,
    default_params: GenerationParams,
    registry: CancellationRegistry,
}

/// Drives queries through retrieval, context assembly and streaming
/// generation.
///
/// Cheap to clone; clones share the cancellation registry.
///
/// # Example
///
/// ```rust,ignore
/// let orchestrator = Orchestrator::builder()
///     .config(RagConfig::from_env()?)
///     .retriever(retriever)
///     .inference(Arc::new(model))
///     .build()?;
///
/// let mut answer = orchestrator.answer(Query::new("What is covered?"), None);
/// while let Some(event) = answer.next().await {
///     // relay `event` to the caller
/// }
/// ```
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn retriever(&self) -> &Retriever {
        &self.inner.retriever
    }

    pub fn assembler(&self) -> &ContextAssembler {
        &self.inner.assembler
    }

    pub fn no_context_policy(&self) -> NoContextPolicy {
        self.inner.policy
    }

    /// Start answering `query`.
    ///
    /// The returned stream is lazy: nothing is retrieved or generated until
    /// it is first polled. It yields any number of deltas followed by exactly
    /// one terminal event, unless the request is cancelled, in which case it
    /// ends without one. `params` overrides the default generation parameters.
    pub fn answer(&self, query: Query, params: Option<GenerationParams>) -> AnswerStream {
        let request_id = query.request_id.clone();
        let control = Arc::new(RequestControl::new(request_id.clone()));
        let registration = self.inner.registry.register(request_id.clone(), control.clone());
        let shared = Arc::new(Shared {
            request_id,
            control,
            registration: Mutex::new(Some(registration)),
            context: OnceLock::new(),
            error: OnceLock::new(),
        });
        let params = params.unwrap_or_else(|| self.inner.default_params.clone());

        let inner = self.inner.clone();
        let state = shared.clone();
        let events = stream! {
            let shared = state;
            let token = shared.control.token().clone();
            let request_id = shared.request_id.clone();

            // RETRIEVING
            if !shared.enter(RequestState::Retrieving) {
                return;
            }
            info!(
                request_id = %request_id,
                query_chars = query.text.chars().count(),
                history_turns = query.history.len(),
                "answering query"
            );
            let retrieval = match inner.retriever.retrieve(&query, &token).await {
                Ok(retrieval) => retrieval,
                Err(RagError::Cancelled) => {
                    shared.log_cancelled();
                    return;
                }
                Err(e) => {
                    if let Some(event) = shared.fail(e) {
                        yield event;
                    }
                    return;
                }
            };

            // ASSEMBLING
            if !shared.enter(RequestState::Assembling) {
                return;
            }
            let context = inner.assembler.assemble(&retrieval);
            debug!(
                request_id = %request_id,
                chunk_count = context.chunks.len(),
                total_size = context.total_size,
                budget = context.budget,
                dropped = context.dropped.len(),
                "context assembled"
            );
            let _ = shared.context.set(context.clone());
            if context.no_context_fit {
                warn!(
                    request_id = %request_id,
                    budget = context.budget,
                    candidates = retrieval.len(),
                    policy = ?inner.policy,
                    "no retrieved chunk fits the context budget"
                );
                if inner.policy == NoContextPolicy::Fail {
                    let e = RagError::NoContextFit { budget: context.budget, candidates: retrieval.len() };
                    if let Some(event) = shared.fail(e) {
                        yield event;
                    }
                    return;
                }
            }

            // GENERATING
            if !shared.enter(RequestState::Generating) {
                return;
            }
            let messages = inner.template.render(&query, &context);
            let request = GenerationRequest {
                request_id: request_id.clone(),
                query,
                context,
                params,
                messages,
            };
            let backend_name = inner.inference.name().to_string();
            let mut backend = match run_cancellable(&token, inner.inference.generate(&request)).await {
                Ok(backend) => backend,
                Err(RagError::Cancelled) => {
                    shared.log_cancelled();
                    return;
                }
                Err(e) => {
                    if let Some(event) = shared.fail(backend_error(&backend_name, e)) {
                        yield event;
                    }
                    return;
                }
            };

            let mut relayed = String::new();
            loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    item = backend.next() => Some(item),
                };
                let Some(item) = next else {
                    drop(backend);
                    shared.log_cancelled();
                    return;
                };

                match item {
                    Some(Ok(InferenceEvent::Delta(text))) => {
                        if text.is_empty() {
                            continue;
                        }
                        if shared.control.is_cancelled() {
                            drop(backend);
                            shared.log_cancelled();
                            return;
                        }
                        relayed.push_str(&text);
                        yield GenerationEvent::Delta { text };
                    }
                    Some(Ok(InferenceEvent::Finished { text, usage })) => {
                        drop(backend);
                        let suffix = text.strip_prefix(relayed.as_str()).map(str::to_owned);
                        let text = match suffix {
                            Some(suffix) => {
                                if !suffix.is_empty() {
                                    if shared.control.is_cancelled() {
                                        shared.log_cancelled();
                                        return;
                                    }
                                    yield GenerationEvent::Delta { text: suffix };
                                }
                                text
                            }
                            None => {
                                warn!(
                                    request_id = %request_id,
                                    backend = %backend_name,
                                    "final text does not extend the streamed deltas, keeping the deltas"
                                );
                                std::mem::take(&mut relayed)
                            }
                        };
                        if shared.enter(RequestState::Completed) {
                            shared.release();
                            info!(
                                request_id = %request_id,
                                answer_chars = text.chars().count(),
                                completion_tokens = usage.completion_tokens,
                                "generation completed"
                            );
                            yield GenerationEvent::Completed { text, usage };
                        }
                        return;
                    }
                    Some(Err(e)) => {
                        drop(backend);
                        if let Some(event) = shared.fail(backend_error(&backend_name, e)) {
                            yield event;
                        }
                        return;
                    }
                    None => {
                        let e = RagError::inference(
                            &backend_name,
                            "stream ended without a terminal event",
                        );
                        if let Some(event) = shared.fail(e) {
                            yield event;
                        }
                        return;
                    }
                }
            }
        };

        AnswerStream { shared, events: Box::pin(events) }
    }

    /// Answer `query` and aggregate the whole response.
    pub async fn answer_whole(
        &self,
        query: Query,
        params: Option<GenerationParams>,
    ) -> Result<Answer> {
        self.answer(query, params).collect_answer().await
    }

    /// Cancel the in-flight request(s) with `request_id`.
    ///
    /// Returns `false` if no such request is in flight, or it already ended.
    pub fn cancel(&self, request_id: &RequestId) -> bool {
        let cancelled = self.inner.registry.cancel(request_id);
        if cancelled {
            info!(request_id = %request_id, "cancellation requested");
        }
        cancelled
    }

    /// Number of requests that have been started and not yet ended or dropped.
    pub fn in_flight(&self) -> usize {
        self.inner.registry.len()
    }
}

/// Normalises anything an inference backend returns into an
/// `InferenceBackendError`.
fn backend_error(backend: &str, error: RagError) -> RagError {
    match error {
        RagError::InferenceBackendError { .. } => error,
        other => RagError::inference(backend, other.to_string()),
    }
}

/// State shared between an [`AnswerStream`] handle and its generator.
struct Shared {
    request_id: RequestId,
    control: Arc<RequestControl>,
    registration: Mutex<Option<Registration>>,
    context: OnceLock<AssembledContext>,
    error: OnceLock<RagError>,
}

impl Shared {
    fn enter(&self, state: RequestState) -> bool {
        self.control.lifecycle().advance(state)
    }

    /// Leave the registry. Called once the request reaches a terminal state,
    /// before its terminal event is handed to the caller.
    fn release(&self) {
        self.registration.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    /// Move to `Failed` and build the terminal event, unless the request
    /// already ended (e.g. it was cancelled concurrently).
    fn fail(&self, error: RagError) -> Option<GenerationEvent> {
        if !self.enter(RequestState::Failed) {
            return None;
        }
        self.release();
        error!(
            request_id = %self.request_id,
            kind = ?error.kind(),
            error = %error,
            "request failed"
        );
        let event = GenerationEvent::failed(&error);
        let _ = self.error.set(error);
        Some(event)
    }

    fn log_cancelled(&self) {
        self.release();
        info!(
            request_id = %self.request_id,
            state = %self.control.lifecycle().current(),
            "request cancelled"
        );
    }
}

/// The streamed answer to one query, plus a view of its request.
///
/// Implements [`Stream`] of [`GenerationEvent`]s. Dropping it abandons the
/// request and releases everything it holds.
pub struct AnswerStream {
    shared: Arc<Shared>,
    events: Pin<Box<dyn Stream<Item = GenerationEvent> + Send>>,
}

impl AnswerStream {
    pub fn request_id(&self) -> &RequestId {
        &self.shared.request_id
    }

    pub fn state(&self) -> RequestState {
        self.shared.control.lifecycle().current()
    }

    /// Every state the request has been in, in order.
    pub fn visited(&self) -> Vec<RequestState> {
        self.shared.control.lifecycle().visited()
    }

    /// The assembled context, once the request got that far.
    pub fn context(&self) -> Option<&AssembledContext> {
        self.shared.context.get()
    }

    /// Cancel this request. No further events are delivered.
    ///
    /// Returns `false` if the request already ended.
    pub fn cancel(&self) -> bool {
        let cancelled = self.shared.control.cancel();
        self.shared.release();
        cancelled
    }

    /// Drain the stream into a single [`Answer`].
    ///
    /// # Errors
    ///
    /// The error behind a `Failed` event, or [`RagError::Cancelled`] if the
    /// request was cancelled.
    pub async fn collect_answer(mut self) -> Result<Answer> {
        while let Some(event) = self.next().await {
            match event {
                GenerationEvent::Delta { .. } => {}
                GenerationEvent::Completed { text, usage } => {
                    let context = self.shared.context.get();
                    return Ok(Answer {
                        request_id: self.shared.request_id.clone(),
                        text,
                        usage,
                        sources: context.map(AssembledContext::sources).unwrap_or_default(),
                        no_context_fit: context.is_some_and(|c| c.no_context_fit),
                    });
                }
                GenerationEvent::Failed { message, .. } => {
                    return Err(self
                        .shared
                        .error
                        .get()
                        .cloned()
                        .unwrap_or_else(|| RagError::inference("unknown", message)));
                }
            }
        }
        Err(RagError::Cancelled)
    }
}

impl Stream for AnswerStream {
    type Item = GenerationEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for AnswerStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerStream")
            .field("request_id", &self.shared.request_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Builder for an [`Orchestrator`].
///
/// `retriever` and `inference` are required. The assembler and no-context
/// policy come from `config` (defaults if unset).
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: Option<RagConfig>,
    retriever: Option<Retriever>,
    inference: Option<Arc<dyn InferenceClient>>,
    template: Option<PromptTemplate>,
    default_params: GenerationParams,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn retriever(mut self, retriever: Retriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn inference(mut self, inference: Arc<dyn InferenceClient>) -> Self {
        self.inference = Some(inference);
        self
    }

    pub fn prompt_template(mut self, template: PromptTemplate) -> Self {
        self.template = Some(template);
        self
    }

    /// Parameters used when [`Orchestrator::answer`] is given none.
    pub fn default_params(mut self, params: GenerationParams) -> Self {
        self.default_params = params;
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let config = self.config.unwrap_or_default();
        let retriever =
            self.retriever.ok_or_else(|| RagError::Config("retriever is required".to_string()))?;
        let inference =
            self.inference.ok_or_else(|| RagError::Config("inference is required".to_string()))?;

        Ok(Orchestrator {
            inner: Arc::new(Inner {
                retriever,
                assembler: ContextAssembler::from_config(&config),
                inference,
                template: self.template.unwrap_or_default(),
                policy: config.no_context_policy,
                default_params: self.default_params,
                registry: CancellationRegistry::new(),
            }),
        })
    }
}
