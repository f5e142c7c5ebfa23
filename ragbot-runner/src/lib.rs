//! # ragbot-runner
//!
//! The generation orchestrator: owns each request from query to final event.
//!
//! ## Overview
//!
//! - [`Orchestrator`] - retrieval, context assembly, prompting and streaming
//! - [`AnswerStream`] - the event stream of one request, with its state
//! - [`RequestState`] - the per-request lifecycle
//! - [`PromptTemplate`] - how context and history become chat messages
//! - [`CancellationRegistry`] - in-flight requests by request id
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use ragbot_core::{GenerationEvent, Query};
//! use ragbot_runner::Orchestrator;
//!
//! let orchestrator = Orchestrator::builder()
//!     .config(config)
//!     .retriever(retriever)
//!     .inference(model)
//!     .build()?;
//!
//! let mut stream = orchestrator.answer(Query::new("How long is the warranty?"), None);
//! while let Some(event) = stream.next().await {
//!     match event {
//!         GenerationEvent::Delta { text } => print!("{text}"),
//!         GenerationEvent::Completed { .. } => println!(),
//!         GenerationEvent::Failed { message, .. } => eprintln!("error: {message}"),
//!     }
//! }
//! ```

pub mod orchestrator;
pub mod prompt;
pub mod registry;
pub mod state;

pub use orchestrator::{AnswerStream, Orchestrator, OrchestratorBuilder};
pub use prompt::{DEFAULT_INSTRUCTIONS, PromptTemplate};
pub use registry::{CancellationRegistry, Registration};
pub use state::{Lifecycle, RequestControl, RequestState};
