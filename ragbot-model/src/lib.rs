//! # ragbot-model
//!
//! Inference backends for ragbot.
//!
//! ## Overview
//!
//! - [`MockInference`] - scripted deltas for tests and demos
//! - [`openai::OpenAICompatibleClient`] - streaming chat completions from a
//!   local OpenAI-compatible server (`openai` feature)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ragbot_model::openai::{OpenAICompatibleClient, OpenAICompatibleConfig};
//!
//! let model = OpenAICompatibleClient::new(
//!     OpenAICompatibleConfig::new("http://127.0.0.1:11434", "llama3.1"),
//! );
//! ```

pub mod mock;
#[cfg(feature = "openai")]
pub mod openai;

pub use mock::MockInference;
