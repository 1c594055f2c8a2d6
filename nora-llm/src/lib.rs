//! nora-llm – LLM provider adapter for the Nora gateway.
//!
//! Translates a provider-neutral [`ChatRequest`] into the HTTP calls of a
//! local Ollama server or the Google Gemini REST API and normalizes the
//! answer into plain text, either in one piece or as a stream of deltas.
//!
//! Provider selection is a static table ([`ProviderRegistry`]); when a call
//! fails the registry may try the other provider once. There are no retries.

pub mod error;
pub mod gemini;
pub mod ollama;
pub mod provider;
pub mod registry;
mod stream;
pub mod types;

pub use error::LlmError;
pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use provider::{DeltaStream, LlmProvider};
pub use registry::{ProviderInfo, ProviderRegistry, ProviderSettings};
pub use types::{ChatMessage, ChatRequest, Completion, ProviderKind, Role};
