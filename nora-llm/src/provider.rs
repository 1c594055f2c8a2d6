use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::LlmError;
use crate::types::{ChatRequest, ProviderKind};

/// Stream of text deltas produced by a streaming chat call.
pub type DeltaStream = BoxStream<'static, Result<String, LlmError>>;

/// A chat-capable LLM backend.
#[async_trait]
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> ProviderKind;

    /// Model used when the request does not override it.
    fn default_model(&self) -> &str;

    /// One request, one normalized text answer.
    async fn chat(&self, req: &ChatRequest) -> Result<String, LlmError>;

    /// Open a streamed answer. Errors before the first byte surface here;
    /// errors mid-stream are yielded as stream items.
    async fn chat_stream(&self, req: &ChatRequest) -> Result<DeltaStream, LlmError>;

    /// Cheap reachability check.
    async fn is_available(&self) -> bool;

    fn model_for<'a>(&'a self, req: &'a ChatRequest) -> &'a str {
        req.model.as_deref().unwrap_or_else(|| self.default_model())
    }
}
