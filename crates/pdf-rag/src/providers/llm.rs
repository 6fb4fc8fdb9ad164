//! LLM provider trait for conversation turns

use async_trait::async_trait;
use crate::error::Result;
use crate::types::{ToolSpec, Turn};

/// Trait for chat models that may answer or request tools
///
/// Implementations:
/// - `OllamaLlm`: Local Ollama server (llama3.1, qwen2.5, etc.)
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Produce the next assistant turn for `messages`.
    ///
    /// With `tools` empty the reply is expected to be a final answer; otherwise
    /// it may carry invocation requests for the advertised tools.
    async fn generate(&self, messages: &[Turn], tools: &[ToolSpec]) -> Result<Turn>;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
