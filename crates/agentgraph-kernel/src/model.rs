//! Model and embedder provider interfaces.
//!
//! These are the "external collaborator, interface only" seams for LLM
//! calls and embedding calls: concrete provider SDKs live outside this
//! crate and are consumed only through [`Model`]/[`Embedder`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GraphResult;

/// One generation request to a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub instruction: String,
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub tools: Vec<Value>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub response_schema: Option<Value>,
}

/// A streamed chunk of a model's response.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelResponseChunk {
    pub delta_content: Option<String>,
    pub role: Option<String>,
    pub tool_calls: Vec<Value>,
    pub finish_reason: Option<String>,
    pub usage: Option<Value>,
}

/// Static metadata describing a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
    pub supports_tools: bool,
    pub supports_streaming: bool,
}

/// A resolvable, callable model.
///
/// Implementations wrap a concrete provider SDK. This crate never
/// implements one itself.
#[async_trait]
pub trait Model: Send + Sync {
    fn info(&self) -> ModelInfo;

    /// Stream a response. Each item is one chunk of the response.
    async fn generate_content(
        &self,
        request: GenerateRequest,
    ) -> GraphResult<BoxStream<'static, GraphResult<ModelResponseChunk>>>;
}

/// Resolves model ids (as configured in the DSL's `model_spec`) to a
/// callable [`Model`].
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn get(&self, id: &str) -> GraphResult<std::sync::Arc<dyn Model>>;
}

/// A resolvable, callable embedder.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;
    async fn embed(&self, text: &str) -> GraphResult<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> GraphResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// Resolves embedder ids to a callable [`Embedder`].
#[async_trait]
pub trait EmbedderProvider: Send + Sync {
    async fn get(&self, id: &str) -> GraphResult<std::sync::Arc<dyn Embedder>>;
}

/// One item of the synthetic input sequence a summarizer consumes: either
/// the previous summary text (carried as a synthetic system entry) or one
/// event from the session's log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerInput {
    pub author: String,
    pub content: String,
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

/// What a summarizer produces for a single delta summarize call.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SummarizerOutput {
    pub text: String,
    #[serde(default)]
    pub topics: Vec<String>,
    /// The summarizer's own opinion of the last event timestamp it folded
    /// in, when it can report one more precisely than "the latest input".
    #[serde(default)]
    pub last_included_timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

/// The "external collaborator, interface only" seam the delta-summarization
/// algorithm calls through — a concrete implementation is typically a thin
/// wrapper over a [`Model`], but the algorithm itself only needs this
/// narrower contract.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Whether this input sequence is worth spending a call on. The delta
    /// algorithm skips the call (and leaves the summary untouched) when this
    /// returns `false` and the caller didn't force it.
    async fn should_summarize(&self, input: &[SummarizerInput]) -> GraphResult<bool>;

    /// Produce a new summary from the input sequence. An empty `text` in the
    /// result means "nothing worth persisting" and is treated like a no-op
    /// by the caller.
    async fn summarize(&self, input: &[SummarizerInput]) -> GraphResult<SummarizerOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_request_defaults() {
        let json = serde_json::json!({"instruction": "hi"});
        let req: GenerateRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.instruction, "hi");
        assert!(req.messages.is_empty());
        assert!(req.temperature.is_none());
    }
}
