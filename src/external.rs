//! External collaborator interfaces the core consumes (spec.md §6).
//!
//! Grounded on `llm::LlmClient` (`invoke`, `invoke_stream`) and
//! `tools::Tool`/`tool_source::ToolSource` (`listTools`/`invoke`), narrowed
//! to exactly the surface spec.md §6 names.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::RuntimeError;
use crate::message::{ChatMessage, ToolCall};

/// A tool definition as advertised by the registry, sorted by name when
/// handed to the model (spec.md §4.7).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A chat completion request assembled by the model node.
#[derive(Clone, Debug)]
pub struct ModelRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDef>,
}

/// One chunk of a model's streamed response (spec.md §4.7): zero or more
/// `Token`s followed by exactly one `Final`.
#[derive(Clone, Debug)]
pub enum ModelStreamChunk {
    Token(String),
    Final(ChatMessage),
}

/// `stream(request) -> sequence<{token(text) | final(message)}>`. Must
/// emit exactly one `Final`, never a chunk after it.
#[async_trait]
pub trait ModelClient: Send + Sync {
    fn model_name(&self) -> &str;
    async fn stream(&self, request: ModelRequest) -> Result<BoxStream<'static, ModelStreamChunk>, RuntimeError>;
}

/// Hints a caller may supply to a [`ModelRouter`] when selecting a client.
#[derive(Clone, Debug, Default)]
pub struct RouteHints {
    pub preferred_model: Option<String>,
}

/// `route(request, hints) -> modelClient`. Takes precedence over a direct
/// model client when configured (spec.md §4.7).
#[async_trait]
pub trait ModelRouter: Send + Sync {
    async fn route(
        &self,
        request: &ModelRequest,
        hints: &RouteHints,
    ) -> Result<std::sync::Arc<dyn ModelClient>, RuntimeError>;
}

/// Result of invoking a tool.
#[derive(Clone, Debug)]
pub struct ToolResult {
    pub content: String,
}

/// `listTools() -> [toolDef]`; `invoke(call) -> result{content}`. Must be
/// thread-safe (shared across concurrent frontier node executions).
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    fn list_tools(&self) -> Vec<ToolDef>;
    async fn invoke(&self, call: &ToolCall) -> Result<ToolResult, RuntimeError>;
}

/// `count([messages]) -> int >= 0`, used by the compactor (spec.md §4.11).
pub trait Tokenizer: Send + Sync {
    fn count(&self, messages: &[ChatMessage]) -> usize;
}
