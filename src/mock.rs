//! Reference external-collaborator implementations for tests: a scripted
//! model client, a canned tool registry, and a whitespace tokenizer.
//!
//! Grounded on `llm::MockLlm` (a queue of canned responses consumed one
//! invocation at a time) and `tool_source::MockToolSource` (a fixed
//! name-to-result map), reworked against this crate's stream-chunk and
//! tool-registry traits.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};

use crate::error::RuntimeError;
use crate::external::{ModelClient, ModelRequest, ModelStreamChunk, ToolDef, ToolRegistry, Tokenizer, ToolResult};
use crate::message::{ChatMessage, ToolCall};

/// One scripted model turn: a handful of tokens followed by a final message.
#[derive(Clone)]
pub struct ScriptedTurn {
    pub tokens: Vec<String>,
    pub final_message: ChatMessage,
}

impl ScriptedTurn {
    pub fn answer(tokens: impl IntoIterator<Item = impl Into<String>>, final_message: ChatMessage) -> Self {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            final_message,
        }
    }
}

/// A model client that plays back a fixed sequence of turns, one per
/// `stream` call, panicking if invoked more times than scripted.
pub struct MockModelClient {
    name: String,
    turns: Mutex<std::collections::VecDeque<ScriptedTurn>>,
}

impl MockModelClient {
    pub fn new(name: impl Into<String>, turns: Vec<ScriptedTurn>) -> Self {
        Self {
            name: name.into(),
            turns: Mutex::new(turns.into()),
        }
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, _request: ModelRequest) -> Result<BoxStream<'static, ModelStreamChunk>, RuntimeError> {
        let turn = self
            .turns
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .ok_or_else(|| RuntimeError::External("mock model has no more scripted turns".to_string()))?;

        let mut chunks: Vec<ModelStreamChunk> = turn.tokens.into_iter().map(ModelStreamChunk::Token).collect();
        chunks.push(ModelStreamChunk::Final(turn.final_message));
        Ok(Box::pin(stream::iter(chunks)))
    }
}

/// A tool registry backed by a fixed name-to-content map. Every listed
/// tool's `invoke` returns the same canned `content` regardless of
/// arguments.
pub struct MockToolRegistry {
    tools: Vec<ToolDef>,
    results: HashMap<String, String>,
}

impl MockToolRegistry {
    pub fn new(entries: Vec<(ToolDef, String)>) -> Self {
        let mut tools = Vec::with_capacity(entries.len());
        let mut results = HashMap::with_capacity(entries.len());
        for (def, result) in entries {
            results.insert(def.name.clone(), result);
            tools.push(def);
        }
        Self { tools, results }
    }
}

#[async_trait]
impl ToolRegistry for MockToolRegistry {
    fn list_tools(&self) -> Vec<ToolDef> {
        self.tools.clone()
    }

    async fn invoke(&self, call: &ToolCall) -> Result<ToolResult, RuntimeError> {
        self.results
            .get(&call.name)
            .cloned()
            .map(|content| ToolResult { content })
            .ok_or_else(|| RuntimeError::External(format!("mock tool registry has no entry for {}", call.name)))
    }
}

/// Counts tokens as whitespace-separated words across every message's
/// `content`, ignoring role/metadata. Deterministic and dependency-free,
/// sufficient for exercising the compactor's budget arithmetic in tests.
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn count(&self, messages: &[ChatMessage]) -> usize {
        messages.iter().map(|m| m.content.split_whitespace().count()).sum()
    }
}
