//! Shared test doubles for the integration tests in this directory.
//!
//! `mock.rs` in the library itself is `#[cfg(test)]`-gated (unit-test only),
//! so integration tests need their own minimal stand-ins rather than
//! reaching into the crate's private test support.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};

use skein::error::RuntimeError;
use skein::external::{ModelClient, ModelRequest, ModelStreamChunk, ToolDef, ToolRegistry, ToolResult};
use skein::interrupt::ApprovalPolicy;
use skein::message::{ChatMessage, Role, ToolCall};
use skein::retry::RetryPolicy;
use skein::Environment;

/// Answers immediately with a fixed final message, no tool calls.
pub struct ImmediateAnswerModel {
    pub answer: &'static str,
}

#[async_trait]
impl ModelClient for ImmediateAnswerModel {
    fn model_name(&self) -> &str {
        "immediate"
    }
    async fn stream(&self, _request: ModelRequest) -> Result<BoxStream<'static, ModelStreamChunk>, RuntimeError> {
        let message = ChatMessage::new("unused", Role::Assistant, self.answer);
        Ok(Box::pin(stream::iter(vec![ModelStreamChunk::Final(message)])))
    }
}

/// Emits one tool call on its first invocation, then a final answer.
pub struct CallsThenAnswersModel {
    pub tool_name: &'static str,
    pub answer: &'static str,
    called: Mutex<bool>,
}

impl CallsThenAnswersModel {
    pub fn new(tool_name: &'static str, answer: &'static str) -> Self {
        Self {
            tool_name,
            answer,
            called: Mutex::new(false),
        }
    }
}

#[async_trait]
impl ModelClient for CallsThenAnswersModel {
    fn model_name(&self) -> &str {
        "calls-then-answers"
    }
    async fn stream(&self, _request: ModelRequest) -> Result<BoxStream<'static, ModelStreamChunk>, RuntimeError> {
        let mut called = self.called.lock().expect("lock poisoned");
        if !*called {
            *called = true;
            let message = ChatMessage {
                tool_calls: vec![ToolCall {
                    id: "call-1".to_string(),
                    name: self.tool_name.to_string(),
                    arguments: serde_json::json!({}),
                }],
                ..ChatMessage::new("unused", Role::Assistant, "")
            };
            Ok(Box::pin(stream::iter(vec![ModelStreamChunk::Final(message)])))
        } else {
            let message = ChatMessage::new("unused", Role::Assistant, self.answer);
            Ok(Box::pin(stream::iter(vec![ModelStreamChunk::Final(message)])))
        }
    }
}

pub struct NoTools;

#[async_trait]
impl ToolRegistry for NoTools {
    fn list_tools(&self) -> Vec<ToolDef> {
        Vec::new()
    }
    async fn invoke(&self, _call: &ToolCall) -> Result<ToolResult, RuntimeError> {
        unreachable!("no tool calls are ever requested in this environment")
    }
}

/// A single registered tool that echoes back a fixed result string.
pub struct EchoTool {
    pub name: &'static str,
    pub result: &'static str,
}

#[async_trait]
impl ToolRegistry for EchoTool {
    fn list_tools(&self) -> Vec<ToolDef> {
        vec![ToolDef {
            name: self.name.to_string(),
            description: "test tool".to_string(),
            parameters: serde_json::json!({}),
        }]
    }
    async fn invoke(&self, _call: &ToolCall) -> Result<ToolResult, RuntimeError> {
        Ok(ToolResult {
            content: self.result.to_string(),
        })
    }
}

pub fn environment_with_immediate_model(answer: &'static str) -> Environment {
    Environment {
        model_client: Some(Arc::new(ImmediateAnswerModel { answer })),
        model_router: None,
        tool_registry: Some(Arc::new(NoTools)),
        tokenizer: None,
        compaction_policy: None,
        approval_policy: ApprovalPolicy::Never,
        model_retry_policy: RetryPolicy::None,
        tool_retry_policy: RetryPolicy::None,
    }
}
