//! `toolExecute` node (spec.md §4.6): invokes pending tool calls in
//! canonical order under retry, appends one tool-role message per call, and
//! routes back to the `model` node.
//!
//! Grounded on the "sort canonically, invoke, emit started/finished" shape
//! implied by `tools::Tool`/`tool_source::ToolSource`'s registry-invocation
//! pattern.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::json;

use crate::builtin_channels::{MESSAGES_KEY, PENDING_TOOL_CALLS_KEY};
use crate::error::RuntimeError;
use crate::events::{Event, EventKind};
use crate::graph::node::RoutingDecision;
use crate::graph::{Node, NodeInput, NodeOutput};
use crate::identity::derive_tool_message_id;
use crate::message::{ChatMessage, Role};
use crate::nodes::MODEL_NODE_ID;
use crate::retry::with_retry;
use crate::store::StagedWrite;

pub const TOOL_EXECUTE_NODE_ID: &str = "toolExecute";

pub struct ToolExecuteNode;

#[async_trait]
impl Node for ToolExecuteNode {
    fn id(&self) -> &str {
        TOOL_EXECUTE_NODE_ID
    }

    async fn run(&self, input: NodeInput) -> Result<NodeOutput, RuntimeError> {
        let mut calls = input
            .store
            .get(PENDING_TOOL_CALLS_KEY)
            .map_err(RuntimeError::Reducer)?;
        calls.sort_by(|a, b| (a.name.as_str(), a.id.as_str()).cmp(&(b.name.as_str(), b.id.as_str())));

        let registry = input
            .environment
            .tool_registry
            .as_ref()
            .ok_or(RuntimeError::ToolRegistryMissing)?;

        let mut new_messages = Vec::with_capacity(calls.len());
        for call in &calls {
            input
                .emit
                .emit(
                    Event::new(
                        input.run_id,
                        input.attempt_id,
                        input.clock.now_ns(),
                        EventKind::ToolInvocationStarted {
                            tool_name: call.name.clone(),
                        },
                    )
                    .with_metadata(json!({ "toolCallID": call.id })),
                )
                .await;

            let retry_policy = input.environment.tool_retry_policy;
            let outcome = with_retry(retry_policy, &input.clock, || registry.invoke(call)).await;
            match &outcome {
                Ok(_) => tracing::debug!(tool_name = %call.name, tool_call_id = %call.id, "tool invocation succeeded"),
                Err(err) => tracing::warn!(tool_name = %call.name, tool_call_id = %call.id, error = %err, "tool invocation failed"),
            }

            input
                .emit
                .emit(
                    Event::new(
                        input.run_id,
                        input.attempt_id,
                        input.clock.now_ns(),
                        EventKind::ToolInvocationFinished {
                            tool_name: call.name.clone(),
                            success: outcome.is_ok(),
                        },
                    )
                    .with_metadata(json!({ "toolCallID": call.id })),
                )
                .await;

            let result = outcome?;
            new_messages.push(ChatMessage {
                id: derive_tool_message_id(&call.id, false),
                tool_call_id: Some(call.id.clone()),
                ..ChatMessage::new("", Role::Tool, result.content)
            });
        }

        let writes = vec![
            StagedWrite::new(MESSAGES_KEY, self.id(), 0, new_messages),
            StagedWrite::new(PENDING_TOOL_CALLS_KEY, self.id(), 0, Vec::new()),
        ];

        Ok(NodeOutput {
            writes,
            routing_override: Some(RoutingDecision::Nodes(back_to_model())),
            interrupt: None,
        })
    }
}

fn back_to_model() -> HashSet<String> {
    let mut set = HashSet::new();
    set.insert(MODEL_NODE_ID.to_string());
    set
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::builtin_channels::builtin_channel_specs;
    use crate::clock::ManualClock;
    use crate::environment::Environment;
    use crate::events::event_channel;
    use crate::external::ToolDef;
    use crate::identity::{derive_task_id, AttemptId, RunId};
    use crate::interrupt::ApprovalPolicy;
    use crate::message::ToolCall;
    use crate::mock::MockToolRegistry;
    use crate::retry::RetryPolicy;
    use crate::store::ChannelStore;

    fn environment(registry: MockToolRegistry) -> Environment {
        Environment {
            model_client: None,
            model_router: None,
            tool_registry: Some(Arc::new(registry)),
            tokenizer: None,
            compaction_policy: None,
            approval_policy: ApprovalPolicy::Never,
            model_retry_policy: RetryPolicy::None,
            tool_retry_policy: RetryPolicy::None,
        }
    }

    fn call(name: &str, id: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: serde_json::json!({}),
        }
    }

    /// Tool calls are invoked in canonical `(name, id)` order (spec.md §4.6)
    /// regardless of the order they were staged in.
    #[tokio::test]
    async fn invokes_pending_calls_in_canonical_name_then_id_order() {
        let registry = MockToolRegistry::new(vec![
            (
                ToolDef {
                    name: "beta".to_string(),
                    description: "".to_string(),
                    parameters: serde_json::json!({}),
                },
                "B".to_string(),
            ),
            (
                ToolDef {
                    name: "alpha".to_string(),
                    description: "".to_string(),
                    parameters: serde_json::json!({}),
                },
                "A".to_string(),
            ),
        ]);
        let mut store = ChannelStore::new(builtin_channel_specs());
        store
            .commit(vec![StagedWrite::new(
                PENDING_TOOL_CALLS_KEY,
                "test",
                0,
                vec![call("beta", "c2"), call("alpha", "c1")],
            )])
            .unwrap();

        let (emit, _events) = event_channel();
        let run_id = RunId::new();
        let attempt_id = AttemptId::new();
        let input = NodeInput {
            store: store.snapshot(),
            run_id,
            attempt_id,
            step_index: 0,
            task_id: derive_task_id(run_id, attempt_id, 0, TOOL_EXECUTE_NODE_ID),
            emit,
            clock: Arc::new(ManualClock::new()),
            environment: Arc::new(environment(registry)),
            resume_value: None,
        };

        let output = ToolExecuteNode.run(input).await.unwrap();
        store.commit(output.writes).unwrap();
        let snapshot = store.snapshot();

        let messages = snapshot.get(MESSAGES_KEY).unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["A", "B"]);
        assert_eq!(messages[0].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(messages[1].tool_call_id.as_deref(), Some("c2"));

        let pending = snapshot.get(PENDING_TOOL_CALLS_KEY).unwrap();
        assert!(pending.is_empty());

        assert!(matches!(output.routing_override, Some(RoutingDecision::Nodes(ref nodes)) if nodes.contains(MODEL_NODE_ID)));
    }

    #[tokio::test]
    async fn propagates_a_tool_invocation_error() {
        let registry = MockToolRegistry::new(Vec::new());
        let mut store = ChannelStore::new(builtin_channel_specs());
        store
            .commit(vec![StagedWrite::new(PENDING_TOOL_CALLS_KEY, "test", 0, vec![call("missing", "c1")])])
            .unwrap();

        let (emit, _events) = event_channel();
        let run_id = RunId::new();
        let attempt_id = AttemptId::new();
        let input = NodeInput {
            store: store.snapshot(),
            run_id,
            attempt_id,
            step_index: 0,
            task_id: derive_task_id(run_id, attempt_id, 0, TOOL_EXECUTE_NODE_ID),
            emit,
            clock: Arc::new(ManualClock::new()),
            environment: Arc::new(environment(registry)),
            resume_value: None,
        };

        let err = ToolExecuteNode.run(input).await.unwrap_err();
        assert!(matches!(err, RuntimeError::External(_)));
    }
}
