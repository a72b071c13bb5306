//! `model` node (spec.md §4.7): assembles a chat request, consumes the
//! model's stream under the strict chunk protocol, rewrites the final
//! message's id deterministically, and stages the resulting writes.
//!
//! Grounded on `agent/react/think_node.rs`'s `self.llm.invoke_stream(...)`
//! fan-out and deterministic-rewrite-on-success shape, reworked against
//! this spec's `{Token, Final}` chunk enum and its strict protocol
//! violations (chunk after final, two finals, missing final).

use async_trait::async_trait;
use futures::StreamExt;

use crate::builtin_channels::{FINAL_ANSWER_KEY, LLM_INPUT_MESSAGES_KEY, MESSAGES_KEY, PENDING_TOOL_CALLS_KEY};
use crate::error::RuntimeError;
use crate::events::{Event, EventKind};
use crate::external::{ModelRequest, ModelStreamChunk};
use crate::graph::node::RoutingDecision;
use crate::graph::{Node, NodeInput, NodeOutput};
use crate::identity::{derive_role_message_id, IdRole};
use crate::message::ChatMessage;
use crate::retry::with_retry;
use crate::store::{StagedWrite, StoreSnapshot};

pub const MODEL_NODE_ID: &str = "model";

pub struct ModelNode;

#[async_trait]
impl Node for ModelNode {
    fn id(&self) -> &str {
        MODEL_NODE_ID
    }

    async fn run(&self, input: NodeInput) -> Result<NodeOutput, RuntimeError> {
        let messages = input.store.get(MESSAGES_KEY).map_err(RuntimeError::Reducer)?;
        let llm_input = input
            .store
            .get(LLM_INPUT_MESSAGES_KEY)
            .map_err(RuntimeError::Reducer)?;
        let request_messages = llm_input.unwrap_or(messages);

        let mut tools = input
            .environment
            .tool_registry
            .as_ref()
            .map(|r| r.list_tools())
            .unwrap_or_default();
        tools.sort_by(|a, b| a.name.cmp(&b.name));

        if input.environment.model_client.is_none() && input.environment.model_router.is_none() {
            return Err(RuntimeError::ModelClientMissing);
        }

        let retry_policy = input.environment.model_retry_policy;
        let final_message = with_retry(retry_policy, &input.clock, || {
            run_stream(&input, request_messages.clone(), tools.clone())
        })
        .await?;
        tracing::debug!(task_id = %input.task_id.0, "model invocation succeeded");

        input
            .emit
            .emit(Event::new(
                input.run_id,
                input.attempt_id,
                input.clock.now_ns(),
                EventKind::ModelInvocationFinished,
            ))
            .await;

        let rewritten_id = derive_role_message_id(&input.task_id, IdRole::Assistant);
        let assistant_message = ChatMessage {
            id: rewritten_id,
            ..final_message
        }
        .at_rest();

        let tool_calls = assistant_message.tool_calls.clone();
        let final_answer = if tool_calls.is_empty() {
            Some(assistant_message.content.clone())
        } else {
            None
        };

        let mut writes = vec![
            StagedWrite::new(MESSAGES_KEY, self.id(), 0, vec![assistant_message]),
            StagedWrite::new(PENDING_TOOL_CALLS_KEY, self.id(), 0, tool_calls),
            StagedWrite::new(LLM_INPUT_MESSAGES_KEY, self.id(), 1, None),
        ];
        if let Some(answer) = final_answer {
            writes.push(StagedWrite::new(FINAL_ANSWER_KEY, self.id(), 0, Some(answer)));
        }

        Ok(NodeOutput::with_writes(writes))
    }
}

/// Start the stream, emit `modelInvocationStarted`/`modelToken`, and enforce
/// the strict `{Token*, Final}` protocol (spec.md §4.7).
async fn run_stream(
    input: &NodeInput,
    messages: Vec<ChatMessage>,
    tools: Vec<crate::external::ToolDef>,
) -> Result<ChatMessage, RuntimeError> {
    let request = ModelRequest { messages, tools };

    let client = if let Some(router) = &input.environment.model_router {
        router
            .route(&request, &crate::external::RouteHints::default())
            .await?
    } else if let Some(client) = &input.environment.model_client {
        client.clone()
    } else {
        return Err(RuntimeError::ModelClientMissing);
    };

    input
        .emit
        .emit(Event::new(
            input.run_id,
            input.attempt_id,
            input.clock.now_ns(),
            EventKind::ModelInvocationStarted {
                model: client.model_name().to_string(),
            },
        ))
        .await;

    let mut stream = client.stream(request).await?;
    let mut final_message: Option<ChatMessage> = None;

    while let Some(chunk) = stream.next().await {
        if final_message.is_some() {
            tracing::error!(model = client.model_name(), "chunk received after final");
            return Err(RuntimeError::ModelStreamInvalid(
                "chunk received after final".to_string(),
            ));
        }
        match chunk {
            ModelStreamChunk::Token(text) => {
                input
                    .emit
                    .emit(Event::new(
                        input.run_id,
                        input.attempt_id,
                        input.clock.now_ns(),
                        EventKind::ModelToken { text },
                    ))
                    .await;
            }
            ModelStreamChunk::Final(message) => {
                final_message = Some(message);
            }
        }
    }

    final_message.ok_or_else(|| {
        tracing::error!(model = client.model_name(), "stream ended without a final chunk");
        RuntimeError::ModelStreamInvalid("stream ended without a final chunk".to_string())
    })
}

/// Router registered on the `model` node (spec.md §4.3 step 7): once a
/// final answer has been committed this step, the run is done; otherwise
/// fall back to the static `model -> toolGate` edge.
pub fn model_router(store: &StoreSnapshot) -> RoutingDecision {
    match store.get(FINAL_ANSWER_KEY) {
        Ok(Some(_)) => RoutingDecision::End,
        _ => RoutingDecision::UseGraphEdges,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::stream;

    use super::*;
    use crate::builtin_channels::builtin_channel_specs;
    use crate::clock::ManualClock;
    use crate::environment::Environment;
    use crate::events::event_channel;
    use crate::external::ToolDef;
    use crate::identity::{derive_task_id, AttemptId, RunId};
    use crate::interrupt::ApprovalPolicy;
    use crate::message::Role;
    use crate::retry::RetryPolicy;
    use crate::store::ChannelStore;

    /// A model client that plays back a fixed, pre-built chunk sequence
    /// regardless of the request, for exercising the stream protocol's
    /// edge cases directly.
    struct ScriptedChunksModel(Vec<ModelStreamChunk>);

    #[async_trait::async_trait]
    impl crate::external::ModelClient for ScriptedChunksModel {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn stream(&self, _request: ModelRequest) -> Result<futures::stream::BoxStream<'static, ModelStreamChunk>, RuntimeError> {
            Ok(Box::pin(stream::iter(self.0.clone())))
        }
    }

    struct NoTools;
    #[async_trait::async_trait]
    impl crate::external::ToolRegistry for NoTools {
        fn list_tools(&self) -> Vec<ToolDef> {
            Vec::new()
        }
        async fn invoke(&self, _call: &crate::message::ToolCall) -> Result<crate::external::ToolResult, RuntimeError> {
            unreachable!("model tests never stage tool calls that get executed")
        }
    }

    fn environment(client: ScriptedChunksModel) -> Environment {
        Environment {
            model_client: Some(Arc::new(client)),
            model_router: None,
            tool_registry: Some(Arc::new(NoTools)),
            tokenizer: None,
            compaction_policy: None,
            approval_policy: ApprovalPolicy::Never,
            model_retry_policy: RetryPolicy::None,
            tool_retry_policy: RetryPolicy::None,
        }
    }

    fn input_over(store: &ChannelStore, environment: Environment) -> (NodeInput, crate::identity::TaskId) {
        let (emit, _events) = event_channel();
        let run_id = RunId::new();
        let attempt_id = AttemptId::new();
        let task_id = derive_task_id(run_id, attempt_id, 0, MODEL_NODE_ID);
        let input = NodeInput {
            store: store.snapshot(),
            run_id,
            attempt_id,
            step_index: 0,
            task_id: task_id.clone(),
            emit,
            clock: Arc::new(ManualClock::new()),
            environment: Arc::new(environment),
            resume_value: None,
        };
        (input, task_id)
    }

    fn store_with_one_user_message() -> ChannelStore {
        let mut store = ChannelStore::new(builtin_channel_specs());
        store
            .commit(vec![StagedWrite::new(
                MESSAGES_KEY,
                "test",
                0,
                vec![ChatMessage::new("u1", Role::User, "hi")],
            )])
            .unwrap();
        store
    }

    #[tokio::test]
    async fn a_chunk_after_final_is_a_protocol_violation() {
        let store = store_with_one_user_message();
        let client = ScriptedChunksModel(vec![
            ModelStreamChunk::Final(ChatMessage::new("m", Role::Assistant, "done")),
            ModelStreamChunk::Token("late".to_string()),
        ]);
        let (input, _task_id) = input_over(&store, environment(client));
        let err = ModelNode.run(input).await.unwrap_err();
        assert!(matches!(err, RuntimeError::ModelStreamInvalid(_)));
    }

    #[tokio::test]
    async fn two_finals_is_a_protocol_violation() {
        let store = store_with_one_user_message();
        let client = ScriptedChunksModel(vec![
            ModelStreamChunk::Final(ChatMessage::new("m1", Role::Assistant, "first")),
            ModelStreamChunk::Final(ChatMessage::new("m2", Role::Assistant, "second")),
        ]);
        let (input, _task_id) = input_over(&store, environment(client));
        let err = ModelNode.run(input).await.unwrap_err();
        assert!(matches!(err, RuntimeError::ModelStreamInvalid(_)));
    }

    #[tokio::test]
    async fn a_stream_with_no_final_is_a_protocol_violation() {
        let store = store_with_one_user_message();
        let client = ScriptedChunksModel(vec![ModelStreamChunk::Token("only".to_string())]);
        let (input, _task_id) = input_over(&store, environment(client));
        let err = ModelNode.run(input).await.unwrap_err();
        assert!(matches!(err, RuntimeError::ModelStreamInvalid(_)));
    }

    #[tokio::test]
    async fn assistant_message_id_is_rewritten_and_final_answer_is_staged_when_there_are_no_tool_calls() {
        let store = store_with_one_user_message();
        let client = ScriptedChunksModel(vec![ModelStreamChunk::Final(ChatMessage::new(
            "whatever-the-model-said",
            Role::Assistant,
            "42",
        ))]);
        let (input, task_id) = input_over(&store, environment(client));
        let output = ModelNode.run(input).await.unwrap();

        let assistant_write = output
            .writes
            .iter()
            .find(|w| w.channel == MESSAGES_KEY.id)
            .expect("a messages write");
        let messages: Vec<ChatMessage> = (*assistant_write.value.clone().downcast::<Vec<ChatMessage>>().unwrap()).clone();
        assert_eq!(messages.len(), 1);
        assert_ne!(messages[0].id, "whatever-the-model-said");
        assert_eq!(messages[0].id, derive_role_message_id(&task_id, IdRole::Assistant));

        let final_answer_write = output
            .writes
            .iter()
            .find(|w| w.channel == FINAL_ANSWER_KEY.id)
            .expect("finalAnswer write when there are no tool calls");
        let final_answer: Option<String> = (*final_answer_write.value.clone().downcast::<Option<String>>().unwrap()).clone();
        assert_eq!(final_answer, Some("42".to_string()));
    }

    #[tokio::test]
    async fn pending_tool_calls_are_staged_and_no_final_answer_is_written_when_the_model_calls_a_tool() {
        let store = store_with_one_user_message();
        let message = ChatMessage {
            tool_calls: vec![crate::message::ToolCall {
                id: "c1".to_string(),
                name: "calc".to_string(),
                arguments: serde_json::json!({}),
            }],
            ..ChatMessage::new("m", Role::Assistant, "")
        };
        let client = ScriptedChunksModel(vec![ModelStreamChunk::Final(message)]);
        let (input, _task_id) = input_over(&store, environment(client));
        let output = ModelNode.run(input).await.unwrap();

        assert!(output.writes.iter().all(|w| w.channel != FINAL_ANSWER_KEY.id));
        let pending_write = output
            .writes
            .iter()
            .find(|w| w.channel == PENDING_TOOL_CALLS_KEY.id)
            .expect("a pendingToolCalls write");
        let pending: Vec<crate::message::ToolCall> = (*pending_write.value.clone().downcast::<Vec<crate::message::ToolCall>>().unwrap()).clone();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "calc");
    }
}
