//! `toolGate` node (spec.md §4.5): interrupts for approval per the
//! configured [`ApprovalPolicy`], and handles the `rejected`/`cancelled`
//! resume decisions by writing the documented system/tool messages and
//! routing back to the `model` node.
//!
//! Grounded on `helve::prompt::ApprovalPolicy`'s `None`/`DestructiveOnly`/
//! `Always` gate shape, generalized to this spec's client-supplied
//! `allowList` and its explicit reject/cancel resume handling.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::builtin_channels::{MESSAGES_KEY, PENDING_TOOL_CALLS_KEY};
use crate::error::RuntimeError;
use crate::graph::node::RoutingDecision;
use crate::graph::{Node, NodeInput, NodeOutput};
use crate::identity::{derive_role_message_id, derive_tool_message_id, IdRole};
use crate::interrupt::{
    ApprovalDecision, InterruptPayload, ResumePayload, TOOL_CALL_CANCELLED_MESSAGE, TOOL_EXECUTION_CANCELLED_MESSAGE,
    TOOL_EXECUTION_REJECTED_MESSAGE,
};
use crate::message::{ChatMessage, Role};
use crate::nodes::MODEL_NODE_ID;
use crate::store::StagedWrite;

pub const TOOL_GATE_NODE_ID: &str = "toolGate";

pub struct ToolGateNode;

#[async_trait]
impl Node for ToolGateNode {
    fn id(&self) -> &str {
        TOOL_GATE_NODE_ID
    }

    async fn run(&self, input: NodeInput) -> Result<NodeOutput, RuntimeError> {
        let pending = input
            .store
            .get(PENDING_TOOL_CALLS_KEY)
            .map_err(RuntimeError::Reducer)?;

        if !input.environment.approval_policy.requires_approval(&pending) {
            return Ok(NodeOutput::new());
        }

        let Some(resume) = input.resume_value.clone() else {
            let mut calls = pending;
            calls.sort_by(|a, b| (a.name.as_str(), a.id.as_str()).cmp(&(b.name.as_str(), b.id.as_str())));
            tracing::info!(task_id = %input.task_id.0, pending = calls.len(), "tool approval required");
            return Ok(NodeOutput::interrupted(InterruptPayload::ToolApprovalRequired { calls }));
        };

        let ResumePayload::ToolApproval { decision } = resume;
        tracing::debug!(task_id = %input.task_id.0, decision = ?decision, "tool approval resumed");
        match decision {
            ApprovalDecision::Approved => Ok(NodeOutput::new()),
            ApprovalDecision::Rejected => {
                let system_message = ChatMessage {
                    id: derive_role_message_id(&input.task_id, IdRole::System),
                    ..ChatMessage::new("", Role::System, TOOL_EXECUTION_REJECTED_MESSAGE)
                };
                let writes = vec![
                    StagedWrite::new(MESSAGES_KEY, self.id(), 0, vec![system_message]),
                    StagedWrite::new(PENDING_TOOL_CALLS_KEY, self.id(), 0, Vec::new()),
                ];
                Ok(NodeOutput {
                    writes,
                    routing_override: Some(RoutingDecision::Nodes(back_to_model())),
                    interrupt: None,
                })
            }
            ApprovalDecision::Cancelled => {
                let system_message = ChatMessage {
                    id: derive_role_message_id(&input.task_id, IdRole::System),
                    ..ChatMessage::new("", Role::System, TOOL_EXECUTION_CANCELLED_MESSAGE)
                };
                let mut new_messages = vec![system_message];
                for call in &pending {
                    new_messages.push(ChatMessage {
                        id: derive_tool_message_id(&call.id, true),
                        tool_call_id: Some(call.id.clone()),
                        ..ChatMessage::new("", Role::Tool, TOOL_CALL_CANCELLED_MESSAGE)
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
    }
}

fn back_to_model() -> HashSet<String> {
    let mut set = HashSet::new();
    set.insert(MODEL_NODE_ID.to_string());
    set
}
