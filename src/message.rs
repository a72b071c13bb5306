//! Chat message record shared by the `messages` and `llmInputMessages`
//! channels.
//!
//! Grounded on `loom::Message` (`System`/`User`/`Assistant` variants,
//! threaded through `think_node.rs` and `compact_node.rs`) and `state::ToolCall`
//! (`llm/mod.rs`, `compress/compact_node.rs`), generalized into one record
//! type with an explicit `Tool` role and a per-write `op` discriminant,
//! because the `messages` channel's reducer needs to distinguish
//! insert-or-update from remove from removeAll on the wire.

use serde::{Deserialize, Serialize};

/// Sentinel id a `removeAll` write must carry (spec.md §4.1).
pub const REMOVE_ALL_SENTINEL: &str = "__remove_all__";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// What a staged `messages` write asks the reducer to do with `id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageOp {
    /// Insert if `id` is unseen, else overwrite the existing entry in place.
    None,
    /// Delete the message with `id`; an unknown `id` is an error.
    Remove,
    /// Delete every message currently in the channel. `id` must equal
    /// [`REMOVE_ALL_SENTINEL`].
    RemoveAll,
}

/// One chat message, plus the op describing how a staged write should be
/// folded into the channel by its reducer. Messages read back out of the
/// channel always carry `op: None` (spec.md §4.1 step 6): the op is a
/// write-time instruction, not part of a message's resting state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub op: MessageOp,
}

impl ChatMessage {
    /// Build a resting-state copy: `op` forced to `None`, matching what a
    /// channel read returns regardless of which op produced the write.
    pub fn at_rest(mut self) -> Self {
        self.op = MessageOp::None;
        self
    }

    pub fn new(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: Vec::new(),
            op: MessageOp::None,
        }
    }

    pub fn remove(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Tool,
            content: String::new(),
            name: None,
            tool_call_id: None,
            tool_calls: Vec::new(),
            op: MessageOp::Remove,
        }
    }

    pub fn remove_all() -> Self {
        Self {
            id: REMOVE_ALL_SENTINEL.to_string(),
            role: Role::Tool,
            content: String::new(),
            name: None,
            tool_call_id: None,
            tool_calls: Vec::new(),
            op: MessageOp::RemoveAll,
        }
    }
}
