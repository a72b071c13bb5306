//! The channels named directly by the data model (spec.md §3): `messages`,
//! `pendingToolCalls`, `finalAnswer`, `llmInputMessages`.

use std::sync::Arc;

use crate::channels::reducers::{last_write_wins, messages_reducer};
use crate::channels::{AnyChannelSpec, ChannelId, ChannelKey, ChannelSpec, Persistence, Scope, UpdatePolicy};
use crate::message::{ChatMessage, ToolCall};

pub const MESSAGES_KEY: ChannelKey<Vec<ChatMessage>> = ChannelKey::new(ChannelId::MESSAGES);
pub const PENDING_TOOL_CALLS_KEY: ChannelKey<Vec<ToolCall>> = ChannelKey::new(ChannelId::PENDING_TOOL_CALLS);
pub const FINAL_ANSWER_KEY: ChannelKey<Option<String>> = ChannelKey::new(ChannelId::FINAL_ANSWER);
pub const LLM_INPUT_MESSAGES_KEY: ChannelKey<Option<Vec<ChatMessage>>> = ChannelKey::new(ChannelId::LLM_INPUT_MESSAGES);

/// The four channels every compiled graph in this runtime carries, ready
/// to hand to [`crate::store::ChannelStore::new`].
pub fn builtin_channel_specs() -> Vec<Arc<dyn AnyChannelSpec>> {
    vec![
        Arc::new(ChannelSpec {
            id: ChannelId::MESSAGES,
            default: Vec::<ChatMessage>::new(),
            reducer: Arc::new(|current: &Vec<ChatMessage>, update: Vec<ChatMessage>| messages_reducer(current, update)),
            update_policy: UpdatePolicy::Multi,
            persistence: Persistence::Checkpointed,
            scope: Scope::Public,
        }),
        Arc::new(ChannelSpec {
            id: ChannelId::PENDING_TOOL_CALLS,
            default: Vec::<ToolCall>::new(),
            reducer: Arc::new(last_write_wins),
            update_policy: UpdatePolicy::Single,
            persistence: Persistence::Checkpointed,
            scope: Scope::Internal,
        }),
        Arc::new(ChannelSpec {
            id: ChannelId::FINAL_ANSWER,
            default: None::<String>,
            reducer: Arc::new(last_write_wins),
            update_policy: UpdatePolicy::Single,
            persistence: Persistence::Checkpointed,
            scope: Scope::Public,
        }),
        Arc::new(ChannelSpec {
            id: ChannelId::LLM_INPUT_MESSAGES,
            default: None::<Vec<ChatMessage>>,
            reducer: Arc::new(last_write_wins),
            update_policy: UpdatePolicy::Single,
            persistence: Persistence::Ephemeral,
            scope: Scope::Internal,
        }),
    ]
}
