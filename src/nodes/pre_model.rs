//! `preModel` node (spec.md §4.11): derives `llmInputMessages` from
//! `messages` via the compactor, without ever mutating `messages` itself.
//!
//! Grounded on `compress::compact_node.rs`'s "only compact when over
//! budget" node shape, wired against this spec's own compactor instead of
//! an LLM summarization call.

use async_trait::async_trait;

use crate::builtin_channels::{LLM_INPUT_MESSAGES_KEY, MESSAGES_KEY};
use crate::compactor::compact;
use crate::error::RuntimeError;
use crate::graph::{Node, NodeInput, NodeOutput};
use crate::store::StagedWrite;

pub const PRE_MODEL_NODE_ID: &str = "preModel";

pub struct PreModelNode;

#[async_trait]
impl Node for PreModelNode {
    fn id(&self) -> &str {
        PRE_MODEL_NODE_ID
    }

    async fn run(&self, input: NodeInput) -> Result<NodeOutput, RuntimeError> {
        let history = input
            .store
            .get(MESSAGES_KEY)
            .map_err(RuntimeError::Reducer)?;

        let compacted = match (&input.environment.compaction_policy, &input.environment.tokenizer) {
            (Some(policy), Some(tokenizer)) => compact(&history, policy, tokenizer.as_ref()),
            _ => None,
        };
        match &compacted {
            Some(messages) => tracing::debug!(kept = messages.len(), original = history.len(), "history compacted"),
            None => tracing::debug!(original = history.len(), "history passed through uncompacted"),
        }

        let write = StagedWrite::new(LLM_INPUT_MESSAGES_KEY, self.id(), 0, compacted);
        Ok(NodeOutput::with_writes(vec![write]))
    }
}
