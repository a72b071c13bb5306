//! The built-in pre-model compactor (spec.md §4.11): tail-preserve plus
//! greedy head-backfill, with a system-prompt special case. Never mutates
//! `messages` — the result only ever lands in `llmInputMessages`.
//!
//! Grounded on `compress::compact_node.rs` / `compress::config.rs`'s
//! "only compact when over budget" shape, reimplemented with this spec's
//! own arithmetic algorithm instead of an LLM summarization call (the core
//! does not author prompts, per its Non-goals).

use crate::external::Tokenizer;
use crate::message::{ChatMessage, Role};

/// `{maxTokens, preserveLastMessages}` (spec.md §4.11).
#[derive(Clone, Copy, Debug)]
pub struct CompactionPolicy {
    pub max_tokens: usize,
    pub preserve_last_messages: usize,
}

/// Returns `None` when `history` already fits (the model uses the full
/// history verbatim), or `Some(compacted)` otherwise.
pub fn compact(history: &[ChatMessage], policy: &CompactionPolicy, tokenizer: &dyn Tokenizer) -> Option<Vec<ChatMessage>> {
    if tokenizer.count(history) <= policy.max_tokens {
        return None;
    }

    let keep_tail_count = policy.preserve_last_messages.min(history.len());
    let split_at = history.len() - keep_tail_count;
    let head = &history[..split_at];
    let mut kept: Vec<ChatMessage> = history[split_at..].to_vec();

    while kept.len() > 1 && tokenizer.count(&kept) > policy.max_tokens {
        kept.remove(0);
    }

    if tokenizer.count(&kept) <= policy.max_tokens {
        for message in head.iter().rev() {
            let mut candidate = Vec::with_capacity(kept.len() + 1);
            candidate.push(message.clone());
            candidate.extend(kept.iter().cloned());
            if tokenizer.count(&candidate) <= policy.max_tokens {
                kept = candidate;
            } else {
                break;
            }
        }
    }

    if let Some(first) = history.first() {
        let already_kept = kept.first().map(|m| m.id == first.id).unwrap_or(false);
        if first.role == Role::System && history.len() > keep_tail_count && !already_kept {
            let mut with_system = Vec::with_capacity(kept.len() + 1);
            with_system.push(first.clone());
            with_system.extend(kept.iter().cloned());
            if tokenizer.count(&with_system) <= policy.max_tokens {
                kept = with_system;
            }
        }
    }

    Some(kept)
}
