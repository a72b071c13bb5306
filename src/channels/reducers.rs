//! Built-in reducers: `last_write_wins` and the messages reducer.
//!
//! Grounded on `channels/ephemeral_value.rs` (folding a `Vec<T>` of staged
//! writes against a current value) and `channels/updater.rs`'s
//! `StateUpdater::apply_update`, generalized to the two reducer shapes the
//! spec's channels actually need.

use super::ChannelError;
use crate::message::{ChatMessage, MessageOp, REMOVE_ALL_SENTINEL};

/// The last staged write replaces the channel's value outright. Used for
/// `single`-policy channels where "more than one write" is already rejected
/// by the commit algorithm's step 2, so this never actually has to fold —
/// it exists so the reducer type signature is uniform.
pub fn last_write_wins<T: Clone>(_current: &T, update: T) -> Result<T, ChannelError> {
    Ok(update)
}

/// The canonical messages reducer (spec.md §4.1), reproduced exactly:
///
/// 1. Reject any `removeAll` whose id isn't [`REMOVE_ALL_SENTINEL`].
/// 2. If a `removeAll` is present, discard `current` and every update up to
///    and including the *last* `removeAll`; only the tail survives.
/// 3. Index the surviving merged list by id, first occurrence wins.
/// 4. Fold remaining updates in order: `remove` marks for deletion (error if
///    unknown), `none` inserts or overwrites in place and unmarks deletion.
/// 5. Apply deletions in one pass, preserving order.
/// 6. Return only `op = None` messages.
pub fn messages_reducer(current: &[ChatMessage], updates: Vec<ChatMessage>) -> Result<Vec<ChatMessage>, ChannelError> {
    for u in &updates {
        if u.op == MessageOp::RemoveAll && u.id != REMOVE_ALL_SENTINEL {
            return Err(ChannelError::InvalidRemoveAllTarget(u.id.clone()));
        }
    }

    let last_remove_all = updates.iter().rposition(|u| u.op == MessageOp::RemoveAll);

    let (mut merged, remaining): (Vec<ChatMessage>, &[ChatMessage]) = match last_remove_all {
        Some(k) => (Vec::new(), &updates[k + 1..]),
        None => (current.to_vec(), &updates[..]),
    };

    // indexById: first occurrence wins, entries recorded as we scan `merged`.
    let mut index_by_id: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for (i, m) in merged.iter().enumerate() {
        index_by_id.entry(m.id.clone()).or_insert(i);
    }

    let mut marked_for_deletion: std::collections::HashSet<String> = std::collections::HashSet::new();

    for update in remaining {
        match update.op {
            MessageOp::RemoveAll => continue,
            MessageOp::Remove => {
                if !index_by_id.contains_key(&update.id) {
                    return Err(ChannelError::UnknownMessageId(update.id.clone()));
                }
                marked_for_deletion.insert(update.id.clone());
            }
            MessageOp::None => {
                marked_for_deletion.remove(&update.id);
                match index_by_id.get(&update.id) {
                    Some(&i) => merged[i] = update.clone().at_rest(),
                    None => {
                        index_by_id.insert(update.id.clone(), merged.len());
                        merged.push(update.clone().at_rest());
                    }
                }
            }
        }
    }

    let result: Vec<ChatMessage> = merged
        .into_iter()
        .filter(|m| !marked_for_deletion.contains(&m.id))
        .filter(|m| m.op == MessageOp::None)
        .collect();

    Ok(result)
}
