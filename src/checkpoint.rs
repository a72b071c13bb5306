//! Checkpoint persistence (spec.md §4.4, §6).
//!
//! Grounded on `memory::Checkpointer<S>` (`put`/`get_tuple`/`list`) and
//! `memory::MemorySaver`, narrowed to the `save`/`loadLatest` pair spec.md
//! §6 names — this spec has no need for checkpoint listing or branching,
//! only "latest wins" ordered by `stepIndex` then id.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;
use crate::identity::{AttemptId, RunId};
use crate::interrupt::PendingInterrupt;

/// A single persisted snapshot of a run's store, restorable via codecs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub thread_id: String,
    pub run_id: RunId,
    pub attempt_id: AttemptId,
    pub step_index: u64,
    pub channels: BTreeMap<String, serde_json::Value>,
    pub pending_interrupt: Option<PendingInterrupt>,
}

/// `save(checkpoint) -> void`; `loadLatest(threadID) -> checkpoint?`.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), RuntimeError>;
    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, RuntimeError>;
}

/// Reference in-memory implementation: latest = largest `stepIndex`,
/// tie-broken by lexicographically largest id.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    by_thread: Mutex<HashMap<String, Vec<Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), RuntimeError> {
        let mut guard = self.by_thread.lock().expect("lock poisoned");
        guard.entry(checkpoint.thread_id.clone()).or_default().push(checkpoint);
        Ok(())
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, RuntimeError> {
        let guard = self.by_thread.lock().expect("lock poisoned");
        let latest = guard
            .get(thread_id)
            .and_then(|checkpoints| checkpoints.iter().max_by_key(|c| (c.step_index, c.id.clone())))
            .cloned();
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint(id: &str, thread: &str, step: u64) -> Checkpoint {
        Checkpoint {
            id: id.to_string(),
            thread_id: thread.to_string(),
            run_id: RunId::new(),
            attempt_id: AttemptId::new(),
            step_index: step,
            channels: BTreeMap::new(),
            pending_interrupt: None,
        }
    }

    #[tokio::test]
    async fn latest_is_largest_step_index() {
        let store = InMemoryCheckpointStore::new();
        store.save(checkpoint("c1", "t", 1)).await.unwrap();
        store.save(checkpoint("c2", "t", 3)).await.unwrap();
        store.save(checkpoint("c3", "t", 2)).await.unwrap();
        let latest = store.load_latest("t").await.unwrap().unwrap();
        assert_eq!(latest.id, "c2");
    }

    #[tokio::test]
    async fn ties_broken_by_lexicographically_largest_id() {
        let store = InMemoryCheckpointStore::new();
        store.save(checkpoint("a", "t", 5)).await.unwrap();
        store.save(checkpoint("z", "t", 5)).await.unwrap();
        let latest = store.load_latest("t").await.unwrap().unwrap();
        assert_eq!(latest.id, "z");
    }

    #[tokio::test]
    async fn unknown_thread_returns_none() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.load_latest("ghost").await.unwrap().is_none());
    }
}
