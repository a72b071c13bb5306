//! The typed channel store (spec.md §4.1): `get`/`stage`/`commit` plus the
//! canonical commit algorithm.
//!
//! Grounded on `memory::Store`'s documented trait shape (a long-term KV
//! store, generalized here to the per-run channel store) and
//! `graph/state_graph.rs`'s `compile_internal` validation style (collect,
//! fail fast with a descriptive error). Type erasure follows Design Note
//! §9's "tagged registry": a map of opaque channel id to type-erased value
//! plus a registry of specs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::channels::{AnyChannelSpec, ChannelError, ChannelId, ChannelKey, ChannelValue, ErasedValue, Persistence, UpdatePolicy};
use crate::error::RuntimeError;

/// One write staged by a node during a step, tagged with enough provenance
/// to fold multi-writer channels in canonical `(sourceNodeID, writeIndex)`
/// order (spec.md §4.1 step 3).
#[derive(Clone)]
pub struct StagedWrite {
    pub channel: ChannelId,
    pub source_node_id: String,
    pub write_index: u32,
    pub value: ErasedValue,
}

impl StagedWrite {
    pub fn new<T: ChannelValue>(key: ChannelKey<T>, source_node_id: impl Into<String>, write_index: u32, value: T) -> Self {
        Self {
            channel: key.id,
            source_node_id: source_node_id.into(),
            write_index,
            value: Arc::new(value),
        }
    }
}

/// An immutable, cheap-to-clone view of the store taken at a step boundary.
/// Every clone is an `Arc` bump: nodes reading a snapshot concurrently never
/// observe another node's in-flight writes (I1/I2/I3).
#[derive(Clone)]
pub struct StoreSnapshot {
    registry: Arc<HashMap<ChannelId, Arc<dyn AnyChannelSpec>>>,
    values: Arc<HashMap<ChannelId, ErasedValue>>,
    revisions: Arc<HashMap<ChannelId, u64>>,
}

impl StoreSnapshot {
    pub fn get<T: ChannelValue>(&self, key: ChannelKey<T>) -> Result<T, ChannelError> {
        let value = self
            .values
            .get(&key.id)
            .ok_or(ChannelError::Uninitialized(key.id))?;
        value
            .downcast_ref::<T>()
            .cloned()
            .ok_or(ChannelError::TypeMismatch(key.id))
    }

    pub fn revision(&self, id: ChannelId) -> u64 {
        *self.revisions.get(&id).unwrap_or(&0)
    }

    /// All channel values keyed by id, for checkpoint serialization.
    pub fn to_json(&self) -> Result<BTreeMap<String, serde_json::Value>, ChannelError> {
        let mut out = BTreeMap::new();
        for (id, value) in self.values.iter() {
            let spec = self.registry.get(id).ok_or(ChannelError::UnknownChannel(*id))?;
            out.insert(id.to_string(), spec.to_json_erased(value)?);
        }
        Ok(out)
    }

    /// Encode only the requested channels, for `Output::Channels(subset)`.
    /// Channels the store has never had a write for are silently omitted.
    pub fn to_json_filtered(&self, ids: &[ChannelId]) -> Result<BTreeMap<String, serde_json::Value>, ChannelError> {
        let mut out = BTreeMap::new();
        for id in ids {
            if let Some(value) = self.values.get(id) {
                let spec = self.registry.get(id).ok_or(ChannelError::UnknownChannel(*id))?;
                out.insert(id.to_string(), spec.to_json_erased(value)?);
            }
        }
        Ok(out)
    }

    /// Like [`Self::to_json`], but excludes channels declared `Ephemeral`
    /// (spec.md §3: "ephemeral fields are excluded from snapshots").
    pub fn to_json_checkpointed(&self) -> Result<BTreeMap<String, serde_json::Value>, ChannelError> {
        let mut out = BTreeMap::new();
        for (id, value) in self.values.iter() {
            let spec = self.registry.get(id).ok_or(ChannelError::UnknownChannel(*id))?;
            if spec.persistence() == crate::channels::Persistence::Checkpointed {
                out.insert(id.to_string(), spec.to_json_erased(value)?);
            }
        }
        Ok(out)
    }
}

/// The mutable store a scheduler drives across steps. Holds the channel
/// registry for the lifetime of a run and the current snapshot.
pub struct ChannelStore {
    snapshot: StoreSnapshot,
}

impl ChannelStore {
    /// A freshly-constructed store has no value for any channel until the
    /// first commit writes it — `get` on an unwritten channel is
    /// `Uninitialized`, matching spec.md §4.1's `get(key) -> T (throws if
    /// uninitialized)`. The registry's `default` is only ever used as the
    /// commit algorithm's fold seed (step 3: "`spec.initial` if key missing").
    pub fn new(specs: Vec<Arc<dyn AnyChannelSpec>>) -> Self {
        let mut registry = HashMap::new();
        for spec in specs {
            registry.insert(spec.id(), spec);
        }
        Self {
            snapshot: StoreSnapshot {
                registry: Arc::new(registry),
                values: Arc::new(HashMap::new()),
                revisions: Arc::new(HashMap::new()),
            },
        }
    }

    /// Restore a store from a checkpointed JSON map, keyed by channel id,
    /// using the freshly-compiled registry's specs. Channels absent from
    /// `saved` because they were never written stay unwritten, same as a
    /// fresh store; channels absent because they're `Ephemeral` (excluded
    /// from serialization by construction — see `to_json_checkpointed`)
    /// are seeded with their spec default instead, so a node resuming
    /// mid-cycle without passing back through the node that (re)populates
    /// them still gets a valid read rather than `Uninitialized`.
    pub fn from_json(specs: Vec<Arc<dyn AnyChannelSpec>>, mut saved: BTreeMap<String, serde_json::Value>) -> Result<Self, ChannelError> {
        let mut registry = HashMap::new();
        let mut values = HashMap::new();
        let mut revisions = HashMap::new();
        for spec in specs {
            let id = spec.id();
            if let Some(json) = saved.remove(id.0) {
                values.insert(id, spec.from_json_erased(json)?);
                revisions.insert(id, 1);
            } else if spec.persistence() == Persistence::Ephemeral {
                values.insert(id, spec.default_erased());
                revisions.insert(id, 0);
            }
            registry.insert(id, spec);
        }
        Ok(Self {
            snapshot: StoreSnapshot {
                registry: Arc::new(registry),
                values: Arc::new(values),
                revisions: Arc::new(revisions),
            },
        })
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.snapshot.clone()
    }

    /// Commit algorithm (spec.md §4.1):
    /// 1. Group staged writes by key.
    /// 2. Reject if a `single`-policy channel received more than one write.
    /// 3. Fold each channel's writes through its reducer, in canonical
    ///    `(sourceNodeID, writeIndex)` order, seeded from the current value
    ///    (or the spec's default if the channel has never been written).
    /// 4. Replace the store atomically (build the whole next map, then swap).
    /// 5. Return `(channel, oldRevision, newRevision)` for every channel that
    ///    received a write, in lexicographic channel-id order, so the
    ///    scheduler can emit `channelUpdated` events in that order (Design
    ///    Note: cross-key ordering resolved lexicographically).
    pub fn commit(&mut self, writes: Vec<StagedWrite>) -> Result<Vec<(ChannelId, u64, u64)>, RuntimeError> {
        let mut by_channel: BTreeMap<ChannelId, Vec<StagedWrite>> = BTreeMap::new();
        for write in writes {
            by_channel.entry(write.channel).or_default().push(write);
        }

        for (channel, writes) in &by_channel {
            let spec = self
                .snapshot
                .registry
                .get(channel)
                .ok_or_else(|| RuntimeError::Reducer(ChannelError::UnknownChannel(*channel)))?;
            // "more than one write" is counted per total staged write, not
            // per distinct writer node: a single node staging two writes to
            // a `single`-policy channel in one step is just as much a
            // violation as two different nodes doing so.
            if spec.update_policy() == UpdatePolicy::Single && writes.len() > 1 {
                return Err(RuntimeError::SingleWriterViolation(*channel));
            }
        }

        let mut next_values = (*self.snapshot.values).clone();
        let mut next_revisions = (*self.snapshot.revisions).clone();
        let mut updates = Vec::new();

        for (channel, mut writes) in by_channel {
            let spec = self.snapshot.registry.get(&channel).expect("checked above");
            writes.sort_by(|a, b| (a.source_node_id.as_str(), a.write_index).cmp(&(b.source_node_id.as_str(), b.write_index)));

            let old_revision = self.snapshot.revisions.get(&channel).copied().unwrap_or(0);
            let mut folded = self
                .snapshot
                .values
                .get(&channel)
                .cloned()
                .unwrap_or_else(|| spec.default_erased());
            for write in writes {
                folded = spec
                    .reduce_erased(&folded, write.value)
                    .map_err(RuntimeError::Reducer)?;
            }

            let new_revision = old_revision + 1;
            tracing::debug!(channel = channel.0, old_revision, new_revision, "channel committed");
            next_values.insert(channel, folded);
            next_revisions.insert(channel, new_revision);
            updates.push((channel, old_revision, new_revision));
        }

        self.snapshot = StoreSnapshot {
            registry: self.snapshot.registry.clone(),
            values: Arc::new(next_values),
            revisions: Arc::new(next_revisions),
        };

        updates.sort_by_key(|(id, _, _)| id.0);
        Ok(updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{ChannelSpec, Persistence, Scope};

    fn counter_spec(id: ChannelId, policy: UpdatePolicy) -> Arc<dyn AnyChannelSpec> {
        Arc::new(ChannelSpec {
            id,
            default: 0i64,
            reducer: Arc::new(|_current: &i64, update: i64| Ok(update)),
            update_policy: policy,
            persistence: Persistence::Ephemeral,
            scope: Scope::Internal,
        })
    }

    const COUNTER: ChannelId = ChannelId("counter");

    #[test]
    fn single_policy_channel_rejects_two_writes_in_one_step() {
        let mut store = ChannelStore::new(vec![counter_spec(COUNTER, UpdatePolicy::Single)]);
        let key: ChannelKey<i64> = ChannelKey::new(COUNTER);
        let writes = vec![
            StagedWrite::new(key, "a", 0, 1),
            StagedWrite::new(key, "b", 0, 2),
        ];
        let err = store.commit(writes).unwrap_err();
        assert!(matches!(err, RuntimeError::SingleWriterViolation(_)));
    }

    #[test]
    fn multi_policy_channel_folds_in_canonical_order() {
        let mut store = ChannelStore::new(vec![counter_spec(COUNTER, UpdatePolicy::Multi)]);
        let key: ChannelKey<i64> = ChannelKey::new(COUNTER);
        let writes = vec![
            StagedWrite::new(key, "b", 0, 2),
            StagedWrite::new(key, "a", 1, 3),
            StagedWrite::new(key, "a", 0, 1),
        ];
        store.commit(writes).unwrap();
        // canonical order is (a,0)=1, (a,1)=3, (b,0)=2 — last_write_wins keeps the final fold: 2
        assert_eq!(store.snapshot().get(key).unwrap(), 2);
    }

    #[test]
    fn commit_returns_updates_in_lexicographic_channel_order() {
        let mut store = ChannelStore::new(vec![
            counter_spec(ChannelId("zeta"), UpdatePolicy::Multi),
            counter_spec(ChannelId("alpha"), UpdatePolicy::Multi),
        ]);
        let zeta: ChannelKey<i64> = ChannelKey::new(ChannelId("zeta"));
        let alpha: ChannelKey<i64> = ChannelKey::new(ChannelId("alpha"));
        let writes = vec![StagedWrite::new(zeta, "n", 0, 1), StagedWrite::new(alpha, "n", 0, 1)];
        let updates = store.commit(writes).unwrap();
        assert_eq!(updates[0].0, ChannelId("alpha"));
        assert_eq!(updates[1].0, ChannelId("zeta"));
    }

    #[test]
    fn reading_uninitialized_channel_fails() {
        let store = ChannelStore::new(vec![]);
        let key: ChannelKey<i64> = ChannelKey::new(COUNTER);
        let err = store.snapshot().get(key).unwrap_err();
        assert!(matches!(err, ChannelError::Uninitialized(_)));
    }

    fn ephemeral_counter_spec(id: ChannelId) -> Arc<dyn AnyChannelSpec> {
        Arc::new(ChannelSpec {
            id,
            default: -1i64,
            reducer: Arc::new(|_current: &i64, update: i64| Ok(update)),
            update_policy: UpdatePolicy::Single,
            persistence: Persistence::Ephemeral,
            scope: Scope::Internal,
        })
    }

    #[test]
    fn restoring_from_json_seeds_missing_ephemeral_channels_with_their_default() {
        let key: ChannelKey<i64> = ChannelKey::new(COUNTER);
        let store = ChannelStore::from_json(vec![ephemeral_counter_spec(COUNTER)], BTreeMap::new()).unwrap();
        assert_eq!(store.snapshot().get(key).unwrap(), -1);
    }

    #[test]
    fn restoring_from_json_leaves_missing_checkpointed_channels_uninitialized() {
        let key: ChannelKey<i64> = ChannelKey::new(COUNTER);
        let checkpointed_spec: Arc<dyn AnyChannelSpec> = Arc::new(ChannelSpec {
            id: COUNTER,
            default: 0i64,
            reducer: Arc::new(|_current: &i64, update: i64| Ok(update)),
            update_policy: UpdatePolicy::Single,
            persistence: Persistence::Checkpointed,
            scope: Scope::Internal,
        });
        let store = ChannelStore::from_json(vec![checkpointed_spec], BTreeMap::new()).unwrap();
        let err = store.snapshot().get(key).unwrap_err();
        assert!(matches!(err, ChannelError::Uninitialized(_)));
    }
}
