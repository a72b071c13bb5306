//! The typed channel store's channel registry: ids, specs, scopes and
//! update policies, and the type-erasure machinery that lets a single
//! `HashMap` hold channels of unrelated concrete types.
//!
//! Grounded on `channels/updater.rs`'s `StateUpdater` (pure `apply_update`
//! merge) and `channels/ephemeral_value.rs` (fold multiple staged writes in
//! order), generalized into a registry of named, independently-typed
//! channels rather than one fixed state struct.

mod error;
pub mod reducers;

pub use error::ChannelError;

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Opaque erased channel value. Cloning is an `Arc` bump, never a deep copy,
/// so store snapshots taken mid-step are cheap.
pub type ErasedValue = Arc<dyn Any + Send + Sync>;

/// Whether a channel's value is persisted in checkpoints or only lives for
/// the remainder of the current run attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Persistence {
    Checkpointed,
    Ephemeral,
}

/// Visibility: whether a channel's value is exposed on `RunHandle` /
/// checkpoints, or only used internally between nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    Public,
    Internal,
}

/// How concurrent writes within one step are combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdatePolicy {
    /// At most one node may write this channel in a given step; two or more
    /// writes is a `SingleWriterViolation`.
    Single,
    /// Writes fold left-to-right, in canonical `(nodeId, writeIndex)` order,
    /// through the channel's reducer.
    Multi,
}

/// Stable identifier for a channel, interned as `&'static str` so that
/// ordering/equality/hashing never touch the heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub &'static str);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Well-known channel ids defined directly by the spec's data model.
impl ChannelId {
    pub const MESSAGES: ChannelId = ChannelId("messages");
    pub const PENDING_TOOL_CALLS: ChannelId = ChannelId("pendingToolCalls");
    pub const FINAL_ANSWER: ChannelId = ChannelId("finalAnswer");
    pub const LLM_INPUT_MESSAGES: ChannelId = ChannelId("llmInputMessages");
}

/// A typed handle onto a channel, used by nodes to read/write without
/// touching the erased representation directly.
pub struct ChannelKey<T> {
    pub id: ChannelId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ChannelKey<T> {
    pub const fn new(id: ChannelId) -> Self {
        Self { id, _marker: PhantomData }
    }
}

impl<T> Clone for ChannelKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for ChannelKey<T> {}

/// Marker bound satisfied by every concrete channel value type. Channels
/// must be (de)serializable so checkpoints can round-trip them through the
/// canonical codec (spec.md §6).
pub trait ChannelValue:
    Any + Send + Sync + Clone + serde::Serialize + serde::de::DeserializeOwned + 'static
{
}
impl<T> ChannelValue for T where
    T: Any + Send + Sync + Clone + serde::Serialize + serde::de::DeserializeOwned + 'static
{
}

/// A reducer folds the channel's current value and one staged write into a
/// new value, or rejects the write.
pub type Reducer<T> = Arc<dyn Fn(&T, T) -> Result<T, ChannelError> + Send + Sync>;

/// Concrete, generically-typed channel definition: default value, reducer,
/// policy and persistence/scope metadata.
#[derive(Clone)]
pub struct ChannelSpec<T: ChannelValue> {
    pub id: ChannelId,
    pub default: T,
    pub reducer: Reducer<T>,
    pub update_policy: UpdatePolicy,
    pub persistence: Persistence,
    pub scope: Scope,
}

impl<T: ChannelValue> ChannelSpec<T> {
    pub fn key(&self) -> ChannelKey<T> {
        ChannelKey::new(self.id)
    }
}

/// Type-erased view of a `ChannelSpec<T>`, stored in the registry so the
/// store can hold channels of unrelated `T` in one map.
pub trait AnyChannelSpec: Send + Sync {
    fn id(&self) -> ChannelId;
    fn update_policy(&self) -> UpdatePolicy;
    fn persistence(&self) -> Persistence;
    fn scope(&self) -> Scope;
    fn default_erased(&self) -> ErasedValue;

    /// Fold one staged write into `current`, downcasting both to the
    /// concrete type and rewrapping the result. Fails with `TypeMismatch`
    /// if either value isn't the channel's declared type — an internal
    /// bug (wrong `ChannelKey<T>` used against this id), never a user error.
    fn reduce_erased(&self, current: &ErasedValue, write: ErasedValue) -> Result<ErasedValue, ChannelError>;

    /// Serialize an erased value through the channel's concrete type, for
    /// checkpoint persistence.
    fn to_json_erased(&self, value: &ErasedValue) -> Result<serde_json::Value, ChannelError>;

    /// Deserialize a checkpointed value back into its erased representation.
    fn from_json_erased(&self, value: serde_json::Value) -> Result<ErasedValue, ChannelError>;
}

impl<T: ChannelValue> AnyChannelSpec for ChannelSpec<T> {
    fn id(&self) -> ChannelId {
        self.id
    }

    fn update_policy(&self) -> UpdatePolicy {
        self.update_policy
    }

    fn persistence(&self) -> Persistence {
        self.persistence
    }

    fn scope(&self) -> Scope {
        self.scope
    }

    fn default_erased(&self) -> ErasedValue {
        Arc::new(self.default.clone())
    }

    fn reduce_erased(&self, current: &ErasedValue, write: ErasedValue) -> Result<ErasedValue, ChannelError> {
        let current = current
            .downcast_ref::<T>()
            .ok_or(ChannelError::TypeMismatch(self.id))?;
        let write = write
            .downcast::<T>()
            .map_err(|_| ChannelError::TypeMismatch(self.id))?;
        let next = (self.reducer)(current, (*write).clone())?;
        Ok(Arc::new(next))
    }

    fn to_json_erased(&self, value: &ErasedValue) -> Result<serde_json::Value, ChannelError> {
        let value = value.downcast_ref::<T>().ok_or(ChannelError::TypeMismatch(self.id))?;
        let bytes = crate::codec::encode(value).map_err(|_| ChannelError::TypeMismatch(self.id))?;
        serde_json::from_slice(&bytes).map_err(|_| ChannelError::TypeMismatch(self.id))
    }

    fn from_json_erased(&self, value: serde_json::Value) -> Result<ErasedValue, ChannelError> {
        let value: T = serde_json::from_value(value).map_err(|_| ChannelError::TypeMismatch(self.id))?;
        Ok(Arc::new(value))
    }
}
