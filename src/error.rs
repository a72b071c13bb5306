//! Runtime error taxonomy.
//!
//! One `thiserror` enum for every error case named in the spec's error
//! taxonomy, plus the channel/graph errors they wrap. Node implementations
//! and external collaborators (model client, tool registry) surface their
//! own failures through `RuntimeError::Node` / `RuntimeError::External`.

use thiserror::Error;

use crate::channels::{ChannelError, ChannelId};
use crate::graph::CompilationError;

/// Errors raised while preflight-checking, running, or resuming a graph.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No model client and no model router configured.
    #[error("model client missing")]
    ModelClientMissing,

    /// No tool registry configured.
    #[error("tool registry missing")]
    ToolRegistryMissing,

    /// Approval policy other than `never` without a configured checkpoint store.
    #[error("checkpoint store missing")]
    CheckpointStoreMissing,

    /// `maxSteps`, compaction policy, or other run options are invalid.
    #[error("invalid run options: {0}")]
    InvalidRunOptions(String),

    /// The model stream violated its protocol (chunk after final, two finals, no final).
    #[error("model stream invalid: {0}")]
    ModelStreamInvalid(String),

    /// A `messages` channel update was invalid (`remove` of unknown id, non-sentinel `removeAll`).
    #[error("invalid messages update: {0}")]
    InvalidMessagesUpdate(String),

    /// Channel has an `updatePolicy` of `single` but more than one write was staged in a step.
    #[error("single-writer channel {0} received more than one write this step")]
    SingleWriterViolation(ChannelId),

    /// Graph failed to compile.
    #[error("graph compilation failed: {0}")]
    Compilation(#[from] CompilationError),

    /// A reducer rejected a staged update.
    #[error("reducer failed: {0}")]
    Reducer(#[from] ChannelError),

    /// A checkpoint could not be written, read, or decoded.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// No interrupt is pending for the requested resume, or the ids don't match.
    #[error("no matching pending interrupt: {0}")]
    NoPendingInterrupt(String),

    /// A node raised an error while executing.
    #[error("node {node_id} failed: {source}")]
    Node {
        node_id: String,
        #[source]
        source: Box<RuntimeError>,
    },

    /// An external collaborator (model client, tool registry, tokenizer) failed.
    #[error("external error: {0}")]
    External(String),
}
