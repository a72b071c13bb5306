//! The `Node` trait and the input/output types nodes exchange with the
//! scheduler (spec.md §4.2, §4.3).
//!
//! Grounded on `graph/node.rs`'s `Node<S>` trait (`id()`, async `run`),
//! unchanged in shape: a node remains an opaque function `(context) ->
//! NodeOutput`, generalized only in what `context` and `NodeOutput` carry.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::clock::Clock;
use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::events::EventSink;
use crate::identity::{AttemptId, RunId, TaskId};
use crate::interrupt::{InterruptPayload, ResumePayload};
use crate::store::{StagedWrite, StoreSnapshot};

/// Routing a router may hand back for the node it's registered on.
#[derive(Clone, Debug)]
pub enum RoutingDecision {
    /// Terminate the run: this node contributes nothing to the next frontier.
    End,
    /// Fall back to the node's statically declared edges.
    UseGraphEdges,
    /// Route to exactly this set of node ids, bypassing static edges.
    Nodes(HashSet<String>),
}

/// Everything a node needs to execute one invocation.
pub struct NodeInput {
    pub store: StoreSnapshot,
    pub run_id: RunId,
    pub attempt_id: AttemptId,
    pub step_index: u64,
    pub task_id: TaskId,
    pub emit: EventSink,
    pub clock: Arc<dyn Clock>,
    pub environment: Arc<Environment>,
    pub resume_value: Option<ResumePayload>,
}

/// What a node hands back to the scheduler after running.
#[derive(Default)]
pub struct NodeOutput {
    pub writes: Vec<StagedWrite>,
    pub routing_override: Option<RoutingDecision>,
    pub interrupt: Option<InterruptPayload>,
}

impl NodeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_writes(writes: Vec<StagedWrite>) -> Self {
        Self {
            writes,
            ..Self::default()
        }
    }

    pub fn interrupted(payload: InterruptPayload) -> Self {
        Self {
            interrupt: Some(payload),
            ..Self::default()
        }
    }
}

/// A node: an opaque async function `(input) -> NodeOutput`.
#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> &str;
    async fn run(&self, input: NodeInput) -> Result<NodeOutput, RuntimeError>;
}

/// Optional router attached to a node: `(storeSnapshot) -> RoutingDecision`,
/// evaluated against the post-commit snapshot (spec.md §4.3 step 7).
pub trait Router: Send + Sync {
    fn route(&self, store: &StoreSnapshot) -> RoutingDecision;
}

impl<F> Router for F
where
    F: Fn(&StoreSnapshot) -> RoutingDecision + Send + Sync,
{
    fn route(&self, store: &StoreSnapshot) -> RoutingDecision {
        self(store)
    }
}
