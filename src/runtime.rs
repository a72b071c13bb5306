//! The public entry point (spec.md §6): compiles the built-in graph once,
//! then drives `start`/`resume`/`applyExternalWrites` against it.
//!
//! Grounded on `agent/react/runner/options.rs` (optional-fields-with-defaults
//! shape) and `stream::StreamWriter`/`StreamEvent` for the event-stream
//! surface, reworked around this spec's scheduler/checkpoint/interrupt
//! plumbing instead of a fixed ReAct chain.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_stream::wrappers::ReceiverStream;

use crate::builtin_channels::{builtin_channel_specs, MESSAGES_KEY};
use crate::channels::ChannelId;
use crate::checkpoint::CheckpointStore;
use crate::clock::{Clock, SystemClock};
use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::events::{event_channel, Event, EventKind};
use crate::graph::{CompiledGraph, GraphBuilder};
use crate::identity::{derive_user_message_id, AttemptId, InterruptId, RunId};
use crate::interrupt::ResumePayload;
use crate::message::{ChatMessage, Role};
use crate::nodes::{
    model_router, ModelNode, PreModelNode, ToolExecuteNode, ToolGateNode, MODEL_NODE_ID, PRE_MODEL_NODE_ID,
    TOOL_EXECUTE_NODE_ID, TOOL_GATE_NODE_ID,
};
use crate::outcome::Outcome;
use crate::preflight;
use crate::scheduler::{self, SchedulerContext};
use crate::store::{ChannelStore, StagedWrite};

/// When a checkpoint is persisted during a run, beyond the interrupt path
/// (which always checkpoints when a store is configured, regardless of
/// this policy).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointPolicy {
    Disabled,
    EveryStep,
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        CheckpointPolicy::Disabled
    }
}

/// A conventional ReAct-loop bound: generous enough that no realistic
/// model/tool round-trip hits it, small enough that a misconfigured router
/// loop can't run forever. spec.md §6 leaves `maxSteps`'s default
/// unspecified; this is this runtime's choice.
pub const DEFAULT_MAX_STEPS: u64 = 50;

/// Per-call options (spec.md §6).
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub max_steps: u64,
    pub checkpoint_policy: CheckpointPolicy,
    pub output_channels: Option<Vec<ChannelId>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            checkpoint_policy: CheckpointPolicy::Disabled,
            output_channels: None,
        }
    }
}

/// A started or resumed run in flight. Events stream on `events`; `outcome`
/// resolves once the scheduler loop returns its terminal [`Outcome`].
pub struct RunHandle {
    pub run_id: RunId,
    pub attempt_id: AttemptId,
    pub events: ReceiverStream<Event>,
    outcome_rx: oneshot::Receiver<Result<Outcome, RuntimeError>>,
    cancel: Arc<AtomicBool>,
}

impl RunHandle {
    /// Await the run's terminal outcome. Call at most once; the channel is
    /// consumed by value.
    pub async fn outcome(self) -> Result<Outcome, RuntimeError> {
        self.outcome_rx
            .await
            .map_err(|_| RuntimeError::External("scheduler task ended without producing an outcome".to_string()))?
    }

    /// Request cancellation. Observed at the next step boundary (spec.md
    /// §4.3: checked once per step, never mid-task).
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

/// Bundles the compiled built-in graph with the collaborators every node
/// reaches through `NodeInput.environment`, plus an optional checkpoint
/// store and the clock driving retry backoff.
pub struct Runtime {
    graph: Arc<CompiledGraph>,
    environment: Arc<Environment>,
    checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    clock: Arc<dyn Clock>,
}

impl Runtime {
    pub fn new(environment: Environment, checkpoint_store: Option<Arc<dyn CheckpointStore>>) -> Result<Self, RuntimeError> {
        Self::with_clock(environment, checkpoint_store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        environment: Environment,
        checkpoint_store: Option<Arc<dyn CheckpointStore>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RuntimeError> {
        let graph = compile_builtin_graph()?;
        Ok(Self {
            graph: Arc::new(graph),
            environment: Arc::new(environment),
            checkpoint_store,
            clock,
        })
    }

    /// Begin a new run on `thread_id`, seeding `messages` with a single user
    /// message (id derived from `(runID, stepIndex=0)` per spec.md §4.8),
    /// and starting at the built-in start frontier (`preModel`).
    pub fn start(
        &self,
        thread_id: impl Into<String>,
        user_message: impl Into<String>,
        options: RunOptions,
    ) -> Result<RunHandle, RuntimeError> {
        preflight::check(&self.environment, self.checkpoint_store.is_some())?;

        let thread_id = thread_id.into();
        let run_id = RunId::new();
        let attempt_id = AttemptId::new();

        let user_message_id = derive_user_message_id(run_id, 0).map_err(RuntimeError::InvalidRunOptions)?;
        let message = ChatMessage {
            id: user_message_id,
            ..ChatMessage::new("", Role::User, user_message)
        };

        let mut store = ChannelStore::new(builtin_channel_specs());
        store.commit(vec![StagedWrite::new(MESSAGES_KEY, "runtime.start", 0, vec![message])])?;

        tracing::info!(run_id = %run_id.0, thread_id = %thread_id, "run starting");
        let frontier = self.graph.start_frontier();
        Ok(self.spawn_run(thread_id, run_id, attempt_id, store, 0, frontier, None, options))
    }

    /// Resume a run previously interrupted with `interrupt_id`: restores the
    /// checkpointed store and re-enters the frontier that raised the
    /// interrupt, handing `resume_payload` to every node in that frontier
    /// (spec.md §4.4).
    pub async fn resume(
        &self,
        thread_id: impl Into<String>,
        interrupt_id: InterruptId,
        resume_payload: ResumePayload,
        options: RunOptions,
    ) -> Result<RunHandle, RuntimeError> {
        preflight::check(&self.environment, self.checkpoint_store.is_some())?;

        let thread_id = thread_id.into();
        let checkpoint_store = self
            .checkpoint_store
            .as_ref()
            .ok_or(RuntimeError::CheckpointStoreMissing)?;
        let checkpoint = checkpoint_store
            .load_latest(&thread_id)
            .await?
            .ok_or_else(|| RuntimeError::NoPendingInterrupt(format!("no checkpoint for thread {thread_id}")))?;
        let pending = checkpoint.pending_interrupt.clone().ok_or_else(|| {
            RuntimeError::NoPendingInterrupt("latest checkpoint has no pending interrupt".to_string())
        })?;
        if pending.id != interrupt_id {
            return Err(RuntimeError::NoPendingInterrupt(
                "requested interrupt id does not match the latest checkpoint's pending interrupt".to_string(),
            ));
        }

        let frontier: HashSet<String> = pending.frontier.iter().cloned().collect();
        let step_index = checkpoint.step_index;
        let run_id = checkpoint.run_id;
        let attempt_id = AttemptId::new();
        let store = ChannelStore::from_json(builtin_channel_specs(), checkpoint.channels).map_err(RuntimeError::Reducer)?;

        tracing::info!(run_id = %run_id.0, thread_id = %thread_id, interrupt_id = %interrupt_id.0, "run resuming");
        Ok(self.spawn_run(
            thread_id,
            run_id,
            attempt_id,
            store,
            step_index,
            frontier,
            Some(resume_payload),
            options,
        ))
    }

    /// Apply externally-authored writes to `thread_id`'s latest checkpoint
    /// without advancing the scheduler, then persist the result back
    /// (spec.md §4.4: a client may mutate e.g. `pendingToolCalls` between an
    /// interrupt and the matching `resume`).
    pub async fn apply_external_writes(&self, thread_id: impl Into<String>, writes: Vec<StagedWrite>) -> Result<(), RuntimeError> {
        let thread_id = thread_id.into();
        let checkpoint_store = self
            .checkpoint_store
            .as_ref()
            .ok_or(RuntimeError::CheckpointStoreMissing)?;
        let mut checkpoint = checkpoint_store
            .load_latest(&thread_id)
            .await?
            .ok_or_else(|| RuntimeError::NoPendingInterrupt(format!("no checkpoint for thread {thread_id}")))?;

        let mut store =
            ChannelStore::from_json(builtin_channel_specs(), checkpoint.channels.clone()).map_err(RuntimeError::Reducer)?;
        store.commit(writes)?;
        checkpoint.channels = store.snapshot().to_json_checkpointed().map_err(RuntimeError::Reducer)?;
        checkpoint.id = uuid::Uuid::new_v4().to_string();
        checkpoint_store.save(checkpoint).await
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_run(
        &self,
        thread_id: String,
        run_id: RunId,
        attempt_id: AttemptId,
        store: ChannelStore,
        step_index: u64,
        frontier: HashSet<String>,
        resume_value: Option<ResumePayload>,
        options: RunOptions,
    ) -> RunHandle {
        let (emit, events) = event_channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let (outcome_tx, outcome_rx) = oneshot::channel();

        let ctx = SchedulerContext {
            graph: self.graph.clone(),
            run_id,
            attempt_id,
            clock: self.clock.clone(),
            environment: self.environment.clone(),
            checkpoint_store: self.checkpoint_store.clone(),
            emit: emit.clone(),
            cancel: cancel.clone(),
            thread_id,
            max_steps: options.max_steps,
            checkpoint_every_step: options.checkpoint_policy == CheckpointPolicy::EveryStep,
            output_channels: options.output_channels,
        };

        tokio::spawn(async move {
            emit.emit(Event::new(run_id, attempt_id, ctx.clock.now_ns(), EventKind::RunStarted)).await;
            let result = scheduler::run(&ctx, store, step_index, frontier, resume_value).await;
            let _ = outcome_tx.send(result);
        });

        RunHandle {
            run_id,
            attempt_id,
            events: ReceiverStream::new(events),
            outcome_rx,
            cancel,
        }
    }
}

/// Wires the four built-in nodes into the fixed topology spec.md §2 names:
/// `preModel -> model -> toolGate -> toolExecute`, with `toolExecute` and
/// the reject/cancel paths of `toolGate` looping back to `model` directly
/// via `routingOverride` (they always loop; it's not the conditional
/// termination logic `model`'s router expresses), and `model`'s router
/// deciding `End` once a final answer is committed (spec.md §4.7).
fn compile_builtin_graph() -> Result<CompiledGraph, RuntimeError> {
    GraphBuilder::new()
        .add_node(Arc::new(PreModelNode))
        .add_node(Arc::new(ModelNode))
        .add_node(Arc::new(ToolGateNode))
        .add_node(Arc::new(ToolExecuteNode))
        .add_edge(PRE_MODEL_NODE_ID, MODEL_NODE_ID)
        .add_edge(MODEL_NODE_ID, TOOL_GATE_NODE_ID)
        .add_edge(TOOL_GATE_NODE_ID, TOOL_EXECUTE_NODE_ID)
        .add_router(MODEL_NODE_ID, Arc::new(model_router as fn(&crate::store::StoreSnapshot) -> crate::graph::node::RoutingDecision))
        .start_frontier([PRE_MODEL_NODE_ID])
        .compile()
        .map_err(RuntimeError::Compilation)
}
