//! The step scheduler (spec.md §4.3): computes the frontier, invokes its
//! nodes concurrently, applies writes through the commit barrier, emits
//! events, and decides the next frontier until the run terminates.
//!
//! Grounded on `graph/runtime.rs` (`Runtime<C, S>` bundling context/store/
//! stream_writer — the shape `NodeInput`/`Environment` borrow) and
//! `agent/react/think_node.rs`'s `tokio::join!` fan-out/fan-in, generalized
//! from a fixed linear chain to `futures::future::join_all` over an
//! arbitrary frontier.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use uuid::Uuid;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::clock::Clock;
use crate::environment::Environment;
use crate::error::RuntimeError;
use crate::events::{Event, EventKind, EventSink};
use crate::graph::node::RoutingDecision;
use crate::graph::{CompiledGraph, NodeInput};
use crate::identity::{derive_task_id, AttemptId, InterruptId, RunId};
use crate::interrupt::{PendingInterrupt, ResumePayload};
use crate::outcome::{Interruption, Outcome, Output, Telemetry};
use crate::store::{ChannelStore, StagedWrite};

/// Everything the scheduler needs that doesn't change across steps of one
/// run attempt.
pub struct SchedulerContext {
    pub graph: Arc<CompiledGraph>,
    pub run_id: RunId,
    pub attempt_id: AttemptId,
    pub clock: Arc<dyn Clock>,
    pub environment: Arc<Environment>,
    pub checkpoint_store: Option<Arc<dyn CheckpointStore>>,
    pub emit: EventSink,
    pub cancel: Arc<AtomicBool>,
    pub thread_id: String,
    pub max_steps: u64,
    pub checkpoint_every_step: bool,
    pub output_channels: Option<Vec<crate::channels::ChannelId>>,
}

/// Drive `store` through steps starting at `(step_index, frontier)` until
/// the run terminates. `resume_value` is handed to every node invoked in
/// the very first step only (spec.md §4.4: "re-enter the same stepIndex
/// with the frontier that produced the interrupt and a resumeValue").
pub async fn run(
    ctx: &SchedulerContext,
    mut store: ChannelStore,
    mut step_index: u64,
    mut frontier: HashSet<String>,
    mut resume_value: Option<ResumePayload>,
) -> Result<Outcome, RuntimeError> {
    loop {
        if ctx.cancel.load(Ordering::SeqCst) {
            tracing::info!(run_id = %ctx.run_id.0, step_index, "run cancelled");
            let output = build_output(&store, ctx)?;
            return Ok(Outcome::Cancelled {
                output: Some(output),
                telemetry: Telemetry { steps_executed: step_index },
            });
        }

        tracing::debug!(run_id = %ctx.run_id.0, step_index, "step started");
        ctx.emit
            .emit(Event::new(
                ctx.run_id,
                ctx.attempt_id,
                ctx.clock.now_ns(),
                EventKind::StepStarted { step_index },
            ))
            .await;

        let pre_step_snapshot = store.snapshot();
        let mut ordered_frontier: Vec<String> = frontier.iter().cloned().collect();
        ordered_frontier.sort();

        let resume_for_step = resume_value.take();

        let invocations = ordered_frontier.iter().map(|node_id| {
            let node = ctx
                .graph
                .node(node_id)
                .unwrap_or_else(|| panic!("frontier node {node_id} not registered"))
                .clone();
            let node_id = node_id.clone();
            let task_id = derive_task_id(ctx.run_id, ctx.attempt_id, step_index, &node_id);
            let input = NodeInput {
                store: pre_step_snapshot.clone(),
                run_id: ctx.run_id,
                attempt_id: ctx.attempt_id,
                step_index,
                task_id: task_id.clone(),
                emit: ctx.emit.clone(),
                clock: ctx.clock.clone(),
                environment: ctx.environment.clone(),
                resume_value: resume_for_step.clone(),
            };
            let emit = ctx.emit.clone();
            let run_id = ctx.run_id;
            let attempt_id = ctx.attempt_id;
            let clock = ctx.clock.clone();
            async move {
                emit.emit(Event::new(
                    run_id,
                    attempt_id,
                    clock.now_ns(),
                    EventKind::TaskStarted {
                        node_id: node_id.clone(),
                        task_id: task_id.clone(),
                    },
                ))
                .await;
                tracing::debug!(node_id = %node_id, task_id = %task_id, "node started");
                let result = node.run(input).await;
                if let Err(err) = &result {
                    tracing::warn!(node_id = %node_id, task_id = %task_id, error = %err, "node failed");
                }
                emit.emit(Event::new(
                    run_id,
                    attempt_id,
                    clock.now_ns(),
                    EventKind::TaskFinished {
                        node_id: node_id.clone(),
                        task_id,
                        success: result.is_ok(),
                    },
                ))
                .await;
                (node_id, result)
            }
        });

        let results = join_all(invocations).await;

        let mut collected_writes: Vec<StagedWrite> = Vec::new();
        let mut routing_overrides: Vec<(String, RoutingDecision)> = Vec::new();
        let mut interrupt: Option<(String, crate::interrupt::InterruptPayload)> = None;

        for (node_id, result) in results {
            let output = result.map_err(|source| RuntimeError::Node {
                node_id: node_id.clone(),
                source: Box::new(source),
            })?;
            if interrupt.is_none() {
                if let Some(payload) = output.interrupt {
                    interrupt = Some((node_id.clone(), payload));
                }
            }
            collected_writes.extend(output.writes);
            if let Some(decision) = output.routing_override {
                routing_overrides.push((node_id, decision));
            }
        }

        if let Some((node_id, payload)) = interrupt {
            let interrupt_id = InterruptId::new();
            tracing::info!(run_id = %ctx.run_id.0, step_index, node_id = %node_id, interrupt_id = %interrupt_id.0, "run interrupted");
            if let Some(checkpoint_store) = &ctx.checkpoint_store {
                let channels = pre_step_snapshot.to_json_checkpointed().map_err(RuntimeError::Reducer)?;
                let pending = PendingInterrupt {
                    id: interrupt_id,
                    step_index,
                    frontier: ordered_frontier.clone(),
                    payload: payload.clone(),
                };
                let checkpoint = Checkpoint {
                    id: Uuid::new_v4().to_string(),
                    thread_id: ctx.thread_id.clone(),
                    run_id: ctx.run_id,
                    attempt_id: ctx.attempt_id,
                    step_index,
                    channels,
                    pending_interrupt: Some(pending),
                };
                checkpoint_store.save(checkpoint).await?;
            }
            ctx.emit
                .emit(Event::new(
                    ctx.run_id,
                    ctx.attempt_id,
                    ctx.clock.now_ns(),
                    EventKind::RunInterrupted { interrupt_id },
                ))
                .await;
            return Ok(Outcome::Interrupted(Interruption { id: interrupt_id, payload }));
        }

        let channel_updates = store.commit(collected_writes)?;
        tracing::debug!(run_id = %ctx.run_id.0, step_index, updated = channel_updates.len(), "writes committed");

        for (channel, old_revision, new_revision) in channel_updates {
            ctx.emit
                .emit(Event::new(
                    ctx.run_id,
                    ctx.attempt_id,
                    ctx.clock.now_ns(),
                    EventKind::ChannelUpdated {
                        channel,
                        old_revision,
                        new_revision,
                    },
                ))
                .await;
        }

        if ctx.checkpoint_every_step {
            if let Some(checkpoint_store) = &ctx.checkpoint_store {
                let channels = store.snapshot().to_json_checkpointed().map_err(RuntimeError::Reducer)?;
                let checkpoint = Checkpoint {
                    id: Uuid::new_v4().to_string(),
                    thread_id: ctx.thread_id.clone(),
                    run_id: ctx.run_id,
                    attempt_id: ctx.attempt_id,
                    step_index,
                    channels,
                    pending_interrupt: None,
                };
                checkpoint_store.save(checkpoint).await?;
            }
        }

        let mut next_frontier: HashSet<String> = HashSet::new();
        let mut end_requested = false;
        let post_commit_snapshot = store.snapshot();
        for node_id in &ordered_frontier {
            let decision = routing_overrides
                .iter()
                .find(|(id, _)| id == node_id)
                .map(|(_, d)| d.clone())
                .or_else(|| ctx.graph.router(node_id).map(|r| r.route(&post_commit_snapshot)))
                .unwrap_or(RoutingDecision::UseGraphEdges);
            match decision {
                RoutingDecision::End => end_requested = true,
                RoutingDecision::UseGraphEdges => next_frontier.extend(ctx.graph.static_edges(node_id)),
                RoutingDecision::Nodes(set) => next_frontier.extend(set),
            }
        }
        if end_requested {
            next_frontier.clear();
        }

        if next_frontier.is_empty() {
            tracing::info!(run_id = %ctx.run_id.0, step_index, "run finished");
            let output = build_output(&store, ctx)?;
            ctx.emit
                .emit(Event::new(ctx.run_id, ctx.attempt_id, ctx.clock.now_ns(), EventKind::RunFinished))
                .await;
            return Ok(Outcome::Finished {
                output,
                telemetry: Telemetry {
                    steps_executed: step_index + 1,
                },
            });
        }

        if step_index + 1 > ctx.max_steps {
            tracing::info!(run_id = %ctx.run_id.0, step_index, max_steps = ctx.max_steps, "run out of steps");
            let output = build_output(&store, ctx)?;
            ctx.emit
                .emit(Event::new(ctx.run_id, ctx.attempt_id, ctx.clock.now_ns(), EventKind::RunFinished))
                .await;
            return Ok(Outcome::OutOfSteps {
                max_steps: ctx.max_steps,
                output,
                telemetry: Telemetry {
                    steps_executed: step_index + 1,
                },
            });
        }

        ctx.emit
            .emit(Event::new(
                ctx.run_id,
                ctx.attempt_id,
                ctx.clock.now_ns(),
                EventKind::StepFinished { step_index },
            ))
            .await;

        step_index += 1;
        frontier = next_frontier;
    }
}

fn build_output(store: &ChannelStore, ctx: &SchedulerContext) -> Result<Output, RuntimeError> {
    let snapshot = store.snapshot();
    match &ctx.output_channels {
        None => Ok(Output::FullStore(snapshot.to_json().map_err(RuntimeError::Reducer)?)),
        Some(ids) => Ok(Output::Channels(
            snapshot.to_json_filtered(ids).map_err(RuntimeError::Reducer)?,
        )),
    }
}
