//! The run event stream (spec.md §4.12): a lazy, finite, non-restartable
//! sequence of events describing a run's progress.
//!
//! Grounded on `stream::StreamWriter`/`StreamEvent` (`stream/mod.rs`),
//! narrowed to exactly the `kind` enum spec.md §4.12 names, transported over
//! a bounded `tokio::sync::mpsc` channel with `send().await` backpressure
//! (Design Note: "pick one explicitly" — backpressure was chosen over
//! drop-oldest so P11's strict event ordering can never be violated by a
//! slow consumer silently losing events).

use serde_json::Value;
use tokio::sync::mpsc;

use crate::channels::ChannelId;
use crate::identity::{AttemptId, InterruptId, RunId, TaskId};

/// Discriminant for an event's payload. Mirrors spec.md §4.12's `kind` enum.
#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    RunStarted,
    RunFinished,
    RunInterrupted { interrupt_id: InterruptId },
    StepStarted { step_index: u64 },
    StepFinished { step_index: u64 },
    TaskStarted { node_id: String, task_id: TaskId },
    TaskFinished { node_id: String, task_id: TaskId, success: bool },
    ChannelUpdated { channel: ChannelId, old_revision: u64, new_revision: u64 },
    ModelInvocationStarted { model: String },
    ModelToken { text: String },
    ModelInvocationFinished,
    ToolInvocationStarted { tool_name: String },
    ToolInvocationFinished { tool_name: String, success: bool },
}

/// One emitted event: common envelope fields plus a `kind`-specific payload
/// and free-form `metadata` (e.g. `{toolCallID: id}` on tool events).
#[derive(Clone, Debug)]
pub struct Event {
    pub run_id: RunId,
    pub attempt_id: AttemptId,
    pub timestamp_ns: u64,
    pub kind: EventKind,
    pub metadata: Value,
}

impl Event {
    pub fn new(run_id: RunId, attempt_id: AttemptId, timestamp_ns: u64, kind: EventKind) -> Self {
        Self {
            run_id,
            attempt_id,
            timestamp_ns,
            kind,
            metadata: Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Sender half used internally by the scheduler. `send` backpressures the
/// caller rather than dropping events, per the Design Note choice above.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<Event>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Best-effort per spec.md §7 ("downstream event consumer errors do not
    /// poison the run"): a closed receiver means nobody is listening, which
    /// is not a run failure.
    pub async fn emit(&self, event: Event) {
        let _ = self.tx.send(event).await;
    }
}

/// Bounded channel capacity for the event stream. Chosen generously enough
/// that a reasonably prompt consumer never forces the scheduler to block
/// mid-step; backpressure still applies past this depth.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

pub fn event_channel() -> (EventSink, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    (EventSink::new(tx), rx)
}
