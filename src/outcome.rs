//! Run lifecycle types (spec.md §3 "Lifecycle"): a run terminates with one
//! of four outcomes, each carrying an [`Output`] (except `interrupted`) and
//! (except `interrupted`) a [`Telemetry`] summary.

use std::collections::BTreeMap;

use crate::identity::InterruptId;
use crate::interrupt::InterruptPayload;

/// `output` as named in a terminal outcome: either the whole store or a
/// caller-selected subset of channels, each channel JSON-encoded through
/// its codec.
#[derive(Clone, Debug)]
pub enum Output {
    FullStore(BTreeMap<String, serde_json::Value>),
    Channels(BTreeMap<String, serde_json::Value>),
}

/// Implementation-defined run statistics; spec.md doesn't fix this shape
/// beyond naming it alongside every non-`interrupted` outcome.
#[derive(Clone, Copy, Debug, Default)]
pub struct Telemetry {
    pub steps_executed: u64,
}

/// The interrupt payload returned by the `interrupted` outcome, paired with
/// the id a subsequent `resume` call must supply.
#[derive(Clone, Debug)]
pub struct Interruption {
    pub id: InterruptId,
    pub payload: InterruptPayload,
}

/// A run's terminal outcome (spec.md §3).
#[derive(Clone, Debug)]
pub enum Outcome {
    Finished {
        output: Output,
        telemetry: Telemetry,
    },
    OutOfSteps {
        max_steps: u64,
        output: Output,
        telemetry: Telemetry,
    },
    Interrupted(Interruption),
    Cancelled {
        output: Option<Output>,
        telemetry: Telemetry,
    },
}
