//! Interrupt/resume types (spec.md §4.4, §4.5) and the tool approval policy.
//!
//! Grounded on `helve::prompt::ApprovalPolicy` (`None`/`DestructiveOnly`/
//! `Always` plus a fixed `tools_requiring_approval` list), generalized from a
//! hardcoded destructive-tool list to a client-supplied `allowList`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::identity::InterruptId;
use crate::message::ToolCall;

/// `toolApprovalPolicy` configuration (spec.md §4.5).
#[derive(Clone, Debug)]
pub enum ApprovalPolicy {
    Never,
    Always,
    AllowList(HashSet<String>),
}

impl ApprovalPolicy {
    /// Whether approval is required given the pending calls' tool names.
    pub fn requires_approval(&self, pending: &[ToolCall]) -> bool {
        match self {
            ApprovalPolicy::Never => false,
            ApprovalPolicy::Always => true,
            ApprovalPolicy::AllowList(allowed) => pending.iter().any(|c| !allowed.contains(&c.name)),
        }
    }

    /// Whether this policy can ever require approval — used at preflight
    /// (spec.md §4.10: non-`never` policies require a checkpoint store).
    pub fn is_trivial(&self) -> bool {
        matches!(self, ApprovalPolicy::Never)
    }
}

/// Payload carried by an `InterruptRequest` (spec.md §4.2's `NodeOutput`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum InterruptPayload {
    ToolApprovalRequired { calls: Vec<ToolCall> },
}

/// The pending interrupt descriptor persisted alongside a checkpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingInterrupt {
    pub id: InterruptId,
    pub step_index: u64,
    pub frontier: Vec<String>,
    pub payload: InterruptPayload,
}

/// Decision carried by a `resume` call answering a `toolApprovalRequired` interrupt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
    Cancelled,
}

/// Payload a caller supplies to `resume` (spec.md §6). Generalized as an enum
/// so future resume kinds don't require changing `resume`'s signature.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ResumePayload {
    ToolApproval { decision: ApprovalDecision },
}

pub const TOOL_EXECUTION_REJECTED_MESSAGE: &str = "Tool execution rejected by user.";
pub const TOOL_EXECUTION_CANCELLED_MESSAGE: &str = "Tool execution cancelled by user.";
pub const TOOL_CALL_CANCELLED_MESSAGE: &str = "Tool call cancelled by user.";
