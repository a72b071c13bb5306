//! Deterministic identity derivation (spec §4.8).
//!
//! All message ids are `"msg:" || lowerHex(SHA256(payload))`, where the
//! payload layout is contractual byte-for-byte. Run/attempt/interrupt ids are
//! opaque 128-bit values rendered as lowercase hyphenated UUIDs; they need
//! not be derived (only message ids are required to be reproducible across
//! re-runs), so they're generated with `uuid::Uuid::new_v4`.

use sha2::{Digest, Sha256};
use std::fmt;

/// 128-bit run identifier. Stable across resumes of the same run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct RunId(pub uuid::Uuid);

/// 128-bit attempt identifier. A fresh value is allocated on every `resume`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct AttemptId(pub uuid::Uuid);

/// 128-bit interrupt identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct InterruptId(pub uuid::Uuid);

/// Per-invocation task identifier: deterministic hash of `(runID, attemptID, stepIndex, nodeID)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct TaskId(pub String);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl RunId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl AttemptId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for InterruptId {
    fn default() -> Self {
        Self::new()
    }
}

fn lower_hex_sha256(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    hex::encode(digest)
}

fn msg_id(payload: &[u8]) -> String {
    format!("msg:{}", lower_hex_sha256(payload))
}

/// Deterministic task id: hash of `(runID, attemptID, stepIndex, nodeID)`.
///
/// Not contractual in the byte-layout sense message ids are (no test asserts
/// its exact bytes), but must be a pure function of its inputs so that
/// `taskStarted`/`taskFinished` events are reproducible across identical re-runs.
pub fn derive_task_id(run_id: RunId, attempt_id: AttemptId, step_index: u64, node_id: &str) -> TaskId {
    let mut payload = Vec::new();
    payload.extend_from_slice(run_id.0.as_bytes());
    payload.extend_from_slice(attempt_id.0.as_bytes());
    payload.extend_from_slice(&step_index.to_be_bytes());
    payload.extend_from_slice(node_id.as_bytes());
    TaskId(lower_hex_sha256(&payload))
}

/// User message id payload: `"HMSG1" || runID(16) || stepIndex(be u32) || "user" || 0u32(be)`.
///
/// `stepIndex` must fit in a `u32`; a run with more than `u32::MAX` steps is
/// a fatal precondition violation (callers should not reach that scale).
pub fn derive_user_message_id(run_id: RunId, step_index: u64) -> Result<String, String> {
    let step_index: u32 = step_index
        .try_into()
        .map_err(|_| "stepIndex does not fit in u32".to_string())?;
    let mut payload = Vec::new();
    payload.extend_from_slice(b"HMSG1");
    payload.extend_from_slice(run_id.0.as_bytes());
    payload.extend_from_slice(&step_index.to_be_bytes());
    payload.extend_from_slice(b"user");
    payload.extend_from_slice(&0u32.to_be_bytes());
    Ok(msg_id(&payload))
}

/// Role for `derive_role_message_id`: only `assistant` and `system` ids are derived this way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdRole {
    Assistant,
    System,
}

impl IdRole {
    fn as_ascii(self) -> &'static [u8] {
        match self {
            IdRole::Assistant => b"assistant",
            IdRole::System => b"system",
        }
    }
}

/// Role-based id payload (assistant/system): `"HMSG1" || taskID || 0x00 || role || 0u32(be)`.
pub fn derive_role_message_id(task_id: &TaskId, role: IdRole) -> String {
    let mut payload = Vec::new();
    payload.extend_from_slice(b"HMSG1");
    payload.extend_from_slice(task_id.0.as_bytes());
    payload.push(0u8);
    payload.extend_from_slice(role.as_ascii());
    payload.extend_from_slice(&0u32.to_be_bytes());
    msg_id(&payload)
}

/// Tool-role message id: `"tool:" || callID`, or `"tool:" || callID || ":cancelled"`.
pub fn derive_tool_message_id(call_id: &str, cancelled: bool) -> String {
    if cancelled {
        format!("tool:{}:cancelled", call_id)
    } else {
        format!("tool:{}", call_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: S6 — assistant id equals the SHA-256 of the documented byte layout.
    #[test]
    fn assistant_id_matches_documented_byte_layout() {
        let task_id = TaskId("T".to_string());
        let id = derive_role_message_id(&task_id, IdRole::Assistant);

        let mut expected_payload = Vec::new();
        expected_payload.extend_from_slice(b"HMSG1");
        expected_payload.extend_from_slice(b"T");
        expected_payload.push(0u8);
        expected_payload.extend_from_slice(b"assistant");
        expected_payload.extend_from_slice(&0u32.to_be_bytes());
        let expected = format!("msg:{}", lower_hex_sha256(&expected_payload));

        assert_eq!(id, expected);
    }

    /// **Scenario**: P6 — user message id depends only on `(runID, stepIndex)`.
    #[test]
    fn user_message_id_is_pure_function_of_run_and_step() {
        let run = RunId::new();
        let a = derive_user_message_id(run, 3).unwrap();
        let b = derive_user_message_id(run, 3).unwrap();
        let c = derive_user_message_id(run, 4).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    /// **Scenario**: P6 — tool reply ids depend only on `(callID, cancelled)`.
    #[test]
    fn tool_message_id_depends_only_on_call_id_and_cancelled_flag() {
        assert_eq!(derive_tool_message_id("c1", false), "tool:c1");
        assert_eq!(derive_tool_message_id("c1", true), "tool:c1:cancelled");
    }

    #[test]
    fn task_id_is_deterministic() {
        let run = RunId::new();
        let attempt = AttemptId::new();
        let a = derive_task_id(run, attempt, 2, "model");
        let b = derive_task_id(run, attempt, 2, "model");
        let c = derive_task_id(run, attempt, 2, "tool_gate");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
