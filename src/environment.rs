//! Bundles the external collaborators a node may consult (spec.md §4.3's
//! per-node `input = {..., environment, ...}`), so `NodeInput` carries one
//! `Arc<Environment>` instead of threading each collaborator through
//! separately.
//!
//! Grounded on `Runtime<C, S>` (`graph/runtime.rs`)'s role as the bundle
//! injected into graph nodes, narrowed to exactly the collaborators spec.md
//! §6 names the core as consuming.

use std::sync::Arc;

use crate::compactor::CompactionPolicy;
use crate::external::{ModelClient, ModelRouter, ToolRegistry, Tokenizer};
use crate::interrupt::ApprovalPolicy;
use crate::retry::RetryPolicy;

/// The environment built-in nodes read from. Constructed once per
/// [`crate::runtime::Runtime`] and shared (via `Arc`) across every step and
/// every node invocation within a run.
pub struct Environment {
    pub model_client: Option<Arc<dyn ModelClient>>,
    pub model_router: Option<Arc<dyn ModelRouter>>,
    pub tool_registry: Option<Arc<dyn ToolRegistry>>,
    pub tokenizer: Option<Arc<dyn Tokenizer>>,
    pub compaction_policy: Option<CompactionPolicy>,
    pub approval_policy: ApprovalPolicy,
    pub model_retry_policy: RetryPolicy,
    pub tool_retry_policy: RetryPolicy,
}
