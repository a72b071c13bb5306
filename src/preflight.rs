//! Preflight validation (spec.md §4.10): checked synchronously before a run
//! starts or resumes, so misconfiguration surfaces at the call site instead
//! of mid-run.

use crate::environment::Environment;
use crate::error::RuntimeError;

pub fn check(environment: &Environment, checkpoint_store_configured: bool) -> Result<(), RuntimeError> {
    if environment.model_client.is_none() && environment.model_router.is_none() {
        return Err(RuntimeError::ModelClientMissing);
    }
    if environment.tool_registry.is_none() {
        return Err(RuntimeError::ToolRegistryMissing);
    }
    if !environment.approval_policy.is_trivial() && !checkpoint_store_configured {
        return Err(RuntimeError::CheckpointStoreMissing);
    }
    if let Some(policy) = &environment.compaction_policy {
        if environment.tokenizer.is_none() {
            return Err(RuntimeError::InvalidRunOptions(
                "compaction policy configured without a tokenizer".to_string(),
            ));
        }
        if policy.max_tokens < 1 {
            return Err(RuntimeError::InvalidRunOptions("maxTokens must be >= 1".to_string()));
        }
    }
    // maxSteps = 0 is explicitly allowed (spec.md §6): it yields `outOfSteps`
    // immediately after the step 0 evaluation barrier, not a preflight error.
    Ok(())
}
