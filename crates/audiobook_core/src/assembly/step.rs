//! Pipeline stage trait definition.

use async_trait::async_trait;

use super::errors::{StepError, StepResult};
use super::types::{Context, PipelineJob, Stage};

/// Trait for assembly stages.
///
/// The pipeline runner calls these methods in order:
///
/// 1. `validate_input` - Check preconditions before execution
/// 2. `execute` - Perform the stage's work
/// 3. `validate_output` - Verify the stage produced valid output
///
/// Every artifact a stage creates must be registered in
/// `PipelineJob::scratch` before the engine call that creates it.
#[async_trait]
pub trait AssemblyStep: Send + Sync {
    /// The stage this step implements.
    fn stage(&self) -> Stage;

    /// Step name (for logging).
    fn name(&self) -> &str;

    /// Validate inputs before execution.
    fn validate_input(&self, ctx: &Context, job: &PipelineJob) -> StepResult<()>;

    /// Execute the stage's work and record results in `job`.
    async fn execute(&self, ctx: &Context, job: &mut PipelineJob) -> StepResult<()>;

    /// Validate outputs after execution.
    async fn validate_output(&self, ctx: &Context, job: &PipelineJob) -> StepResult<()>;
}

/// Fail unless `name` is present in the engine namespace.
pub(crate) async fn require_artifact(ctx: &Context, name: &str) -> StepResult<()> {
    let (dir, file) = match name.rsplit_once('/') {
        Some((dir, file)) => (dir, file),
        None => ("", name),
    };
    let entries = ctx
        .engine
        .list_artifacts(dir)
        .await
        .map_err(|e| StepError::engine("listing artifacts", e))?;
    if entries.iter().any(|e| e == file) {
        Ok(())
    } else {
        Err(StepError::invalid_output(format!(
            "{} was not produced",
            name
        )))
    }
}
