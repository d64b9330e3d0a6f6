//! Pipeline runner that executes stages in sequence.

use tokio_util::sync::CancellationToken;

use crate::error::ErrorClass;

use super::errors::{AssemblyError, AssemblyResult, StepError};
use super::step::AssemblyStep;
use super::types::{Context, PipelineJob, Stage};

/// Pipeline that runs a sequence of stages.
///
/// Stages run strictly in order with validation before and after each.
/// Whatever the outcome, every artifact registered in the job's scratch
/// set is deleted before `run` returns.
pub struct Pipeline {
    steps: Vec<Box<dyn AssemblyStep>>,
}

impl Pipeline {
    /// Create a new empty pipeline.
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Add a step (builder pattern).
    pub fn with_step<S: AssemblyStep + 'static>(mut self, step: S) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Get the number of steps in the pipeline.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Get step names in order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step, then clean up.
    ///
    /// On return `job.stage` is `Done` or `Failed`.
    pub async fn run(&self, ctx: &Context, job: &mut PipelineJob) -> AssemblyResult<()> {
        let result = self.run_steps(ctx, job).await;
        ctx.drain_engine_events().await;
        cleanup(ctx, job).await;

        match &result {
            Ok(()) => {
                job.stage = Stage::Done;
                ctx.report_progress("Complete", 100, "Assembly finished");
                ctx.logger.success("Assembly completed successfully");
            }
            Err(e) => {
                job.stage = Stage::Failed;
                ctx.logger.error(&e.to_string());
            }
        }
        result
    }

    async fn run_steps(&self, ctx: &Context, job: &mut PipelineJob) -> AssemblyResult<()> {
        let total_steps = self.steps.len().max(1);

        for (i, step) in self.steps.iter().enumerate() {
            let stage = step.stage();
            if ctx.cancel.is_cancelled() {
                ctx.logger
                    .warn(&format!("Assembly cancelled before stage '{}'", stage));
                return Err(AssemblyError::cancelled(&ctx.job_name));
            }

            job.stage = stage;
            ctx.logger.phase(step.name());
            let percent = ((i * 100) / total_steps) as u32;
            ctx.report_progress(stage.label(), percent, &format!("Starting {}", step.name()));

            ctx.logger.debug(&format!("Validating input for '{}'", stage));
            if let Err(e) = step.validate_input(ctx, job) {
                ctx.logger.error(&format!("Input validation failed: {}", e));
                return Err(fail(ctx, stage, e));
            }

            ctx.logger.debug(&format!("Executing '{}'", stage));
            if let Err(e) = step.execute(ctx, job).await {
                ctx.drain_engine_events().await;
                ctx.logger.error(&format!("Execution failed: {}", e));
                return Err(fail(ctx, stage, e));
            }

            ctx.logger.debug(&format!("Validating output for '{}'", stage));
            if let Err(e) = step.validate_output(ctx, job).await {
                ctx.logger.error(&format!("Output validation failed: {}", e));
                return Err(fail(ctx, stage, e));
            }

            ctx.logger.success(&format!("{} completed", step.name()));
        }
        Ok(())
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn fail(ctx: &Context, stage: Stage, error: StepError) -> AssemblyError {
    if error.class() == ErrorClass::Cancelled {
        return AssemblyError::cancelled(&ctx.job_name);
    }
    AssemblyError::stage_failed(&ctx.job_name, stage, error, ctx.logger.get_tail())
}

/// Delete every registered artifact. Failures are logged, never raised.
async fn cleanup(ctx: &Context, job: &mut PipelineJob) {
    let scratch = std::mem::take(&mut job.scratch);
    let mut removed = 0usize;
    for name in &scratch {
        match ctx.engine.delete_artifact(name).await {
            Ok(()) => removed += 1,
            Err(e) if e.is_not_found() => {}
            Err(e) => ctx
                .logger
                .warn(&format!("Failed to remove artifact {}: {}", name, e)),
        }
    }
    ctx.logger.debug(&format!(
        "Cleanup removed {} of {} registered artifact(s)",
        removed,
        scratch.len()
    ));

    let prefix = format!("{}-", job.run_id);
    match ctx.engine.list_artifacts("").await {
        Ok(entries) => {
            let leftover: Vec<_> = entries.iter().filter(|e| e.starts_with(&prefix)).collect();
            if !leftover.is_empty() {
                ctx.logger.warn(&format!(
                    "Artifacts left after cleanup: {}",
                    leftover
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
        }
        Err(e) => ctx.logger.debug(&format!("Could not list artifacts: {}", e)),
    }
}

/// Handle for cancelling a running assembly or batch.
///
/// Cancellation is observed before each stage, at pool admission, and
/// inside engine invocations.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the run.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token passed to the pool and engine invocations.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}
