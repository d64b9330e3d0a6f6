//! Concat stage - joins the staged inputs into one audio stream.

use async_trait::async_trait;
use bytes::Bytes;

use crate::assembly::commands::{concat_args, render_manifest};
use crate::assembly::errors::{StepError, StepResult};
use crate::assembly::step::{require_artifact, AssemblyStep};
use crate::assembly::types::{Context, PipelineJob, Stage};

/// Concat stage.
///
/// Writes the manifest in sorted input order and issues one transform
/// that encodes the concatenation with the run's encode options.
pub struct ConcatStep;

impl ConcatStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ConcatStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssemblyStep for ConcatStep {
    fn stage(&self) -> Stage {
        Stage::Concatenating
    }

    fn name(&self) -> &str {
        "Concat"
    }

    fn validate_input(&self, _ctx: &Context, job: &PipelineJob) -> StepResult<()> {
        if job.staged.is_empty() {
            return Err(StepError::invalid_input("No staged inputs to concatenate"));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &Context, job: &mut PipelineJob) -> StepResult<()> {
        let manifest = job.artifact_name("list.txt");
        let text = render_manifest(&job.staged);
        ctx.write_scratch(job, &manifest, Bytes::from(text.into_bytes()))
            .await?;
        job.manifest = Some(manifest.clone());

        let output = job.artifact_name("all.m4a");
        job.register(&output);
        let args = concat_args(&manifest, &ctx.options, &output);
        ctx.transform(Stage::Concatenating, &args, Some(job.total_duration_ms()))
            .await?;

        job.concatenated = Some(output);
        Ok(())
    }

    async fn validate_output(&self, ctx: &Context, job: &PipelineJob) -> StepResult<()> {
        match &job.concatenated {
            Some(name) => require_artifact(ctx, name).await,
            None => Err(StepError::invalid_output("Concatenated audio not recorded")),
        }
    }
}
