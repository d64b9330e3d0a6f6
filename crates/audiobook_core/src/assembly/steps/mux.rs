//! Mux stage - applies chapters, tags, and cover to the joined audio.

use async_trait::async_trait;
use bytes::Bytes;

use crate::assembly::commands::mux_args;
use crate::assembly::errors::{StepError, StepResult};
use crate::assembly::step::{require_artifact, AssemblyStep};
use crate::assembly::types::{Context, PipelineJob, Stage};
use crate::chapters::render_metadata_document;

/// Mux stage.
pub struct MuxStep;

impl MuxStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MuxStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssemblyStep for MuxStep {
    fn stage(&self) -> Stage {
        Stage::Muxing
    }

    fn name(&self) -> &str {
        "Mux"
    }

    fn validate_input(&self, _ctx: &Context, job: &PipelineJob) -> StepResult<()> {
        if job.concatenated.is_none() {
            return Err(StepError::invalid_input("No concatenated audio to mux"));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &Context, job: &mut PipelineJob) -> StepResult<()> {
        let audio = job
            .concatenated
            .clone()
            .ok_or_else(|| StepError::invalid_input("No concatenated audio to mux"))?;

        let document = render_metadata_document(&job.metadata, &job.chapters);
        let metadata_name = job.artifact_name("metadata.txt");
        ctx.write_scratch(job, &metadata_name, Bytes::from(document.into_bytes()))
            .await?;
        job.metadata_document = Some(metadata_name.clone());

        if let Some(cover) = job.metadata.cover.clone() {
            let cover_name = job.artifact_name(&format!("cover.{}", cover.format.extension()));
            ctx.write_scratch(job, &cover_name, cover.data).await?;
            job.cover_artifact = Some(cover_name);
        }

        let output = job.artifact_name(&format!("output.{}", ctx.options.output_extension));
        job.register(&output);
        ctx.logger.info(&format!(
            "Muxing {} chapter(s){}",
            job.chapters.len(),
            if job.cover_artifact.is_some() { " with cover" } else { "" }
        ));
        let args = mux_args(
            &audio,
            job.cover_artifact.as_deref(),
            &metadata_name,
            &output,
        );
        ctx.transform(Stage::Muxing, &args, None).await?;

        job.output_artifact = Some(output);
        Ok(())
    }

    async fn validate_output(&self, ctx: &Context, job: &PipelineJob) -> StepResult<()> {
        match &job.output_artifact {
            Some(name) => require_artifact(ctx, name).await,
            None => Err(StepError::invalid_output("Output container not recorded")),
        }
    }
}
