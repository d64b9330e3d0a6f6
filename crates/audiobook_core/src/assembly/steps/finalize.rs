//! Finalize stage - reads the container out of the engine namespace.

use async_trait::async_trait;

use crate::assembly::errors::{StepError, StepResult};
use crate::assembly::step::AssemblyStep;
use crate::assembly::types::{AssembledAudiobook, Context, PipelineJob, Stage};
use crate::logging::sanitize_filename;

/// Finalize stage.
pub struct FinalizeStep;

impl FinalizeStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FinalizeStep {
    fn default() -> Self {
        Self::new()
    }
}

/// `<album>.<ext>` with the album made safe for file systems, or `output.<ext>`.
pub fn output_file_name(album: Option<&str>, extension: &str) -> String {
    let stem = album
        .map(sanitize_filename)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "output".to_string());
    format!("{}.{}", stem, extension)
}

#[async_trait]
impl AssemblyStep for FinalizeStep {
    fn stage(&self) -> Stage {
        Stage::Finalizing
    }

    fn name(&self) -> &str {
        "Finalize"
    }

    fn validate_input(&self, _ctx: &Context, job: &PipelineJob) -> StepResult<()> {
        if job.output_artifact.is_none() {
            return Err(StepError::invalid_input("No output container to read"));
        }
        Ok(())
    }

    async fn execute(&self, ctx: &Context, job: &mut PipelineJob) -> StepResult<()> {
        let name = job
            .output_artifact
            .clone()
            .ok_or_else(|| StepError::invalid_input("No output container to read"))?;
        let data = ctx
            .engine
            .read_artifact(&name)
            .await
            .map_err(|e| StepError::engine("reading output", e))?;

        let file_name = output_file_name(job.metadata.album.as_deref(), &ctx.options.output_extension);
        ctx.logger
            .info(&format!("Read {} ({} bytes)", file_name, data.len()));

        job.output = Some(AssembledAudiobook {
            file_name,
            data,
            duration_ms: job.total_duration_ms(),
            chapters: job.chapters.clone(),
            metadata: job.metadata.clone(),
        });
        Ok(())
    }

    async fn validate_output(&self, _ctx: &Context, job: &PipelineJob) -> StepResult<()> {
        match &job.output {
            Some(output) if !output.data.is_empty() => Ok(()),
            Some(_) => Err(StepError::invalid_output("Output container is empty")),
            None => Err(StepError::invalid_output("Output container not read")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_uses_sanitized_album() {
        assert_eq!(output_file_name(Some("Book: Part 1?"), "m4b"), "Book_ Part 1_.m4b");
        assert_eq!(output_file_name(Some(" ... "), "m4b"), "output.m4b");
        assert_eq!(output_file_name(None, "m4a"), "output.m4a");
    }
}
