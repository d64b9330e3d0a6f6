//! Probe stage - stages inputs and gathers durations, tags, and cover.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::assembly::errors::{StepError, StepResult};
use crate::assembly::step::AssemblyStep;
use crate::assembly::types::{Context, InputSource, PipelineJob, Stage};
use crate::chapters::build_timeline;
use crate::metadata::{extract_cover, merge_metadata, CoverImage};
use crate::pool::run_pool;
use crate::probe::probe;

/// Probe stage.
///
/// Sorts inputs by file name, copies them into the engine namespace,
/// probes them through the pool, then resolves the cover and builds
/// the chapter timeline and merged metadata.
pub struct ProbeStep;

impl ProbeStep {
    pub fn new() -> Self {
        Self
    }

    async fn stage_inputs(&self, ctx: &Context, job: &mut PipelineJob) -> StepResult<()> {
        job.inputs.sort_by(|a, b| a.name.cmp(&b.name));

        let mut staged = Vec::with_capacity(job.inputs.len());
        for (index, input) in job.inputs.iter().enumerate() {
            let name = job.artifact_name(&format!("in-{:03}.{}", index, input.extension()));
            job.scratch.insert(name.clone());
            let written = match &input.source {
                InputSource::Path(path) => ctx.engine.import_artifact(&name, path).await,
                InputSource::Bytes(data) => ctx.engine.write_artifact(&name, data.clone()).await,
            };
            written.map_err(|e| StepError::engine(format!("staging {}", input.name), e))?;
            ctx.logger
                .debug(&format!("Staged {} as {}", input.name, name));
            staged.push(name);
        }
        job.staged = staged;
        Ok(())
    }

    async fn probe_inputs(&self, ctx: &Context, job: &mut PipelineJob) -> StepResult<()> {
        let limit = ctx.effective_concurrency(ctx.probe_concurrency);
        let token = ctx.cancel.token();
        let engine = ctx.engine.as_ref();
        let opts = &ctx.invoke;

        ctx.logger.info(&format!(
            "Probing {} file(s), {} at a time",
            job.staged.len(),
            limit
        ));
        let units: Vec<_> = job
            .staged
            .iter()
            .map(|name| Box::pin(probe(engine, name, opts)))
            .collect();
        let report = run_pool(units, limit, Some(&token)).await?;
        ctx.drain_engine_events().await;

        if report.cancelled {
            return Err(StepError::cancelled("probing"));
        }

        let mut probes = Vec::with_capacity(job.inputs.len());
        for (input, outcome) in job.inputs.iter().zip(report.into_ordered()) {
            probes.push(outcome?.with_file_name(input.name.clone()));
        }
        job.probes = probes;
        Ok(())
    }

    /// First embedded cover found in sorted order.
    async fn find_embedded_cover(
        &self,
        ctx: &Context,
        job: &mut PipelineJob,
    ) -> StepResult<Option<CoverImage>> {
        let scratch = job.artifact_name("cover-probe.jpg");
        let candidates: Vec<String> = job
            .staged
            .iter()
            .zip(&job.probes)
            .filter(|(_, probe)| probe.has_embedded_cover)
            .map(|(name, _)| name.clone())
            .collect();

        for staged in candidates {
            job.register(&scratch);
            let cover = extract_cover(ctx.engine.as_ref(), &staged, &scratch, &ctx.invoke)
                .await
                .map_err(|e| StepError::engine("extracting cover", e))?;
            if let Some(cover) = cover {
                ctx.logger.info(&format!("Using embedded cover from {}", staged));
                return Ok(Some(cover));
            }
        }
        Ok(None)
    }
}

impl Default for ProbeStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssemblyStep for ProbeStep {
    fn stage(&self) -> Stage {
        Stage::Probing
    }

    fn name(&self) -> &str {
        "Probe"
    }

    fn validate_input(&self, _ctx: &Context, job: &PipelineJob) -> StepResult<()> {
        if job.inputs.is_empty() {
            return Err(StepError::invalid_input("No input files"));
        }
        let mut seen = HashSet::new();
        for input in &job.inputs {
            if input.name.trim().is_empty() {
                return Err(StepError::invalid_input("Input file with empty name"));
            }
            if !seen.insert(input.name.as_str()) {
                return Err(StepError::invalid_input(format!(
                    "Duplicate input file name: {}",
                    input.name
                )));
            }
        }
        Ok(())
    }

    async fn execute(&self, ctx: &Context, job: &mut PipelineJob) -> StepResult<()> {
        self.stage_inputs(ctx, job).await?;
        self.probe_inputs(ctx, job).await?;

        let embedded = if job.cover_override.is_some() {
            ctx.logger.info("Using supplied cover");
            None
        } else {
            self.find_embedded_cover(ctx, job).await?
        };
        ctx.drain_engine_events().await;
        // Failed extraction attempts are expected; keep them out of later diagnostics.
        ctx.logger.clear_tail();

        job.metadata = merge_metadata(&job.probes, [job.cover_override.clone(), embedded]);
        job.chapters = build_timeline(&job.probes);

        ctx.logger.info(&format!(
            "{} chapter(s), {} ms total, album: {}",
            job.chapters.len(),
            job.total_duration_ms(),
            job.metadata.album.as_deref().unwrap_or("(none)")
        ));
        Ok(())
    }

    async fn validate_output(&self, _ctx: &Context, job: &PipelineJob) -> StepResult<()> {
        if job.probes.len() != job.inputs.len() || job.staged.len() != job.inputs.len() {
            return Err(StepError::invalid_output("Not every input was probed"));
        }
        if job.chapters.len() != job.probes.len() {
            return Err(StepError::invalid_output("Chapter count does not match inputs"));
        }
        Ok(())
    }
}
