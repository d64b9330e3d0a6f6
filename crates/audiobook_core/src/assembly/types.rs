//! Core types for the assembly pipeline.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};

use crate::chapters::ChapterEntry;
use crate::config::EncodeSettings;
use crate::engine::{format_command, Engine, EngineEvent, InvokeOptions};
use crate::logging::JobLogger;
use crate::metadata::{CoverImage, MergedMetadata};
use crate::probe::ProbeResult;

use super::errors::{StepError, StepResult};
use super::pipeline::CancelHandle;

/// Progress callback type for reporting pipeline progress.
///
/// Arguments: (stage_name, percent_complete, message)
pub type ProgressCallback = Box<dyn Fn(&str, u32, &str) + Send + Sync>;

/// Stage of an assembly run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Probing,
    Concatenating,
    Muxing,
    Finalizing,
    Done,
    Failed,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Probing => "probing",
            Stage::Concatenating => "concatenating",
            Stage::Muxing => "muxing",
            Stage::Finalizing => "finalizing",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Encoding options for one assembly run.
///
/// `None` leaves the engine default in place and omits the argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeOptions {
    pub codec: Option<String>,
    pub sample_rate: Option<u32>,
    pub bit_rate_kbps: Option<u32>,
    /// Sample format width: 16, 32, or 64.
    pub bit_depth_bits: Option<u32>,
    /// Disable AAC perceptual noise substitution.
    pub legacy_device_compat: bool,
    pub output_extension: String,
}

impl EncodeOptions {
    /// Options from the `[encode]` settings section.
    pub fn from_settings(settings: &EncodeSettings) -> Self {
        Self {
            codec: settings.codec.clone(),
            sample_rate: settings.sample_rate,
            bit_rate_kbps: settings.bit_rate_kbps,
            bit_depth_bits: settings.bit_depth_bits,
            legacy_device_compat: settings.legacy_device_compat,
            output_extension: settings.output_extension.clone(),
        }
    }

    /// Check option values before any engine work.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(codec) = &self.codec {
            if codec.trim().is_empty() {
                return Err("codec must not be empty".to_string());
            }
        }
        if self.sample_rate == Some(0) {
            return Err("sample rate must be positive".to_string());
        }
        if self.bit_rate_kbps == Some(0) {
            return Err("bit rate must be positive".to_string());
        }
        if let Some(bits) = self.bit_depth_bits {
            if !matches!(bits, 16 | 32 | 64) {
                return Err(format!("bit depth must be 16, 32 or 64, got {}", bits));
            }
        }
        let ext = self.output_extension.trim();
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!("invalid output extension '{}'", self.output_extension));
        }
        Ok(())
    }
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self::from_settings(&EncodeSettings::default())
    }
}

/// Where an input's bytes come from.
#[derive(Debug, Clone)]
pub enum InputSource {
    /// A host file, copied into the engine namespace when staged.
    Path(PathBuf),
    /// In-memory bytes.
    Bytes(Bytes),
}

/// One user-supplied audio file.
#[derive(Debug, Clone)]
pub struct InputFile {
    /// File name used for ordering and chapter title fallback.
    pub name: String,
    pub source: InputSource,
}

impl InputFile {
    /// Input backed by a host file; the name is the final path component.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            source: InputSource::Path(path),
        }
    }

    /// Input backed by bytes.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            source: InputSource::Bytes(data.into()),
        }
    }

    /// Lowercased extension, or `bin` when there is none.
    pub fn extension(&self) -> String {
        Path::new(&self.name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| "bin".to_string())
    }
}

/// Finished container.
#[derive(Debug, Clone)]
pub struct AssembledAudiobook {
    /// `<album>.<ext>`, or `output.<ext>` without an album.
    pub file_name: String,
    pub data: Bytes,
    pub duration_ms: u64,
    pub chapters: Vec<ChapterEntry>,
    pub metadata: MergedMetadata,
}

/// Shared context passed to pipeline stages.
///
/// Holds the engine and run configuration that stages read but do not
/// modify. Mutable state goes in `PipelineJob`.
pub struct Context {
    /// Engine used for every invocation and artifact operation.
    pub engine: Arc<dyn Engine>,
    /// Job name/identifier.
    pub job_name: String,
    /// Per-run logger.
    pub logger: Arc<JobLogger>,
    /// Encoding options.
    pub options: EncodeOptions,
    /// Timeout and cancellation applied to each invocation.
    pub invoke: InvokeOptions,
    /// Maximum concurrent probes.
    pub probe_concurrency: usize,
    /// Run cancellation.
    pub cancel: CancelHandle,
    events: Mutex<broadcast::Receiver<EngineEvent>>,
    progress_callback: Option<ProgressCallback>,
}

impl Context {
    /// Create a new context for a run.
    ///
    /// Subscribes to engine events immediately so output from the first
    /// invocation is captured.
    pub fn new(
        engine: Arc<dyn Engine>,
        job_name: impl Into<String>,
        logger: Arc<JobLogger>,
        options: EncodeOptions,
        cancel: CancelHandle,
    ) -> Self {
        let events = engine.subscribe();
        Self {
            invoke: InvokeOptions::new().with_cancel(cancel.token()),
            engine,
            job_name: job_name.into(),
            logger,
            options,
            probe_concurrency: 1,
            cancel,
            events: Mutex::new(events),
            progress_callback: None,
        }
    }

    /// Set the per-invocation timeout (0 = none).
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.invoke = self.invoke.with_timeout_secs(secs);
        self
    }

    /// Set the probe concurrency limit.
    pub fn with_probe_concurrency(mut self, limit: usize) -> Self {
        self.probe_concurrency = limit;
        self
    }

    /// Set the progress callback.
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Report progress to callback (if set).
    pub fn report_progress(&self, stage_name: &str, percent: u32, message: &str) {
        if let Some(ref callback) = self.progress_callback {
            callback(stage_name, percent, message);
        }
    }

    /// Concurrency limit for engine work; 1 when the engine is not safe
    /// for concurrent invocations.
    pub fn effective_concurrency(&self, configured: usize) -> usize {
        if self.engine.supports_concurrent_invocations() {
            configured
        } else {
            configured.min(1)
        }
    }

    /// Write an artifact, registering it for cleanup first.
    pub async fn write_scratch(
        &self,
        job: &mut PipelineJob,
        name: &str,
        data: Bytes,
    ) -> StepResult<()> {
        job.register(name);
        self.engine
            .write_artifact(name, data)
            .await
            .map_err(|e| StepError::engine(format!("writing {}", name), e))
    }

    /// Run a transform and fail on non-zero status.
    ///
    /// Engine output is forwarded into the logger while the invocation
    /// runs. With `expected_ms`, progress events are turned into
    /// percentage updates for `stage`.
    pub async fn transform(
        &self,
        stage: Stage,
        args: &[String],
        expected_ms: Option<u64>,
    ) -> StepResult<()> {
        self.logger.command(&format_command("ffmpeg", args));

        let mut events = self.events.lock().await;
        let run = self.engine.transform(args, &self.invoke);
        tokio::pin!(run);

        let outcome = loop {
            tokio::select! {
                biased;
                outcome = &mut run => break outcome,
                event = events.recv() => match event {
                    Ok(event) => self.handle_event(stage, event, expected_ms),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        self.logger.debug(&format!("Dropped {} engine events", skipped));
                    }
                    Err(broadcast::error::RecvError::Closed) => break (&mut run).await,
                },
            }
        };
        Self::drain(&mut events, |event| self.handle_event(stage, event, expected_ms));
        drop(events);

        let status = outcome.map_err(|e| StepError::engine("transform", e))?;
        if status != 0 {
            self.logger.show_tail("ffmpeg output");
            let message = self
                .logger
                .get_tail()
                .last()
                .cloned()
                .unwrap_or_else(|| "no diagnostic output".to_string());
            return Err(StepError::command_failed("ffmpeg", status, message));
        }
        Ok(())
    }

    /// Forward queued engine events into the logger.
    pub async fn drain_engine_events(&self) {
        let mut events = self.events.lock().await;
        Self::drain(&mut events, |event| {
            if let EngineEvent::Log { line, stderr } = event {
                self.logger.output_line(&line, stderr);
            }
        });
    }

    fn drain(events: &mut broadcast::Receiver<EngineEvent>, mut handle: impl FnMut(EngineEvent)) {
        loop {
            match events.try_recv() {
                Ok(event) => handle(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    }

    fn handle_event(&self, stage: Stage, event: EngineEvent, expected_ms: Option<u64>) {
        match event {
            EngineEvent::Log { line, stderr } => self.logger.output_line(&line, stderr),
            EngineEvent::Progress { processed_ms } => {
                let Some(total) = expected_ms.filter(|t| *t > 0) else {
                    return;
                };
                let percent = ((processed_ms.min(total) * 100) / total) as u32;
                if self.logger.progress(percent) {
                    self.report_progress(stage.label(), percent, "encoding");
                }
            }
        }
    }
}

/// Mutable state of one assembly run.
///
/// Stages fill in their own fields; every artifact the run creates is
/// recorded in `scratch` so cleanup can remove it on any path.
#[derive(Debug)]
pub struct PipelineJob {
    /// Prefix of every artifact this run creates.
    pub run_id: String,
    /// Inputs, sorted by name once probing starts.
    pub inputs: Vec<InputFile>,
    /// Caller-supplied cover, preferred over embedded covers.
    pub cover_override: Option<CoverImage>,
    /// Staged input artifact names, parallel to `inputs`.
    pub staged: Vec<String>,
    pub probes: Vec<ProbeResult>,
    pub chapters: Vec<ChapterEntry>,
    pub metadata: MergedMetadata,
    pub manifest: Option<String>,
    pub concatenated: Option<String>,
    pub metadata_document: Option<String>,
    pub cover_artifact: Option<String>,
    pub output_artifact: Option<String>,
    pub stage: Stage,
    /// Artifacts to delete when the run ends.
    pub scratch: BTreeSet<String>,
    pub output: Option<AssembledAudiobook>,
}

impl PipelineJob {
    /// Create the state for a new run.
    pub fn new(
        run_id: impl Into<String>,
        inputs: Vec<InputFile>,
        cover_override: Option<CoverImage>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            inputs,
            cover_override,
            staged: Vec::new(),
            probes: Vec::new(),
            chapters: Vec::new(),
            metadata: MergedMetadata::default(),
            manifest: None,
            concatenated: None,
            metadata_document: None,
            cover_artifact: None,
            output_artifact: None,
            stage: Stage::Probing,
            scratch: BTreeSet::new(),
            output: None,
        }
    }

    /// Run-scoped artifact name: `<run_id>-<suffix>`.
    pub fn artifact_name(&self, suffix: &str) -> String {
        format!("{}-{}", self.run_id, suffix)
    }

    /// Record an artifact for cleanup.
    pub fn register(&mut self, name: &str) {
        self.scratch.insert(name.to_string());
    }

    /// Total duration of all probed inputs.
    pub fn total_duration_ms(&self) -> u64 {
        self.probes.iter().map(|p| p.duration_ms).sum()
    }
}
