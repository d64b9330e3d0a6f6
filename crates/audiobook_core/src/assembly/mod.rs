//! Audiobook assembly: many audio files into one chaptered container.
//!
//! # Architecture
//!
//! ```text
//! Pipeline
//!     ├── Stage: Probing        stage inputs, probe, cover, timeline, tags
//!     ├── Stage: Concatenating  manifest + one encode
//!     ├── Stage: Muxing         metadata document + cover + chapters
//!     └── Stage: Finalizing     read the container
//! ```
//!
//! Every artifact a run creates is prefixed with its run id and deleted
//! before `assemble` returns, on success and on failure.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use audiobook_core::assembly::{Assembler, EncodeOptions, InputFile};
//! use audiobook_core::config::Settings;
//! use audiobook_core::engine::ProcessEngine;
//!
//! # async fn demo() -> Result<(), audiobook_core::assembly::AssemblyError> {
//! let settings = Settings::default();
//! let engine = Arc::new(ProcessEngine::from_settings(&settings));
//! let assembler = Assembler::new(engine, settings.clone());
//!
//! let files = vec![InputFile::from_path("/books/01.mp3"), InputFile::from_path("/books/02.mp3")];
//! let book = assembler
//!     .assemble(files, None, EncodeOptions::from_settings(&settings.encode))
//!     .await?;
//! println!("{}: {} chapters", book.file_name, book.chapters.len());
//! # Ok(())
//! # }
//! ```

mod commands;
mod errors;
mod pipeline;
mod step;
pub mod steps;
mod types;

pub use commands::{concat_args, mux_args, quote_manifest_path, render_manifest};
pub use errors::{AssemblyError, AssemblyResult, StepError, StepResult};
pub use pipeline::{CancelHandle, Pipeline};
pub use step::AssemblyStep;
pub use steps::{ConcatStep, FinalizeStep, MuxStep, ProbeStep};
pub use types::{
    AssembledAudiobook, Context, EncodeOptions, InputFile, InputSource, PipelineJob,
    ProgressCallback, Stage,
};

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Settings;
use crate::engine::Engine;
use crate::logging::{JobLogger, JobLoggerBuilder, LogConfig, LogLevel};
use crate::metadata::CoverImage;

/// Create the standard pipeline with all stages in order.
pub fn create_standard_pipeline() -> Pipeline {
    Pipeline::new()
        .with_step(ProbeStep::new())
        .with_step(ConcatStep::new())
        .with_step(MuxStep::new())
        .with_step(FinalizeStep::new())
}

type SharedLogCallback = Arc<dyn Fn(&str) + Send + Sync>;
type SharedProgressCallback = Arc<dyn Fn(&str, u32, &str) + Send + Sync>;

/// Runs assembly jobs against one engine.
pub struct Assembler {
    engine: Arc<dyn Engine>,
    settings: Settings,
    cancel: CancelHandle,
    log_level: LogLevel,
    log_dir: Option<PathBuf>,
    log_callback: Option<SharedLogCallback>,
    progress_callback: Option<SharedProgressCallback>,
}

impl Assembler {
    pub fn new(engine: Arc<dyn Engine>, settings: Settings) -> Self {
        Self {
            engine,
            settings,
            cancel: CancelHandle::new(),
            log_level: LogLevel::Info,
            log_dir: None,
            log_callback: None,
            progress_callback: None,
        }
    }

    /// Write a per-run log file into `dir`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Minimum level for per-run log output.
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Receive each formatted per-run log line.
    pub fn with_log_callback(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.log_callback = Some(Arc::new(callback));
        self
    }

    /// Receive `(stage, percent, message)` progress updates.
    pub fn with_progress_callback(
        mut self,
        callback: impl Fn(&str, u32, &str) + Send + Sync + 'static,
    ) -> Self {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Handle that cancels every run of this assembler.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Assemble `files` into one container.
    ///
    /// Files are ordered by name regardless of the order given. The
    /// engine is opened if it is not already; it is left open afterwards.
    pub async fn assemble(
        &self,
        files: Vec<InputFile>,
        cover: Option<CoverImage>,
        options: EncodeOptions,
    ) -> AssemblyResult<AssembledAudiobook> {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let job_name = format!("audiobook_{}", run_id.chars().take(8).collect::<String>());

        options
            .validate()
            .map_err(|message| AssemblyError::validation_failed(&job_name, message))?;

        let logger = Arc::new(self.build_logger(&job_name)?);
        if !self.engine.is_open() {
            self.engine
                .open()
                .await
                .map_err(|e| AssemblyError::setup_failed(&job_name, e.to_string()))?;
        }

        let mut ctx = Context::new(
            Arc::clone(&self.engine),
            &job_name,
            Arc::clone(&logger),
            options,
            self.cancel.clone(),
        )
        .with_timeout_secs(self.settings.engine.timeout_secs)
        .with_probe_concurrency(self.settings.engine.probe_concurrency);
        if let Some(callback) = &self.progress_callback {
            let callback = Arc::clone(callback);
            ctx = ctx.with_progress_callback(Box::new(move |stage, percent, message| {
                callback(stage, percent, message)
            }));
        }

        logger.section(&format!("Assembling {} file(s)", files.len()));
        logger.debug(&format!("Engine: {}, run id: {}", self.engine.name(), run_id));

        let mut job = PipelineJob::new(run_id, files, cover);
        let result = create_standard_pipeline().run(&ctx, &mut job).await;
        logger.flush();
        result?;

        job.output.take().ok_or_else(|| {
            AssemblyError::stage_failed(
                &job_name,
                Stage::Finalizing,
                StepError::invalid_output("Output container not read"),
                Vec::new(),
            )
        })
    }

    fn build_logger(&self, job_name: &str) -> AssemblyResult<JobLogger> {
        let mut builder = JobLoggerBuilder::new(job_name)
            .config(LogConfig::from_settings(&self.settings.logging))
            .level(self.log_level);
        if let Some(dir) = &self.log_dir {
            builder = builder.log_dir(dir);
        }
        if let Some(callback) = &self.log_callback {
            let callback = Arc::clone(callback);
            builder = builder.callback(Box::new(move |line: &str| callback(line)));
        }

        builder
            .build()
            .map_err(|e| AssemblyError::setup_failed(job_name, format!("log file: {}", e)))
    }
}
