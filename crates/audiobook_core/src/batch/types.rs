//! Batch conversion types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::engine::EngineError;
use crate::error::ErrorClass;
use crate::pool::PoolError;
use crate::probe::ProbeError;

/// Options for one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Re-convert files whose output already exists.
    pub force_overwrite: bool,
    /// Report the commands without running them.
    pub dry_run: bool,
}

/// Why one file could not be converted.
#[derive(Error, Debug)]
pub enum FileError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("ffmpeg failed with exit code {exit_code}")]
    CommandFailed { exit_code: i32 },

    #[error("Engine error in {operation}: {source}")]
    Engine {
        operation: String,
        #[source]
        source: EngineError,
    },

    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },
}

impl FileError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Probe(e) => e.class(),
            Self::CommandFailed { .. } => ErrorClass::Encode,
            Self::Engine { source, .. } => source.class(),
            Self::Io { .. } => ErrorClass::Artifact,
        }
    }
}

/// Result for one file.
#[derive(Debug)]
pub enum FileStatus {
    /// Transcoded successfully.
    Converted,
    /// Output already existed and overwrite was not forced.
    Skipped,
    /// Dry run; the command that would have run.
    DryRun { command: String },
    Failed(FileError),
}

impl FileStatus {
    /// Progress character printed per file: `.` converted, `x` failed,
    /// `_` skipped. Dry runs print their command instead.
    pub fn status_char(&self) -> Option<char> {
        match self {
            FileStatus::Converted => Some('.'),
            FileStatus::Failed(_) => Some('x'),
            FileStatus::Skipped => Some('_'),
            FileStatus::DryRun { .. } => None,
        }
    }
}

/// Outcome of one discovered file.
#[derive(Debug)]
pub struct FileOutcome {
    /// Absolute input path.
    pub input: PathBuf,
    /// Path relative to the input root.
    pub relative: PathBuf,
    /// Mirrored output path.
    pub output: PathBuf,
    pub status: FileStatus,
}

/// Per-file outcomes of a batch run, in discovery order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
    /// The run stopped admitting files because it was cancelled.
    pub cancelled: bool,
}

impl BatchReport {
    fn count(&self, pred: impl Fn(&FileStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn converted(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Converted))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Skipped))
    }

    pub fn dry_run(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::DryRun { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Failed(_)))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// One-line summary for the CLI.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} converted, {} skipped, {} failed",
            self.converted(),
            self.skipped(),
            self.failed()
        );
        if self.dry_run() > 0 {
            summary.push_str(&format!(", {} dry-run", self.dry_run()));
        }
        if self.cancelled {
            summary.push_str(" (cancelled)");
        }
        summary
    }
}

/// Errors that stop a batch before any file is processed.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Input directory not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to open engine: {0}")]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl BatchError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InputNotFound { .. } | Self::Pool(_) => ErrorClass::Validation,
            Self::Io { .. } => ErrorClass::Artifact,
            Self::Engine(e) => e.class(),
        }
    }
}

pub type BatchResult<T> = Result<T, BatchError>;
