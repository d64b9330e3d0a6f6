//! Error types for the assembly pipeline.
//!
//! Errors carry context that chains through layers:
//! Job → Stage → Operation → Detail

use thiserror::Error;

use crate::engine::EngineError;
use crate::error::ErrorClass;
use crate::pool::PoolError;
use crate::probe::ProbeError;

use super::types::Stage;

/// Top-level assembly error with job context.
#[derive(Error, Debug)]
pub enum AssemblyError {
    /// A stage failed during execution.
    #[error("Job '{job_name}' failed at stage '{stage}': {source}")]
    StageFailed {
        job_name: String,
        stage: Stage,
        #[source]
        source: StepError,
        /// Tail of the engine output captured before the failure.
        diagnostics: Vec<String>,
    },

    /// Options or inputs were rejected before the pipeline started.
    #[error("Job '{job_name}' failed validation: {message}")]
    ValidationFailed { job_name: String, message: String },

    /// The run was cancelled.
    #[error("Job '{job_name}' was cancelled")]
    Cancelled { job_name: String },

    /// Failed to set up the run (engine, log file).
    #[error("Job '{job_name}' setup failed: {message}")]
    SetupFailed { job_name: String, message: String },
}

impl AssemblyError {
    /// Create a stage failed error.
    pub fn stage_failed(
        job_name: impl Into<String>,
        stage: Stage,
        source: StepError,
        diagnostics: Vec<String>,
    ) -> Self {
        Self::StageFailed {
            job_name: job_name.into(),
            stage,
            source,
            diagnostics,
        }
    }

    /// Create a validation failed error.
    pub fn validation_failed(job_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            job_name: job_name.into(),
            message: message.into(),
        }
    }

    /// Create a setup failed error.
    pub fn setup_failed(job_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SetupFailed {
            job_name: job_name.into(),
            message: message.into(),
        }
    }

    /// Create a cancelled error.
    pub fn cancelled(job_name: impl Into<String>) -> Self {
        Self::Cancelled {
            job_name: job_name.into(),
        }
    }

    /// Stage at which the run failed, if it got that far.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Engine output captured before the failure.
    pub fn diagnostics(&self) -> &[String] {
        match self {
            Self::StageFailed { diagnostics, .. } => diagnostics,
            _ => &[],
        }
    }

    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::StageFailed { source, .. } => source.class(),
            Self::ValidationFailed { .. } => ErrorClass::Validation,
            Self::Cancelled { .. } => ErrorClass::Cancelled,
            Self::SetupFailed { .. } => ErrorClass::Artifact,
        }
    }
}

/// Error from a pipeline stage with operation context.
#[derive(Error, Debug)]
pub enum StepError {
    /// Input validation failed.
    #[error("Input validation failed: {0}")]
    InvalidInput(String),

    /// Output validation failed.
    #[error("Output validation failed: {0}")]
    InvalidOutput(String),

    /// An engine invocation returned a non-zero status.
    #[error("{tool} failed with exit code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    /// Probing an input failed.
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// An engine call failed outright.
    #[error("Engine error in {operation}: {source}")]
    Engine {
        operation: String,
        #[source]
        source: EngineError,
    },

    /// The probe pool could not run.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Cancellation was observed inside the stage.
    #[error("Cancelled during {0}")]
    Cancelled(String),
}

impl StepError {
    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create an invalid output error.
    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidOutput(message.into())
    }

    /// Create a command failed error.
    pub fn command_failed(
        tool: impl Into<String>,
        exit_code: i32,
        message: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            tool: tool.into(),
            exit_code,
            message: message.into(),
        }
    }

    /// Create an engine error with context.
    pub fn engine(operation: impl Into<String>, source: EngineError) -> Self {
        Self::Engine {
            operation: operation.into(),
            source,
        }
    }

    /// Create a cancelled error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled(operation.into())
    }

    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidInput(_) | Self::Pool(_) => ErrorClass::Validation,
            Self::InvalidOutput(_) => ErrorClass::Artifact,
            Self::CommandFailed { .. } => ErrorClass::Encode,
            Self::Probe(e) => e.class(),
            Self::Engine { source, .. } => source.class(),
            Self::Cancelled(_) => ErrorClass::Cancelled,
        }
    }
}

/// Result type for stage operations.
pub type StepResult<T> = Result<T, StepError>;

/// Result type for assembly runs.
pub type AssemblyResult<T> = Result<T, AssemblyError>;
