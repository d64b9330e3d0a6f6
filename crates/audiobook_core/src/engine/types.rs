//! Engine invocation options, events, and errors.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::ErrorClass;

/// Which engine entry point an invocation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineTool {
    /// Metadata probe (`ffprobe`).
    Probe,
    /// Transform/encode (`ffmpeg`).
    Transform,
}

impl EngineTool {
    /// Conventional tool name, used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            EngineTool::Probe => "ffprobe",
            EngineTool::Transform => "ffmpeg",
        }
    }

    /// Arguments always placed before caller arguments.
    pub fn default_args(&self) -> &'static [&'static str] {
        match self {
            EngineTool::Probe => &["-hide_banner"],
            EngineTool::Transform => &["-hide_banner", "-nostdin", "-y"],
        }
    }
}

/// Per-invocation options.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    /// Kill the invocation after this long. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Token observed while the invocation runs.
    pub cancel: Option<CancellationToken>,
}

impl InvokeOptions {
    /// Options with no timeout and no cancellation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the timeout from a seconds value where zero means no limit.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    /// Set the cancellation token.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Whether the attached token (if any) has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

/// Event published by the engine while invocations run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A line of diagnostic output.
    Log { line: String, stderr: bool },
    /// Encoding progress, as media time processed so far.
    Progress { processed_ms: u64 },
}

/// Errors raised by an engine implementation.
///
/// A non-zero exit status is not an error at this layer; it is returned
/// as the invocation status and interpreted by the caller.
#[derive(Error, Debug)]
pub enum EngineError {
    /// An operation was attempted before `open()` or after `close()`.
    #[error("Engine is not open")]
    NotOpen,

    /// The tool could not be started.
    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    /// The invocation exceeded its timeout and was killed.
    #[error("{tool} timed out after {after:?}")]
    Timeout { tool: String, after: Duration },

    /// The invocation was cancelled and its result discarded.
    #[error("{tool} was cancelled")]
    Cancelled { tool: String },

    /// An artifact operation failed.
    #[error("Artifact {operation} failed for '{name}': {source}")]
    Artifact {
        operation: String,
        name: String,
        #[source]
        source: io::Error,
    },

    /// The artifact name escapes the engine namespace or is empty.
    #[error("Invalid artifact name: '{0}'")]
    InvalidArtifactName(String),
}

impl EngineError {
    /// Create a spawn error.
    pub fn spawn(tool: impl Into<String>, source: io::Error) -> Self {
        Self::Spawn {
            tool: tool.into(),
            source,
        }
    }

    /// Create a timeout error.
    pub fn timeout(tool: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            tool: tool.into(),
            after,
        }
    }

    /// Create a cancelled error.
    pub fn cancelled(tool: impl Into<String>) -> Self {
        Self::Cancelled { tool: tool.into() }
    }

    /// Create an artifact error with context.
    pub fn artifact(
        operation: impl Into<String>,
        name: impl Into<String>,
        source: io::Error,
    ) -> Self {
        Self::Artifact {
            operation: operation.into(),
            name: name.into(),
            source,
        }
    }

    /// Whether this is an artifact error caused by a missing artifact.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Artifact { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }

    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotOpen | Self::InvalidArtifactName(_) => ErrorClass::Validation,
            Self::Spawn { .. } => ErrorClass::Encode,
            Self::Timeout { .. } => ErrorClass::Timeout,
            Self::Cancelled { .. } => ErrorClass::Cancelled,
            Self::Artifact { .. } => ErrorClass::Artifact,
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
