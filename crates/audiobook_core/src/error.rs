//! Error classification shared by every layer.
//!
//! Each module keeps its own `thiserror` enum; `ErrorClass` is the common
//! taxonomy callers use to decide how to report a failure.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Broad category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Metadata probing failed or returned unusable output.
    Probe,
    /// An encode/transform invocation returned a non-zero status.
    Encode,
    /// An engine invocation exceeded its time budget.
    Timeout,
    /// Reading, writing, or deleting an intermediate artifact failed.
    Artifact,
    /// Caller-supplied input or configuration was rejected.
    Validation,
    /// The operation was cancelled before it completed.
    Cancelled,
}

impl ErrorClass {
    /// Short lowercase label used in logs and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorClass::Probe => "probe",
            ErrorClass::Encode => "encode",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Artifact => "artifact",
            ErrorClass::Validation => "validation",
            ErrorClass::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
