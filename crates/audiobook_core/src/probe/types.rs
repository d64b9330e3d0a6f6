//! Probe result types and errors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::EngineError;
use crate::error::ErrorClass;

/// Duration and tags of one audio file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// File name the result belongs to (not the staged artifact name).
    pub file_name: String,
    /// Duration of the first audio stream, in milliseconds.
    pub duration_ms: u64,
    /// Tags with lowercase keys; format tags win over stream tags.
    pub tags: BTreeMap<String, String>,
    /// Whether the file has an attached picture stream.
    pub has_embedded_cover: bool,
}

impl ProbeResult {
    /// Replace the file name.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Tag value, if present and not blank.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .get(&key.to_ascii_lowercase())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn title(&self) -> Option<&str> {
        self.tag("title")
    }

    pub fn album(&self) -> Option<&str> {
        self.tag("album")
    }

    pub fn artist(&self) -> Option<&str> {
        self.tag("artist")
    }

    pub fn album_artist(&self) -> Option<&str> {
        self.tag("album_artist")
    }
}

/// Errors from probing a file.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The engine call itself failed (not started, timed out, cancelled).
    #[error("Probe of '{file}' failed: {source}")]
    Engine {
        file: String,
        #[source]
        source: EngineError,
    },

    /// The probe returned a non-zero status.
    #[error("ffprobe failed on '{file}' with exit code {exit_code}")]
    Status { file: String, exit_code: i32 },

    /// The probe output was not the expected JSON structure.
    #[error("Failed to parse probe output for '{file}': {message}")]
    Parse { file: String, message: String },

    /// The file has no audio stream.
    #[error("No audio stream in '{file}'")]
    NoAudioStream { file: String },

    /// Neither the audio stream nor the container reports a duration.
    #[error("No duration reported for '{file}'")]
    MissingDuration { file: String },
}

impl ProbeError {
    /// File the error refers to.
    pub fn file(&self) -> &str {
        match self {
            Self::Engine { file, .. }
            | Self::Status { file, .. }
            | Self::Parse { file, .. }
            | Self::NoAudioStream { file }
            | Self::MissingDuration { file } => file,
        }
    }

    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Engine { source, .. } => match source.class() {
                ErrorClass::Encode => ErrorClass::Probe,
                other => other,
            },
            _ => ErrorClass::Probe,
        }
    }
}

/// Result type for probe operations.
pub type ProbeOutcome<T> = Result<T, ProbeError>;

/// Raw ffprobe JSON document.
#[derive(Debug, Deserialize)]
pub(crate) struct RawProbe {
    #[serde(default)]
    pub streams: Vec<RawStream>,
    #[serde(default)]
    pub format: Option<RawFormat>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawStream {
    #[serde(default)]
    pub codec_type: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub disposition: BTreeMap<String, i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawFormat {
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}
