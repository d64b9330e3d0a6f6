//! Cover art detection and extraction.

use std::path::Path;

use bytes::Bytes;

use crate::engine::{Engine, EngineResult, InvokeOptions};

/// Image encoding of a cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverFormat {
    Jpeg,
    Png,
}

impl CoverFormat {
    /// File extension used when staging the cover.
    pub fn extension(&self) -> &'static str {
        match self {
            CoverFormat::Jpeg => "jpg",
            CoverFormat::Png => "png",
        }
    }
}

/// Cover image bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub data: Bytes,
    pub format: CoverFormat,
}

impl CoverImage {
    /// Wrap image bytes, detecting PNG by signature and assuming JPEG otherwise.
    pub fn from_bytes(data: Bytes) -> Self {
        let format = if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            CoverFormat::Png
        } else {
            CoverFormat::Jpeg
        };
        Self { data, format }
    }

    /// Read a cover from a host file.
    pub async fn from_file(path: &Path) -> std::io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        Ok(Self::from_bytes(Bytes::from(data)))
    }
}

/// Arguments that copy the attached picture of `input` into `output`.
pub fn cover_extraction_args(input: &str, output: &str) -> Vec<String> {
    ["-loglevel", "error", "-i", input, "-an", "-vcodec", "copy", output]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Extract the embedded cover of `input`, if any.
///
/// A non-zero engine status means the file has no extractable picture
/// and yields `Ok(None)`. `scratch` is removed before returning.
pub async fn extract_cover(
    engine: &dyn Engine,
    input: &str,
    scratch: &str,
    opts: &InvokeOptions,
) -> EngineResult<Option<CoverImage>> {
    let status = engine
        .transform(&cover_extraction_args(input, scratch), opts)
        .await?;
    if status != 0 {
        tracing::debug!("No cover in {} (status {})", input, status);
        return Ok(None);
    }

    let data = engine.read_artifact(scratch).await;
    if let Err(e) = engine.delete_artifact(scratch).await {
        if !e.is_not_found() {
            tracing::warn!("Failed to remove cover scratch {}: {}", scratch, e);
        }
    }
    let data = data?;
    if data.is_empty() {
        return Ok(None);
    }
    Ok(Some(CoverImage::from_bytes(data)))
}
