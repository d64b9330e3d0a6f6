//! Interface to the external media engine.
//!
//! The engine exposes two entry points (probe and transform) that take
//! ffmpeg-style argument vectors and return an exit status, plus a flat
//! artifact namespace where inputs are staged and outputs are collected.
//! Status `0` is success; any other status is returned as-is and
//! interpreted by the caller. Timeouts and cancellation are errors.
//!
//! # Example
//!
//! ```no_run
//! use audiobook_core::engine::{Engine, InvokeOptions, ProcessEngine};
//!
//! # async fn demo() -> Result<(), audiobook_core::engine::EngineError> {
//! let engine = ProcessEngine::new("ffmpeg", "ffprobe", ".temp");
//! engine.open().await?;
//!
//! let args = vec!["-i".to_string(), "/music/a.mp3".to_string(), "a.m4a".to_string()];
//! let status = engine.transform(&args, &InvokeOptions::new()).await?;
//! assert_eq!(status, 0);
//!
//! let bytes = engine.read_artifact("a.m4a").await?;
//! engine.close().await?;
//! # Ok(())
//! # }
//! ```

mod process;
mod types;

#[cfg(test)]
pub mod fake;

pub use process::{parse_progress_time, ProcessEngine};
pub use types::{EngineError, EngineEvent, EngineResult, EngineTool, InvokeOptions};

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

/// An external media engine.
///
/// Implementations must be usable through `Arc<dyn Engine>`; whether
/// several invocations may be in flight at once is reported by
/// [`Engine::supports_concurrent_invocations`].
#[async_trait]
pub trait Engine: Send + Sync {
    /// Engine name, for logging.
    fn name(&self) -> &str;

    /// Acquire engine resources (namespace, workers).
    async fn open(&self) -> EngineResult<()>;

    /// Release engine resources. Artifacts left in the namespace are discarded.
    async fn close(&self) -> EngineResult<()>;

    /// Whether `open()` has been called without a matching `close()`.
    fn is_open(&self) -> bool;

    /// Run the probe entry point.
    async fn probe(&self, args: &[String], opts: &InvokeOptions) -> EngineResult<i32>;

    /// Run the transform entry point.
    async fn transform(&self, args: &[String], opts: &InvokeOptions) -> EngineResult<i32>;

    /// Write an artifact into the namespace, replacing any existing one.
    async fn write_artifact(&self, name: &str, data: Bytes) -> EngineResult<()>;

    /// Copy a host file into the namespace.
    async fn import_artifact(&self, name: &str, source: &Path) -> EngineResult<()> {
        let data = tokio::fs::read(source)
            .await
            .map_err(|e| EngineError::artifact("import", name, e))?;
        self.write_artifact(name, Bytes::from(data)).await
    }

    /// Read an artifact's bytes.
    async fn read_artifact(&self, name: &str) -> EngineResult<Bytes>;

    /// Read an artifact as UTF-8 text.
    async fn read_artifact_text(&self, name: &str) -> EngineResult<String> {
        let data = self.read_artifact(name).await?;
        String::from_utf8(data.to_vec()).map_err(|e| {
            EngineError::artifact(
                "read",
                name,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })
    }

    /// Delete an artifact.
    async fn delete_artifact(&self, name: &str) -> EngineResult<()>;

    /// List artifact names in a namespace directory (`""` for the root).
    async fn list_artifacts(&self, dir: &str) -> EngineResult<Vec<String>>;

    /// Subscribe to log and progress events.
    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;

    /// Whether concurrent probe/transform invocations are safe.
    fn supports_concurrent_invocations(&self) -> bool;
}

/// Render a command line for display (dry-run output, logs).
///
/// Arguments containing whitespace or quotes are double-quoted.
pub fn format_command(program: &str, args: &[String]) -> String {
    let mut out = String::from(program);
    for arg in args {
        out.push(' ');
        if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
            out.push('"');
            out.push_str(&arg.replace('\\', "\\\\").replace('"', "\\\""));
            out.push('"');
        } else {
            out.push_str(arg);
        }
    }
    out
}

/// Reject artifact names that are empty, absolute, or contain `..`.
pub(crate) fn validate_artifact_name(name: &str) -> EngineResult<()> {
    let path = Path::new(name);
    let escapes = path
        .components()
        .any(|c| !matches!(c, std::path::Component::Normal(_)));
    if name.trim().is_empty() || escapes {
        return Err(EngineError::InvalidArtifactName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_command_quotes_spaces() {
        let args = vec![
            "-i".to_string(),
            "/books/My Book/01.mp3".to_string(),
            "-metadata".to_string(),
            "artist=Jane \"JD\" Doe".to_string(),
        ];
        assert_eq!(
            format_command("ffmpeg", &args),
            "ffmpeg -i \"/books/My Book/01.mp3\" -metadata \"artist=Jane \\\"JD\\\" Doe\""
        );
    }

    #[test]
    fn artifact_names_stay_in_namespace() {
        assert!(validate_artifact_name("run-all.m4a").is_ok());
        assert!(validate_artifact_name("covers/front.jpg").is_ok());
        assert!(validate_artifact_name("").is_err());
        assert!(validate_artifact_name("../escape.txt").is_err());
        assert!(validate_artifact_name("/etc/passwd").is_err());
        assert!(validate_artifact_name("./a.txt").is_err());
    }
}
