//! Subprocess-backed engine.
//!
//! Each invocation spawns the configured ffmpeg/ffprobe binary with its
//! working directory set to a private scratch directory, which serves as
//! the artifact namespace. Relative artifact names in arguments therefore
//! resolve inside the namespace while absolute host paths pass through.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::types::{EngineError, EngineEvent, EngineResult, EngineTool, InvokeOptions};
use super::{validate_artifact_name, Engine};
use crate::config::Settings;

/// Capacity of the event channel; slow subscribers see `Lagged`.
const EVENT_CAPACITY: usize = 1024;

/// Engine that runs ffmpeg/ffprobe as child processes.
pub struct ProcessEngine {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
    scratch_root: PathBuf,
    namespace: Mutex<Option<PathBuf>>,
    events: broadcast::Sender<EngineEvent>,
}

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

impl ProcessEngine {
    /// Create an engine. Nothing is touched on disk until `open()`.
    pub fn new(
        ffmpeg_path: impl Into<PathBuf>,
        ffprobe_path: impl Into<PathBuf>,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            scratch_root: scratch_root.into(),
            namespace: Mutex::new(None),
            events,
        }
    }

    /// Create an engine from the `[engine]` and `[paths]` settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.engine.ffmpeg_path,
            &settings.engine.ffprobe_path,
            &settings.paths.temp_root,
        )
    }

    /// Namespace directory, if open.
    pub fn namespace_dir(&self) -> Option<PathBuf> {
        self.namespace.lock().clone()
    }

    fn require_namespace(&self) -> EngineResult<PathBuf> {
        self.namespace_dir().ok_or(EngineError::NotOpen)
    }

    fn artifact_path(&self, name: &str) -> EngineResult<PathBuf> {
        validate_artifact_name(name)?;
        Ok(self.require_namespace()?.join(name))
    }

    fn program(&self, tool: EngineTool) -> &Path {
        match tool {
            EngineTool::Probe => &self.ffprobe_path,
            EngineTool::Transform => &self.ffmpeg_path,
        }
    }

    async fn run(
        &self,
        tool: EngineTool,
        args: &[String],
        opts: &InvokeOptions,
    ) -> EngineResult<i32> {
        let dir = self.require_namespace()?;
        if opts.is_cancelled() {
            return Err(EngineError::cancelled(tool.name()));
        }

        let program = self.program(tool);
        let mut cmd = Command::new(program);
        cmd.args(tool.default_args())
            .args(args)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            "Running {}: {}",
            tool.name(),
            super::format_command(&program.display().to_string(), args)
        );

        let mut child = cmd
            .spawn()
            .map_err(|e| EngineError::spawn(tool.name(), e))?;

        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_lines(out, self.events.clone(), false)));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward_lines(err, self.events.clone(), true)));

        let cancel = opts.cancel.clone().unwrap_or_else(CancellationToken::new);
        let timeout = opts.timeout;

        let waited = {
            let wait = child.wait();
            let timed = async move {
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, wait).await.ok(),
                    None => Some(wait.await),
                }
            };
            tokio::select! {
                result = timed => match result {
                    Some(status) => Waited::Exited(status),
                    None => Waited::TimedOut,
                },
                _ = cancel.cancelled() => Waited::Cancelled,
            }
        };

        let outcome = match waited {
            Waited::Exited(status) => {
                let status = status.map_err(|e| EngineError::spawn(tool.name(), e))?;
                Ok(status.code().unwrap_or(-1))
            }
            Waited::TimedOut => {
                let _ = child.kill().await;
                tracing::warn!("{} killed after timeout", tool.name());
                Err(EngineError::timeout(tool.name(), timeout.unwrap_or_default()))
            }
            Waited::Cancelled => {
                let _ = child.kill().await;
                tracing::info!("{} killed on cancellation", tool.name());
                Err(EngineError::cancelled(tool.name()))
            }
        };

        // Readers finish once the pipes close, so every line is published
        // before the status is returned.
        for task in [stdout_task, stderr_task].into_iter().flatten() {
            let _ = task.await;
        }

        outcome
    }
}

impl Drop for ProcessEngine {
    fn drop(&mut self) {
        if let Some(dir) = self.namespace.lock().take() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}

#[async_trait]
impl Engine for ProcessEngine {
    fn name(&self) -> &str {
        "process"
    }

    async fn open(&self) -> EngineResult<()> {
        if self.is_open() {
            return Ok(());
        }
        let dir = self
            .scratch_root
            .join(format!("engine-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| EngineError::artifact("open", dir.display().to_string(), e))?;
        tracing::debug!("Engine namespace opened at {}", dir.display());
        *self.namespace.lock() = Some(dir);
        Ok(())
    }

    async fn close(&self) -> EngineResult<()> {
        let dir = self.namespace.lock().take();
        if let Some(dir) = dir {
            tokio::fs::remove_dir_all(&dir)
                .await
                .map_err(|e| EngineError::artifact("close", dir.display().to_string(), e))?;
            tracing::debug!("Engine namespace removed: {}", dir.display());
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.namespace.lock().is_some()
    }

    async fn probe(&self, args: &[String], opts: &InvokeOptions) -> EngineResult<i32> {
        self.run(EngineTool::Probe, args, opts).await
    }

    async fn transform(&self, args: &[String], opts: &InvokeOptions) -> EngineResult<i32> {
        self.run(EngineTool::Transform, args, opts).await
    }

    async fn write_artifact(&self, name: &str, data: Bytes) -> EngineResult<()> {
        let path = self.artifact_path(name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineError::artifact("write", name, e))?;
        }
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| EngineError::artifact("write", name, e))
    }

    async fn import_artifact(&self, name: &str, source: &Path) -> EngineResult<()> {
        let path = self.artifact_path(name)?;
        tokio::fs::copy(source, &path)
            .await
            .map(|_| ())
            .map_err(|e| EngineError::artifact("import", name, e))
    }

    async fn read_artifact(&self, name: &str) -> EngineResult<Bytes> {
        let path = self.artifact_path(name)?;
        tokio::fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|e| EngineError::artifact("read", name, e))
    }

    async fn delete_artifact(&self, name: &str) -> EngineResult<()> {
        let path = self.artifact_path(name)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| EngineError::artifact("delete", name, e))
    }

    async fn list_artifacts(&self, dir: &str) -> EngineResult<Vec<String>> {
        let root = self.require_namespace()?;
        let target = if dir.is_empty() {
            root
        } else {
            validate_artifact_name(dir)?;
            root.join(dir)
        };

        let mut entries = tokio::fs::read_dir(&target)
            .await
            .map_err(|e| EngineError::artifact("list", dir, e))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| EngineError::artifact("list", dir, e))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    fn supports_concurrent_invocations(&self) -> bool {
        // Every invocation is its own process; callers keep artifact names unique.
        true
    }
}

/// Publish each line of a child pipe as engine events.
async fn forward_lines<R>(reader: R, events: broadcast::Sender<EngineEvent>, stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if let Some(processed_ms) = parse_progress_time(&line) {
            let _ = events.send(EngineEvent::Progress { processed_ms });
        }
        let _ = events.send(EngineEvent::Log { line, stderr });
    }
}

/// Extract the `time=HH:MM:SS.xx` field from an ffmpeg stats line, in ms.
pub fn parse_progress_time(line: &str) -> Option<u64> {
    let start = line.find("time=")? + "time=".len();
    let value = line[start..].split_whitespace().next()?;

    let mut parts = value.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || seconds < 0.0 {
        return None;
    }

    Some((hours * 3600 + minutes * 60) * 1000 + (seconds * 1000.0).round() as u64)
}
