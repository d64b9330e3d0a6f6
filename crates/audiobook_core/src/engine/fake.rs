//! Scripted in-memory engine for tests.
//!
//! Probe responses and transform failures are keyed by a suffix of the
//! input argument, so staged names like `run-in-000.mp3` still match a
//! script registered for `in-000.mp3` or `.mp3`. When several probe
//! scripts match, the one registered last wins.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::types::{EngineError, EngineEvent, EngineResult, EngineTool, InvokeOptions};
use super::{validate_artifact_name, Engine};

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub tool: EngineTool,
    pub args: Vec<String>,
}

enum ProbeScript {
    Json(String),
    Status(i32),
}

/// In-memory engine with scripted behavior.
pub struct FakeEngine {
    open: AtomicBool,
    concurrent: bool,
    delay: Duration,
    artifacts: Mutex<BTreeMap<String, Bytes>>,
    written: Mutex<BTreeMap<String, Bytes>>,
    probes: Mutex<Vec<(String, ProbeScript)>>,
    covers: Mutex<HashSet<String>>,
    transform_failures: Mutex<Vec<(String, i32)>>,
    read_failures: Mutex<Vec<String>>,
    hangs: Mutex<Vec<String>>,
    invocations: Mutex<Vec<Invocation>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    events: broadcast::Sender<EngineEvent>,
}

impl FakeEngine {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            open: AtomicBool::new(true),
            concurrent: true,
            delay: Duration::ZERO,
            artifacts: Mutex::new(BTreeMap::new()),
            written: Mutex::new(BTreeMap::new()),
            probes: Mutex::new(Vec::new()),
            covers: Mutex::new(HashSet::new()),
            transform_failures: Mutex::new(Vec::new()),
            read_failures: Mutex::new(Vec::new()),
            hangs: Mutex::new(Vec::new()),
            invocations: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            events,
        }
    }

    /// Start closed, requiring `open()`.
    pub fn closed(self) -> Self {
        self.open.store(false, Ordering::SeqCst);
        self
    }

    /// Report itself as unsafe for concurrent invocations.
    pub fn serial(mut self) -> Self {
        self.concurrent = false;
        self
    }

    /// Sleep this long inside every probe/transform.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Probe output for inputs ending with `suffix`.
    pub fn with_probe_json(self, suffix: &str, json: impl Into<String>) -> Self {
        self.probes
            .lock()
            .push((suffix.to_string(), ProbeScript::Json(json.into())));
        self
    }

    /// Standard probe output: one audio stream of `duration_ms` and format tags.
    pub fn with_audio(self, suffix: &str, duration_ms: u64, tags: &[(&str, &str)]) -> Self {
        let json = audio_probe_json(duration_ms, tags, false);
        self.with_probe_json(suffix, json)
    }

    /// Non-zero probe status for inputs ending with `suffix`.
    pub fn with_probe_status(self, suffix: &str, status: i32) -> Self {
        self.probes
            .lock()
            .push((suffix.to_string(), ProbeScript::Status(status)));
        self
    }

    /// Like `with_audio`, plus an attached picture that cover extraction returns.
    pub fn with_audio_cover(self, suffix: &str, duration_ms: u64, tags: &[(&str, &str)]) -> Self {
        self.covers.lock().insert(suffix.to_string());
        let json = audio_probe_json(duration_ms, tags, true);
        self.with_probe_json(suffix, json)
    }

    /// Transforms whose joined arguments contain `pattern` return `status`.
    pub fn with_transform_failure(self, pattern: &str, status: i32) -> Self {
        self.transform_failures
            .lock()
            .push((pattern.to_string(), status));
        self
    }

    /// Reads of artifacts ending with `suffix` fail.
    pub fn with_read_failure(self, suffix: &str) -> Self {
        self.read_failures.lock().push(suffix.to_string());
        self
    }

    /// Invocations whose joined arguments contain `pattern` never finish on their own.
    pub fn with_hang(self, pattern: &str) -> Self {
        self.hangs.lock().push(pattern.to_string());
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }

    pub fn transforms(&self) -> Vec<Vec<String>> {
        self.invocations
            .lock()
            .iter()
            .filter(|i| i.tool == EngineTool::Transform)
            .map(|i| i.args.clone())
            .collect()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn artifact_names(&self) -> Vec<String> {
        self.artifacts.lock().keys().cloned().collect()
    }

    pub fn artifact(&self, name: &str) -> Option<Bytes> {
        self.artifacts.lock().get(name).cloned()
    }

    /// Last bytes written through `write_artifact` to a name ending with
    /// `suffix`, even if the artifact has since been deleted.
    pub fn written(&self, suffix: &str) -> Option<(String, Bytes)> {
        self.written
            .lock()
            .iter()
            .find(|(name, _)| name.ends_with(suffix))
            .map(|(name, data)| (name.clone(), data.clone()))
    }

    fn require_open(&self) -> EngineResult<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::NotOpen)
        }
    }

    fn log(&self, line: impl Into<String>) {
        let _ = self.events.send(EngineEvent::Log {
            line: line.into(),
            stderr: true,
        });
    }

    fn input_exists(&self, input: &str) -> bool {
        let path = Path::new(input);
        (path.is_absolute() && path.exists()) || self.artifacts.lock().contains_key(input)
    }

    async fn invoke(&self, tool: EngineTool, args: &[String], opts: &InvokeOptions) -> EngineResult<i32> {
        self.require_open()?;
        self.invocations.lock().push(Invocation {
            tool,
            args: args.to_vec(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let joined = args.join(" ");
        let hang = self.hangs.lock().iter().any(|p| joined.contains(p.as_str()));
        let wait = async {
            if hang {
                std::future::pending::<()>().await;
            } else if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        };

        let timed = async {
            match opts.timeout {
                Some(limit) => tokio::time::timeout(limit, wait).await.is_ok(),
                None => {
                    wait.await;
                    true
                }
            }
        };
        let cancel = opts.cancel.clone().unwrap_or_default();
        let finished = tokio::select! {
            finished = timed => Some(finished),
            _ = cancel.cancelled() => None,
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match finished {
            None => return Err(EngineError::cancelled(tool.name())),
            Some(false) => {
                return Err(EngineError::timeout(
                    tool.name(),
                    opts.timeout.unwrap_or_default(),
                ))
            }
            Some(true) => {}
        }

        match tool {
            EngineTool::Probe => self.run_probe(args).await,
            EngineTool::Transform => self.run_transform(args, &joined).await,
        }
    }

    async fn run_probe(&self, args: &[String]) -> EngineResult<i32> {
        let Some(input) = args.first() else {
            return Ok(1);
        };
        let output = args
            .iter()
            .position(|a| a == "-o")
            .and_then(|i| args.get(i + 1));

        let script = {
            let probes = self.probes.lock();
            probes.iter().rev().find(|(suffix, _)| input.ends_with(suffix.as_str())).map(|(_, s)| match s {
                ProbeScript::Json(json) => Ok(json.clone()),
                ProbeScript::Status(code) => Err(*code),
            })
        };

        match (script, output) {
            (Some(Ok(json)), Some(output)) => {
                self.artifacts
                    .lock()
                    .insert(output.clone(), Bytes::from(json.into_bytes()));
                Ok(0)
            }
            (Some(Err(code)), _) => {
                self.log(format!("{}: Invalid data found when processing input", input));
                Ok(code)
            }
            _ => {
                self.log(format!("{}: No such file or directory", input));
                Ok(1)
            }
        }
    }

    async fn run_transform(&self, args: &[String], joined: &str) -> EngineResult<i32> {
        let failure = self
            .transform_failures
            .lock()
            .iter()
            .find(|(pattern, _)| joined.contains(pattern.as_str()))
            .map(|(_, status)| *status);
        if let Some(status) = failure {
            self.log(format!("simulated failure for: {}", joined));
            return Ok(status);
        }

        let inputs: Vec<&String> = args
            .windows(2)
            .filter(|w| w[0] == "-i")
            .map(|w| &w[1])
            .collect();
        for input in &inputs {
            if !self.input_exists(input) {
                self.log(format!("{}: No such file or directory", input));
                return Ok(1);
            }
        }

        // Cover extraction: `-i <file> -an -vcodec copy <out>`
        if args.iter().any(|a| a == "-an") {
            let has_cover = inputs.first().is_some_and(|input| {
                self.covers
                    .lock()
                    .iter()
                    .any(|suffix| input.ends_with(suffix.as_str()))
            });
            if !has_cover {
                self.log("Output file #0 does not contain any stream");
                return Ok(1);
            }
        }

        let Some(output) = args.last().filter(|a| !a.starts_with('-')) else {
            return Ok(1);
        };
        let body = Bytes::from(format!("fake:{}", output).into_bytes());
        if Path::new(output).is_absolute() {
            tokio::fs::write(output, &body)
                .await
                .map_err(|e| EngineError::artifact("write", output.as_str(), e))?;
        } else {
            self.artifacts.lock().insert(output.clone(), body);
        }
        Ok(0)
    }
}

#[async_trait]
impl Engine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn open(&self) -> EngineResult<()> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> EngineResult<()> {
        self.open.store(false, Ordering::SeqCst);
        self.artifacts.lock().clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn probe(&self, args: &[String], opts: &InvokeOptions) -> EngineResult<i32> {
        self.invoke(EngineTool::Probe, args, opts).await
    }

    async fn transform(&self, args: &[String], opts: &InvokeOptions) -> EngineResult<i32> {
        self.invoke(EngineTool::Transform, args, opts).await
    }

    async fn write_artifact(&self, name: &str, data: Bytes) -> EngineResult<()> {
        self.require_open()?;
        validate_artifact_name(name)?;
        self.written.lock().insert(name.to_string(), data.clone());
        self.artifacts.lock().insert(name.to_string(), data);
        Ok(())
    }

    async fn read_artifact(&self, name: &str) -> EngineResult<Bytes> {
        self.require_open()?;
        validate_artifact_name(name)?;
        if self.read_failures.lock().iter().any(|s| name.ends_with(s.as_str())) {
            return Err(EngineError::artifact(
                "read",
                name,
                std::io::Error::new(std::io::ErrorKind::Other, "simulated read failure"),
            ));
        }
        self.artifacts.lock().get(name).cloned().ok_or_else(|| {
            EngineError::artifact("read", name, std::io::ErrorKind::NotFound.into())
        })
    }

    async fn delete_artifact(&self, name: &str) -> EngineResult<()> {
        self.require_open()?;
        validate_artifact_name(name)?;
        match self.artifacts.lock().remove(name) {
            Some(_) => Ok(()),
            None => Err(EngineError::artifact(
                "delete",
                name,
                std::io::ErrorKind::NotFound.into(),
            )),
        }
    }

    async fn list_artifacts(&self, dir: &str) -> EngineResult<Vec<String>> {
        self.require_open()?;
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir.trim_end_matches('/'))
        };
        Ok(self
            .artifacts
            .lock()
            .keys()
            .filter_map(|k| k.strip_prefix(prefix.as_str()))
            .filter(|k| !k.contains('/'))
            .map(str::to_string)
            .collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    fn supports_concurrent_invocations(&self) -> bool {
        self.concurrent
    }
}

/// ffprobe-style JSON for a single audio stream (plus optional cover stream).
pub fn audio_probe_json(duration_ms: u64, tags: &[(&str, &str)], with_cover: bool) -> String {
    let tags: serde_json::Map<String, serde_json::Value> = tags
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect();
    let mut streams = vec![serde_json::json!({
        "index": 0,
        "codec_type": "audio",
        "codec_name": "mp3",
        "duration": format!("{:.6}", duration_ms as f64 / 1000.0),
    })];
    if with_cover {
        streams.push(serde_json::json!({
            "index": 1,
            "codec_type": "video",
            "codec_name": "mjpeg",
            "disposition": { "attached_pic": 1 },
        }));
    }
    serde_json::json!({
        "streams": streams,
        "format": { "tags": tags },
    })
    .to_string()
}
