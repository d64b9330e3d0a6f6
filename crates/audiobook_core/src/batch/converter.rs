//! Directory-tree transcoder.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::assembly::CancelHandle;
use crate::config::{BatchSettings, Settings};
use crate::engine::{format_command, Engine, InvokeOptions};
use crate::pool::run_pool;
use crate::probe::{probe, ProbeResult};

use super::discovery::{discover, output_path_for, SourceFile};
use super::types::{
    BatchError, BatchReport, BatchResult, ConvertOptions, FileError, FileOutcome, FileStatus,
};

/// Called once per finished file, in completion order.
pub type OutcomeObserver = Box<dyn Fn(&FileOutcome) + Send + Sync>;

/// Converts every audio file under a root into a mirrored output tree.
pub struct BatchConverter {
    engine: Arc<dyn Engine>,
    settings: BatchSettings,
    invoke: InvokeOptions,
    observer: Option<OutcomeObserver>,
}

impl BatchConverter {
    pub fn new(engine: Arc<dyn Engine>, settings: &Settings) -> Self {
        Self {
            engine,
            settings: settings.batch.clone(),
            invoke: InvokeOptions::new().with_timeout_secs(settings.engine.timeout_secs),
            observer: None,
        }
    }

    /// Observe each file as it finishes.
    pub fn with_observer(mut self, observer: impl Fn(&FileOutcome) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Convert the tree under `input_root` into `output_root`.
    ///
    /// Files are discovered lazily and converted with at most
    /// `batch.concurrency` in flight (1 for engines that cannot run
    /// invocations concurrently). Per-file failures are recorded in the
    /// report; only setup problems return an error.
    pub async fn convert_tree(
        &self,
        input_root: &Path,
        output_root: &Path,
        options: ConvertOptions,
        cancel: &CancelHandle,
    ) -> BatchResult<BatchReport> {
        let input_root = absolutize(input_root)?;
        let output_root = absolutize(output_root)?;
        if !input_root.is_dir() {
            return Err(BatchError::InputNotFound { path: input_root });
        }

        if !self.engine.is_open() {
            self.engine.open().await?;
        }

        let limit = if self.engine.supports_concurrent_invocations() {
            self.settings.concurrency
        } else {
            self.settings.concurrency.min(1)
        };
        tracing::info!(
            "Converting {} -> {} ({} at a time{})",
            input_root.display(),
            output_root.display(),
            limit,
            if options.dry_run { ", dry run" } else { "" }
        );

        let token = cancel.token();
        let invoke = self.invoke.clone().with_cancel(token.clone());
        let units = discover(&input_root, &self.settings.extensions)
            .map(|source| self.convert_file(source, &output_root, options, &invoke));
        let report = run_pool(units, limit, Some(&token)).await?;

        let cancelled = report.cancelled;
        let report = BatchReport {
            outcomes: report.into_ordered(),
            cancelled,
        };
        tracing::info!("Batch finished: {}", report.summary());
        Ok(report)
    }

    async fn convert_file(
        &self,
        source: SourceFile,
        output_root: &Path,
        options: ConvertOptions,
        invoke: &InvokeOptions,
    ) -> FileOutcome {
        let output = output_path_for(output_root, &source.relative, &self.settings.output_extension);
        let status = match self.process(&source, &output, options, invoke).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("{}: {} ({})", source.relative.display(), e, e.class());
                FileStatus::Failed(e)
            }
        };
        tracing::debug!("{}: {:?}", source.relative.display(), status);

        let outcome = FileOutcome {
            input: source.path,
            relative: source.relative,
            output,
            status,
        };
        if let Some(observer) = &self.observer {
            observer(&outcome);
        }
        outcome
    }

    async fn process(
        &self,
        source: &SourceFile,
        output: &Path,
        options: ConvertOptions,
        invoke: &InvokeOptions,
    ) -> Result<FileStatus, FileError> {
        if !options.force_overwrite && output.exists() {
            return Ok(FileStatus::Skipped);
        }

        let input = source.path.to_string_lossy();
        let probed = probe(self.engine.as_ref(), &input, invoke).await?;
        let args = transcode_args(&input, &probed, &output.to_string_lossy(), &self.settings);

        if options.dry_run {
            return Ok(FileStatus::DryRun {
                command: format_command("ffmpeg", &args),
            });
        }

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| FileError::Io {
                    operation: "creating output directory".to_string(),
                    source,
                })?;
        }

        let status = self
            .engine
            .transform(&args, invoke)
            .await
            .map_err(|source| FileError::Engine {
                operation: "transcode".to_string(),
                source,
            })?;
        if status != 0 {
            return Err(FileError::CommandFailed { exit_code: status });
        }
        Ok(FileStatus::Converted)
    }
}

/// Transcode arguments for one file.
///
/// When the input has an `album_artist` tag it replaces `artist`.
pub fn transcode_args(
    input: &str,
    probed: &ProbeResult,
    output: &str,
    settings: &BatchSettings,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-i".to_string(),
        input.to_string(),
        "-codec:a".to_string(),
        settings.codec.clone(),
        "-b:a".to_string(),
        settings.bit_rate.clone(),
        "-map_metadata".to_string(),
        "0".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-v".to_string(),
        "quiet".to_string(),
        "-stats".to_string(),
    ];
    if let Some(album_artist) = probed.album_artist() {
        args.push("-metadata".to_string());
        args.push(format!("artist={}", album_artist));
    }
    args.push(output.to_string());
    args
}

fn absolutize(path: &Path) -> BatchResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|source| BatchError::Io {
        operation: "resolving working directory".to_string(),
        source,
    })?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeEngine;
    use crate::error::ErrorClass;
    use parking_lot::Mutex;
    use std::fs;
    use std::time::Duration;

    struct Tree {
        _dir: tempfile::TempDir,
        input: PathBuf,
        output: PathBuf,
    }

    fn tree(files: &[&str]) -> Tree {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        for file in files {
            let path = input.join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"audio").unwrap();
        }
        fs::create_dir_all(&input).unwrap();
        Tree {
            _dir: dir,
            input,
            output,
        }
    }

    fn converter(engine: &Arc<FakeEngine>, settings: &Settings) -> BatchConverter {
        let engine: Arc<dyn Engine> = engine.clone();
        BatchConverter::new(engine, settings)
    }

    async fn run(converter: &BatchConverter, tree: &Tree, options: ConvertOptions) -> BatchReport {
        converter
            .convert_tree(&tree.input, &tree.output, options, &CancelHandle::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn converts_tree_into_mirrored_layout() {
        let tree = tree(&["a.mp3", "sub/b.FLAC", "sub/notes.txt"]);
        let engine = Arc::new(
            FakeEngine::new()
                .with_audio(".mp3", 1_000, &[])
                .with_audio(".FLAC", 2_000, &[]),
        );
        let chars = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&chars);
        let converter = converter(&engine, &Settings::default())
            .with_observer(move |o| sink.lock().extend(o.status.status_char()));

        let report = run(&converter, &tree, ConvertOptions::default()).await;

        assert_eq!(report.converted(), 2);
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.outcomes[0].relative, PathBuf::from("a.mp3"));
        assert!(tree.output.join("a.m4a").is_file());
        assert!(tree.output.join("sub/b.m4a").is_file());
        assert!(!tree.output.join("sub/notes.m4a").exists());
        assert_eq!(chars.lock().as_str(), "..");

        let a_input = tree.input.join("a.mp3").display().to_string();
        let transforms = engine.transforms();
        let args = transforms.iter().find(|t| t[1] == a_input).unwrap();
        assert_eq!(
            args[..13].join(" "),
            format!(
                "-i {} -codec:a aac -b:a 256k -map_metadata 0 -c:v copy -v quiet -stats",
                a_input
            )
        );
        // Probe scratch files are gone
        assert!(engine.artifact_names().is_empty());
    }

    #[tokio::test]
    async fn existing_output_skipped_unless_forced() {
        let tree = tree(&["a.mp3"]);
        fs::create_dir_all(&tree.output).unwrap();
        fs::write(tree.output.join("a.m4a"), b"old").unwrap();
        let engine = Arc::new(FakeEngine::new().with_audio(".mp3", 1_000, &[]));
        let converter = converter(&engine, &Settings::default());

        let report = run(&converter, &tree, ConvertOptions::default()).await;
        assert_eq!(report.skipped(), 1);
        assert!(engine.invocations().is_empty());
        assert_eq!(fs::read(tree.output.join("a.m4a")).unwrap(), b"old");

        let forced = ConvertOptions {
            force_overwrite: true,
            dry_run: false,
        };
        let report = run(&converter, &tree, forced).await;
        assert_eq!(report.converted(), 1);
        assert_eq!(engine.transforms().len(), 1);
        assert_ne!(fs::read(tree.output.join("a.m4a")).unwrap(), b"old");
    }

    #[tokio::test]
    async fn album_artist_overrides_artist() {
        let tree = tree(&["a.mp3", "b.flac"]);
        let engine = Arc::new(
            FakeEngine::new()
                .with_audio("a.mp3", 1_000, &[("album_artist", "Narrator"), ("artist", "Other")])
                .with_audio("b.flac", 1_000, &[("artist", "Solo")]),
        );
        let converter = converter(&engine, &Settings::default());

        run(&converter, &tree, ConvertOptions::default()).await;

        let transforms = engine.transforms();
        let a = transforms.iter().find(|t| t[1].ends_with("a.mp3")).unwrap();
        let n = a.len();
        assert_eq!(a[n - 3..n - 1], ["-metadata".to_string(), "artist=Narrator".to_string()]);
        let b = transforms.iter().find(|t| t[1].ends_with("b.flac")).unwrap();
        assert!(!b.contains(&"-metadata".to_string()));
    }

    #[tokio::test]
    async fn dry_run_reports_commands_only() {
        let tree = tree(&["My Book/01.mp3"]);
        let engine = Arc::new(FakeEngine::new().with_audio(".mp3", 1_000, &[]));
        let converter = converter(&engine, &Settings::default());

        let report = run(
            &converter,
            &tree,
            ConvertOptions {
                force_overwrite: false,
                dry_run: true,
            },
        )
        .await;

        assert_eq!(report.dry_run(), 1);
        match &report.outcomes[0].status {
            FileStatus::DryRun { command } => {
                assert!(command.starts_with("ffmpeg -i \""));
                assert!(command.ends_with(&format!(
                    "\"{}\"",
                    tree.output.join("My Book/01.m4a").display()
                )));
            }
            other => panic!("unexpected status {:?}", other),
        }
        assert!(engine.transforms().is_empty());
        assert!(!tree.output.exists());
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_batch() {
        let tree = tree(&["bad.mp3", "broken.mp3", "good.mp3"]);
        let engine = Arc::new(
            FakeEngine::new()
                .with_audio(".mp3", 1_000, &[])
                .with_probe_status("broken.mp3", 1)
                .with_transform_failure("bad.mp3", 1),
        );
        let chars = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&chars);
        let converter = converter(&engine, &Settings::default())
            .with_observer(move |o| sink.lock().extend(o.status.status_char()));

        let report = run(&converter, &tree, ConvertOptions::default()).await;

        assert_eq!(report.failed(), 2);
        assert_eq!(report.converted(), 1);
        let classes: Vec<_> = report
            .outcomes
            .iter()
            .filter_map(|o| match &o.status {
                FileStatus::Failed(e) => Some(e.class()),
                _ => None,
            })
            .collect();
        assert_eq!(classes, vec![ErrorClass::Encode, ErrorClass::Probe]);

        let mut seen = chars.lock().clone();
        seen.sort();
        assert_eq!(seen, vec!['.', 'x', 'x']);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let files: Vec<String> = (0..8).map(|i| format!("{:02}.mp3", i)).collect();
        let names: Vec<&str> = files.iter().map(String::as_str).collect();

        let mut settings = Settings::default();
        settings.batch.concurrency = 2;

        let tree_a = tree(&names);
        let engine = Arc::new(
            FakeEngine::new()
                .with_delay(Duration::from_millis(5))
                .with_audio(".mp3", 1_000, &[]),
        );
        let report = run(&converter(&engine, &settings), &tree_a, ConvertOptions::default()).await;
        assert_eq!(report.converted(), 8);
        assert_eq!(engine.peak_in_flight(), 2);

        let tree_b = tree(&names);
        let serial = Arc::new(
            FakeEngine::new()
                .serial()
                .with_delay(Duration::from_millis(5))
                .with_audio(".mp3", 1_000, &[]),
        );
        run(&converter(&serial, &settings), &tree_b, ConvertOptions::default()).await;
        assert_eq!(serial.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn missing_input_root_is_rejected() {
        let engine = Arc::new(FakeEngine::new());
        let err = converter(&engine, &Settings::default())
            .convert_tree(
                Path::new("/definitely/not/here"),
                Path::new("/tmp/out"),
                ConvertOptions::default(),
                &CancelHandle::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BatchError::InputNotFound { .. }));
        assert_eq!(err.class(), ErrorClass::Validation);
    }

    #[tokio::test]
    async fn cancelled_batch_admits_nothing() {
        let tree = tree(&["a.mp3", "b.mp3"]);
        let engine = Arc::new(FakeEngine::new().with_audio(".mp3", 1_000, &[]));
        let cancel = CancelHandle::new();
        cancel.cancel();

        let report = converter(&engine, &Settings::default())
            .convert_tree(&tree.input, &tree.output, ConvertOptions::default(), &cancel)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert!(report.outcomes.is_empty());
        assert!(engine.invocations().is_empty());
    }
}
