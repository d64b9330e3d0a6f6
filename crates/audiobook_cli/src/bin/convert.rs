//! Batch converter: transcode every audio file under a directory.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use audiobook_cli::{cancel_on_ctrl_c, convert_command, load_settings, log_level, parse_or_exit};
use audiobook_core::assembly::CancelHandle;
use audiobook_core::batch::{BatchConverter, ConvertOptions, FileStatus};
use audiobook_core::engine::{Engine, ProcessEngine};
use audiobook_core::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = parse_or_exit(convert_command());

    let level = log_level(matches.get_flag("debug"));
    let loaded = load_settings(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
    let _log_guard = match &loaded.logs_dir {
        Some(dir) => logging::init_tracing_with_file(level, dir),
        None => {
            logging::init_tracing(level);
            None
        }
    };

    let input_dir = matches
        .get_one::<PathBuf>("input_dir")
        .context("inputDir is required")?;
    let output_dir = matches
        .get_one::<PathBuf>("output_dir")
        .context("outputDir is required")?;
    let options = ConvertOptions {
        force_overwrite: matches.get_flag("force"),
        dry_run: matches.get_flag("dry-run"),
    };
    tracing::debug!(
        "Converting {} -> {} ({:?})",
        input_dir.display(),
        output_dir.display(),
        options
    );

    let engine: Arc<dyn Engine> = Arc::new(ProcessEngine::from_settings(&loaded.settings));
    // Failure details reach stderr through tracing.
    let converter = BatchConverter::new(Arc::clone(&engine), &loaded.settings).with_observer(
        |outcome| match &outcome.status {
            FileStatus::DryRun { command } => println!("DRY-RUN: {}", command),
            status => {
                if let Some(c) = status.status_char() {
                    print!("{}", c);
                    let _ = std::io::stdout().flush();
                }
            }
        },
    );

    let cancel = CancelHandle::new();
    cancel_on_ctrl_c(cancel.token());

    let result = converter
        .convert_tree(input_dir, output_dir, options, &cancel)
        .await;
    if let Err(e) = engine.close().await {
        tracing::warn!("Failed to close engine: {}", e);
    }
    let report = result?;

    println!("\ndone!");
    println!("{}", report.summary());
    Ok(())
}
