//! Audiobook assembler: join audio files into one chaptered container.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use audiobook_cli::{assemble_command, cancel_on_ctrl_c, load_settings, log_level, parse_or_exit};
use audiobook_core::assembly::{Assembler, EncodeOptions, InputFile};
use audiobook_core::engine::{Engine, ProcessEngine};
use audiobook_core::logging;
use audiobook_core::metadata::CoverImage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = parse_or_exit(assemble_command());

    let level = log_level(matches.get_flag("debug"));
    logging::init_tracing(level);

    let loaded = load_settings(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
    let settings = loaded.settings;

    let files: Vec<InputFile> = matches
        .get_many::<PathBuf>("files")
        .context("at least one audio file is required")?
        .map(InputFile::from_path)
        .collect();

    let mut options = EncodeOptions::from_settings(&settings.encode);
    if let Some(codec) = matches.get_one::<String>("codec") {
        options.codec = Some(codec.clone());
    }
    if let Some(rate) = matches.get_one::<u32>("sample-rate") {
        options.sample_rate = Some(*rate);
    }
    if let Some(rate) = matches.get_one::<u32>("bit-rate") {
        options.bit_rate_kbps = Some(*rate);
    }
    if let Some(bits) = matches.get_one::<u32>("bit-depth") {
        options.bit_depth_bits = Some(*bits);
    }
    if matches.get_flag("legacy-device") {
        options.legacy_device_compat = true;
    }

    let cover = match matches.get_one::<PathBuf>("cover") {
        Some(path) => Some(
            CoverImage::from_file(path)
                .await
                .with_context(|| format!("failed to read cover '{}'", path.display()))?,
        ),
        None => None,
    };

    let output_dir = matches
        .get_one::<PathBuf>("output-dir")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(&settings.paths.output_folder));

    let engine: Arc<dyn Engine> = Arc::new(ProcessEngine::from_settings(&settings));
    let mut assembler = Assembler::new(Arc::clone(&engine), settings)
        .with_log_level(level)
        .with_progress_callback(|stage, percent, message| {
            eprintln!("[{:>3}%] {}: {}", percent, stage, message);
        });
    if let Some(dir) = loaded.logs_dir {
        assembler = assembler.with_log_dir(dir);
    }
    cancel_on_ctrl_c(assembler.cancel_handle().token());

    let result = assembler.assemble(files, cover, options).await;
    if let Err(e) = engine.close().await {
        tracing::warn!("Failed to close engine: {}", e);
    }

    let book = match result {
        Ok(book) => book,
        Err(e) => {
            eprintln!("Error: {}", e);
            if !e.diagnostics().is_empty() {
                eprintln!("Last engine output:");
                for line in e.diagnostics() {
                    eprintln!("  {}", line);
                }
            }
            std::process::exit(1);
        }
    };

    tokio::fs::create_dir_all(&output_dir)
        .await
        .with_context(|| format!("failed to create '{}'", output_dir.display()))?;
    let path = output_dir.join(&book.file_name);
    tokio::fs::write(&path, &book.data)
        .await
        .with_context(|| format!("failed to write '{}'", path.display()))?;

    println!(
        "{} ({} chapters, {})",
        path.display(),
        book.chapters.len(),
        format_duration(book.duration_ms)
    );
    Ok(())
}

fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
