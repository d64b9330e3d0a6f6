//! Shared pieces of the `audiobook-convert` and `audiobook-assemble` binaries.

use std::path::{Path, PathBuf};

use anyhow::Context;
use audiobook_core::config::{ConfigManager, Settings};
use audiobook_core::logging::LogLevel;
use clap::error::ErrorKind;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use tokio_util::sync::CancellationToken;

/// Parse arguments, exiting with status 1 on `--help` or any usage error.
pub fn parse_or_exit(command: Command) -> ArgMatches {
    match command.try_get_matches() {
        Ok(matches) => matches,
        Err(e) => {
            let _ = e.print();
            std::process::exit(exit_code(e.kind()));
        }
    }
}

/// `--version` is the only early exit that succeeds.
pub fn exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

/// Arguments shared by both binaries.
fn common_args(command: Command) -> Command {
    command
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Output extra debug information")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Settings file (created with defaults if missing)")
                .value_parser(value_parser!(PathBuf)),
        )
}

pub fn convert_command() -> Command {
    common_args(
        Command::new("audiobook-convert")
            .about("Convert every audio file under a directory, mirroring its layout"),
    )
    .arg(
        Arg::new("input_dir")
            .value_name("inputDir")
            .help("Directory to scan for audio files")
            .required(true)
            .value_parser(value_parser!(PathBuf)),
    )
    .arg(
        Arg::new("output_dir")
            .value_name("outputDir")
            .help("Directory the converted tree is written to")
            .required(true)
            .value_parser(value_parser!(PathBuf)),
    )
    .arg(
        Arg::new("dry-run")
            .long("dryRun")
            .visible_alias("dry-run")
            .help("Emulate what will happen")
            .action(ArgAction::SetTrue),
    )
    .arg(
        Arg::new("force")
            .long("force")
            .help("Overwrite existing files")
            .action(ArgAction::SetTrue),
    )
}

pub fn assemble_command() -> Command {
    common_args(
        Command::new("audiobook-assemble")
            .about("Assemble audio files into one chaptered audiobook"),
    )
    .arg(
        Arg::new("files")
            .value_name("FILE")
            .help("Audio files, one chapter each (ordered by file name)")
            .required(true)
            .num_args(1..)
            .value_parser(value_parser!(PathBuf)),
    )
    .arg(
        Arg::new("output-dir")
            .short('o')
            .long("output-dir")
            .value_name("DIR")
            .help("Where the audiobook is written (default: paths.output_folder)")
            .value_parser(value_parser!(PathBuf)),
    )
    .arg(
        Arg::new("cover")
            .long("cover")
            .value_name("IMAGE")
            .help("Cover image, used instead of any embedded cover")
            .value_parser(value_parser!(PathBuf)),
    )
    .arg(
        Arg::new("codec")
            .long("codec")
            .value_name("CODEC")
            .help("Audio codec"),
    )
    .arg(
        Arg::new("sample-rate")
            .long("sample-rate")
            .value_name("HZ")
            .help("Output sample rate")
            .value_parser(value_parser!(u32)),
    )
    .arg(
        Arg::new("bit-rate")
            .long("bit-rate")
            .value_name("KBPS")
            .help("Output bit rate in kbit/s")
            .value_parser(value_parser!(u32)),
    )
    .arg(
        Arg::new("bit-depth")
            .long("bit-depth")
            .value_name("BITS")
            .help("Sample format width: 16, 32 or 64")
            .value_parser(value_parser!(u32)),
    )
    .arg(
        Arg::new("legacy-device")
            .long("legacy-device")
            .help("Disable AAC perceptual noise substitution for older players")
            .action(ArgAction::SetTrue),
    )
}

/// Loaded settings and where per-run logs go.
pub struct LoadedConfig {
    pub settings: Settings,
    /// Set only when a config file was given.
    pub logs_dir: Option<PathBuf>,
}

/// Settings from `--config`, or defaults without touching the disk.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<LoadedConfig> {
    let Some(path) = path else {
        return Ok(LoadedConfig {
            settings: Settings::default(),
            logs_dir: None,
        });
    };

    let mut manager = ConfigManager::new(path);
    manager
        .load_or_create()
        .with_context(|| format!("failed to load config '{}'", path.display()))?;
    manager
        .ensure_dirs_exist()
        .context("failed to create configured directories")?;
    let logs_dir = manager
        .settings()
        .logging
        .job_log_files
        .then(|| manager.logs_folder());
    Ok(LoadedConfig {
        settings: manager.into_settings(),
        logs_dir,
    })
}

pub fn log_level(debug: bool) -> LogLevel {
    if debug {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    }
}

/// Cancel `token` when Ctrl-C is received.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, finishing work in progress...");
            token.cancel();
        }
    });
}
