//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use serde::{Deserialize, Serialize};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Path-related settings.
    #[serde(default)]
    pub paths: PathSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// External engine configuration.
    #[serde(default)]
    pub engine: EngineSettings,

    /// Defaults for audiobook assembly encoding.
    #[serde(default)]
    pub encode: EncodeSettings,

    /// Batch conversion settings.
    #[serde(default)]
    pub batch: BatchSettings,
}

/// Path configuration for output, scratch, and logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Output folder for assembled audiobooks.
    #[serde(default = "default_output_folder")]
    pub output_folder: String,

    /// Root folder for engine scratch namespaces.
    #[serde(default = "default_temp_root")]
    pub temp_root: String,

    /// Folder for log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,
}

fn default_output_folder() -> String {
    "audiobooks".to_string()
}

fn default_temp_root() -> String {
    ".temp".to_string()
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            output_folder: default_output_folder(),
            temp_root: default_temp_root(),
            logs_folder: default_logs_folder(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Use compact log format (engine output goes to the tail buffer only).
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Number of engine output lines kept for error diagnostics.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Progress update step percentage.
    #[serde(default = "default_progress_step")]
    pub progress_step: u32,

    /// Prefix log lines with a timestamp.
    #[serde(default = "default_true")]
    pub show_timestamps: bool,

    /// Write a per-run log file into the logs folder.
    #[serde(default = "default_true")]
    pub job_log_files: bool,
}

fn default_true() -> bool {
    true
}

fn default_error_tail() -> u32 {
    20
}

fn default_progress_step() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            compact: true,
            error_tail: default_error_tail(),
            progress_step: default_progress_step(),
            show_timestamps: true,
            job_log_files: true,
        }
    }
}

/// External engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Path or name of the ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Path or name of the ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,

    /// Per-invocation timeout in seconds (0 = no limit).
    #[serde(default)]
    pub timeout_secs: u64,

    /// Maximum concurrent probes during assembly.
    #[serde(default = "default_concurrency")]
    pub probe_concurrency: usize,
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_concurrency() -> usize {
    4
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            timeout_secs: 0,
            probe_concurrency: default_concurrency(),
        }
    }
}

/// Encoding defaults for assembled audiobooks.
///
/// Unset optional values are omitted from the engine command, leaving
/// the engine's own defaults in effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeSettings {
    /// Audio codec (e.g. "aac").
    #[serde(default = "default_assembly_codec", skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,

    /// Output sample rate in Hz.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,

    /// Output bit rate in kbit/s.
    #[serde(default = "default_assembly_bit_rate", skip_serializing_if = "Option::is_none")]
    pub bit_rate_kbps: Option<u32>,

    /// Output sample format width (16, 32, or 64).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_depth_bits: Option<u32>,

    /// Disable AAC perceptual noise substitution for older players.
    #[serde(default)]
    pub legacy_device_compat: bool,

    /// Extension of the assembled container.
    #[serde(default = "default_assembly_extension")]
    pub output_extension: String,
}

fn default_assembly_codec() -> Option<String> {
    Some("aac".to_string())
}

fn default_assembly_bit_rate() -> Option<u32> {
    Some(128)
}

fn default_assembly_extension() -> String {
    "m4b".to_string()
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            codec: default_assembly_codec(),
            sample_rate: None,
            bit_rate_kbps: default_assembly_bit_rate(),
            bit_depth_bits: None,
            legacy_device_compat: false,
            output_extension: default_assembly_extension(),
        }
    }
}

/// Batch conversion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Maximum files converted at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Audio codec for transcoded files.
    #[serde(default = "default_batch_codec")]
    pub codec: String,

    /// Bit rate argument for transcoded files (e.g. "256k").
    #[serde(default = "default_batch_bit_rate")]
    pub bit_rate: String,

    /// Extension of transcoded files.
    #[serde(default = "default_batch_extension")]
    pub output_extension: String,

    /// Input extensions picked up by the directory walk (case-insensitive).
    #[serde(default = "default_batch_extensions")]
    pub extensions: Vec<String>,
}

fn default_batch_codec() -> String {
    "aac".to_string()
}

fn default_batch_bit_rate() -> String {
    "256k".to_string()
}

fn default_batch_extension() -> String {
    "m4a".to_string()
}

fn default_batch_extensions() -> Vec<String> {
    ["mp3", "m4a", "aac", "aiff", "flac", "m4b", "m4r"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            codec: default_batch_codec(),
            bit_rate: default_batch_bit_rate(),
            output_extension: default_batch_extension(),
            extensions: default_batch_extensions(),
        }
    }
}

/// Names of config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Paths,
    Logging,
    Engine,
    Encode,
    Batch,
}

impl ConfigSection {
    /// All sections, in file order.
    pub const ALL: [ConfigSection; 5] = [
        ConfigSection::Paths,
        ConfigSection::Logging,
        ConfigSection::Engine,
        ConfigSection::Encode,
        ConfigSection::Batch,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
            ConfigSection::Engine => "engine",
            ConfigSection::Encode => "encode",
            ConfigSection::Batch => "batch",
        }
    }

    /// Comment written above the section in generated files.
    pub fn comment(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "Output, scratch, and log directories",
            ConfigSection::Logging => "Logging configuration",
            ConfigSection::Engine => "External ffmpeg/ffprobe engine",
            ConfigSection::Encode => "Audiobook assembly encoding defaults",
            ConfigSection::Batch => "Batch conversion",
        }
    }
}
