//! Configuration management for the audiobook tools.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//! - Validation on load with automatic defaults
//!
//! # Example
//!
//! ```no_run
//! use audiobook_core::config::{ConfigManager, ConfigSection};
//!
//! // Create manager and load (or create default) config
//! let mut config = ConfigManager::new(".config/audiobook.toml");
//! config.load_or_create().unwrap();
//!
//! // Read settings
//! println!("Batch concurrency: {}", config.settings().batch.concurrency);
//!
//! // Modify a setting
//! config.settings_mut().engine.timeout_secs = 600;
//!
//! // Save just the engine section atomically
//! config.update_section(ConfigSection::Engine).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{
    BatchSettings, ConfigSection, EncodeSettings, EngineSettings, LoggingSettings, PathSettings,
    Settings,
};
