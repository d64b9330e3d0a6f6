//! Audiobook Core - backend logic for audiobook assembly and batch conversion
//!
//! This crate contains all orchestration logic with zero UI dependencies.
//! It drives an external encoding engine (ffmpeg/ffprobe) through the
//! [`engine::Engine`] trait and can be used by the CLI tools or any other
//! front end.

pub mod assembly;
pub mod batch;
pub mod chapters;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod pool;
pub mod probe;

pub use error::ErrorClass;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
