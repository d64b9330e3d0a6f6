//! Batch conversion of a directory tree.
//!
//! Walks an input tree for audio files, mirrors the relative layout under
//! an output root with the target extension, and transcodes each file
//! through the engine with bounded concurrency. One file failing never
//! stops the batch.

mod converter;
mod discovery;
mod types;

pub use converter::{transcode_args, BatchConverter, OutcomeObserver};
pub use discovery::{discover, has_audio_extension, output_path_for, SourceFile};
pub use types::{
    BatchError, BatchReport, BatchResult, ConvertOptions, FileError, FileOutcome, FileStatus,
};
