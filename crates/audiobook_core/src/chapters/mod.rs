//! Chapter timeline and metadata document generation.
//!
//! The timeline turns ordered per-file durations into contiguous chapter
//! boundaries; the document writer renders those chapters together with
//! the merged container tags in ffmpeg's FFMETADATA format.

mod document;
mod timeline;

pub use document::{escape_value, render_metadata_document};
pub use timeline::{build_timeline, chapter_title, total_duration_ms, ChapterEntry};
