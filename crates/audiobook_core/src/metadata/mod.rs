//! Container metadata: tag merging and cover art.

mod cover;
mod merge;

pub use cover::{cover_extraction_args, extract_cover, CoverFormat, CoverImage};
pub use merge::{merge_metadata, MergedMetadata};
