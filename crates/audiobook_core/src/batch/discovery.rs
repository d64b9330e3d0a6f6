//! Lazy, sorted discovery of audio files under a root.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// A discovered input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// `path` relative to the walk root.
    pub relative: PathBuf,
}

/// Whether `path` ends in one of `extensions` (case-insensitive).
pub fn has_audio_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
}

/// Mirrored output path: `relative` under `output_root` with `extension`.
pub fn output_path_for(output_root: &Path, relative: &Path, extension: &str) -> PathBuf {
    output_root.join(relative).with_extension(extension)
}

/// Walk `root` lazily, yielding matching files sorted by name within
/// each directory.
///
/// Unreadable entries are logged and skipped.
pub fn discover<'a>(
    root: &'a Path,
    extensions: &'a [String],
) -> impl Iterator<Item = SourceFile> + 'a {
    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(move |entry| has_audio_extension(entry.path(), extensions))
        .filter_map(move |entry| {
            let relative = entry.path().strip_prefix(root).ok()?.to_path_buf();
            Some(SourceFile {
                path: entry.into_path(),
                relative,
            })
        })
}
