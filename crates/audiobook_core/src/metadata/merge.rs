//! First-non-empty merge of container tags across inputs.

use serde::Serialize;

use crate::probe::ProbeResult;

use super::cover::CoverImage;

/// Tags and cover for the assembled container.
///
/// A field is `Some` only if at least one input supplied a non-blank value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergedMetadata {
    pub album: Option<String>,
    pub artist: Option<String>,
    pub composer: Option<String>,
    pub date: Option<String>,
    #[serde(skip)]
    pub cover: Option<CoverImage>,
}

/// Merge tags from `results` and pick a cover from `cover_candidates`.
///
/// Each scalar field independently takes the first non-blank value in
/// `results` order. The cover is the first candidate that is `Some`.
/// Both are order-sensitive: earlier inputs win.
pub fn merge_metadata<I>(results: &[ProbeResult], cover_candidates: I) -> MergedMetadata
where
    I: IntoIterator<Item = Option<CoverImage>>,
{
    let first = |key: &str| {
        results
            .iter()
            .find_map(|r| r.tag(key))
            .map(str::to_string)
    };

    MergedMetadata {
        album: first("album"),
        artist: first("artist"),
        composer: first("composer"),
        date: first("date"),
        cover: cover_candidates.into_iter().flatten().next(),
    }
}
