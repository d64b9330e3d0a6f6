//! Chapter boundaries from ordered durations.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::probe::ProbeResult;

/// One chapter, in milliseconds from the start of the assembled audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterEntry {
    pub start_ms: u64,
    pub end_ms: u64,
    pub title: String,
}

impl ChapterEntry {
    /// Chapter length in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

/// Build one chapter per input, in the given order.
///
/// The caller decides the order; the timeline never re-sorts. Chapters
/// are contiguous and their total equals the sum of input durations.
pub fn build_timeline(results: &[ProbeResult]) -> Vec<ChapterEntry> {
    let mut start_ms = 0u64;
    results
        .iter()
        .enumerate()
        .map(|(index, result)| {
            let end_ms = start_ms + result.duration_ms;
            let entry = ChapterEntry {
                start_ms,
                end_ms,
                title: chapter_title(result, index),
            };
            start_ms = end_ms;
            entry
        })
        .collect()
}

/// Title for the chapter at `index`: the title tag, else the file stem,
/// else `Chapter NN`.
pub fn chapter_title(result: &ProbeResult, index: usize) -> String {
    if let Some(title) = result.title() {
        return title.to_string();
    }

    let stem = Path::new(&result.file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().trim().to_string())
        .unwrap_or_default();
    if !stem.is_empty() {
        return stem;
    }

    format!("Chapter {:02}", index + 1)
}

/// Sum of all chapter lengths.
pub fn total_duration_ms(chapters: &[ChapterEntry]) -> u64 {
    chapters.last().map(|c| c.end_ms).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn result(name: &str, duration_ms: u64, title: Option<&str>) -> ProbeResult {
        let mut tags = BTreeMap::new();
        if let Some(title) = title {
            tags.insert("title".to_string(), title.to_string());
        }
        ProbeResult {
            file_name: name.to_string(),
            duration_ms,
            tags,
            has_embedded_cover: false,
        }
    }

    #[test]
    fn chapters_are_contiguous_and_sum_to_total() {
        let inputs = vec![
            result("01.mp3", 60_000, Some("Intro")),
            result("02.mp3", 30_000, Some("Part 1")),
            result("03.mp3", 45_500, None),
            result("04.mp3", 0, None),
        ];
        let chapters = build_timeline(&inputs);

        assert_eq!(chapters.len(), inputs.len());
        assert_eq!(chapters[0].start_ms, 0);
        for pair in chapters.windows(2) {
            assert_eq!(pair[0].end_ms, pair[1].start_ms);
        }
        for (chapter, input) in chapters.iter().zip(&inputs) {
            assert_eq!(chapter.duration_ms(), input.duration_ms);
        }
        let sum: u64 = inputs.iter().map(|r| r.duration_ms).sum();
        assert_eq!(total_duration_ms(&chapters), sum);
    }

    #[test]
    fn keeps_input_order() {
        let inputs = vec![result("b.mp3", 10, None), result("a.mp3", 20, None)];
        let chapters = build_timeline(&inputs);
        assert_eq!(chapters[0].title, "b");
        assert_eq!(chapters[1].start_ms, 10);
    }

    #[test]
    fn title_fallbacks() {
        assert_eq!(chapter_title(&result("x.mp3", 1, Some("Tagged")), 0), "Tagged");
        assert_eq!(chapter_title(&result("03 - The Road.mp3", 1, Some("  ")), 2), "03 - The Road");
        assert_eq!(chapter_title(&result("", 1, None), 6), "Chapter 07");
    }

    #[test]
    fn empty_input_empty_timeline() {
        assert!(build_timeline(&[]).is_empty());
        assert_eq!(total_duration_ms(&[]), 0);
    }
}
