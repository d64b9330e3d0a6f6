//! FFMETADATA document writer.

use crate::metadata::MergedMetadata;

use super::timeline::ChapterEntry;

/// Escape a value for FFMETADATA: `=`, `;`, `#`, `\` and newlines get a backslash.
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '=' | ';' | '#' | '\\' | '\n') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Render the metadata document applied when muxing.
///
/// Container tags come first (album doubles as the title), then one
/// `[CHAPTER]` block per chapter with a millisecond timebase.
pub fn render_metadata_document(metadata: &MergedMetadata, chapters: &[ChapterEntry]) -> String {
    let mut doc = String::from(";FFMETADATA1\n");

    let fields = [
        ("title", metadata.album.as_deref()),
        ("album", metadata.album.as_deref()),
        ("artist", metadata.artist.as_deref()),
        ("composer", metadata.composer.as_deref()),
        ("date", metadata.date.as_deref()),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            doc.push_str(&format!("{}={}\n", key, escape_value(value)));
        }
    }
    doc.push('\n');

    for chapter in chapters {
        doc.push_str("[CHAPTER]\n");
        doc.push_str("TIMEBASE=1/1000\n");
        doc.push_str(&format!("START={}\n", chapter.start_ms));
        doc.push_str(&format!("END={}\n", chapter.end_ms));
        doc.push_str(&format!("TITLE={}\n", escape_value(&chapter.title)));
        doc.push('\n');
    }

    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_special_characters() {
        assert_eq!(escape_value("a=b;c#d\\e"), "a\\=b\\;c\\#d\\\\e");
        assert_eq!(escape_value("line1\nline2"), "line1\\\nline2");
        assert_eq!(escape_value("plain"), "plain");
    }

    #[test]
    fn renders_tags_and_chapters() {
        let metadata = MergedMetadata {
            album: Some("The Book".to_string()),
            artist: Some("A. Writer".to_string()),
            composer: None,
            date: Some("2021".to_string()),
            cover: None,
        };
        let chapters = vec![
            ChapterEntry { start_ms: 0, end_ms: 60_000, title: "Intro".to_string() },
            ChapterEntry { start_ms: 60_000, end_ms: 90_000, title: "Part=1".to_string() },
        ];

        let doc = render_metadata_document(&metadata, &chapters);
        let expected = ";FFMETADATA1\n\
                        title=The Book\n\
                        album=The Book\n\
                        artist=A. Writer\n\
                        date=2021\n\
                        \n\
                        [CHAPTER]\nTIMEBASE=1/1000\nSTART=0\nEND=60000\nTITLE=Intro\n\n\
                        [CHAPTER]\nTIMEBASE=1/1000\nSTART=60000\nEND=90000\nTITLE=Part\\=1\n\n";
        assert_eq!(doc, expected);
    }

    #[test]
    fn absent_fields_are_omitted() {
        let doc = render_metadata_document(&MergedMetadata::default(), &[]);
        assert_eq!(doc, ";FFMETADATA1\n\n");
    }
}
