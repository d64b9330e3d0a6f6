//! Per-file metadata probing.
//!
//! Runs the engine's probe entry point with JSON output written to a
//! scratch artifact, then parses duration, tags, and cover presence.
//! The scratch artifact name is unique per call and it is deleted on
//! every path, so concurrent probes against one engine never collide.

mod types;

pub use types::{ProbeError, ProbeOutcome, ProbeResult};

use std::collections::BTreeMap;

use crate::engine::{Engine, EngineError, InvokeOptions};
use types::RawProbe;

/// Probe one input.
///
/// `input` is passed to the engine as-is: an artifact name in the engine
/// namespace or an absolute host path. The returned `file_name` is the
/// final path component of `input`.
pub async fn probe(
    engine: &dyn Engine,
    input: &str,
    opts: &InvokeOptions,
) -> ProbeOutcome<ProbeResult> {
    let scratch = format!("probe-{}.json", uuid::Uuid::new_v4().simple());
    let args = probe_args(input, &scratch);

    let outcome = match engine.probe(&args, opts).await {
        Ok(0) => match engine.read_artifact_text(&scratch).await {
            Ok(json) => parse_probe_output(input, &json),
            Err(source) => Err(engine_error(input, source)),
        },
        Ok(exit_code) => Err(ProbeError::Status {
            file: input.to_string(),
            exit_code,
        }),
        Err(source) => Err(engine_error(input, source)),
    };

    if let Err(e) = engine.delete_artifact(&scratch).await {
        if !e.is_not_found() {
            tracing::warn!("Failed to remove probe scratch {}: {}", scratch, e);
        }
    }

    match &outcome {
        Ok(result) => tracing::debug!(
            "Probed {}: {} ms, {} tags",
            input,
            result.duration_ms,
            result.tags.len()
        ),
        Err(e) => tracing::debug!("Probe failed for {}: {}", input, e),
    }
    outcome
}

/// Arguments for the probe entry point.
pub fn probe_args(input: &str, output: &str) -> Vec<String> {
    [
        input,
        "-loglevel",
        "error",
        "-show_streams",
        "-show_entries",
        "format=duration:stream_tags:format_tags",
        "-of",
        "json",
        "-o",
        output,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn engine_error(input: &str, source: EngineError) -> ProbeError {
    ProbeError::Engine {
        file: input.to_string(),
        source,
    }
}

/// Parse ffprobe JSON output into a `ProbeResult`.
pub fn parse_probe_output(input: &str, json: &str) -> ProbeOutcome<ProbeResult> {
    let raw: RawProbe = serde_json::from_str(json).map_err(|e| ProbeError::Parse {
        file: input.to_string(),
        message: e.to_string(),
    })?;

    let audio = raw
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .ok_or_else(|| ProbeError::NoAudioStream {
            file: input.to_string(),
        })?;

    let duration_text = audio
        .duration
        .as_deref()
        .or_else(|| raw.format.as_ref().and_then(|f| f.duration.as_deref()))
        .ok_or_else(|| ProbeError::MissingDuration {
            file: input.to_string(),
        })?;
    let duration_ms = seconds_to_ms(duration_text).ok_or_else(|| ProbeError::Parse {
        file: input.to_string(),
        message: format!("invalid duration '{}'", duration_text),
    })?;

    // Stream tags first so format tags overwrite them. Raw keys iterate in
    // sorted order, so within one block the all-lowercase spelling wins.
    let mut tags = BTreeMap::new();
    let format_tags = raw.format.iter().flat_map(|f| f.tags.iter());
    for (key, value) in audio.tags.iter().chain(format_tags) {
        tags.insert(key.to_ascii_lowercase(), value.clone());
    }

    let has_embedded_cover = raw.streams.iter().any(|s| {
        s.codec_type.as_deref() == Some("video")
            && s.disposition.get("attached_pic").copied() == Some(1)
    });

    Ok(ProbeResult {
        file_name: file_name_of(input),
        duration_ms,
        tags,
        has_embedded_cover,
    })
}

/// Convert a decimal seconds string to rounded milliseconds.
fn seconds_to_ms(text: &str) -> Option<u64> {
    let secs: f64 = text.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some((secs * 1000.0).round() as u64)
}

fn file_name_of(input: &str) -> String {
    std::path::Path::new(input)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::FakeEngine;
    use crate::error::ErrorClass;

    const SAMPLE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "audio", "duration": "61.0446",
             "tags": {"title": "Stream Title", "encoder": "LAME"}},
            {"index": 1, "codec_type": "video", "disposition": {"default": 0, "attached_pic": 1}}
        ],
        "format": {"duration": "61.100000", "tags": {"TITLE": "Chapter One", "Album": "The Book"}}
    }"#;

    #[test]
    fn parses_duration_tags_and_cover() {
        let result = parse_probe_output("/books/01.mp3", SAMPLE).unwrap();
        assert_eq!(result.file_name, "01.mp3");
        assert_eq!(result.duration_ms, 61_045);
        // Format tag wins and keys are lowercased
        assert_eq!(result.title(), Some("Chapter One"));
        assert_eq!(result.album(), Some("The Book"));
        assert_eq!(result.tag("encoder"), Some("LAME"));
        assert!(result.has_embedded_cover);
    }

    #[test]
    fn falls_back_to_format_duration() {
        let json = r#"{"streams":[{"codec_type":"audio"}],"format":{"duration":"2.5"}}"#;
        let result = parse_probe_output("a.flac", json).unwrap();
        assert_eq!(result.duration_ms, 2500);
        assert!(!result.has_embedded_cover);
    }

    #[test]
    fn rejects_unexpected_output() {
        assert!(matches!(
            parse_probe_output("a.mp3", "not json"),
            Err(ProbeError::Parse { .. })
        ));
        assert!(matches!(
            parse_probe_output("a.mp3", r#"{"streams":[{"codec_type":"video"}]}"#),
            Err(ProbeError::NoAudioStream { .. })
        ));
        assert!(matches!(
            parse_probe_output("a.mp3", r#"{"streams":[{"codec_type":"audio"}]}"#),
            Err(ProbeError::MissingDuration { .. })
        ));
        assert!(matches!(
            parse_probe_output("a.mp3", r#"{"streams":[{"codec_type":"audio","duration":"N/A"}]}"#),
            Err(ProbeError::Parse { .. })
        ));
    }

    #[test]
    fn case_variants_of_one_key_resolve_the_same_way() {
        let json = r#"{"streams":[{"codec_type":"audio","duration":"1",
            "tags":{"title":"stream lower","TITLE":"stream upper"}}],
            "format":{"tags":{"Album":"mixed","ALBUM":"upper","album":"lower"}}}"#;
        let result = parse_probe_output("a.mp3", json).unwrap();
        assert_eq!(result.title(), Some("stream lower"));
        assert_eq!(result.album(), Some("lower"));
    }

    #[test]
    fn args_write_json_to_scratch() {
        let args = probe_args("in.mp3", "probe-x.json");
        assert_eq!(args[0], "in.mp3");
        assert_eq!(&args[args.len() - 2..], ["-o", "probe-x.json"]);
        assert!(args.contains(&"-show_streams".to_string()));
    }

    #[tokio::test]
    async fn probe_deletes_scratch_on_success() {
        let engine = FakeEngine::new().with_audio("01.mp3", 60_000, &[("title", "One")]);

        let result = probe(&engine, "01.mp3", &InvokeOptions::new()).await.unwrap();
        assert_eq!(result.duration_ms, 60_000);
        assert_eq!(result.title(), Some("One"));
        assert!(engine.artifact_names().is_empty());
    }

    #[tokio::test]
    async fn probe_status_failure_is_probe_error() {
        let engine = FakeEngine::new()
            .with_probe_status("bad.mp3", 1)
            .with_probe_json("junk.mp3", "{ nope");

        let err = probe(&engine, "bad.mp3", &InvokeOptions::new()).await.unwrap_err();
        assert!(matches!(err, ProbeError::Status { exit_code: 1, .. }));
        assert_eq!(err.class(), ErrorClass::Probe);

        let err = probe(&engine, "junk.mp3", &InvokeOptions::new()).await.unwrap_err();
        assert!(matches!(err, ProbeError::Parse { .. }));
        // Scratch removed even though parsing failed
        assert!(engine.artifact_names().is_empty());
    }

    #[tokio::test]
    async fn probe_timeout_keeps_timeout_class() {
        let engine = FakeEngine::new().with_hang("slow.mp3");
        let opts = InvokeOptions::new().with_timeout(std::time::Duration::from_millis(20));

        let err = probe(&engine, "slow.mp3", &opts).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Timeout);
    }
}
