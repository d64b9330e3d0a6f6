//! Engine argument builders for the concat and mux stages.

use super::types::EncodeOptions;

/// Quote a name for the concat manifest.
///
/// The name is wrapped in single quotes; an embedded `'` closes the
/// quote, emits an escaped quote, and reopens it (`'\''`).
pub fn quote_manifest_path(name: &str) -> String {
    format!("'{}'", name.replace('\'', "'\\''"))
}

/// Render the concat manifest, one `file '<name>'` line per input.
pub fn render_manifest<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|name| format!("file {}\n", quote_manifest_path(name.as_ref())))
        .collect()
}

/// Arguments that concatenate the manifest entries into one audio stream.
///
/// Optional encode settings are emitted only when set.
pub fn concat_args(manifest: &str, options: &EncodeOptions, output: &str) -> Vec<String> {
    let mut args: Vec<String> = ["-f", "concat", "-safe", "0", "-i", manifest]
        .iter()
        .map(|s| s.to_string())
        .collect();

    if let Some(codec) = &options.codec {
        args.push("-codec:a".to_string());
        args.push(codec.clone());
    }
    if let Some(rate) = options.sample_rate {
        args.push("-ar".to_string());
        args.push(rate.to_string());
    }
    if let Some(kbps) = options.bit_rate_kbps {
        args.push("-b:a".to_string());
        args.push(format!("{}k", kbps));
    }
    if let Some(bits) = options.bit_depth_bits {
        args.push("-sample_fmt".to_string());
        args.push(format!("s{}", bits));
    }
    if options.legacy_device_compat {
        args.push("-aac_pns".to_string());
        args.push("0".to_string());
    }

    args.push("-vn".to_string());
    args.push(output.to_string());
    args
}

/// Arguments that mux audio, optional cover and the metadata document.
///
/// Inputs are `0` audio, `1` cover (if any), then the metadata document;
/// container metadata and chapters are mapped from the last input.
pub fn mux_args(audio: &str, cover: Option<&str>, metadata: &str, output: &str) -> Vec<String> {
    let mut args = vec!["-i".to_string(), audio.to_string()];
    if let Some(cover) = cover {
        args.push("-i".to_string());
        args.push(cover.to_string());
    }
    args.push("-i".to_string());
    args.push(metadata.to_string());

    args.push("-map".to_string());
    args.push("0:a".to_string());
    if cover.is_some() {
        args.extend(
            [
                "-map",
                "1",
                "-disposition:v:0",
                "attached_pic",
                "-metadata:s:v",
                "title=Album cover",
                "-metadata:s:v",
                "comment=Cover (front)",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
    }

    let metadata_index = if cover.is_some() { "2" } else { "1" };
    args.extend(
        [
            "-c",
            "copy",
            "-map_metadata",
            metadata_index,
            "-map_chapters",
            metadata_index,
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args.push(output.to_string());
    args
}
