//! Video fingerprinting via an `ffprobe` subprocess.
//!
//! The digest covers duration, container format, the format tags (excluding
//! filename-derived ones) in sorted key order, and one descriptor line per
//! video stream. Any probe failure, including ffprobe being absent, makes the
//! caller fall back to byte-prefix hashing.

use super::Fingerprint;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::process::Command;

/// Format tags that encode filesystem location rather than content
const EXCLUDED_TAGS: &[&str] = &["filename", "file", "filepath", "file_path", "file_name"];

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    // BTreeMap keeps tag iteration order deterministic
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
}

/// Probe a video's container/stream metadata.
///
/// `None` means the probe failed and the caller should fall back to
/// byte-prefix hashing.
pub(super) fn read(path: &Path) -> Option<Fingerprint> {
    let output = Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let probe: ProbeOutput = serde_json::from_slice(&output.stdout).ok()?;
    let format = probe.format?;

    let timestamp = format
        .tags
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("creation_time"))
        .and_then(|(_, v)| parse_creation_time(v));

    let mut blob = String::new();
    let _ = writeln!(blob, "Duration={}", format.duration.as_deref().unwrap_or(""));
    let _ = writeln!(blob, "Format={}", format.format_name.as_deref().unwrap_or(""));

    for (key, value) in &format.tags {
        let lowered = key.to_ascii_lowercase();
        if EXCLUDED_TAGS.contains(&lowered.as_str()) {
            continue;
        }
        let _ = writeln!(blob, "{}={}", key, value);
    }

    for stream in probe.streams.iter().filter(|s| {
        s.codec_type.as_deref() == Some("video")
    }) {
        let _ = writeln!(
            blob,
            "VideoStream={},{}x{},{}",
            stream.codec_name.as_deref().unwrap_or(""),
            stream.width.unwrap_or(0),
            stream.height.unwrap_or(0),
            stream.avg_frame_rate.as_deref().unwrap_or("")
        );
    }

    Some(Fingerprint {
        timestamp,
        digest: super::text_digest(&blob),
    })
}

/// ffprobe usually reports RFC 3339; some muxers write a plain datetime
fn parse_creation_time(raw: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp());
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok()?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_creation_time() {
        let ts = parse_creation_time("2023-01-15T14:30:52.000000Z").unwrap();
        assert_eq!(ts, 1673793052);
    }

    #[test]
    fn parses_plain_datetime_creation_time() {
        let ts = parse_creation_time("2023-01-15 14:30:52").unwrap();
        assert_eq!(ts, 1673793052);
    }

    #[test]
    fn rejects_garbage_creation_time() {
        assert!(parse_creation_time("not a date").is_none());
    }

    #[test]
    fn probe_of_missing_file_returns_none() {
        assert!(read(Path::new("/nonexistent/clip.mp4")).is_none());
    }

    #[test]
    fn probe_json_shape_deserializes() {
        let json = r#"{
            "format": {
                "format_name": "mov,mp4,m4a",
                "duration": "12.480000",
                "tags": {"creation_time": "2023-01-15T14:30:52.000000Z", "Filename": "x.mp4"}
            },
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080, "avg_frame_rate": "30/1"},
                {"codec_type": "audio", "codec_name": "aac"}
            ]
        }"#;
        let probe: ProbeOutput = serde_json::from_str(json).unwrap();
        let format = probe.format.unwrap();
        assert_eq!(format.format_name.as_deref(), Some("mov,mp4,m4a"));
        assert_eq!(probe.streams.len(), 2);
    }
}
