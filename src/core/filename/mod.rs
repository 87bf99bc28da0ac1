//! # Filename Timestamp Module
//!
//! Extracts a best-guess capture time from camera and messaging-app filename
//! conventions.
//!
//! ## Matching rules
//! A static ordered table of patterns is tried against the extension-stripped
//! stem; the first structurally valid match wins. List order is the tie-break
//! rule, deliberately taking priority over pattern specificity. A match whose
//! digits fail calendar validation (month 13, second 61) is treated as a
//! non-match and the next pattern is tried. All times are interpreted as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::LazyLock;

struct TimestampPattern {
    regex: Regex,
    extract: fn(&Captures) -> Option<NaiveDateTime>,
}

static PATTERNS: LazyLock<Vec<TimestampPattern>> = LazyLock::new(|| {
    vec![
        // Android native camera: IMG_20230115_143052.jpg or IMG_20230115_143052123.jpg
        TimestampPattern {
            regex: Regex::new(r"(?i)(?:IMG|VID)_(\d{8})_(\d{6})(?:\d{3})?").unwrap(),
            extract: |c| compact_date_time(&c[1], &c[2]),
        },
        // Generic compact format without prefix: 20230115_143052.jpg, optional _n suffix
        TimestampPattern {
            regex: Regex::new(r"^(\d{8})_(\d{6})(?:\d{3})?(?:[_-]\d+)?").unwrap(),
            extract: |c| compact_date_time(&c[1], &c[2]),
        },
        // WhatsApp Android: IMG-20230115-WA0001.jpg (date only)
        TimestampPattern {
            regex: Regex::new(r"(?i)(?:IMG|VID)-(\d{8})-WA\d+").unwrap(),
            extract: |c| compact_date(&c[1]),
        },
        // WhatsApp iOS/Desktop: "WhatsApp Image 2023-01-15 at 14.30.52.jpeg"
        TimestampPattern {
            regex: Regex::new(
                r"(?i)WhatsApp (?:Image|Video) (\d{4})-(\d{2})-(\d{2}) at (\d{2})\.(\d{2})\.(\d{2})",
            )
            .unwrap(),
            extract: dashed_date_time,
        },
        // WhatsApp iOS share sheet: PHOTO-2023-01-15-14-30-52.jpg
        TimestampPattern {
            regex: Regex::new(
                r"(?i)(?:PHOTO|VIDEO)-(\d{4})-(\d{2})-(\d{2})-(\d{2})-(\d{2})-(\d{2})",
            )
            .unwrap(),
            extract: dashed_date_time,
        },
        // Screenshot Android: Screenshot_20230115-143052.png
        TimestampPattern {
            regex: Regex::new(r"(?i)Screenshot[_\s](\d{8})-(\d{6})").unwrap(),
            extract: |c| compact_date_time(&c[1], &c[2]),
        },
        // Screenshot iOS: "Screenshot 2023-01-15 at 14.30.52.png"
        TimestampPattern {
            regex: Regex::new(
                r"(?i)Screenshot (\d{4})-(\d{2})-(\d{2}) at (\d{2})\.(\d{2})\.(\d{2})",
            )
            .unwrap(),
            extract: dashed_date_time,
        },
        // Signal: signal-2023-01-15-143052.jpg
        TimestampPattern {
            regex: Regex::new(r"(?i)signal-(\d{4})-(\d{2})-(\d{2})-(\d{2})(\d{2})(\d{2})")
                .unwrap(),
            extract: dashed_date_time,
        },
        // Generic dashed format: YYYY-MM-DD_HH-MM-SS or YYYY-MM-DD HH.MM.SS
        TimestampPattern {
            regex: Regex::new(
                r"(\d{4})[_-](\d{2})[_-](\d{2})[_\s]+(\d{2})[._-](\d{2})[._-](\d{2})",
            )
            .unwrap(),
            extract: dashed_date_time,
        },
        // Date-only fallback: bounded YYYYMMDD or YYYY-MM-DD (time = 00:00:00)
        TimestampPattern {
            regex: Regex::new(r"(?:^|[_-])(\d{4})-?(\d{2})-?(\d{2})(?:[_-]|$)").unwrap(),
            extract: |c| date_parts(&c[1], &c[2], &c[3]).map(|d| d.and_hms_opt(0, 0, 0).unwrap()),
        },
    ]
});

/// Attempt to extract a Unix timestamp from a filename.
///
/// The extension is stripped before matching. Returns `None` when no pattern
/// yields a valid calendar date.
pub fn parse_timestamp(filename: &str) -> Option<i64> {
    if filename.trim().is_empty() {
        return None;
    }

    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);

    for pattern in PATTERNS.iter() {
        if let Some(captures) = pattern.regex.captures(stem) {
            if let Some(naive) = (pattern.extract)(&captures) {
                return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).timestamp());
            }
            // Structurally invalid date; fall through to the next pattern
        }
    }

    None
}

/// YYYYMMDD + HHMMSS digit groups
fn compact_date_time(date: &str, time: &str) -> Option<NaiveDateTime> {
    let d = date_parts(&date[0..4], &date[4..6], &date[6..8])?;
    let hour: u32 = time[0..2].parse().ok()?;
    let minute: u32 = time[2..4].parse().ok()?;
    let second: u32 = time[4..6].parse().ok()?;
    d.and_hms_opt(hour, minute, second)
}

/// YYYYMMDD digit group, midnight
fn compact_date(date: &str) -> Option<NaiveDateTime> {
    date_parts(&date[0..4], &date[4..6], &date[6..8]).map(|d| d.and_hms_opt(0, 0, 0).unwrap())
}

/// Six separate capture groups: year month day hour minute second
fn dashed_date_time(captures: &Captures) -> Option<NaiveDateTime> {
    let d = date_parts(&captures[1], &captures[2], &captures[3])?;
    let hour: u32 = captures[4].parse().ok()?;
    let minute: u32 = captures[5].parse().ok()?;
    let second: u32 = captures[6].parse().ok()?;
    d.and_hms_opt(hour, minute, second)
}

fn date_parts(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
