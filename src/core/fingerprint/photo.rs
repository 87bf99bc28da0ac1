//! EXIF-based photo fingerprinting.
//!
//! The digest covers every embedded EXIF field as `ifd:tag=value` lines in
//! the reader's field order, which is stable for identical metadata content.
//! Filesystem-derived groups (name, size, modify time) never appear in EXIF,
//! so two byte-identical photos stored under different names fingerprint the
//! same.

use super::Fingerprint;
use chrono::{DateTime, NaiveDateTime, Utc};
use exif::{In, Reader, Tag, Value};
use std::fmt::Write as _;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Read timestamp and fingerprint from a photo's EXIF block.
///
/// `None` means the metadata could not be read and the caller should fall
/// back to byte-prefix hashing.
pub(super) fn read(path: &Path) -> Option<Fingerprint> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(&file);
    let exif = Reader::new().read_from_container(&mut reader).ok()?;

    let timestamp = date_time_field(&exif, Tag::DateTimeOriginal)
        .or_else(|| date_time_field(&exif, Tag::DateTime));

    let mut blob = String::new();
    for field in exif.fields() {
        let _ = writeln!(
            blob,
            "{}:{}={}",
            field.ifd_num,
            field.tag,
            field.display_value()
        );
    }

    Some(Fingerprint {
        timestamp,
        digest: super::text_digest(&blob),
    })
}

/// Extract a Unix timestamp from an EXIF date/time tag
fn date_time_field(exif: &exif::Exif, tag: Tag) -> Option<i64> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let Value::Ascii(ref vec) = field.value else {
        return None;
    };
    let bytes = vec.first()?;
    let s = std::str::from_utf8(bytes).ok()?;

    // EXIF date format: "YYYY:MM:DD HH:MM:SS", no timezone; treated as UTC
    let naive = NaiveDateTime::parse_from_str(s.trim(), "%Y:%m:%d %H:%M:%S").ok()?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).timestamp())
}
