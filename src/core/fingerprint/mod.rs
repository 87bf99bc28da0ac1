//! # Fingerprint Module
//!
//! Derives a content-stable identity for a media file from its embedded
//! metadata, plus a best-effort capture timestamp.
//!
//! ## Strategy
//! - Photos: hash of the embedded EXIF tags (never filesystem-derived data),
//!   so identical photos copied under different names still match.
//! - Videos: hash of the container metadata and video stream descriptors
//!   reported by `ffprobe`.
//! - Fallback: hash of the first 128 KiB of raw bytes whenever metadata
//!   cannot be read. Every file ends up with a usable fingerprint.
//!
//! Digests are xxh3-128 rendered as 32 lowercase hex characters. Collision
//! resistance is not a security requirement here, only practical uniqueness.

mod photo;
mod video;

use crate::error::FingerprintError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use xxhash_rust::xxh3::xxh3_128;

/// Bytes of file prefix hashed when metadata is unavailable
const FALLBACK_PREFIX_LEN: usize = 128 * 1024;

/// Media category derived from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    Picture,
    Video,
}

impl MediaType {
    /// Classify a path by extension; `None` means unsupported
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(|e| e.to_str())?;
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "tiff" | "tif" | "heic" | "heif"
            | "webp" => Some(MediaType::Picture),
            "mp4" | "mov" | "avi" | "mkv" | "wmv" | "flv" | "m4v" | "mpg" | "mpeg" | "3gp"
            | "webm" => Some(MediaType::Video),
            _ => None,
        }
    }

    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Picture => "picture",
            MediaType::Video => "video",
        }
    }

    /// Parse the storage representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "picture" => Some(MediaType::Picture),
            "video" => Some(MediaType::Video),
            _ => None,
        }
    }
}

/// Result of fingerprinting one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    /// Capture time from embedded metadata, Unix seconds UTC
    pub timestamp: Option<i64>,
    /// 32-char lowercase hex digest, never empty
    pub digest: String,
}

/// Fingerprint a media file.
///
/// Metadata read failures of any kind degrade to the byte-prefix fallback;
/// only an I/O failure of the fallback itself is an error.
pub fn fingerprint_file(path: &Path, media_type: MediaType) -> Result<Fingerprint, FingerprintError> {
    let from_metadata = match media_type {
        MediaType::Picture => photo::read(path),
        MediaType::Video => video::read(path),
    };

    match from_metadata {
        Some(fingerprint) => Ok(fingerprint),
        None => {
            tracing::debug!(path = %path.display(), "metadata unreadable, using byte-prefix fingerprint");
            Ok(Fingerprint {
                timestamp: None,
                digest: prefix_digest(path)?,
            })
        }
    }
}

/// Hash a UTF-8 metadata blob to the canonical hex form
pub(crate) fn text_digest(blob: &str) -> String {
    format!("{:032x}", xxh3_128(blob.as_bytes()))
}

/// Hash the first 128 KiB of the file (whole file if smaller)
fn prefix_digest(path: &Path) -> Result<String, FingerprintError> {
    let file = File::open(path).map_err(|e| FingerprintError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut buffer = Vec::with_capacity(FALLBACK_PREFIX_LEN.min(64 * 1024));
    file.take(FALLBACK_PREFIX_LEN as u64)
        .read_to_end(&mut buffer)
        .map_err(|e| FingerprintError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(format!("{:032x}", xxh3_128(&buffer)))
}
