//! # Error Module
//!
//! Error types for the media deduplicator.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - paths, identifiers, what went wrong
//! - **Per-item vs. fatal** - a single file or task failing is recorded and
//!   skipped; store and traversal-setup failures abort the run

use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum MediaDedupError {
    #[error("Scanning error: {0}")]
    Scan(#[from] ScanError),

    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors that occur during directory scanning
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Failed to read directory {path}: {source}")]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path {path} is not under the scan root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },
}

/// Errors that occur while fingerprinting a media file
#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the persistent store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open database at {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Database file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Database query failed: {0}")]
    QueryFailed(String),

    #[error("Unknown task operation '{operation}' stored for task {task_id}")]
    UnknownOperation { task_id: i64, operation: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::QueryFailed(e.to_string())
    }
}

/// Errors resolving physical device identity
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Cannot determine mount point for path: {path}")]
    NoMountPoint { path: PathBuf },

    #[error("Cannot determine a disk identifier for mount {mount}: {reason}")]
    NoDiskId { mount: PathBuf, reason: String },

    #[error("Failed to enumerate mounted devices: {0}")]
    Enumeration(String),
}

/// Errors applying a single deduplication task
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Target file not found: {path}")]
    MissingFile { path: PathBuf },

    #[error("Adjust task {task_id} has no timestamp")]
    MissingTimestamp { task_id: i64 },

    #[error("Adjust task {task_id} has an out-of-range timestamp {value}")]
    InvalidTimestamp { task_id: i64, value: i64 },

    #[error("Filesystem operation on {path} failed: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store error while retiring task: {0}")]
    Store(#[from] StoreError),
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, MediaDedupError>;
