//! Record types mirroring the store's four relations.

use crate::core::device::ContainerIdentity;
use crate::core::fingerprint::MediaType;
use serde::{Deserialize, Serialize};

/// One physical partition/volume tracked across runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    pub id: i64,
    pub identity: ContainerIdentity,
}

/// Lifecycle of a scan run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    InProgress,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(SessionStatus::InProgress),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            _ => None,
        }
    }
}

/// One scan run over a (container, root) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSessionRecord {
    pub id: i64,
    pub container_id: i64,
    /// Root directory, relative to the container's mount root
    pub root_path: String,
    pub status: SessionStatus,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub files_processed: u64,
    pub files_total: Option<u64>,
}

/// Field set for a scan upsert; container and session ids are supplied by
/// the scan engine at commit time
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub path: String,
    pub name: String,
    pub media_type: MediaType,
    pub size: u64,
    pub metadata_timestamp: Option<i64>,
    pub filesystem_creation_time: Option<i64>,
    pub filesystem_modified_time: Option<i64>,
    pub filename_timestamp: Option<i64>,
    pub content_fingerprint: String,
}

/// Planned remediation action; a closed set, exhaustively matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOperation {
    /// Retime the retained copy to the canonical timestamp and rename it
    Adjust { new_timestamp: Option<i64> },
    /// Remove a redundant copy
    Delete,
}

impl TaskOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskOperation::Adjust { .. } => "adjust",
            TaskOperation::Delete => "delete",
        }
    }

    pub fn new_timestamp(&self) -> Option<i64> {
        match self {
            TaskOperation::Adjust { new_timestamp } => *new_timestamp,
            TaskOperation::Delete => None,
        }
    }
}

/// Candidate row for dedup planning
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub id: i64,
    pub size: u64,
    pub content_fingerprint: String,
    pub metadata_timestamp: Option<i64>,
    pub filename_timestamp: Option<i64>,
    pub filesystem_creation_time: Option<i64>,
    pub filesystem_modified_time: Option<i64>,
}

impl CandidateFile {
    /// Every defined timestamp, in no particular order
    pub fn timestamps(&self) -> impl Iterator<Item = i64> + '_ {
        [
            self.metadata_timestamp,
            self.filename_timestamp,
            self.filesystem_creation_time,
            self.filesystem_modified_time,
        ]
        .into_iter()
        .flatten()
    }
}
