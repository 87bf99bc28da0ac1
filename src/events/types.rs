//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// All events emitted by the deduplicator core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Scan engine events
    Scan(ScanEvent),
    /// Dedup planning events
    Plan(PlanEvent),
    /// Task execution events
    Task(TaskEvent),
}

impl From<ScanEvent> for Event {
    fn from(event: ScanEvent) -> Self {
        Event::Scan(event)
    }
}

impl From<PlanEvent> for Event {
    fn from(event: PlanEvent) -> Self {
        Event::Plan(event)
    }
}

impl From<TaskEvent> for Event {
    fn from(event: TaskEvent) -> Self {
        Event::Task(event)
    }
}

/// Events during a scan run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScanEvent {
    /// File discovery under the root has started
    DiscoveryStarted { root: PathBuf },
    /// Discovery finished; `pending` excludes files already covered by a resumed session
    DiscoveryCompleted { pending: usize, resumed: usize },
    /// Progress update after each processed file
    Progress(ScanProgress),
    /// A single file failed and was skipped
    FileFailed { path: PathBuf, message: String },
    /// Orphan reconciliation removed stale records
    OrphansRemoved { count: usize },
    /// The session finished
    Completed { files_processed: u64 },
}

/// Progress information during scanning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Files processed so far, including any resumed prefix
    pub processed: u64,
    /// Total files this session covers
    pub total: u64,
    /// File most recently processed
    pub current_path: PathBuf,
}

/// Events during dedup planning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlanEvent {
    /// Existing tasks were cleared before replanning
    TasksCleared,
    /// A duplicate group was turned into tasks
    GroupPlanned { members: usize },
    /// Planning finished
    Completed { groups: usize, tasks: usize },
}

/// Events during task execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskEvent {
    /// Starting the task batch for one container
    ContainerStarted { mount: PathBuf, tasks: usize },
    /// A container's device is not currently attached
    ContainerOffline { disk_id: String },
    /// One task was applied and retired
    TaskApplied { task_id: i64 },
    /// One task failed; it stays pending for a later run
    TaskFailed { task_id: i64, message: String },
    /// Execution finished
    Completed { processed: usize, failed: usize },
}
