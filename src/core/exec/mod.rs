//! Task execution: apply the dedup plan to the filesystem.
//!
//! Tasks run per container. A container whose device is not attached is
//! skipped with its tasks intact, so a plan spanning several external
//! drives can be worked off one drive at a time. Each task's filesystem
//! mutation and the retirement of its row commit together; a failure
//! leaves the task pending for a later run.

use crate::core::device::{ContainerIdentity, ContainerResolver, DeviceInfo};
use crate::core::fingerprint::MediaType;
use crate::core::store::{ContainerTasks, PendingTask, Store, TaskOperation};
use crate::error::{MediaDedupError, TaskError};
use crate::events::{EventSender, TaskEvent};
use chrono::{DateTime, Utc};
use filetime::FileTime;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecReport {
    /// Tasks applied and retired
    pub processed: usize,
    /// Tasks that failed and remain pending
    pub failed: usize,
    /// Containers skipped because their device was not attached
    pub offline_containers: usize,
}

pub struct TaskExecutor<'a, D: DeviceInfo> {
    store: &'a Store,
    resolver: ContainerResolver<D>,
    events: EventSender,
}

impl<'a, D: DeviceInfo> TaskExecutor<'a, D> {
    pub fn new(store: &'a Store, device: D, events: EventSender) -> Self {
        TaskExecutor {
            store,
            resolver: ContainerResolver::new(device),
            events,
        }
    }

    /// Execute every pending task whose container is reachable. When a
    /// container is offline, `reconnect` is asked once whether to re-probe
    /// (after the user attaches the drive); declining skips the container.
    pub fn execute(
        &mut self,
        mut reconnect: impl FnMut(&ContainerIdentity) -> bool,
    ) -> Result<ExecReport, MediaDedupError> {
        let batches = self.store.pending_task_batches()?;
        let mut report = ExecReport::default();

        for batch in batches {
            let identity = &batch.container.identity;
            let mount = match self.locate(identity, &mut reconnect)? {
                Some(mount) => mount,
                None => {
                    warn!(disk_id = %identity.disk_id, "container offline, keeping its tasks");
                    self.events.send(TaskEvent::ContainerOffline {
                        disk_id: identity.disk_id.clone(),
                    });
                    report.offline_containers += 1;
                    continue;
                }
            };
            self.events.send(TaskEvent::ContainerStarted {
                mount: mount.clone(),
                tasks: batch.tasks.len(),
            });
            self.run_batch(&mount, &batch, &mut report);
        }

        info!(
            processed = report.processed,
            failed = report.failed,
            "task execution finished"
        );
        self.events.send(TaskEvent::Completed {
            processed: report.processed,
            failed: report.failed,
        });
        Ok(report)
    }

    fn locate(
        &mut self,
        identity: &ContainerIdentity,
        reconnect: &mut impl FnMut(&ContainerIdentity) -> bool,
    ) -> Result<Option<PathBuf>, MediaDedupError> {
        if let Some(mount) = self.resolver.find_mount(identity)? {
            return Ok(Some(mount));
        }
        if reconnect(identity) {
            return Ok(self.resolver.find_mount(identity)?);
        }
        Ok(None)
    }

    fn run_batch(&self, mount: &Path, batch: &ContainerTasks, report: &mut ExecReport) {
        for task in &batch.tasks {
            let result = self
                .store
                .retire_task_with(task.id, || apply_task(mount, task));
            match result {
                Ok(()) => {
                    report.processed += 1;
                    self.events.send(TaskEvent::TaskApplied { task_id: task.id });
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(task_id = task.id, error = %err, "task failed, keeping it pending");
                    self.events.send(TaskEvent::TaskFailed {
                        task_id: task.id,
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}

fn apply_task(mount: &Path, task: &PendingTask) -> Result<(), TaskError> {
    let target = mount.join(&task.file_path).join(&task.file_name);
    match task.operation {
        // A missing delete target means the work is already done
        TaskOperation::Delete => {
            if target.is_file() {
                std::fs::remove_file(&target).map_err(|source| TaskError::Filesystem {
                    path: target.clone(),
                    source,
                })?;
            }
            Ok(())
        }
        TaskOperation::Adjust { new_timestamp } => adjust_file(&target, task, new_timestamp),
    }
}

/// Retime the kept file to the canonical timestamp and rename it to the
/// canonical `IMG_date_time_DIGEST_n` form.
fn adjust_file(target: &Path, task: &PendingTask, new_timestamp: Option<i64>) -> Result<(), TaskError> {
    let seconds = new_timestamp.ok_or(TaskError::MissingTimestamp { task_id: task.id })?;
    let timestamp = DateTime::<Utc>::from_timestamp(seconds, 0).ok_or(TaskError::InvalidTimestamp {
        task_id: task.id,
        value: seconds,
    })?;
    let directory = target.parent().unwrap_or(Path::new(""));
    let stem = canonical_stem(task, &timestamp);

    if !target.is_file() {
        // A crash after the rename but before the task row was retired
        // leaves the file already at its canonical name; finish the task
        // instead of failing it forever.
        if find_canonical(directory, &stem).is_some() {
            return Ok(());
        }
        return Err(TaskError::MissingFile {
            path: target.to_path_buf(),
        });
    }

    let times = FileTime::from_unix_time(timestamp.timestamp(), 0);
    filetime::set_file_times(target, times, times).map_err(|source| TaskError::Filesystem {
        path: target.to_path_buf(),
        source,
    })?;

    let extension = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let mut counter = 1u32;
    let renamed = loop {
        let candidate = directory.join(format!("{stem}{counter}{extension}"));
        if candidate == target {
            // Already canonically named
            return Ok(());
        }
        if !candidate.exists() {
            break candidate;
        }
        counter += 1;
    };
    std::fs::rename(target, &renamed).map_err(|source| TaskError::Filesystem {
        path: target.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn canonical_stem(task: &PendingTask, timestamp: &DateTime<Utc>) -> String {
    let prefix = match task.media_type {
        MediaType::Picture => "IMG",
        MediaType::Video => "VID",
    };
    format!(
        "{prefix}_{}_{}_",
        timestamp.format("%Y%m%d_%H%M%S"),
        task.content_fingerprint.to_uppercase()
    )
}

fn find_canonical(directory: &Path, stem: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(directory).ok()?;
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().starts_with(stem) {
            return Some(entry.path());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fingerprint::MediaType;
    use crate::core::store::NewFileRecord;
    use crate::error::DeviceError;
    use crate::events::null_sender;
    use std::fs;
    use tempfile::TempDir;

    struct FixedDevice {
        mounts: Vec<PathBuf>,
    }

    impl DeviceInfo for FixedDevice {
        fn identify(&self, _mount_root: &Path) -> Result<ContainerIdentity, DeviceError> {
            Ok(test_identity())
        }

        fn mount_points(&self) -> Result<Vec<PathBuf>, DeviceError> {
            Ok(self.mounts.clone())
        }
    }

    fn test_identity() -> ContainerIdentity {
        ContainerIdentity {
            partition_id: Some("uuid-x".to_string()),
            disk_id: "disk-x".to_string(),
        }
    }

    fn seed_file(store: &Store, name: &str, fingerprint: &str) -> i64 {
        let container = store.get_or_create_container(&test_identity()).unwrap();
        let session = store.create_session(container.id, "").unwrap();
        store
            .apply_scan_batch(
                container.id,
                session.id,
                &[NewFileRecord {
                    path: String::new(),
                    name: name.to_string(),
                    media_type: MediaType::Picture,
                    size: 4,
                    metadata_timestamp: Some(1_600_000_000),
                    filesystem_creation_time: None,
                    filesystem_modified_time: None,
                    filename_timestamp: None,
                    content_fingerprint: fingerprint.to_string(),
                }],
                1,
            )
            .unwrap();
        store.complete_session(session.id).unwrap();
        store.fingerprint_candidates().unwrap()
            .into_iter()
            .find(|c| c.content_fingerprint == fingerprint)
            .unwrap()
            .id
    }

    fn executor<'a>(store: &'a Store, mount: &Path) -> TaskExecutor<'a, FixedDevice> {
        TaskExecutor::new(
            store,
            FixedDevice {
                mounts: vec![mount.to_path_buf()],
            },
            null_sender(),
        )
    }

    #[test]
    fn delete_task_removes_file_and_retires() {
        let temp = TempDir::new().unwrap();
        let mount = temp.path().canonicalize().unwrap();
        fs::write(mount.join("dupe.jpg"), b"data").unwrap();

        let store = Store::open_in_memory().unwrap();
        let file_id = seed_file(&store, "dupe.jpg", "abcd");
        store.replace_tasks(&[(file_id, TaskOperation::Delete)]).unwrap();

        let report = executor(&store, &mount).execute(|_| false).unwrap();
        assert_eq!(report.processed, 1);
        assert!(!mount.join("dupe.jpg").exists());
        assert_eq!(store.task_count().unwrap(), 0);
    }

    #[test]
    fn delete_of_already_missing_file_counts_as_done() {
        let temp = TempDir::new().unwrap();
        let mount = temp.path().canonicalize().unwrap();

        let store = Store::open_in_memory().unwrap();
        let file_id = seed_file(&store, "ghost.jpg", "abcd");
        store.replace_tasks(&[(file_id, TaskOperation::Delete)]).unwrap();

        let report = executor(&store, &mount).execute(|_| false).unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(store.task_count().unwrap(), 0);
    }

    #[test]
    fn adjust_renames_to_canonical_form_and_retimes() {
        let temp = TempDir::new().unwrap();
        let mount = temp.path().canonicalize().unwrap();
        fs::write(mount.join("keep.jpg"), b"data").unwrap();

        let store = Store::open_in_memory().unwrap();
        let file_id = seed_file(&store, "keep.jpg", "00ff");
        // 2023-01-15 14:30:52 UTC
        store
            .replace_tasks(&[(
                file_id,
                TaskOperation::Adjust {
                    new_timestamp: Some(1_673_793_052),
                },
            )])
            .unwrap();

        let report = executor(&store, &mount).execute(|_| false).unwrap();
        assert_eq!(report.processed, 1);

        let renamed = mount.join("IMG_20230115_143052_00FF_1.jpg");
        assert!(renamed.is_file());
        assert!(!mount.join("keep.jpg").exists());
        let mtime = fs::metadata(&renamed).unwrap().modified().unwrap();
        let secs = mtime
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert_eq!(secs, 1_673_793_052);
    }

    #[test]
    fn adjust_collision_advances_the_counter() {
        let temp = TempDir::new().unwrap();
        let mount = temp.path().canonicalize().unwrap();
        fs::write(mount.join("keep.jpg"), b"data").unwrap();
        fs::write(mount.join("IMG_20230115_143052_00FF_1.jpg"), b"other").unwrap();

        let store = Store::open_in_memory().unwrap();
        let file_id = seed_file(&store, "keep.jpg", "00ff");
        store
            .replace_tasks(&[(
                file_id,
                TaskOperation::Adjust {
                    new_timestamp: Some(1_673_793_052),
                },
            )])
            .unwrap();

        executor(&store, &mount).execute(|_| false).unwrap();
        assert!(mount.join("IMG_20230115_143052_00FF_2.jpg").is_file());
    }

    #[test]
    fn adjust_retry_after_interrupted_run_succeeds() {
        let temp = TempDir::new().unwrap();
        let mount = temp.path().canonicalize().unwrap();
        // The rename already happened; the task row survived the crash
        fs::write(mount.join("IMG_20230115_143052_00FF_1.jpg"), b"data").unwrap();

        let store = Store::open_in_memory().unwrap();
        let file_id = seed_file(&store, "keep.jpg", "00ff");
        store
            .replace_tasks(&[(
                file_id,
                TaskOperation::Adjust {
                    new_timestamp: Some(1_673_793_052),
                },
            )])
            .unwrap();

        let report = executor(&store, &mount).execute(|_| false).unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(store.task_count().unwrap(), 0);
    }

    #[test]
    fn adjust_without_timestamp_fails_and_stays_pending() {
        let temp = TempDir::new().unwrap();
        let mount = temp.path().canonicalize().unwrap();
        fs::write(mount.join("keep.jpg"), b"data").unwrap();

        let store = Store::open_in_memory().unwrap();
        let file_id = seed_file(&store, "keep.jpg", "00ff");
        store
            .replace_tasks(&[(file_id, TaskOperation::Adjust { new_timestamp: None })])
            .unwrap();

        let report = executor(&store, &mount).execute(|_| false).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(store.task_count().unwrap(), 1);
        assert!(mount.join("keep.jpg").is_file());
    }

    #[test]
    fn adjust_with_out_of_range_timestamp_reports_the_value() {
        let temp = TempDir::new().unwrap();
        let mount = temp.path().canonicalize().unwrap();
        fs::write(mount.join("keep.jpg"), b"data").unwrap();

        let store = Store::open_in_memory().unwrap();
        let file_id = seed_file(&store, "keep.jpg", "00ff");
        store
            .replace_tasks(&[(
                file_id,
                TaskOperation::Adjust {
                    new_timestamp: Some(i64::MAX),
                },
            )])
            .unwrap();

        let (sender, receiver) = crate::events::EventChannel::new();
        let mut executor = TaskExecutor::new(
            &store,
            FixedDevice {
                mounts: vec![mount.clone()],
            },
            sender,
        );
        let report = executor.execute(|_| false).unwrap();
        drop(executor);

        assert_eq!(report.failed, 1);
        assert_eq!(store.task_count().unwrap(), 1);
        let message = receiver
            .iter()
            .find_map(|e| match e {
                crate::events::Event::Task(TaskEvent::TaskFailed { message, .. }) => Some(message),
                _ => None,
            })
            .unwrap();
        assert!(message.contains("out-of-range"));
        assert!(message.contains(&i64::MAX.to_string()));
    }

    #[test]
    fn offline_container_keeps_tasks_and_asks_once() {
        let store = Store::open_in_memory().unwrap();
        let file_id = seed_file(&store, "somewhere.jpg", "abcd");
        store.replace_tasks(&[(file_id, TaskOperation::Delete)]).unwrap();

        let mut asked = 0;
        let mut executor = TaskExecutor::new(
            &store,
            FixedDevice { mounts: Vec::new() },
            null_sender(),
        );
        let report = executor
            .execute(|_| {
                asked += 1;
                false
            })
            .unwrap();

        assert_eq!(asked, 1);
        assert_eq!(report.offline_containers, 1);
        assert_eq!(store.task_count().unwrap(), 1);
    }
}
