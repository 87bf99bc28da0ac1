//! SQLite persistence for containers, files, scan sessions and tasks.
//!
//! The store is the single source of truth between runs. All multi-row
//! updates go through a transaction so a crash can never leave a batch
//! half-applied.

mod types;

pub use types::{
    CandidateFile, ContainerRecord, NewFileRecord, ScanSessionRecord, SessionStatus,
    TaskOperation,
};

use crate::core::device::ContainerIdentity;
use crate::core::fingerprint::MediaType;
use crate::error::StoreError;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS containers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    partition_id TEXT,
    disk_id TEXT NOT NULL,
    UNIQUE (partition_id, disk_id)
);

CREATE TABLE IF NOT EXISTS scan_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    container_id INTEGER NOT NULL REFERENCES containers(id) ON DELETE CASCADE,
    root_path TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at INTEGER NOT NULL,
    completed_at INTEGER,
    files_processed INTEGER NOT NULL DEFAULT 0,
    files_total INTEGER
);

CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    container_id INTEGER NOT NULL REFERENCES containers(id) ON DELETE CASCADE,
    path TEXT NOT NULL,
    name TEXT NOT NULL,
    media_type TEXT NOT NULL,
    size INTEGER NOT NULL,
    metadata_timestamp INTEGER,
    filesystem_creation_time INTEGER,
    filesystem_modified_time INTEGER,
    filename_timestamp INTEGER,
    content_fingerprint TEXT NOT NULL DEFAULT '',
    last_scan_session_id INTEGER REFERENCES scan_sessions(id) ON DELETE SET NULL,
    UNIQUE (container_id, path, name)
);

CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id INTEGER REFERENCES files(id) ON DELETE CASCADE,
    operation TEXT NOT NULL,
    new_timestamp INTEGER
);

CREATE INDEX IF NOT EXISTS idx_files_content_dupes ON files (size, content_fingerprint);
CREATE INDEX IF NOT EXISTS idx_files_timestamp_dupes ON files (size, metadata_timestamp);
CREATE INDEX IF NOT EXISTS idx_files_session ON files (last_scan_session_id);
";

/// A pending task joined with the file and container it acts on
#[derive(Debug, Clone)]
pub struct PendingTask {
    pub id: i64,
    pub operation: TaskOperation,
    /// Directory relative to the container mount root
    pub file_path: String,
    pub file_name: String,
    pub media_type: MediaType,
    pub content_fingerprint: String,
}

/// All pending tasks for one container, in insertion order
#[derive(Debug, Clone)]
pub struct ContainerTasks {
    pub container: ContainerRecord,
    pub tasks: Vec<PendingTask>,
}

/// Duplicate-group row for the summary report: one (size, timestamp) key
/// shared by `count` files
#[derive(Debug, Clone, Copy)]
pub struct DuplicateGroupStat {
    pub size: u64,
    pub count: u64,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::initialize(conn)
    }

    /// Open an existing database; fails rather than silently creating an
    /// empty one, so `summary` on a typo'd path does not report zero files.
    pub fn open_existing(path: &Path) -> Result<Self, StoreError> {
        if !path.is_file() {
            return Err(StoreError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Self::open(path)
    }

    fn initialize(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Store { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::OpenFailed {
            path: std::path::PathBuf::from(":memory:"),
            reason: e.to_string(),
        })?;
        Self::initialize(conn)
    }

    // --- containers ---

    /// Look up a container by identity, creating it on first sight. `IS`
    /// rather than `=` so a NULL partition id matches itself.
    pub fn get_or_create_container(
        &self,
        identity: &ContainerIdentity,
    ) -> Result<ContainerRecord, StoreError> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM containers WHERE partition_id IS ?1 AND disk_id = ?2",
                params![identity.partition_id, identity.disk_id],
                |row| row.get(0),
            )
            .optional()?;
        let id = match existing {
            Some(id) => id,
            None => {
                self.conn.execute(
                    "INSERT INTO containers (partition_id, disk_id) VALUES (?1, ?2)",
                    params![identity.partition_id, identity.disk_id],
                )?;
                let id = self.conn.last_insert_rowid();
                debug!(container_id = id, disk_id = %identity.disk_id, "registered container");
                id
            }
        };
        Ok(ContainerRecord {
            id,
            identity: identity.clone(),
        })
    }

    // --- scan sessions ---

    pub fn find_in_progress_session(
        &self,
        container_id: i64,
        root_path: &str,
    ) -> Result<Option<ScanSessionRecord>, StoreError> {
        let session = self
            .conn
            .query_row(
                "SELECT id, container_id, root_path, status, started_at, completed_at, \
                        files_processed, files_total \
                 FROM scan_sessions \
                 WHERE container_id = ?1 AND root_path = ?2 AND status = 'in_progress' \
                 ORDER BY id DESC LIMIT 1",
                params![container_id, root_path],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    pub fn create_session(
        &self,
        container_id: i64,
        root_path: &str,
    ) -> Result<ScanSessionRecord, StoreError> {
        let started_at = chrono::Utc::now().timestamp();
        self.conn.execute(
            "INSERT INTO scan_sessions (container_id, root_path, status, started_at) \
             VALUES (?1, ?2, 'in_progress', ?3)",
            params![container_id, root_path, started_at],
        )?;
        Ok(ScanSessionRecord {
            id: self.conn.last_insert_rowid(),
            container_id,
            root_path: root_path.to_string(),
            status: SessionStatus::InProgress,
            started_at,
            completed_at: None,
            files_processed: 0,
            files_total: None,
        })
    }

    pub fn set_session_total(&self, session_id: i64, total: u64) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE scan_sessions SET files_total = ?2 WHERE id = ?1",
            params![session_id, total],
        )?;
        Ok(())
    }

    pub fn complete_session(&self, session_id: i64) -> Result<(), StoreError> {
        self.finish_session(session_id, SessionStatus::Completed)
    }

    pub fn fail_session(&self, session_id: i64) -> Result<(), StoreError> {
        self.finish_session(session_id, SessionStatus::Failed)
    }

    fn finish_session(&self, session_id: i64, status: SessionStatus) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE scan_sessions SET status = ?2, completed_at = ?3 WHERE id = ?1",
            params![session_id, status.as_str(), chrono::Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// (path, name) keys already attributed to this session, for resume.
    pub fn session_file_keys(
        &self,
        session_id: i64,
    ) -> Result<HashSet<(String, String)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, name FROM files WHERE last_scan_session_id = ?1")?;
        let keys = stmt
            .query_map([session_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(keys)
    }

    /// Commit one scan batch atomically: upsert every record, attribute it
    /// to the session, and advance the session's progress counter.
    pub fn apply_scan_batch(
        &self,
        container_id: i64,
        session_id: i64,
        files: &[NewFileRecord],
        files_processed: u64,
    ) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO files (container_id, path, name, media_type, size, \
                     metadata_timestamp, filesystem_creation_time, filesystem_modified_time, \
                     filename_timestamp, content_fingerprint, last_scan_session_id) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
                 ON CONFLICT (container_id, path, name) DO UPDATE SET \
                     media_type = excluded.media_type, \
                     size = excluded.size, \
                     metadata_timestamp = excluded.metadata_timestamp, \
                     filesystem_creation_time = excluded.filesystem_creation_time, \
                     filesystem_modified_time = excluded.filesystem_modified_time, \
                     filename_timestamp = excluded.filename_timestamp, \
                     content_fingerprint = excluded.content_fingerprint, \
                     last_scan_session_id = excluded.last_scan_session_id",
            )?;
            for file in files {
                stmt.execute(params![
                    container_id,
                    file.path,
                    file.name,
                    file.media_type.as_str(),
                    file.size,
                    file.metadata_timestamp,
                    file.filesystem_creation_time,
                    file.filesystem_modified_time,
                    file.filename_timestamp,
                    file.content_fingerprint,
                    session_id,
                ])?;
            }
        }
        tx.execute(
            "UPDATE scan_sessions SET files_processed = ?2 WHERE id = ?1",
            params![session_id, files_processed],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Remove records under the scanned root that the finished session did
    /// not touch; they no longer exist on disk. An empty root means the
    /// whole container was scanned. The prefix test is a plain substring
    /// comparison, so `_` and `%` in directory names stay literal.
    pub fn delete_orphans(
        &self,
        container_id: i64,
        root_path: &str,
        session_id: i64,
    ) -> Result<usize, StoreError> {
        let removed = self.conn.execute(
            "DELETE FROM files WHERE container_id = ?1 \
               AND (last_scan_session_id IS NULL OR last_scan_session_id != ?2) \
               AND (?3 = '' OR path = ?3 OR substr(path, 1, length(?3) + 1) = ?3 || '/')",
            params![container_id, session_id, root_path],
        )?;
        Ok(removed)
    }

    // --- planning ---

    /// Every fingerprinted file ordered so equal (size, fingerprint) rows
    /// are adjacent, ties broken by insertion order.
    pub fn fingerprint_candidates(&self) -> Result<Vec<CandidateFile>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, size, content_fingerprint, metadata_timestamp, filename_timestamp, \
                    filesystem_creation_time, filesystem_modified_time \
             FROM files WHERE content_fingerprint != '' \
             ORDER BY size, content_fingerprint, id",
        )?;
        let candidates = stmt
            .query_map([], |row| {
                Ok(CandidateFile {
                    id: row.get(0)?,
                    size: row.get(1)?,
                    content_fingerprint: row.get(2)?,
                    metadata_timestamp: row.get(3)?,
                    filename_timestamp: row.get(4)?,
                    filesystem_creation_time: row.get(5)?,
                    filesystem_modified_time: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(candidates)
    }

    /// Replace the task list in one transaction so an interrupted prepare
    /// never leaves a mix of old and new tasks.
    pub fn replace_tasks(&self, tasks: &[(i64, TaskOperation)]) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM tasks", [])?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO tasks (file_id, operation, new_timestamp) VALUES (?1, ?2, ?3)",
            )?;
            for (file_id, operation) in tasks {
                stmt.execute(params![file_id, operation.as_str(), operation.new_timestamp()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // --- execution ---

    pub fn task_count(&self) -> Result<u64, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?)
    }

    /// All pending tasks grouped per container, containers and tasks both
    /// in id order. Tasks whose file row has vanished are not returned.
    pub fn pending_task_batches(&self) -> Result<Vec<ContainerTasks>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.partition_id, c.disk_id, \
                    t.id, t.operation, t.new_timestamp, \
                    f.path, f.name, f.media_type, f.content_fingerprint \
             FROM tasks t \
             JOIN files f ON f.id = t.file_id \
             JOIN containers c ON c.id = f.container_id \
             ORDER BY c.id, t.id",
        )?;
        let mut batches: Vec<ContainerTasks> = Vec::new();
        let rows = stmt.query_map([], |row| {
            let container = ContainerRecord {
                id: row.get(0)?,
                identity: ContainerIdentity {
                    partition_id: row.get(1)?,
                    disk_id: row.get(2)?,
                },
            };
            let task_id: i64 = row.get(3)?;
            let op_name: String = row.get(4)?;
            let new_timestamp: Option<i64> = row.get(5)?;
            let media_type: String = row.get(8)?;
            Ok((
                container,
                task_id,
                op_name,
                new_timestamp,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                media_type,
                row.get::<_, String>(9)?,
            ))
        })?;
        for row in rows {
            let (container, task_id, op_name, new_timestamp, path, name, media_type, fingerprint) =
                row?;
            let operation = match op_name.as_str() {
                "adjust" => TaskOperation::Adjust { new_timestamp },
                "delete" => TaskOperation::Delete,
                other => {
                    return Err(StoreError::UnknownOperation {
                        task_id,
                        operation: other.to_string(),
                    })
                }
            };
            let media_type = MediaType::parse(&media_type).ok_or_else(|| {
                StoreError::UnknownOperation {
                    task_id,
                    operation: format!("media type {media_type}"),
                }
            })?;
            let task = PendingTask {
                id: task_id,
                operation,
                file_path: path,
                file_name: name,
                media_type,
                content_fingerprint: fingerprint,
            };
            match batches.last_mut() {
                Some(batch) if batch.container.id == container.id => batch.tasks.push(task),
                _ => batches.push(ContainerTasks {
                    container,
                    tasks: vec![task],
                }),
            }
        }
        Ok(batches)
    }

    /// Run the filesystem side of a task and retire its row in the same
    /// transaction. If the mutation fails the transaction rolls back and
    /// the task stays pending for a future run.
    pub fn retire_task_with<F, E>(&self, task_id: i64, mutation: F) -> Result<(), E>
    where
        F: FnOnce() -> Result<(), E>,
        E: From<StoreError>,
    {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(StoreError::from)?;
        mutation()?;
        tx.execute("DELETE FROM tasks WHERE id = ?1", [task_id])
            .map_err(StoreError::from)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(())
    }

    // --- reporting ---

    pub fn total_file_count(&self) -> Result<u64, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?)
    }

    /// Duplicate groups keyed on (size, metadata timestamp). Files without
    /// a metadata timestamp never form a group here.
    pub fn timestamp_duplicate_groups(&self) -> Result<Vec<DuplicateGroupStat>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT size, COUNT(*) FROM files \
             WHERE metadata_timestamp IS NOT NULL \
             GROUP BY size, metadata_timestamp \
             HAVING COUNT(*) > 1",
        )?;
        let groups = stmt
            .query_map([], |row| {
                Ok(DuplicateGroupStat {
                    size: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    #[cfg(test)]
    pub(crate) fn raw(&self) -> &Connection {
        &self.conn
    }
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ScanSessionRecord> {
    let status: String = row.get(3)?;
    let status = SessionStatus::parse(&status).unwrap_or(SessionStatus::Failed);
    Ok(ScanSessionRecord {
        id: row.get(0)?,
        container_id: row.get(1)?,
        root_path: row.get(2)?,
        status,
        started_at: row.get(4)?,
        completed_at: row.get(5)?,
        files_processed: row.get(6)?,
        files_total: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(partition: Option<&str>, disk: &str) -> ContainerIdentity {
        ContainerIdentity {
            partition_id: partition.map(str::to_string),
            disk_id: disk.to_string(),
        }
    }

    fn sample_file(path: &str, name: &str, size: u64, fingerprint: &str) -> NewFileRecord {
        NewFileRecord {
            path: path.to_string(),
            name: name.to_string(),
            media_type: MediaType::Picture,
            size,
            metadata_timestamp: Some(1_600_000_000),
            filesystem_creation_time: None,
            filesystem_modified_time: Some(1_700_000_000),
            filename_timestamp: None,
            content_fingerprint: fingerprint.to_string(),
        }
    }

    #[test]
    fn container_lookup_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let first = store
            .get_or_create_container(&identity(Some("uuid-1"), "disk-a"))
            .unwrap();
        let second = store
            .get_or_create_container(&identity(Some("uuid-1"), "disk-a"))
            .unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn null_partition_id_matches_itself() {
        let store = Store::open_in_memory().unwrap();
        let first = store
            .get_or_create_container(&identity(None, "disk-a"))
            .unwrap();
        let second = store
            .get_or_create_container(&identity(None, "disk-a"))
            .unwrap();
        let other = store
            .get_or_create_container(&identity(Some("uuid"), "disk-a"))
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_ne!(first.id, other.id);
    }

    #[test]
    fn sizes_beyond_32_bits_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let container = store
            .get_or_create_container(&identity(Some("u"), "d"))
            .unwrap();
        let session = store.create_session(container.id, "").unwrap();
        let mut big = sample_file("", "timelapse.mp4", 0, "aa");
        big.size = 5 * 1024 * 1024 * 1024; // a 5 GiB video
        store
            .apply_scan_batch(container.id, session.id, &[big], 1)
            .unwrap();

        let candidates = store.fingerprint_candidates().unwrap();
        assert_eq!(candidates[0].size, 5 * 1024 * 1024 * 1024);
    }

    #[test]
    fn session_lifecycle() {
        let store = Store::open_in_memory().unwrap();
        let container = store
            .get_or_create_container(&identity(Some("u"), "d"))
            .unwrap();
        let session = store.create_session(container.id, "photos").unwrap();
        let found = store
            .find_in_progress_session(container.id, "photos")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, session.id);
        assert_eq!(found.status, SessionStatus::InProgress);

        store.complete_session(session.id).unwrap();
        assert!(store
            .find_in_progress_session(container.id, "photos")
            .unwrap()
            .is_none());
    }

    #[test]
    fn rescan_upserts_rather_than_duplicating() {
        let store = Store::open_in_memory().unwrap();
        let container = store
            .get_or_create_container(&identity(Some("u"), "d"))
            .unwrap();
        let first = store.create_session(container.id, "").unwrap();
        store
            .apply_scan_batch(container.id, first.id, &[sample_file("", "a.jpg", 10, "aa")], 1)
            .unwrap();
        store.complete_session(first.id).unwrap();

        let second = store.create_session(container.id, "").unwrap();
        store
            .apply_scan_batch(container.id, second.id, &[sample_file("", "a.jpg", 12, "bb")], 1)
            .unwrap();

        assert_eq!(store.total_file_count().unwrap(), 1);
        let candidates = store.fingerprint_candidates().unwrap();
        assert_eq!(candidates[0].size, 12);
        assert_eq!(candidates[0].content_fingerprint, "bb");
    }

    #[test]
    fn orphan_delete_respects_scan_root() {
        let store = Store::open_in_memory().unwrap();
        let container = store
            .get_or_create_container(&identity(Some("u"), "d"))
            .unwrap();
        let old = store.create_session(container.id, "").unwrap();
        store
            .apply_scan_batch(
                container.id,
                old.id,
                &[
                    sample_file("photos", "inside.jpg", 1, "aa"),
                    sample_file("photos/2023", "nested.jpg", 2, "bb"),
                    sample_file("music", "outside.jpg", 3, "cc"),
                ],
                3,
            )
            .unwrap();
        store.complete_session(old.id).unwrap();

        // Rescan of photos/ that only sees the nested file
        let new = store.create_session(container.id, "photos").unwrap();
        store
            .apply_scan_batch(
                container.id,
                new.id,
                &[sample_file("photos/2023", "nested.jpg", 2, "bb")],
                1,
            )
            .unwrap();
        let removed = store.delete_orphans(container.id, "photos", new.id).unwrap();
        assert_eq!(removed, 1);
        // The record outside the scan root survives
        assert_eq!(store.total_file_count().unwrap(), 2);
    }

    #[test]
    fn orphan_delete_keeps_underscore_roots_literal() {
        let store = Store::open_in_memory().unwrap();
        let container = store
            .get_or_create_container(&identity(Some("u"), "d"))
            .unwrap();
        let old = store.create_session(container.id, "").unwrap();
        // `_` must not act as a single-character wildcard: a sibling
        // directory differing only at that position is out of scope
        store
            .apply_scan_batch(
                container.id,
                old.id,
                &[
                    sample_file("my_photos", "inside.jpg", 1, "aa"),
                    sample_file("myXphotos/sub", "outside.jpg", 2, "bb"),
                ],
                2,
            )
            .unwrap();
        store.complete_session(old.id).unwrap();

        let new = store.create_session(container.id, "my_photos").unwrap();
        let removed = store
            .delete_orphans(container.id, "my_photos", new.id)
            .unwrap();
        assert_eq!(removed, 1);
        let survivor = &store.fingerprint_candidates().unwrap()[0];
        assert_eq!(survivor.content_fingerprint, "bb");
    }

    #[test]
    fn orphan_delete_with_empty_root_covers_container() {
        let store = Store::open_in_memory().unwrap();
        let container = store
            .get_or_create_container(&identity(Some("u"), "d"))
            .unwrap();
        let old = store.create_session(container.id, "").unwrap();
        store
            .apply_scan_batch(
                container.id,
                old.id,
                &[
                    sample_file("photos", "a.jpg", 1, "aa"),
                    sample_file("music", "b.jpg", 2, "bb"),
                ],
                2,
            )
            .unwrap();
        let new = store.create_session(container.id, "").unwrap();
        store
            .apply_scan_batch(container.id, new.id, &[sample_file("photos", "a.jpg", 1, "aa")], 1)
            .unwrap();
        let removed = store.delete_orphans(container.id, "", new.id).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.total_file_count().unwrap(), 1);
    }

    #[test]
    fn tasks_round_trip_grouped_by_container() {
        let store = Store::open_in_memory().unwrap();
        let container = store
            .get_or_create_container(&identity(Some("u"), "d"))
            .unwrap();
        let session = store.create_session(container.id, "").unwrap();
        store
            .apply_scan_batch(
                container.id,
                session.id,
                &[
                    sample_file("", "keep.jpg", 10, "aa"),
                    sample_file("", "drop.jpg", 10, "aa"),
                ],
                2,
            )
            .unwrap();
        let candidates = store.fingerprint_candidates().unwrap();
        store
            .replace_tasks(&[
                (
                    candidates[0].id,
                    TaskOperation::Adjust {
                        new_timestamp: Some(1_500_000_000),
                    },
                ),
                (candidates[1].id, TaskOperation::Delete),
            ])
            .unwrap();

        let batches = store.pending_task_batches().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].container.id, container.id);
        assert_eq!(batches[0].tasks.len(), 2);
        assert_eq!(
            batches[0].tasks[0].operation,
            TaskOperation::Adjust {
                new_timestamp: Some(1_500_000_000)
            }
        );
        assert_eq!(batches[0].tasks[1].operation, TaskOperation::Delete);
    }

    #[test]
    fn unknown_operation_is_rejected_on_load() {
        let store = Store::open_in_memory().unwrap();
        let container = store
            .get_or_create_container(&identity(Some("u"), "d"))
            .unwrap();
        let session = store.create_session(container.id, "").unwrap();
        store
            .apply_scan_batch(container.id, session.id, &[sample_file("", "a.jpg", 1, "aa")], 1)
            .unwrap();
        let file_id = store.fingerprint_candidates().unwrap()[0].id;
        store
            .raw()
            .execute(
                "INSERT INTO tasks (file_id, operation) VALUES (?1, 'transmogrify')",
                [file_id],
            )
            .unwrap();
        let err = store.pending_task_batches().unwrap_err();
        assert!(matches!(err, StoreError::UnknownOperation { .. }));
    }

    #[test]
    fn retire_task_rolls_back_when_mutation_fails() {
        let store = Store::open_in_memory().unwrap();
        let container = store
            .get_or_create_container(&identity(Some("u"), "d"))
            .unwrap();
        let session = store.create_session(container.id, "").unwrap();
        store
            .apply_scan_batch(container.id, session.id, &[sample_file("", "a.jpg", 1, "aa")], 1)
            .unwrap();
        let file_id = store.fingerprint_candidates().unwrap()[0].id;
        store.replace_tasks(&[(file_id, TaskOperation::Delete)]).unwrap();
        let task_id = store.pending_task_batches().unwrap()[0].tasks[0].id;

        let result: Result<(), StoreError> = store.retire_task_with(task_id, || {
            Err(StoreError::UnknownOperation {
                task_id,
                operation: "boom".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(store.task_count().unwrap(), 1);

        store
            .retire_task_with::<_, StoreError>(task_id, || Ok(()))
            .unwrap();
        assert_eq!(store.task_count().unwrap(), 0);
    }

    #[test]
    fn timestamp_duplicate_groups_ignore_missing_timestamps() {
        let store = Store::open_in_memory().unwrap();
        let container = store
            .get_or_create_container(&identity(Some("u"), "d"))
            .unwrap();
        let session = store.create_session(container.id, "").unwrap();
        let mut no_timestamp = sample_file("", "c.jpg", 10, "cc");
        no_timestamp.metadata_timestamp = None;
        let mut other = sample_file("", "d.jpg", 10, "dd");
        other.metadata_timestamp = None;
        store
            .apply_scan_batch(
                container.id,
                session.id,
                &[
                    sample_file("", "a.jpg", 10, "aa"),
                    sample_file("", "b.jpg", 10, "bb"),
                    no_timestamp,
                    other,
                ],
                4,
            )
            .unwrap();
        let groups = store.timestamp_duplicate_groups().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].count, 2);
    }
}
