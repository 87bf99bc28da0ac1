//! Directory scanning with resumable, crash-safe sessions.
//!
//! A scan walks one directory tree, fingerprints every supported media
//! file and upserts the results in fixed-size transactional batches. The
//! session row records progress, so an interrupted scan can pick up where
//! it stopped instead of re-fingerprinting everything.

use crate::core::device::{ContainerResolver, DeviceInfo};
use crate::core::fingerprint::{self, MediaType};
use crate::core::filename;
use crate::core::store::{ContainerRecord, NewFileRecord, ScanSessionRecord, Store};
use crate::error::{MediaDedupError, ScanError};
use crate::events::{EventSender, ScanEvent, ScanProgress};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Files are committed in groups of this size; a crash loses at most one
/// batch of fingerprinting work.
const BATCH_SIZE: usize = 100;

/// A resolved scan request: where we are scanning and what, if anything,
/// can be resumed.
#[derive(Debug)]
pub struct ScanTarget {
    /// Absolute, canonicalized scan root
    pub directory: PathBuf,
    /// Mount root of the containing volume
    pub mount_root: PathBuf,
    pub container: ContainerRecord,
    /// Scan root relative to the mount root; empty when scanning the
    /// whole volume
    pub root_path: String,
    /// An unfinished session over the same (container, root), if any
    pub resumable: Option<ScanSessionRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    pub session_id: i64,
    pub files_processed: u64,
    pub orphans_removed: usize,
}

struct PendingFile {
    absolute: PathBuf,
    path: String,
    name: String,
    media_type: MediaType,
}

pub struct ScanEngine<'a, D: DeviceInfo> {
    store: &'a Store,
    resolver: ContainerResolver<D>,
    events: EventSender,
}

impl<'a, D: DeviceInfo> ScanEngine<'a, D> {
    pub fn new(store: &'a Store, device: D, events: EventSender) -> Self {
        ScanEngine {
            store,
            resolver: ContainerResolver::new(device),
            events,
        }
    }

    /// Resolve a directory to its container and look for an interrupted
    /// session. No scanning happens yet; the caller decides whether to
    /// resume or restart before calling [`run`](Self::run).
    pub fn begin(&mut self, directory: &Path) -> Result<ScanTarget, MediaDedupError> {
        if !directory.is_dir() {
            return Err(ScanError::DirectoryNotFound {
                path: directory.to_path_buf(),
            }
            .into());
        }
        let directory = directory
            .canonicalize()
            .map_err(|source| ScanError::ReadDirectory {
                path: directory.to_path_buf(),
                source,
            })?;
        let (mount_root, identity) = self.resolver.resolve(&directory)?;
        let container = self.store.get_or_create_container(&identity)?;
        let root_path = relative_key(&directory, &mount_root)?;
        let resumable = self
            .store
            .find_in_progress_session(container.id, &root_path)?;
        Ok(ScanTarget {
            directory,
            mount_root,
            container,
            root_path,
            resumable,
        })
    }

    /// Run the scan. `resume` continues the target's unfinished session;
    /// otherwise any such session is marked failed and a fresh one starts.
    /// A session whose scan errors out is marked failed before the error
    /// propagates.
    pub fn run(&mut self, target: &ScanTarget, resume: bool) -> Result<ScanOutcome, MediaDedupError> {
        let (session, done_keys) = match (&target.resumable, resume) {
            (Some(session), true) => {
                info!(session_id = session.id, "resuming interrupted scan");
                let keys = self.store.session_file_keys(session.id)?;
                (session.clone(), keys)
            }
            (previous, _) => {
                if let Some(previous) = previous {
                    info!(session_id = previous.id, "abandoning interrupted scan");
                    self.store.fail_session(previous.id)?;
                }
                let session = self
                    .store
                    .create_session(target.container.id, &target.root_path)?;
                (session, HashSet::new())
            }
        };

        match self.run_session(target, &session, &done_keys) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                if let Err(store_err) = self.store.fail_session(session.id) {
                    warn!(session_id = session.id, error = %store_err, "could not mark session failed");
                }
                Err(err)
            }
        }
    }

    fn run_session(
        &mut self,
        target: &ScanTarget,
        session: &ScanSessionRecord,
        done_keys: &HashSet<(String, String)>,
    ) -> Result<ScanOutcome, MediaDedupError> {
        self.events.send(ScanEvent::DiscoveryStarted {
            root: target.directory.clone(),
        });

        let pending = self.discover(target, done_keys)?;
        let resumed = done_keys.len() as u64;
        let total = resumed + pending.len() as u64;
        self.store.set_session_total(session.id, total)?;
        self.events.send(ScanEvent::DiscoveryCompleted {
            pending: pending.len(),
            resumed: done_keys.len(),
        });

        let mut processed = resumed;
        for batch in pending.chunks(BATCH_SIZE) {
            let fingerprinted: Vec<_> = batch
                .par_iter()
                .map(|file| (file, fingerprint_entry(file)))
                .collect();

            let mut records = Vec::with_capacity(batch.len());
            for (file, result) in fingerprinted {
                processed += 1;
                match result {
                    Ok(record) => records.push(record),
                    Err(message) => {
                        warn!(path = %file.absolute.display(), %message, "skipping file");
                        self.events.send(ScanEvent::FileFailed {
                            path: file.absolute.clone(),
                            message,
                        });
                    }
                }
            }
            self.store
                .apply_scan_batch(target.container.id, session.id, &records, processed)?;
            if let Some(last) = batch.last() {
                self.events.send(ScanEvent::Progress(ScanProgress {
                    processed,
                    total,
                    current_path: last.absolute.clone(),
                }));
            }
        }

        let orphans_removed =
            self.store
                .delete_orphans(target.container.id, &target.root_path, session.id)?;
        if orphans_removed > 0 {
            info!(orphans_removed, "removed records for vanished files");
            self.events.send(ScanEvent::OrphansRemoved {
                count: orphans_removed,
            });
        }

        self.store.complete_session(session.id)?;
        self.events.send(ScanEvent::Completed {
            files_processed: processed,
        });
        Ok(ScanOutcome {
            session_id: session.id,
            files_processed: processed,
            orphans_removed,
        })
    }

    /// Walk the tree and collect supported files not already covered by a
    /// resumed session. Unreadable directories are skipped, not fatal.
    fn discover(
        &self,
        target: &ScanTarget,
        done_keys: &HashSet<(String, String)>,
    ) -> Result<Vec<PendingFile>, MediaDedupError> {
        let mut pending = Vec::new();
        for entry in WalkDir::new(&target.directory).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(media_type) = MediaType::from_path(entry.path()) else {
                continue;
            };
            let parent = entry.path().parent().unwrap_or(&target.directory);
            let path = relative_key(parent, &target.mount_root)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if done_keys.contains(&(path.clone(), name.clone())) {
                debug!(path = %entry.path().display(), "already scanned this session");
                continue;
            }
            pending.push(PendingFile {
                absolute: entry.path().to_path_buf(),
                path,
                name,
                media_type,
            });
        }
        Ok(pending)
    }
}

/// Fingerprint one file and gather its filesystem metadata. Errors come
/// back as a display string so the batch can keep going.
fn fingerprint_entry(file: &PendingFile) -> Result<NewFileRecord, String> {
    let metadata = std::fs::metadata(&file.absolute).map_err(|e| e.to_string())?;
    let fingerprinted =
        fingerprint::fingerprint_file(&file.absolute, file.media_type).map_err(|e| e.to_string())?;
    Ok(NewFileRecord {
        path: file.path.clone(),
        name: file.name.clone(),
        media_type: file.media_type,
        size: metadata.len(),
        metadata_timestamp: fingerprinted.timestamp,
        filesystem_creation_time: metadata.created().ok().and_then(unix_seconds),
        filesystem_modified_time: metadata.modified().ok().and_then(unix_seconds),
        filename_timestamp: filename::parse_timestamp(&file.name),
        content_fingerprint: fingerprinted.digest,
    })
}

fn unix_seconds(time: std::time::SystemTime) -> Option<i64> {
    time.duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs() as i64)
}

/// Path relative to the mount root, '/'-separated so stored keys compare
/// equal across platforms and remounts.
fn relative_key(path: &Path, mount_root: &Path) -> Result<String, ScanError> {
    let relative = path
        .strip_prefix(mount_root)
        .map_err(|_| ScanError::OutsideRoot {
            path: path.to_path_buf(),
            root: mount_root.to_path_buf(),
        })?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}
