//! # Device Module
//!
//! Resolves filesystem paths to stable physical volume identities so that the
//! same partition is recognized across mount-point changes and reconnections.
//!
//! ## Design
//! The OS-specific lookup sits behind the [`DeviceInfo`] trait; the resolver
//! layers a per-run cache on top (identity cannot change while a device stays
//! mounted). Tests substitute a fake `DeviceInfo`.

#[cfg(unix)]
mod sys;

#[cfg(unix)]
pub use sys::SysDeviceInfo;

use crate::error::DeviceError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Stable identity of one physical partition/volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerIdentity {
    /// Stable per-volume identifier, or a synthesized disk:partition
    /// composite; best-effort and may be absent
    pub partition_id: Option<String>,
    /// Physical disk serial (or synthesized equivalent); mandatory
    pub disk_id: String,
}

/// OS facility for volume identity queries.
///
/// One function per direction: identify a mount root, and enumerate the
/// currently attached mount roots of fixed/removable media.
pub trait DeviceInfo {
    fn identify(&self, mount_root: &Path) -> Result<ContainerIdentity, DeviceError>;

    fn mount_points(&self) -> Result<Vec<PathBuf>, DeviceError>;
}

/// Maps paths to container identities with a per-run cache.
///
/// The cache is owned by the resolver instance and lives for one process run,
/// never longer.
pub struct ContainerResolver<D: DeviceInfo> {
    device: D,
    cache: HashMap<PathBuf, ContainerIdentity>,
}

impl<D: DeviceInfo> ContainerResolver<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            cache: HashMap::new(),
        }
    }

    /// Find the mount root owning `path`: the longest mount point that is a
    /// prefix of the canonicalized path.
    pub fn mount_root_of(&self, path: &Path) -> Result<PathBuf, DeviceError> {
        let canonical = path
            .canonicalize()
            .map_err(|_| DeviceError::NoMountPoint {
                path: path.to_path_buf(),
            })?;

        let mut best: Option<PathBuf> = None;
        for mount in self.device.mount_points()? {
            if canonical.starts_with(&mount) {
                let better = match &best {
                    Some(b) => mount.components().count() > b.components().count(),
                    None => true,
                };
                if better {
                    best = Some(mount);
                }
            }
        }

        best.ok_or(DeviceError::NoMountPoint {
            path: path.to_path_buf(),
        })
    }

    /// Resolve a path to its mount root and that volume's identity.
    pub fn resolve(&mut self, path: &Path) -> Result<(PathBuf, ContainerIdentity), DeviceError> {
        let mount = self.mount_root_of(path)?;
        let identity = self.identity_of(&mount)?;
        Ok((mount, identity))
    }

    /// Identity of a specific mount root, cached for the run.
    pub fn identity_of(&mut self, mount: &Path) -> Result<ContainerIdentity, DeviceError> {
        if let Some(cached) = self.cache.get(mount) {
            return Ok(cached.clone());
        }
        let identity = self.device.identify(mount)?;
        self.cache.insert(mount.to_path_buf(), identity.clone());
        Ok(identity)
    }

    /// Reverse lookup: where is this container currently mounted?
    ///
    /// Enumerates attached mount roots and returns the first whose identity
    /// matches. Mounts that fail to identify are skipped, not fatal; a device
    /// may simply not be connected right now.
    pub fn find_mount(&mut self, identity: &ContainerIdentity) -> Result<Option<PathBuf>, DeviceError> {
        for mount in self.device.mount_points()? {
            match self.identity_of(&mount) {
                Ok(found) if &found == identity => return Ok(Some(mount)),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(mount = %mount.display(), error = %e, "skipping unidentifiable mount");
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Fake device backend with a scriptable mount table
    struct FakeDevice {
        mounts: Vec<(PathBuf, ContainerIdentity)>,
        identify_calls: RefCell<usize>,
    }

    impl DeviceInfo for FakeDevice {
        fn identify(&self, mount_root: &Path) -> Result<ContainerIdentity, DeviceError> {
            *self.identify_calls.borrow_mut() += 1;
            self.mounts
                .iter()
                .find(|(m, _)| m == mount_root)
                .map(|(_, id)| id.clone())
                .ok_or_else(|| DeviceError::NoDiskId {
                    mount: mount_root.to_path_buf(),
                    reason: "unknown mount".to_string(),
                })
        }

        fn mount_points(&self) -> Result<Vec<PathBuf>, DeviceError> {
            Ok(self.mounts.iter().map(|(m, _)| m.clone()).collect())
        }
    }

    fn identity(partition: Option<&str>, disk: &str) -> ContainerIdentity {
        ContainerIdentity {
            partition_id: partition.map(str::to_string),
            disk_id: disk.to_string(),
        }
    }

    #[test]
    fn identity_is_cached_per_mount() {
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let device = FakeDevice {
            mounts: vec![(root.clone(), identity(Some("p1"), "d1"))],
            identify_calls: RefCell::new(0),
        };
        let mut resolver = ContainerResolver::new(device);

        let (_, first) = resolver.resolve(&root).unwrap();
        let (_, second) = resolver.resolve(&root).unwrap();
        assert_eq!(first, second);
        assert_eq!(*resolver.device.identify_calls.borrow(), 1);
    }

    #[test]
    fn longest_mount_prefix_wins() {
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        let nested = root.join("media").join("card");
        std::fs::create_dir_all(&nested).unwrap();

        let device = FakeDevice {
            mounts: vec![
                (root.clone(), identity(None, "root-disk")),
                (nested.clone(), identity(Some("card-p1"), "card-disk")),
            ],
            identify_calls: RefCell::new(0),
        };
        let mut resolver = ContainerResolver::new(device);

        let (mount, id) = resolver.resolve(&nested.join(".")).unwrap();
        assert_eq!(mount, nested);
        assert_eq!(id.disk_id, "card-disk");
    }

    #[test]
    fn find_mount_matches_both_identifiers() {
        let a = tempfile::TempDir::new().unwrap();
        let b = tempfile::TempDir::new().unwrap();
        let device = FakeDevice {
            mounts: vec![
                (a.path().to_path_buf(), identity(Some("p1"), "disk-a")),
                (b.path().to_path_buf(), identity(Some("p1"), "disk-b")),
            ],
            identify_calls: RefCell::new(0),
        };
        let mut resolver = ContainerResolver::new(device);

        let found = resolver
            .find_mount(&identity(Some("p1"), "disk-b"))
            .unwrap();
        assert_eq!(found, Some(b.path().to_path_buf()));
    }

    #[test]
    fn find_mount_absent_device_is_none() {
        let a = tempfile::TempDir::new().unwrap();
        let device = FakeDevice {
            mounts: vec![(a.path().to_path_buf(), identity(None, "disk-a"))],
            identify_calls: RefCell::new(0),
        };
        let mut resolver = ContainerResolver::new(device);

        let found = resolver.find_mount(&identity(None, "gone")).unwrap();
        assert_eq!(found, None);
    }

    #[test]
    fn unmounted_path_is_an_error() {
        let device = FakeDevice {
            mounts: vec![],
            identify_calls: RefCell::new(0),
        };
        let resolver = ContainerResolver::new(device);
        assert!(resolver.mount_root_of(Path::new("/")).is_err());
    }
}
