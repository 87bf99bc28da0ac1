//! Unix implementation of [`DeviceInfo`] backed by procfs and sysfs.
//!
//! Mount points come from `/proc/self/mounts`, restricted to block-device
//! backed filesystems. Partition identity comes from `/dev/disk/by-uuid`
//! symlinks with a sysfs `<disk>:<partition-index>` fallback; disk identity
//! comes from `/dev/disk/by-id` symlinks of the parent whole-disk device.

use super::{ContainerIdentity, DeviceInfo};
use crate::error::DeviceError;
use std::fs;
use std::path::{Path, PathBuf};

const MOUNTS: &str = "/proc/self/mounts";
const BY_UUID: &str = "/dev/disk/by-uuid";
const BY_ID: &str = "/dev/disk/by-id";

/// Production device backend for Linux hosts
pub struct SysDeviceInfo;

impl SysDeviceInfo {
    pub fn new() -> Self {
        SysDeviceInfo
    }

    /// Mount table rows as (device, mount point), block devices only
    fn mount_table(&self) -> Result<Vec<(PathBuf, PathBuf)>, DeviceError> {
        let raw = fs::read_to_string(MOUNTS)
            .map_err(|e| DeviceError::Enumeration(format!("cannot read {MOUNTS}: {e}")))?;

        let mut rows = Vec::new();
        for line in raw.lines() {
            let mut fields = line.split_whitespace();
            let (Some(device), Some(mount)) = (fields.next(), fields.next()) else {
                continue;
            };
            if !device.starts_with("/dev/") {
                continue;
            }
            // Octal escapes in the mount field (e.g. \040 for space)
            rows.push((PathBuf::from(device), PathBuf::from(unescape_mount(mount))));
        }
        Ok(rows)
    }

    /// The /dev node backing a given mount root
    fn device_for_mount(&self, mount_root: &Path) -> Result<PathBuf, DeviceError> {
        self.mount_table()?
            .into_iter()
            .find(|(_, mount)| mount == mount_root)
            .map(|(device, _)| device)
            .ok_or_else(|| DeviceError::NoMountPoint {
                path: mount_root.to_path_buf(),
            })
    }

    /// Search a /dev/disk/by-* directory for symlinks resolving to `device`.
    /// Entries are visited in sorted order so the answer is stable.
    fn links_to(&self, dir: &str, device: &Path) -> Vec<String> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };

        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|entry| {
                let resolved = entry.path().canonicalize().ok()?;
                (resolved == device).then(|| entry.file_name().to_string_lossy().into_owned())
            })
            .collect();
        names.sort();
        names
    }

    /// Walk sysfs from a partition device node to its whole-disk parent.
    ///
    /// `/sys/class/block/sda3` canonicalizes to `.../block/sda/sda3`, so the
    /// parent directory name is the disk. Whole-disk mounts resolve to
    /// themselves.
    fn parent_disk(&self, device: &Path) -> Option<PathBuf> {
        let name = device.file_name()?.to_str()?;
        let sys = PathBuf::from("/sys/class/block").join(name);
        let resolved = sys.canonicalize().ok()?;

        if resolved.join("partition").exists() {
            let disk_name = resolved.parent()?.file_name()?.to_str()?.to_string();
            Some(PathBuf::from("/dev").join(disk_name))
        } else {
            Some(device.to_path_buf())
        }
    }

    /// Synthesized partition identifier when no volume UUID exists
    fn synthesized_partition_id(&self, device: &Path) -> Option<String> {
        let name = device.file_name()?.to_str()?;
        let sys = PathBuf::from("/sys/class/block").join(name);
        let resolved = sys.canonicalize().ok()?;
        let index = fs::read_to_string(resolved.join("partition")).ok()?;
        let disk = resolved.parent()?.file_name()?.to_str()?.to_string();
        Some(format!("{}:{}", disk, index.trim()))
    }
}

impl Default for SysDeviceInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceInfo for SysDeviceInfo {
    fn identify(&self, mount_root: &Path) -> Result<ContainerIdentity, DeviceError> {
        let device = self.device_for_mount(mount_root)?;
        let device = device.canonicalize().unwrap_or(device);

        let partition_id = self
            .links_to(BY_UUID, &device)
            .into_iter()
            .next()
            .or_else(|| self.synthesized_partition_id(&device));

        let disk = self
            .parent_disk(&device)
            .ok_or_else(|| DeviceError::NoDiskId {
                mount: mount_root.to_path_buf(),
                reason: format!("no sysfs entry for {}", device.display()),
            })?;

        let disk_id = self
            .links_to(BY_ID, &disk)
            .into_iter()
            .next()
            .ok_or_else(|| DeviceError::NoDiskId {
                mount: mount_root.to_path_buf(),
                reason: format!("no /dev/disk/by-id link for {}", disk.display()),
            })?;

        Ok(ContainerIdentity {
            partition_id,
            disk_id,
        })
    }

    fn mount_points(&self) -> Result<Vec<PathBuf>, DeviceError> {
        Ok(self
            .mount_table()?
            .into_iter()
            .map(|(_, mount)| mount)
            .collect())
    }
}

/// Decode the octal escapes mount(8) writes into /proc/self/mounts
fn unescape_mount(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let digits: String = chars.by_ref().take(3).collect();
            if let Ok(code) = u8::from_str_radix(&digits, 8) {
                out.push(code as char);
                continue;
            }
            out.push(c);
            out.push_str(&digits);
        } else {
            out.push(c);
        }
    }
    out
}
