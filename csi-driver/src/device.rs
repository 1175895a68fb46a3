//! Block-device discovery on the node.
//!
//! Attached volumes surface under `/dev/disk/by-id` with names derived from
//! the volume label. Attachment is asynchronous on the cloud side, so the
//! node service polls [`DeviceResolver::verify`] for a bounded window after
//! a fresh attach before giving up.

use std::fs;
use std::path::{Path, PathBuf};

/// Resolves a volume label to an on-host device path.
pub trait DeviceResolver: Send + Sync + 'static {
    /// Ordered candidate paths the device may appear under.
    fn candidates(&self, label: &str, partition: Option<u32>) -> Vec<PathBuf>;

    /// First candidate that exists on the host, if any.
    fn verify(&self, candidates: &[PathBuf]) -> Option<PathBuf>;
}

/// `/dev/disk/by-id` resolver using the Linode naming convention.
///
/// Volumes appear both as a `linode-<label>` udev alias and as the SCSI
/// identity `scsi-0Linode_Volume_<label>`; partitions add `-part<N>`.
#[derive(Debug, Clone)]
pub struct ByIdResolver {
    dev_root: PathBuf,
}

impl ByIdResolver {
    pub fn new() -> Self {
        Self {
            dev_root: PathBuf::from("/dev/disk/by-id"),
        }
    }

    pub fn with_root(dev_root: impl Into<PathBuf>) -> Self {
        Self {
            dev_root: dev_root.into(),
        }
    }
}

impl Default for ByIdResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceResolver for ByIdResolver {
    fn candidates(&self, label: &str, partition: Option<u32>) -> Vec<PathBuf> {
        let suffix = match partition {
            Some(part) => format!("-part{}", part),
            None => String::new(),
        };
        vec![
            self.dev_root.join(format!("linode-{}{}", label, suffix)),
            self.dev_root
                .join(format!("scsi-0Linode_Volume_{}{}", label, suffix)),
        ]
    }

    fn verify(&self, candidates: &[PathBuf]) -> Option<PathBuf> {
        candidates.iter().find(|p| p.exists()).cloned()
    }
}

/// Counts the node's real block devices.
pub trait HardwareInventory: Send + Sync + 'static {
    /// Number of block devices that occupy a volume-attachment slot.
    fn attached_device_count(&self) -> std::io::Result<usize>;
}

/// `/sys/block` census.
///
/// Loop, ram and device-mapper entries are kernel-virtual and do not occupy
/// an attachment slot; neither do removable media. Everything else backed
/// by a real controller (it has a `device` link) counts.
#[derive(Debug, Clone)]
pub struct SysBlockInventory {
    sys_root: PathBuf,
}

impl SysBlockInventory {
    pub fn new() -> Self {
        Self {
            sys_root: PathBuf::from("/sys/block"),
        }
    }

    pub fn with_root(sys_root: impl Into<PathBuf>) -> Self {
        Self {
            sys_root: sys_root.into(),
        }
    }

    fn is_virtual(name: &str) -> bool {
        name.starts_with("loop")
            || name.starts_with("ram")
            || name.starts_with("zram")
            || name.starts_with("dm-")
            || name.starts_with("md")
    }

    fn is_removable(device_dir: &Path) -> bool {
        fs::read_to_string(device_dir.join("removable"))
            .map(|v| v.trim() != "0")
            .unwrap_or(false)
    }
}

impl Default for SysBlockInventory {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareInventory for SysBlockInventory {
    fn attached_device_count(&self) -> std::io::Result<usize> {
        let mut count = 0;
        for entry in fs::read_dir(&self.sys_root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if Self::is_virtual(&name) {
                continue;
            }
            let device_dir = entry.path();
            if Self::is_removable(&device_dir) {
                continue;
            }
            // Virtual devices have no backing controller link.
            if !device_dir.join("device").exists() {
                continue;
            }
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn test_candidates_follow_naming_convention() {
        let resolver = ByIdResolver::new();
        let candidates = resolver.candidates("pvc-abc", None);
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/dev/disk/by-id/linode-pvc-abc"),
                PathBuf::from("/dev/disk/by-id/scsi-0Linode_Volume_pvc-abc"),
            ]
        );
    }

    #[test]
    fn test_candidates_with_partition() {
        let resolver = ByIdResolver::new();
        let candidates = resolver.candidates("vol", Some(1));
        assert_eq!(
            candidates,
            vec![
                PathBuf::from("/dev/disk/by-id/linode-vol-part1"),
                PathBuf::from("/dev/disk/by-id/scsi-0Linode_Volume_vol-part1"),
            ]
        );
    }

    #[test]
    fn test_verify_picks_first_existing() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ByIdResolver::with_root(dir.path());

        let candidates = resolver.candidates("vol", None);
        assert_eq!(resolver.verify(&candidates), None);

        File::create(dir.path().join("scsi-0Linode_Volume_vol")).unwrap();
        assert_eq!(
            resolver.verify(&candidates),
            Some(dir.path().join("scsi-0Linode_Volume_vol"))
        );

        // The udev alias wins once it exists; it sorts first.
        File::create(dir.path().join("linode-vol")).unwrap();
        assert_eq!(
            resolver.verify(&candidates),
            Some(dir.path().join("linode-vol"))
        );
    }

    #[test]
    fn test_sys_block_census_skips_virtual_and_removable() {
        let dir = tempfile::tempdir().unwrap();
        let make_device = |name: &str, removable: &str, has_controller: bool| {
            let dev = dir.path().join(name);
            fs::create_dir_all(&dev).unwrap();
            fs::write(dev.join("removable"), removable).unwrap();
            if has_controller {
                fs::create_dir_all(dev.join("device")).unwrap();
            }
        };

        make_device("sda", "0", true);
        make_device("sdb", "0", true);
        make_device("sr0", "1", true); // removable
        make_device("loop0", "0", false);
        make_device("dm-0", "0", false);
        make_device("vda-virtual", "0", false); // no controller link

        let inventory = SysBlockInventory::with_root(dir.path());
        assert_eq!(inventory.attached_device_count().unwrap(), 2);
    }
}
