//! Attachment-capacity policy.
//!
//! The cloud platform exposes a bounded number of block devices per
//! instance, derived from the instance's memory. Volumes share that budget
//! with the instance's own disks (boot, swap), so the usable volume cap is
//! the device cap minus the disk count.

use thiserror::Error;

use crate::linode::Instance;

/// Device cap for instances below the memory threshold.
pub const PERSISTENT_DEVICE_CAP: usize = 8;

/// Device cap for the largest instances.
pub const HARD_DEVICE_CAP: usize = 64;

/// Memory at which the cap starts scaling past the persistent default.
pub const DEVICE_CAP_MEMORY_THRESHOLD: u64 = 16 << 30;

const GIB: u64 = 1 << 30;

/// Error returned when the policy is asked about an unusable instance.
#[derive(Debug, Error)]
pub enum CapacityError {
    #[error("instance {0} reports no hardware specs")]
    MissingSpecs(u64),
}

/// Maximum number of block devices the platform will expose to an instance
/// with the given memory.
///
/// Below 16 GiB the platform grants 8 devices; from 16 GiB up it grants one
/// device per GiB of memory, capped at 64.
pub fn max_block_devices(memory_bytes: u64) -> usize {
    if memory_bytes < DEVICE_CAP_MEMORY_THRESHOLD {
        return PERSISTENT_DEVICE_CAP;
    }
    ((memory_bytes / GIB) as usize).min(HARD_DEVICE_CAP)
}

/// Maximum number of volumes attachable to an instance with the given
/// memory and `num_disks` instance disks, clamped at zero.
pub fn max_volume_attachments(memory_bytes: u64, num_disks: usize) -> usize {
    max_block_devices(memory_bytes).saturating_sub(num_disks)
}

/// Whether one more volume may be attached to `instance` given the number
/// of volumes currently attached to it.
///
/// A missing spec record is a usage error, not a capacity signal.
pub fn can_attach(
    instance: &Instance,
    currently_attached: usize,
) -> Result<bool, CapacityError> {
    let specs = instance
        .specs
        .as_ref()
        .ok_or(CapacityError::MissingSpecs(instance.id))?;

    // The cloud-side disk count shares the device budget with volumes.
    Ok(currently_attached
        < max_volume_attachments(specs.memory_bytes(), instance.disks.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linode::InstanceSpecs;

    fn instance(memory_mib: u64, num_disks: usize) -> Instance {
        Instance {
            id: 100,
            label: "node-1".to_string(),
            region: "us-east".to_string(),
            specs: Some(InstanceSpecs {
                memory: memory_mib,
                disk: 81920,
                vcpus: 2,
            }),
            disks: (0..num_disks)
                .map(|i| crate::linode::InstanceDisk {
                    id: i as u64,
                    label: format!("disk-{}", i),
                    size: 25600,
                    filesystem: "ext4".to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_max_block_devices_table() {
        for gib in [1u64, 2, 4, 8] {
            assert_eq!(max_block_devices(gib << 30), 8, "{} GiB", gib);
        }
        assert_eq!(max_block_devices(16 << 30), 16);
        assert_eq!(max_block_devices(32 << 30), 32);
        for gib in [64u64, 96, 128, 256, 512] {
            assert_eq!(max_block_devices(gib << 30), 64, "{} GiB", gib);
        }
    }

    #[test]
    fn test_max_volume_attachments_subtracts_disks() {
        assert_eq!(max_volume_attachments(8 << 30, 1), 7);
        assert_eq!(max_volume_attachments(16 << 30, 2), 14);
        assert_eq!(max_volume_attachments(64 << 30, 0), 64);
    }

    #[test]
    fn test_max_volume_attachments_clamps_at_zero() {
        assert_eq!(max_volume_attachments(1 << 30, 9), 0);
        assert_eq!(max_volume_attachments(1 << 30, 100), 0);
    }

    #[test]
    fn test_can_attach_limits() {
        // 1 GiB, 1 disk: cap is 7 volumes
        assert!(!can_attach(&instance(1024, 1), 7).unwrap());
        assert!(can_attach(&instance(1024, 1), 6).unwrap());

        // 16 GiB, 1 disk: cap is 15 volumes
        assert!(can_attach(&instance(16384, 1), 14).unwrap());
        assert!(!can_attach(&instance(16384, 1), 15).unwrap());

        // 256 GiB, no disks: cap is 64 volumes
        assert!(!can_attach(&instance(262144, 0), 64).unwrap());
        assert!(can_attach(&instance(262144, 0), 63).unwrap());
    }

    #[test]
    fn test_can_attach_missing_specs() {
        let mut inst = instance(1024, 1);
        inst.specs = None;
        assert!(matches!(
            can_attach(&inst, 0),
            Err(CapacityError::MissingSpecs(100))
        ));
    }
}
