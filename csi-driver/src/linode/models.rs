//! Serde models for the Linode API v4 resources the driver touches.

use serde::{Deserialize, Serialize};

/// A block-storage volume as reported by the cloud API.
#[derive(Debug, Clone, Deserialize)]
pub struct Volume {
    pub id: u64,
    pub label: String,
    pub status: VolumeStatus,
    pub region: String,
    /// Size in GiB.
    pub size: u64,
    /// Instance the volume is attached to, if any.
    pub linode_id: Option<u64>,
    /// Stable device path under `/dev/disk/by-id` for the attached volume.
    #[serde(default)]
    pub filesystem_path: String,
}

impl Volume {
    /// Capacity in bytes; the API reports whole GiB.
    pub fn capacity_bytes(&self) -> i64 {
        (self.size as i64) << 30
    }
}

/// Volume lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeStatus {
    Creating,
    Active,
    Resizing,
    ContactSupport,
    #[serde(other)]
    Unknown,
}

/// A compute instance.
///
/// The instances endpoint does not embed the disk list; callers resolve it
/// through the disks endpoint and stitch it in before consulting the
/// attachment policy.
#[derive(Debug, Clone, Deserialize)]
pub struct Instance {
    pub id: u64,
    pub label: String,
    pub region: String,
    pub specs: Option<InstanceSpecs>,
    #[serde(default)]
    pub disks: Vec<InstanceDisk>,
}

/// Hardware specification of an instance.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct InstanceSpecs {
    /// Memory in MiB.
    pub memory: u64,
    /// Total disk in MiB.
    pub disk: u64,
    pub vcpus: u32,
}

impl InstanceSpecs {
    pub fn memory_bytes(&self) -> u64 {
        self.memory << 20
    }
}

/// A non-volume disk attached to an instance (boot disk, swap, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceDisk {
    pub id: u64,
    pub label: String,
    /// Size in MiB.
    pub size: u64,
    #[serde(default)]
    pub filesystem: String,
}

/// One page of a paginated collection response.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub pages: u32,
    pub results: u32,
}

#[derive(Debug, Serialize)]
pub struct CreateVolumeRequest<'a> {
    pub label: &'a str,
    pub region: &'a str,
    /// Size in GiB.
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct CloneVolumeRequest<'a> {
    pub label: &'a str,
}

#[derive(Debug, Serialize)]
pub struct AttachVolumeRequest {
    pub linode_id: u64,
    pub persist_across_boots: bool,
}

#[derive(Debug, Serialize)]
pub struct ResizeVolumeRequest {
    /// New size in GiB.
    pub size: u64,
}

/// Error body returned by the API.
#[derive(Debug, Deserialize)]
pub struct ApiErrors {
    #[serde(default)]
    pub errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorItem {
    pub reason: String,
    #[serde(default)]
    pub field: Option<String>,
}

impl ApiErrors {
    /// Collapse the per-field errors into one message.
    pub fn message(&self) -> String {
        if self.errors.is_empty() {
            return "unknown API error".to_string();
        }
        self.errors
            .iter()
            .map(|e| match &e.field {
                Some(field) => format!("{}: {}", field, e.reason),
                None => e.reason.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}
