//! CSI Node Service Implementation
//!
//! Handles volume staging and publishing on Linode instances: device
//! discovery under `/dev/disk/by-id`, optional LUKS activation, filesystem
//! formatting, and the two-level stage/publish mount hierarchy.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

use crate::controller::{PUBLISH_CONTEXT_DEVICE_PATH, PUBLISH_CONTEXT_VOLUME_NAME};
use crate::csi;
use crate::device::{DeviceResolver, HardwareInventory};
use crate::identity::TOPOLOGY_REGION_KEY;
use crate::locks::VolumeLocks;
use crate::luks::{LuksContext, LuksError, LuksService};
use crate::metrics::OperationTimer;
use crate::mount::{MountError, Mounter};
use crate::policy;
use crate::types::VolumeKey;

/// Default filesystem for staged volumes.
const DEFAULT_FS_TYPE: &str = "ext4";

/// How long to wait for a freshly attached device to surface in
/// `/dev/disk/by-id` before declaring the volume not attached.
const DEVICE_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

const DEVICE_PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Identity and sizing of the instance this node service runs on.
#[derive(Debug, Clone)]
pub struct NodeMetadata {
    pub instance_id: u64,
    pub region: String,
    pub memory_bytes: u64,
}

/// CSI Node Service
///
/// Implements the CSI Node service which handles:
/// - Volume staging (device discovery, LUKS activation, format, mount)
/// - Volume unstaging (unmount, LUKS teardown)
/// - Volume publishing (bind mount from staging to the workload target)
/// - Volume unpublishing
/// - Online filesystem expansion
/// - Node identity and capability reporting
pub struct NodeService {
    devices: Arc<dyn DeviceResolver>,
    mounter: Arc<dyn Mounter>,
    luks: Arc<dyn LuksService>,
    hardware: Arc<dyn HardwareInventory>,
    metadata: NodeMetadata,
    locks: VolumeLocks,
    device_wait: Duration,
}

impl NodeService {
    pub fn new(
        devices: Arc<dyn DeviceResolver>,
        mounter: Arc<dyn Mounter>,
        luks: Arc<dyn LuksService>,
        hardware: Arc<dyn HardwareInventory>,
        metadata: NodeMetadata,
    ) -> Self {
        Self {
            devices,
            mounter,
            luks,
            hardware,
            metadata,
            locks: VolumeLocks::new(),
            device_wait: DEVICE_DISCOVERY_TIMEOUT,
        }
    }

    /// Override the device-discovery budget.
    pub fn with_device_wait(mut self, device_wait: Duration) -> Self {
        self.device_wait = device_wait;
        self
    }

    fn mount_error(volume: &str, err: MountError) -> Status {
        Status::internal(format!("volume {}: {}", volume, err))
    }

    fn luks_error(volume: &str, err: LuksError) -> Status {
        match err {
            LuksError::InvalidContext(_) => {
                Status::failed_precondition(format!("volume {}: {}", volume, err))
            }
            other => Status::internal(format!("volume {}: {}", volume, other)),
        }
    }

    fn acquire(&self, volume_id: &str) -> Result<crate::locks::VolumeLockGuard, Status> {
        self.locks
            .try_acquire(volume_id)
            .ok_or_else(|| Status::aborted(format!("operation pending for volume {}", volume_id)))
    }

    /// Create a directory (and parents) with mode 0755.
    fn ensure_dir(path: &Path) -> std::io::Result<()> {
        use std::os::unix::fs::DirBuilderExt;
        let mut builder = std::fs::DirBuilder::new();
        builder.recursive(true).mode(0o755);
        builder.create(path)
    }

    /// Wait for the volume's device to surface under `/dev/disk/by-id`.
    ///
    /// The cloud acknowledges the attach before the kernel exposes the
    /// device, so a bounded poll is required to make stage-after-attach
    /// reliable.
    async fn wait_for_device(&self, key: &VolumeKey) -> Result<PathBuf, Status> {
        let candidates = self.devices.candidates(&key.label, None);
        let deadline = tokio::time::Instant::now() + self.device_wait;
        loop {
            if let Some(path) = self.devices.verify(&candidates) {
                return Ok(path);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Status::internal(format!(
                    "volume {} is not attached: no device found under {:?}",
                    key.label, candidates
                )));
            }
            tokio::time::sleep(DEVICE_PROBE_INTERVAL).await;
        }
    }

    /// Probe the target path, creating it when missing.
    ///
    /// Returns `true` when the path is already a mountpoint.
    async fn prepare_target(&self, path: &Path, volume: &str) -> Result<bool, Status> {
        match self.mounter.is_likely_not_mount_point(path).await {
            Ok(true) => Ok(false),
            Ok(false) => Ok(true),
            Err(MountError::NotFound(_)) => {
                Self::ensure_dir(path).map_err(|e| {
                    Status::internal(format!(
                        "volume {}: failed to create {}: {}",
                        volume,
                        path.display(),
                        e
                    ))
                })?;
                Ok(false)
            }
            Err(e) => Err(Self::mount_error(volume, e)),
        }
    }

    /// Mount view of the capability: filesystem type and mount options.
    fn mount_parameters(capability: &csi::VolumeCapability) -> (String, Vec<String>) {
        match capability.access_type.as_ref() {
            Some(csi::volume_capability::AccessType::Mount(mount)) => {
                let fs_type = if mount.fs_type.is_empty() {
                    DEFAULT_FS_TYPE.to_string()
                } else {
                    mount.fs_type.clone()
                };
                (fs_type, mount.mount_flags.clone())
            }
            _ => (DEFAULT_FS_TYPE.to_string(), Vec::new()),
        }
    }

    /// Publish a filesystem volume: bind-mount the staging path into the
    /// workload target.
    async fn publish_mount(
        &self,
        req: &csi::NodePublishVolumeRequest,
        key: &VolumeKey,
    ) -> Result<(), Status> {
        let staging = Path::new(&req.staging_target_path);
        let target = Path::new(&req.target_path);

        if self.prepare_target(target, &key.label).await? {
            info!(target = %target.display(), "volume already published");
            return Ok(());
        }

        let (_, mut options) = req
            .volume_capability
            .as_ref()
            .map(Self::mount_parameters)
            .unwrap_or((DEFAULT_FS_TYPE.to_string(), Vec::new()));
        if req.readonly {
            options.push("ro".to_string());
        }

        self.mounter
            .bind_mount(staging, target, &options)
            .await
            .map_err(|e| Self::mount_error(&key.label, e))
    }

    /// Publish a raw block volume: bind-mount the device node onto a
    /// regular file at the target path.
    async fn publish_block(
        &self,
        req: &csi::NodePublishVolumeRequest,
        key: &VolumeKey,
    ) -> Result<(), Status> {
        let device = req
            .publish_context
            .get(PUBLISH_CONTEXT_DEVICE_PATH)
            .ok_or_else(|| {
                Status::internal(format!(
                    "volume {}: publish context is missing {}",
                    key.label, PUBLISH_CONTEXT_DEVICE_PATH
                ))
            })?;
        let target = Path::new(&req.target_path);

        match self.mounter.is_likely_not_mount_point(target).await {
            Ok(false) => {
                info!(target = %target.display(), "volume already published");
                return Ok(());
            }
            Ok(true) => {}
            Err(MountError::NotFound(_)) => {}
            Err(e) => return Err(Self::mount_error(&key.label, e)),
        }

        if let Some(parent) = target.parent() {
            Self::ensure_dir(parent).map_err(|e| {
                Status::internal(format!(
                    "volume {}: failed to create {}: {}",
                    key.label,
                    parent.display(),
                    e
                ))
            })?;
        }

        // The mount target for a block volume is a regular file
        {
            use std::os::unix::fs::OpenOptionsExt;
            std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .mode(0o660)
                .open(target)
                .map_err(|e| {
                    Status::internal(format!(
                        "volume {}: failed to create {}: {}",
                        key.label,
                        target.display(),
                        e
                    ))
                })?;
        }

        let mut options = Vec::new();
        if req.readonly {
            options.push("ro".to_string());
        }

        if let Err(mount_err) = self
            .mounter
            .bind_mount(Path::new(device), target, &options)
            .await
        {
            // Roll the file back; the mount failure stays the primary cause.
            let mut message = format!("volume {}: {}", key.label, mount_err);
            if let Err(unlink_err) = std::fs::remove_file(target) {
                if unlink_err.kind() != std::io::ErrorKind::NotFound {
                    warn!(
                        target = %target.display(),
                        error = %unlink_err,
                        "failed to remove block publish target after mount failure"
                    );
                    message = format!(
                        "{}; additionally failed to remove {}: {}",
                        message,
                        target.display(),
                        unlink_err
                    );
                }
            }
            return Err(Status::internal(message));
        }
        Ok(())
    }
}

#[tonic::async_trait]
impl csi::node_server::Node for NodeService {
    /// Stage a volume: discover the device, activate LUKS when requested,
    /// format if needed, and mount to the staging path.
    async fn node_stage_volume(
        &self,
        request: Request<csi::NodeStageVolumeRequest>,
    ) -> Result<Response<csi::NodeStageVolumeResponse>, Status> {
        let req = request.into_inner();

        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("Volume ID is required"));
        }
        if req.staging_target_path.is_empty() {
            return Err(Status::invalid_argument("Staging target path is required"));
        }
        let capability = req
            .volume_capability
            .as_ref()
            .ok_or_else(|| Status::invalid_argument("Volume capability is required"))?;

        let key: VolumeKey = req
            .volume_id
            .parse()
            .map_err(|e| Status::invalid_argument(format!("{}", e)))?;

        let _guard = self.acquire(&req.volume_id)?;
        let timer = OperationTimer::new("node_stage_volume");

        info!(
            volume_id = %key,
            staging_target_path = %req.staging_target_path,
            "NodeStageVolume request"
        );

        let device = self.wait_for_device(&key).await.inspect_err(|_| {
            debug!(volume_id = %key, "device discovery window exhausted");
        })?;

        let staging = Path::new(&req.staging_target_path);
        if self.prepare_target(staging, &key.label).await? {
            info!(staging_target_path = %req.staging_target_path, "volume already staged");
            timer.success();
            return Ok(Response::new(csi::NodeStageVolumeResponse {}));
        }

        // Raw block volumes are consumed straight from the device at
        // publish time; there is nothing to mount here.
        if matches!(
            capability.access_type,
            Some(csi::volume_capability::AccessType::Block(_))
        ) {
            debug!(volume_id = %key, "block volume, nothing to stage");
            timer.success();
            return Ok(Response::new(csi::NodeStageVolumeResponse {}));
        }

        let (fs_type, options) = Self::mount_parameters(capability);

        let luks_name = req
            .publish_context
            .get(PUBLISH_CONTEXT_VOLUME_NAME)
            .map(String::as_str)
            .unwrap_or(&key.label);
        let luks_ctx = LuksContext::new(&req.volume_context, &req.secrets, luks_name);

        let source = if luks_ctx.enabled {
            let mapper = self
                .luks
                .prepare(&luks_ctx, &device.to_string_lossy())
                .await
                .map_err(|e| Self::luks_error(&key.label, e))?;
            info!(volume_id = %key, mapper = %mapper.display(), "LUKS volume activated");
            mapper
        } else {
            device
        };

        // A mount failure leaves any mapper open; unstage reclaims it.
        self.mounter
            .format_and_mount(&source, staging, &fs_type, &options)
            .await
            .map_err(|e| Self::mount_error(&key.label, e))?;

        info!(
            volume_id = %key,
            staging_target_path = %req.staging_target_path,
            source = %source.display(),
            fs_type = %fs_type,
            "Volume staged successfully"
        );
        timer.success();

        Ok(Response::new(csi::NodeStageVolumeResponse {}))
    }

    /// Unstage a volume: unmount the staging path and tear down any LUKS
    /// mapping it was served from.
    async fn node_unstage_volume(
        &self,
        request: Request<csi::NodeUnstageVolumeRequest>,
    ) -> Result<Response<csi::NodeUnstageVolumeResponse>, Status> {
        let req = request.into_inner();

        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("Volume ID is required"));
        }
        if req.staging_target_path.is_empty() {
            return Err(Status::invalid_argument("Staging target path is required"));
        }

        let key: VolumeKey = req
            .volume_id
            .parse()
            .map_err(|e| Status::invalid_argument(format!("{}", e)))?;

        let _guard = self.acquire(&req.volume_id)?;
        let timer = OperationTimer::new("node_unstage_volume");

        info!(
            volume_id = %key,
            staging_target_path = %req.staging_target_path,
            "NodeUnstageVolume request"
        );

        let staging = Path::new(&req.staging_target_path);
        if !staging.exists() {
            info!(staging_target_path = %req.staging_target_path, "staging path already gone");
            timer.success();
            return Ok(Response::new(csi::NodeUnstageVolumeResponse {}));
        }

        // Capture the mount sources before unmounting; they identify any
        // LUKS mapping that must be deactivated.
        let sources = self
            .mounter
            .mount_sources(staging)
            .map_err(|e| Self::mount_error(&key.label, e))?;

        self.mounter
            .unmount(staging)
            .await
            .map_err(|e| Self::mount_error(&key.label, e))?;

        for source in &sources {
            let mapping = self
                .luks
                .is_luks_mapping(source)
                .await
                .map_err(|e| Self::luks_error(&key.label, e))?;
            if let Some(name) = mapping {
                self.luks
                    .close(&name)
                    .await
                    .map_err(|e| Self::luks_error(&key.label, e))?;
                info!(volume_id = %key, mapper = %name, "LUKS mapping closed");
            }
        }

        if let Err(e) = std::fs::remove_dir(staging) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    staging_target_path = %req.staging_target_path,
                    error = %e,
                    "could not remove staging directory"
                );
            }
        }

        info!(volume_id = %key, "Volume unstaged successfully");
        timer.success();

        Ok(Response::new(csi::NodeUnstageVolumeResponse {}))
    }

    /// Publish a volume to a workload target path.
    async fn node_publish_volume(
        &self,
        request: Request<csi::NodePublishVolumeRequest>,
    ) -> Result<Response<csi::NodePublishVolumeResponse>, Status> {
        let req = request.into_inner();

        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("Volume ID is required"));
        }
        if req.staging_target_path.is_empty() {
            return Err(Status::invalid_argument("Staging target path is required"));
        }
        if req.target_path.is_empty() {
            return Err(Status::invalid_argument("Target path is required"));
        }
        let capability = req
            .volume_capability
            .as_ref()
            .ok_or_else(|| Status::invalid_argument("Volume capability is required"))?;

        let key: VolumeKey = req
            .volume_id
            .parse()
            .map_err(|e| Status::invalid_argument(format!("{}", e)))?;

        let _guard = self.acquire(&req.volume_id)?;

        info!(
            volume_id = %key,
            staging_target_path = %req.staging_target_path,
            target_path = %req.target_path,
            readonly = req.readonly,
            "NodePublishVolume request"
        );

        match capability.access_type.as_ref() {
            Some(csi::volume_capability::AccessType::Block(_)) => {
                self.publish_block(&req, &key).await?
            }
            _ => self.publish_mount(&req, &key).await?,
        }

        info!(volume_id = %key, target_path = %req.target_path, "Volume published successfully");
        Ok(Response::new(csi::NodePublishVolumeResponse {}))
    }

    /// Unpublish a volume from a workload target path.
    async fn node_unpublish_volume(
        &self,
        request: Request<csi::NodeUnpublishVolumeRequest>,
    ) -> Result<Response<csi::NodeUnpublishVolumeResponse>, Status> {
        let req = request.into_inner();

        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("Volume ID is required"));
        }
        if req.target_path.is_empty() {
            return Err(Status::invalid_argument("Target path is required"));
        }

        let key: VolumeKey = req
            .volume_id
            .parse()
            .map_err(|e| Status::invalid_argument(format!("{}", e)))?;

        let _guard = self.acquire(&req.volume_id)?;

        info!(
            volume_id = %key,
            target_path = %req.target_path,
            "NodeUnpublishVolume request"
        );

        let target = Path::new(&req.target_path);

        self.mounter
            .unmount(target)
            .await
            .map_err(|e| Self::mount_error(&key.label, e))?;

        match std::fs::symlink_metadata(target) {
            Ok(metadata) => {
                let removed = if metadata.is_dir() {
                    std::fs::remove_dir(target)
                } else {
                    std::fs::remove_file(target)
                };
                if let Err(e) = removed {
                    return Err(Status::internal(format!(
                        "volume {}: failed to remove {}: {}",
                        key.label,
                        target.display(),
                        e
                    )));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Status::internal(format!(
                    "volume {}: failed to stat {}: {}",
                    key.label,
                    target.display(),
                    e
                )));
            }
        }

        info!(volume_id = %key, target_path = %req.target_path, "Volume unpublished successfully");
        Ok(Response::new(csi::NodeUnpublishVolumeResponse {}))
    }

    /// Grow the filesystem (and any LUKS mapping under it) after a
    /// controller-side resize.
    async fn node_expand_volume(
        &self,
        request: Request<csi::NodeExpandVolumeRequest>,
    ) -> Result<Response<csi::NodeExpandVolumeResponse>, Status> {
        let req = request.into_inner();

        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("Volume ID is required"));
        }
        if req.volume_path.is_empty() {
            return Err(Status::invalid_argument("Volume path is required"));
        }

        let key: VolumeKey = req
            .volume_id
            .parse()
            .map_err(|e| Status::invalid_argument(format!("{}", e)))?;

        let _guard = self.acquire(&req.volume_id)?;

        info!(
            volume_id = %key,
            volume_path = %req.volume_path,
            "NodeExpandVolume request"
        );

        let volume_path = Path::new(&req.volume_path);
        let sources = self
            .mounter
            .mount_sources(volume_path)
            .map_err(|e| Self::mount_error(&key.label, e))?;
        let source = sources.first().ok_or_else(|| {
            Status::internal(format!(
                "volume {}: nothing mounted at {}",
                key.label, req.volume_path
            ))
        })?;

        // Encrypted volumes grow the mapping before the filesystem.
        let mapping = self
            .luks
            .is_luks_mapping(source)
            .await
            .map_err(|e| Self::luks_error(&key.label, e))?;
        if let Some(name) = mapping {
            self.luks
                .resize(&name)
                .await
                .map_err(|e| Self::luks_error(&key.label, e))?;
        }

        self.mounter
            .resize_fs(Path::new(source), volume_path)
            .await
            .map_err(|e| Self::mount_error(&key.label, e))?;

        let capacity_bytes = req
            .capacity_range
            .map(|range| range.required_bytes)
            .unwrap_or(0);

        info!(volume_id = %key, capacity_bytes = capacity_bytes, "Volume expanded successfully");

        Ok(Response::new(csi::NodeExpandVolumeResponse {
            capacity_bytes,
        }))
    }

    /// Get information about this node.
    async fn node_get_info(
        &self,
        _request: Request<csi::NodeGetInfoRequest>,
    ) -> Result<Response<csi::NodeGetInfoResponse>, Status> {
        let attached_devices = self.hardware.attached_device_count().map_err(|e| {
            Status::internal(format!("failed to enumerate block devices: {}", e))
        })?;

        let max_volumes =
            policy::max_volume_attachments(self.metadata.memory_bytes, attached_devices);

        info!(
            instance_id = self.metadata.instance_id,
            region = %self.metadata.region,
            max_volumes = max_volumes,
            "NodeGetInfo request"
        );

        Ok(Response::new(csi::NodeGetInfoResponse {
            node_id: self.metadata.instance_id.to_string(),
            max_volumes_per_node: max_volumes as i64,
            accessible_topology: Some(csi::Topology {
                segments: std::collections::HashMap::from([(
                    TOPOLOGY_REGION_KEY.to_string(),
                    self.metadata.region.clone(),
                )]),
            }),
        }))
    }

    /// Report node capabilities.
    async fn node_get_capabilities(
        &self,
        _request: Request<csi::NodeGetCapabilitiesRequest>,
    ) -> Result<Response<csi::NodeGetCapabilitiesResponse>, Status> {
        let capabilities = vec![
            csi::NodeServiceCapability {
                r#type: Some(csi::node_service_capability::Type::Rpc(
                    csi::node_service_capability::Rpc {
                        r#type: csi::node_service_capability::rpc::Type::StageUnstageVolume as i32,
                    },
                )),
            },
            csi::NodeServiceCapability {
                r#type: Some(csi::node_service_capability::Type::Rpc(
                    csi::node_service_capability::Rpc {
                        r#type: csi::node_service_capability::rpc::Type::ExpandVolume as i32,
                    },
                )),
            },
        ];

        Ok(Response::new(csi::NodeGetCapabilitiesResponse {
            capabilities,
        }))
    }

    /// Get volume statistics (not implemented).
    async fn node_get_volume_stats(
        &self,
        _request: Request<csi::NodeGetVolumeStatsRequest>,
    ) -> Result<Response<csi::NodeGetVolumeStatsResponse>, Status> {
        Err(Status::unimplemented("NodeGetVolumeStats is not supported"))
    }
}
