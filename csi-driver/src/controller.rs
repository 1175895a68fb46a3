//! CSI Controller Service Implementation
//!
//! Handles volume lifecycle operations against the Linode API: create,
//! delete, clone, resize, attach and detach. Attachment is gated by the
//! capacity policy so the driver never asks the platform for a device slot
//! it cannot grant.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tonic::{Request, Response, Status};
use tracing::{debug, error, info, warn};

use crate::csi;
use crate::identity::TOPOLOGY_REGION_KEY;
use crate::linode::{
    CloudError, CloudVolumeService, DEFAULT_WAIT_TIMEOUT, Volume, VolumeStatus,
};
use crate::locks::VolumeLocks;
use crate::luks::{LUKS_CIPHER_ATTRIBUTE, LUKS_ENCRYPTED_ATTRIBUTE, LUKS_KEY_SIZE_ATTRIBUTE};
use crate::metrics::OperationTimer;
use crate::policy;
use crate::types::{VolumeKey, normalize_label};

/// Publish-context key carrying the host device path to the node service.
pub const PUBLISH_CONTEXT_DEVICE_PATH: &str = "devicePath";
/// Publish-context key carrying the volume label, used as the mapper name
/// for encrypted volumes.
pub const PUBLISH_CONTEXT_VOLUME_NAME: &str = "volumeName";

/// Smallest volume the platform will provision, in GiB.
const MIN_VOLUME_SIZE_GIB: u64 = 10;

const GIB: i64 = 1 << 30;

/// CSI Controller Service
///
/// Implements the CSI Controller service which handles:
/// - Volume creation, cloning and deletion
/// - Volume attachment to and detachment from instances
/// - Volume expansion
/// - Capability reporting and validation
pub struct ControllerService {
    cloud: Arc<dyn CloudVolumeService>,
    /// Region volumes are created in when the request carries no topology.
    region: String,
    /// Serializes attach/detach per volume id.
    locks: VolumeLocks,
    /// Budget for attach/detach completion polling.
    wait_timeout: Duration,
}

impl ControllerService {
    /// Create a new ControllerService for the given cloud client.
    pub fn new(cloud: Arc<dyn CloudVolumeService>, region: String) -> Self {
        Self {
            cloud,
            region,
            locks: VolumeLocks::new(),
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    /// Override the completion-poll budget.
    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    /// Map a cloud-layer failure onto the CSI status surface.
    fn cloud_error(volume: &str, err: CloudError) -> Status {
        match err {
            CloudError::VolumeNotFound(id) => {
                Status::not_found(format!("volume {} ({}) not found", volume, id))
            }
            CloudError::InstanceNotFound(id) => {
                Status::not_found(format!("instance {} not found", id))
            }
            CloudError::WaitTimeout { .. } => Status::deadline_exceeded(format!(
                "timed out waiting on volume {}: {}",
                volume, err
            )),
            other => Status::internal(format!("volume {}: {}", volume, other)),
        }
    }

    /// Round a byte request up to whole GiB, honoring the platform floor.
    fn requested_size_gib(capacity_range: Option<&csi::CapacityRange>) -> Result<u64, Status> {
        let (required, limit) = match capacity_range {
            Some(range) => (range.required_bytes, range.limit_bytes),
            None => (0, 0),
        };
        if required < 0 || limit < 0 {
            return Err(Status::invalid_argument("Capacity range cannot be negative"));
        }

        let size_gib = ((required + GIB - 1) / GIB) as u64;
        let size_gib = size_gib.max(MIN_VOLUME_SIZE_GIB);

        if limit > 0 && (size_gib as i64) * GIB > limit {
            return Err(Status::out_of_range(format!(
                "required size {} GiB exceeds the capacity limit of {} bytes",
                size_gib, limit
            )));
        }
        Ok(size_gib)
    }

    /// Accept only single-node writer capabilities of mount or block type.
    fn validate_capability(capability: &csi::VolumeCapability) -> Result<(), Status> {
        if capability.access_type.is_none() {
            return Err(Status::invalid_argument(
                "Volume capability access type is required",
            ));
        }

        let mode = capability
            .access_mode
            .as_ref()
            .map(|m| m.mode)
            .unwrap_or_default();
        if mode != csi::volume_capability::access_mode::Mode::SingleNodeWriter as i32 {
            return Err(Status::failed_precondition(
                "only single-node writer access modes are supported",
            ));
        }
        Ok(())
    }

    fn validate_capabilities(capabilities: &[csi::VolumeCapability]) -> Result<(), Status> {
        if capabilities.is_empty() {
            return Err(Status::invalid_argument("Volume capability is required"));
        }
        capabilities.iter().try_for_each(Self::validate_capability)
    }

    /// Volume context the node needs, filtered out of the storage class
    /// parameters.
    fn volume_context_from_parameters(
        parameters: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        let mut context = HashMap::new();
        for key in [
            LUKS_ENCRYPTED_ATTRIBUTE,
            LUKS_CIPHER_ATTRIBUTE,
            LUKS_KEY_SIZE_ATTRIBUTE,
        ] {
            if let Some(value) = parameters.get(key) {
                context.insert(key.to_string(), value.clone());
            }
        }
        context
    }

    /// Convert a cloud volume into its CSI representation.
    fn csi_volume(volume: &Volume, volume_context: HashMap<String, String>) -> csi::Volume {
        csi::Volume {
            capacity_bytes: volume.capacity_bytes(),
            volume_id: VolumeKey::new(volume.id, &volume.label).to_string(),
            volume_context,
            content_source: None,
            accessible_topology: vec![csi::Topology {
                segments: HashMap::from([(
                    TOPOLOGY_REGION_KEY.to_string(),
                    volume.region.clone(),
                )]),
            }],
        }
    }

    /// Stable device path reported to the node for an attached volume.
    fn device_path(volume: &Volume) -> String {
        if !volume.filesystem_path.is_empty() {
            return volume.filesystem_path.clone();
        }
        format!("/dev/disk/by-id/scsi-0Linode_Volume_{}", volume.label)
    }

    /// Region for a new volume: topology preference first, then the
    /// driver's own region.
    fn create_region(&self, requirement: Option<&csi::TopologyRequirement>) -> String {
        requirement
            .into_iter()
            .flat_map(|r| r.preferred.iter().chain(r.requisite.iter()))
            .find_map(|topology| topology.segments.get(TOPOLOGY_REGION_KEY).cloned())
            .unwrap_or_else(|| self.region.clone())
    }
}

#[tonic::async_trait]
impl csi::controller_server::Controller for ControllerService {
    /// Create a new volume, idempotently by name.
    async fn create_volume(
        &self,
        request: Request<csi::CreateVolumeRequest>,
    ) -> Result<Response<csi::CreateVolumeResponse>, Status> {
        let req = request.into_inner();

        if req.name.is_empty() {
            return Err(Status::invalid_argument("Volume name is required"));
        }
        Self::validate_capabilities(&req.volume_capabilities)?;
        let size_gib = Self::requested_size_gib(req.capacity_range.as_ref())?;
        let label = normalize_label(&req.name);

        let timer = OperationTimer::new("create_volume");
        info!(name = %req.name, label = %label, size_gib = size_gib, "CreateVolume request");

        let volume_context = Self::volume_context_from_parameters(&req.parameters);

        // Idempotency: a volume with this label may already exist.
        if let Some(existing) = self
            .cloud
            .find_volume_by_label(&label)
            .await
            .map_err(|e| Self::cloud_error(&label, e))?
        {
            if existing.size != size_gib {
                timer.failure("already_exists");
                return Err(Status::already_exists(format!(
                    "volume {} already exists with size {} GiB, requested {} GiB",
                    label, existing.size, size_gib
                )));
            }
            info!(volume_id = existing.id, label = %label, "volume already exists, reusing");
            timer.success();
            return Ok(Response::new(csi::CreateVolumeResponse {
                volume: Some(Self::csi_volume(&existing, volume_context)),
            }));
        }

        let region = self.create_region(req.accessibility_requirements.as_ref());
        let created = match req.volume_content_source.as_ref().and_then(|s| s.r#type.as_ref()) {
            None => self
                .cloud
                .create_volume(&label, &region, size_gib)
                .await
                .map_err(|e| Self::cloud_error(&label, e))?,
            Some(csi::volume_content_source::Type::Volume(source)) => {
                let source_key: VolumeKey = source
                    .volume_id
                    .parse()
                    .map_err(|e| Status::invalid_argument(format!("{}", e)))?;
                debug!(source = %source_key, label = %label, "cloning volume");
                let clone = self
                    .cloud
                    .clone_volume(source_key.volume_id, &label)
                    .await
                    .map_err(|e| Self::cloud_error(&label, e))?;
                if clone.size < size_gib {
                    self.cloud
                        .resize_volume(clone.id, size_gib)
                        .await
                        .map_err(|e| Self::cloud_error(&label, e))?;
                }
                clone
            }
            Some(csi::volume_content_source::Type::Snapshot(_)) => {
                timer.failure("invalid_argument");
                return Err(Status::invalid_argument(
                    "volume snapshots are not supported",
                ));
            }
        };

        let volume = self
            .cloud
            .wait_for_volume_status(created.id, VolumeStatus::Active, self.wait_timeout)
            .await
            .map_err(|e| Self::cloud_error(&label, e))?;

        info!(
            volume_id = volume.id,
            label = %volume.label,
            size_gib = volume.size,
            region = %volume.region,
            "Volume created successfully"
        );
        timer.success();

        let mut csi_volume = Self::csi_volume(&volume, volume_context);
        csi_volume.content_source = req.volume_content_source;
        Ok(Response::new(csi::CreateVolumeResponse {
            volume: Some(csi_volume),
        }))
    }

    /// Delete a volume. A missing volume is success.
    async fn delete_volume(
        &self,
        request: Request<csi::DeleteVolumeRequest>,
    ) -> Result<Response<csi::DeleteVolumeResponse>, Status> {
        let req = request.into_inner();

        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("Volume ID is required"));
        }
        let key: VolumeKey = req
            .volume_id
            .parse()
            .map_err(|e| Status::invalid_argument(format!("{}", e)))?;

        let _guard = self
            .locks
            .try_acquire(&req.volume_id)
            .ok_or_else(|| Status::aborted(format!("operation pending for volume {}", key)))?;

        info!(volume_id = %key, "DeleteVolume request");

        let volume = match self.cloud.get_volume(key.volume_id).await {
            Ok(volume) => volume,
            Err(CloudError::VolumeNotFound(_)) => {
                warn!(volume_id = %key, "volume not found, treating as already deleted");
                return Ok(Response::new(csi::DeleteVolumeResponse {}));
            }
            Err(e) => return Err(Self::cloud_error(&key.label, e)),
        };

        if let Some(linode_id) = volume.linode_id {
            return Err(Status::failed_precondition(format!(
                "volume {} is still attached to instance {}",
                key.label, linode_id
            )));
        }

        self.cloud
            .delete_volume(key.volume_id)
            .await
            .map_err(|e| Self::cloud_error(&key.label, e))?;

        info!(volume_id = %key, "Volume deleted successfully");
        Ok(Response::new(csi::DeleteVolumeResponse {}))
    }

    /// Attach a volume to an instance.
    async fn controller_publish_volume(
        &self,
        request: Request<csi::ControllerPublishVolumeRequest>,
    ) -> Result<Response<csi::ControllerPublishVolumeResponse>, Status> {
        let req = request.into_inner();

        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("Volume ID is required"));
        }
        if req.node_id.is_empty() {
            return Err(Status::invalid_argument("Node ID is required"));
        }
        let capability = req
            .volume_capability
            .as_ref()
            .ok_or_else(|| Status::invalid_argument("Volume capability is required"))?;
        Self::validate_capability(capability)?;

        let key: VolumeKey = req
            .volume_id
            .parse()
            .map_err(|e| Status::invalid_argument(format!("{}", e)))?;
        let linode_id: u64 = req
            .node_id
            .parse()
            .map_err(|_| Status::invalid_argument(format!("invalid node id '{}'", req.node_id)))?;

        let _guard = self
            .locks
            .try_acquire(&req.volume_id)
            .ok_or_else(|| Status::aborted(format!("operation pending for volume {}", key)))?;

        let timer = OperationTimer::new("controller_publish_volume");
        info!(volume_id = %key, linode_id = linode_id, "ControllerPublishVolume request");

        let mut instance = self
            .cloud
            .get_instance(linode_id)
            .await
            .map_err(|e| Self::cloud_error(&key.label, e))?;
        instance.disks = self
            .cloud
            .list_instance_disks(linode_id)
            .await
            .map_err(|e| Self::cloud_error(&key.label, e))?;

        let volume = self
            .cloud
            .get_volume(key.volume_id)
            .await
            .map_err(|e| Self::cloud_error(&key.label, e))?;

        if let Some(attached_to) = volume.linode_id {
            if attached_to == linode_id {
                info!(volume_id = %key, linode_id = linode_id, "volume already attached");
                timer.success();
                return Ok(Response::new(csi::ControllerPublishVolumeResponse {
                    publish_context: HashMap::from([
                        (
                            PUBLISH_CONTEXT_DEVICE_PATH.to_string(),
                            Self::device_path(&volume),
                        ),
                        (
                            PUBLISH_CONTEXT_VOLUME_NAME.to_string(),
                            volume.label.clone(),
                        ),
                    ]),
                }));
            }
            timer.failure("failed_precondition");
            return Err(Status::failed_precondition(format!(
                "volume {} is attached to instance {}, cannot attach to {}",
                key.label, attached_to, linode_id
            )));
        }

        // Capacity gate: count this instance's current volumes and ask the
        // policy before touching the attach API.
        let attached_volumes = self
            .cloud
            .list_volumes()
            .await
            .map_err(|e| Self::cloud_error(&key.label, e))?
            .iter()
            .filter(|v| v.linode_id == Some(linode_id))
            .count();

        let can_attach = policy::can_attach(&instance, attached_volumes)
            .map_err(|e| Status::internal(e.to_string()))?;
        if !can_attach {
            let specs = instance.specs.as_ref();
            let limit = specs
                .map(|s| policy::max_volume_attachments(s.memory_bytes(), instance.disks.len()))
                .unwrap_or(0);
            timer.failure("resource_exhausted");
            return Err(Status::resource_exhausted(format!(
                "instance {} is at its volume attachment limit of {}",
                linode_id, limit
            )));
        }

        self.cloud
            .attach_volume(key.volume_id, linode_id)
            .await
            .map_err(|e| Self::cloud_error(&key.label, e))?;

        let volume = self
            .cloud
            .wait_for_volume_linode_id(key.volume_id, Some(linode_id), self.wait_timeout)
            .await
            .map_err(|e| Self::cloud_error(&key.label, e))?;

        info!(
            volume_id = %key,
            linode_id = linode_id,
            device_path = %Self::device_path(&volume),
            "Volume attached successfully"
        );
        timer.success();

        Ok(Response::new(csi::ControllerPublishVolumeResponse {
            publish_context: HashMap::from([
                (
                    PUBLISH_CONTEXT_DEVICE_PATH.to_string(),
                    Self::device_path(&volume),
                ),
                (
                    PUBLISH_CONTEXT_VOLUME_NAME.to_string(),
                    volume.label.clone(),
                ),
            ]),
        }))
    }

    /// Detach a volume from an instance. Already detached is success.
    async fn controller_unpublish_volume(
        &self,
        request: Request<csi::ControllerUnpublishVolumeRequest>,
    ) -> Result<Response<csi::ControllerUnpublishVolumeResponse>, Status> {
        let req = request.into_inner();

        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("Volume ID is required"));
        }
        let key: VolumeKey = req
            .volume_id
            .parse()
            .map_err(|e| Status::invalid_argument(format!("{}", e)))?;

        let _guard = self
            .locks
            .try_acquire(&req.volume_id)
            .ok_or_else(|| Status::aborted(format!("operation pending for volume {}", key)))?;

        info!(volume_id = %key, node_id = %req.node_id, "ControllerUnpublishVolume request");

        let volume = match self.cloud.get_volume(key.volume_id).await {
            Ok(volume) => volume,
            Err(CloudError::VolumeNotFound(_)) => {
                warn!(volume_id = %key, "volume not found, treating as detached");
                return Ok(Response::new(csi::ControllerUnpublishVolumeResponse {}));
            }
            Err(e) => return Err(Self::cloud_error(&key.label, e)),
        };

        let Some(attached_to) = volume.linode_id else {
            info!(volume_id = %key, "volume already detached");
            return Ok(Response::new(csi::ControllerUnpublishVolumeResponse {}));
        };

        // Detached from the requested node already, even if attached
        // elsewhere.
        if let Ok(requested) = req.node_id.parse::<u64>() {
            if attached_to != requested {
                warn!(
                    volume_id = %key,
                    attached_to = attached_to,
                    requested = requested,
                    "volume attached to a different instance, nothing to do"
                );
                return Ok(Response::new(csi::ControllerUnpublishVolumeResponse {}));
            }
        }

        self.cloud
            .detach_volume(key.volume_id)
            .await
            .map_err(|e| Self::cloud_error(&key.label, e))?;

        self.cloud
            .wait_for_volume_linode_id(key.volume_id, None, self.wait_timeout)
            .await
            .map_err(|e| Self::cloud_error(&key.label, e))?;

        info!(volume_id = %key, "Volume detached successfully");
        Ok(Response::new(csi::ControllerUnpublishVolumeResponse {}))
    }

    /// Grow a volume. The filesystem grow happens later on the node.
    async fn controller_expand_volume(
        &self,
        request: Request<csi::ControllerExpandVolumeRequest>,
    ) -> Result<Response<csi::ControllerExpandVolumeResponse>, Status> {
        let req = request.into_inner();

        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("Volume ID is required"));
        }
        let key: VolumeKey = req
            .volume_id
            .parse()
            .map_err(|e| Status::invalid_argument(format!("{}", e)))?;
        let size_gib = Self::requested_size_gib(req.capacity_range.as_ref())?;

        let _guard = self
            .locks
            .try_acquire(&req.volume_id)
            .ok_or_else(|| Status::aborted(format!("operation pending for volume {}", key)))?;

        info!(volume_id = %key, size_gib = size_gib, "ControllerExpandVolume request");

        let volume = self
            .cloud
            .get_volume(key.volume_id)
            .await
            .map_err(|e| Self::cloud_error(&key.label, e))?;

        if size_gib < volume.size {
            return Err(Status::invalid_argument(format!(
                "volume {} cannot shrink from {} GiB to {} GiB",
                key.label, volume.size, size_gib
            )));
        }

        if size_gib > volume.size {
            self.cloud
                .resize_volume(key.volume_id, size_gib)
                .await
                .map_err(|e| Self::cloud_error(&key.label, e))?;
            self.cloud
                .wait_for_volume_status(key.volume_id, VolumeStatus::Active, self.wait_timeout)
                .await
                .map_err(|e| Self::cloud_error(&key.label, e))?;
        }

        info!(volume_id = %key, size_gib = size_gib, "Volume expanded successfully");

        Ok(Response::new(csi::ControllerExpandVolumeResponse {
            capacity_bytes: (size_gib as i64) << 30,
            node_expansion_required: true,
        }))
    }

    /// Validate volume capabilities against what the driver supports.
    async fn validate_volume_capabilities(
        &self,
        request: Request<csi::ValidateVolumeCapabilitiesRequest>,
    ) -> Result<Response<csi::ValidateVolumeCapabilitiesResponse>, Status> {
        let req = request.into_inner();

        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("Volume ID is required"));
        }
        if req.volume_capabilities.is_empty() {
            return Err(Status::invalid_argument("Volume capability is required"));
        }
        let key: VolumeKey = req
            .volume_id
            .parse()
            .map_err(|e| Status::invalid_argument(format!("{}", e)))?;

        // The volume must exist before its capabilities can be judged.
        self.cloud
            .get_volume(key.volume_id)
            .await
            .map_err(|e| Self::cloud_error(&key.label, e))?;

        if let Err(unsupported) = Self::validate_capabilities(&req.volume_capabilities) {
            return Ok(Response::new(csi::ValidateVolumeCapabilitiesResponse {
                confirmed: None,
                message: unsupported.message().to_string(),
            }));
        }

        Ok(Response::new(csi::ValidateVolumeCapabilitiesResponse {
            confirmed: Some(csi::validate_volume_capabilities_response::Confirmed {
                volume_context: req.volume_context,
                volume_capabilities: req.volume_capabilities,
                parameters: req.parameters,
                mutable_parameters: req.mutable_parameters,
            }),
            message: String::new(),
        }))
    }

    /// List every volume with its attachment status.
    async fn list_volumes(
        &self,
        _request: Request<csi::ListVolumesRequest>,
    ) -> Result<Response<csi::ListVolumesResponse>, Status> {
        let volumes = self.cloud.list_volumes().await.map_err(|e| {
            error!(error = %e, "failed to list cloud volumes");
            Status::internal(format!("failed to list volumes: {}", e))
        })?;

        let entries = volumes
            .iter()
            .map(|volume| csi::list_volumes_response::Entry {
                volume: Some(Self::csi_volume(volume, HashMap::new())),
                status: Some(csi::list_volumes_response::VolumeStatus {
                    published_node_ids: volume
                        .linode_id
                        .map(|id| vec![id.to_string()])
                        .unwrap_or_default(),
                    volume_condition: None,
                }),
            })
            .collect();

        Ok(Response::new(csi::ListVolumesResponse {
            entries,
            next_token: String::new(),
        }))
    }

    /// Report controller capabilities.
    async fn controller_get_capabilities(
        &self,
        _request: Request<csi::ControllerGetCapabilitiesRequest>,
    ) -> Result<Response<csi::ControllerGetCapabilitiesResponse>, Status> {
        let rpc_capability = |rpc_type: csi::controller_service_capability::rpc::Type| {
            csi::ControllerServiceCapability {
                r#type: Some(csi::controller_service_capability::Type::Rpc(
                    csi::controller_service_capability::Rpc {
                        r#type: rpc_type as i32,
                    },
                )),
            }
        };

        let capabilities = vec![
            rpc_capability(csi::controller_service_capability::rpc::Type::CreateDeleteVolume),
            rpc_capability(csi::controller_service_capability::rpc::Type::PublishUnpublishVolume),
            rpc_capability(csi::controller_service_capability::rpc::Type::ListVolumes),
            rpc_capability(csi::controller_service_capability::rpc::Type::ExpandVolume),
            rpc_capability(csi::controller_service_capability::rpc::Type::CloneVolume),
        ];

        Ok(Response::new(csi::ControllerGetCapabilitiesResponse {
            capabilities,
        }))
    }

    /// Get capacity (not implemented).
    async fn get_capacity(
        &self,
        _request: Request<csi::GetCapacityRequest>,
    ) -> Result<Response<csi::GetCapacityResponse>, Status> {
        Err(Status::unimplemented("GetCapacity is not supported"))
    }

    /// Create a snapshot (not implemented).
    async fn create_snapshot(
        &self,
        _request: Request<csi::CreateSnapshotRequest>,
    ) -> Result<Response<csi::CreateSnapshotResponse>, Status> {
        Err(Status::unimplemented("CreateSnapshot is not supported"))
    }

    /// Delete a snapshot (not implemented).
    async fn delete_snapshot(
        &self,
        _request: Request<csi::DeleteSnapshotRequest>,
    ) -> Result<Response<csi::DeleteSnapshotResponse>, Status> {
        Err(Status::unimplemented("DeleteSnapshot is not supported"))
    }

    /// List snapshots (not implemented).
    async fn list_snapshots(
        &self,
        _request: Request<csi::ListSnapshotsRequest>,
    ) -> Result<Response<csi::ListSnapshotsResponse>, Status> {
        Err(Status::unimplemented("ListSnapshots is not supported"))
    }

    /// Get volume (not implemented).
    async fn controller_get_volume(
        &self,
        _request: Request<csi::ControllerGetVolumeRequest>,
    ) -> Result<Response<csi::ControllerGetVolumeResponse>, Status> {
        Err(Status::unimplemented("ControllerGetVolume is not supported"))
    }

    /// Modify volume (not implemented).
    async fn controller_modify_volume(
        &self,
        _request: Request<csi::ControllerModifyVolumeRequest>,
    ) -> Result<Response<csi::ControllerModifyVolumeResponse>, Status> {
        Err(Status::unimplemented(
            "ControllerModifyVolume is not supported",
        ))
    }
}
