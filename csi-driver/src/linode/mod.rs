//! Linode cloud API layer.
//!
//! The driver talks to the Linode API v4 for volume CRUD and host
//! attachment. The [`CloudVolumeService`] trait is the seam between the CSI
//! services and the HTTP client so the Controller and Node cores can be
//! driven with fakes in tests.

mod client;
mod models;

use std::time::Duration;

use thiserror::Error;

pub use client::LinodeClient;
pub use models::{
    Instance, InstanceDisk, InstanceSpecs, Volume, VolumeStatus,
};

/// Default public API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.linode.com/v4";

/// Cadence of attach/detach/status completion polling.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default budget for a completion poll.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors from the cloud API layer.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("volume {0} not found")]
    VolumeNotFound(u64),

    #[error("instance {0} not found")]
    InstanceNotFound(u64),

    #[error("Linode API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid Linode API token")]
    InvalidToken,

    #[error("timed out after {timeout:?} waiting for volume {volume_id}")]
    WaitTimeout {
        volume_id: u64,
        timeout: Duration,
    },
}

/// Remote volume operations the CSI services depend on.
///
/// One method per remote call; completion polling is layered on top of
/// `get_volume` so fake implementations get it for free.
#[tonic::async_trait]
pub trait CloudVolumeService: Send + Sync + 'static {
    /// All volumes visible to the driver principal.
    async fn list_volumes(&self) -> Result<Vec<Volume>, CloudError>;

    async fn get_volume(&self, volume_id: u64) -> Result<Volume, CloudError>;

    async fn find_volume_by_label(&self, label: &str)
    -> Result<Option<Volume>, CloudError>;

    async fn create_volume(
        &self,
        label: &str,
        region: &str,
        size_gib: u64,
    ) -> Result<Volume, CloudError>;

    /// Clone an existing volume into a new label.
    async fn clone_volume(&self, source_id: u64, label: &str)
    -> Result<Volume, CloudError>;

    async fn delete_volume(&self, volume_id: u64) -> Result<(), CloudError>;

    async fn resize_volume(&self, volume_id: u64, size_gib: u64)
    -> Result<(), CloudError>;

    async fn attach_volume(&self, volume_id: u64, linode_id: u64)
    -> Result<Volume, CloudError>;

    async fn detach_volume(&self, volume_id: u64) -> Result<(), CloudError>;

    async fn get_instance(&self, linode_id: u64) -> Result<Instance, CloudError>;

    async fn find_instance_by_label(&self, label: &str)
    -> Result<Option<Instance>, CloudError>;

    async fn list_instance_disks(&self, linode_id: u64)
    -> Result<Vec<InstanceDisk>, CloudError>;

    /// Poll until the volume reports the given attachment, or time out.
    ///
    /// `linode_id = None` waits for the volume to detach. The poll checks
    /// cancellation between attempts by virtue of suspending on the ambient
    /// task; dropping the RPC future abandons the loop.
    async fn wait_for_volume_linode_id(
        &self,
        volume_id: u64,
        linode_id: Option<u64>,
        timeout: Duration,
    ) -> Result<Volume, CloudError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            crate::metrics::record_cloud_poll("attachment");
            let volume = self.get_volume(volume_id).await?;
            if volume.linode_id == linode_id {
                return Ok(volume);
            }
            if tokio::time::Instant::now() + POLL_INTERVAL > deadline {
                return Err(CloudError::WaitTimeout { volume_id, timeout });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Poll until the volume reaches the given status, or time out.
    async fn wait_for_volume_status(
        &self,
        volume_id: u64,
        status: VolumeStatus,
        timeout: Duration,
    ) -> Result<Volume, CloudError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            crate::metrics::record_cloud_poll("status");
            let volume = self.get_volume(volume_id).await?;
            if volume.status == status {
                return Ok(volume);
            }
            if tokio::time::Instant::now() + POLL_INTERVAL > deadline {
                return Err(CloudError::WaitTimeout { volume_id, timeout });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
