//! CSI Identity Service Implementation
//!
//! Provides plugin identification and capability reporting to the
//! orchestrator.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tonic::{Request, Response, Status};

use crate::csi;

pub const DRIVER_NAME: &str = "linodebs.csi.linode.com";
pub const DRIVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Topology key under which the driver reports the volume region.
pub const TOPOLOGY_REGION_KEY: &str = "topology.linodebs.csi.linode.com/region";

/// Shared readiness state for the CSI driver
///
/// Used by the probe() method to report actual readiness status
/// and updated by the server lifecycle during startup and shutdown.
#[derive(Debug)]
pub struct ReadinessState {
    ready: AtomicBool,
}

impl ReadinessState {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

impl Default for ReadinessState {
    fn default() -> Self {
        Self::new()
    }
}

/// Error returned when the identity service is constructed without a
/// driver readiness handle.
#[derive(Debug, thiserror::Error)]
#[error("identity service requires the driver's readiness handle")]
pub struct MissingDriverHandle;

/// CSI Identity Service
///
/// Implements the CSI Identity service which provides:
/// - Plugin identification (name and version)
/// - Plugin capability reporting
/// - Readiness probing
pub struct IdentityService {
    readiness: Arc<ReadinessState>,
}

impl IdentityService {
    /// Create a new IdentityService bound to the driver's readiness state.
    ///
    /// Construction fails when the handle is absent; a detached identity
    /// service would report readiness the server cannot vouch for.
    pub fn new(readiness: Option<Arc<ReadinessState>>) -> Result<Self, MissingDriverHandle> {
        match readiness {
            Some(readiness) => Ok(Self { readiness }),
            None => Err(MissingDriverHandle),
        }
    }
}

#[tonic::async_trait]
impl csi::identity_server::Identity for IdentityService {
    /// Returns the name and version of the CSI plugin.
    async fn get_plugin_info(
        &self,
        _request: Request<csi::GetPluginInfoRequest>,
    ) -> Result<Response<csi::GetPluginInfoResponse>, Status> {
        Ok(Response::new(csi::GetPluginInfoResponse {
            name: DRIVER_NAME.to_string(),
            vendor_version: DRIVER_VERSION.to_string(),
            manifest: std::collections::HashMap::new(),
        }))
    }

    /// Returns the capabilities of the CSI plugin.
    async fn get_plugin_capabilities(
        &self,
        _request: Request<csi::GetPluginCapabilitiesRequest>,
    ) -> Result<Response<csi::GetPluginCapabilitiesResponse>, Status> {
        // Controller service, region-constrained volumes, online expansion
        let capabilities = vec![
            csi::PluginCapability {
                r#type: Some(csi::plugin_capability::Type::Service(
                    csi::plugin_capability::Service {
                        r#type: csi::plugin_capability::service::Type::ControllerService as i32,
                    },
                )),
            },
            csi::PluginCapability {
                r#type: Some(csi::plugin_capability::Type::Service(
                    csi::plugin_capability::Service {
                        r#type: csi::plugin_capability::service::Type::VolumeAccessibilityConstraints
                            as i32,
                    },
                )),
            },
            csi::PluginCapability {
                r#type: Some(csi::plugin_capability::Type::VolumeExpansion(
                    csi::plugin_capability::VolumeExpansion {
                        r#type: csi::plugin_capability::volume_expansion::Type::Online as i32,
                    },
                )),
            },
        ];

        Ok(Response::new(csi::GetPluginCapabilitiesResponse {
            capabilities,
        }))
    }

    /// Probes the plugin to check if it is ready.
    ///
    /// Returns ready=true when the driver has completed initialization
    /// and is accepting requests. Returns ready=false during startup
    /// or shutdown.
    async fn probe(
        &self,
        _request: Request<csi::ProbeRequest>,
    ) -> Result<Response<csi::ProbeResponse>, Status> {
        Ok(Response::new(csi::ProbeResponse {
            ready: Some(self.readiness.is_ready()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csi::identity_server::Identity;

    #[test]
    fn test_construction_requires_handle() {
        assert!(IdentityService::new(None).is_err());
        assert!(IdentityService::new(Some(Arc::new(ReadinessState::new()))).is_ok());
    }

    #[tokio::test]
    async fn test_get_plugin_info() {
        let service = IdentityService::new(Some(Arc::new(ReadinessState::new()))).unwrap();
        let request = Request::new(csi::GetPluginInfoRequest {});
        let response = Identity::get_plugin_info(&service, request).await.unwrap();
        let info = response.into_inner();

        assert_eq!(info.name, DRIVER_NAME);
        assert_eq!(info.vendor_version, DRIVER_VERSION);
    }

    #[tokio::test]
    async fn test_get_plugin_capabilities() {
        let service = IdentityService::new(Some(Arc::new(ReadinessState::new()))).unwrap();
        let request = Request::new(csi::GetPluginCapabilitiesRequest {});
        let response = Identity::get_plugin_capabilities(&service, request)
            .await
            .unwrap();
        let caps = response.into_inner();

        // Controller service, accessibility constraints, volume expansion
        assert_eq!(caps.capabilities.len(), 3);
    }

    #[tokio::test]
    async fn test_probe_follows_readiness_state() {
        let readiness = Arc::new(ReadinessState::new());
        let service = IdentityService::new(Some(readiness.clone())).unwrap();

        // Initially not ready
        let request = Request::new(csi::ProbeRequest {});
        let response = Identity::probe(&service, request).await.unwrap();
        assert_eq!(response.into_inner().ready, Some(false));

        // Set ready
        readiness.set_ready(true);
        let request = Request::new(csi::ProbeRequest {});
        let response = Identity::probe(&service, request).await.unwrap();
        assert_eq!(response.into_inner().ready, Some(true));

        // Set not ready (shutdown)
        readiness.set_ready(false);
        let request = Request::new(csi::ProbeRequest {});
        let response = Identity::probe(&service, request).await.unwrap();
        assert_eq!(response.into_inner().ready, Some(false));
    }

    #[test]
    fn test_readiness_state() {
        let state = ReadinessState::new();
        assert!(!state.is_ready());

        state.set_ready(true);
        assert!(state.is_ready());

        state.set_ready(false);
        assert!(!state.is_ready());
    }
}
