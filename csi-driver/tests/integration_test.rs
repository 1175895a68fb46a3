//! Integration tests for the Linode Block Storage CSI driver
//!
//! These tests drive the real service implementations through their gRPC
//! surface without requiring a Linode account or host mount privileges.
//! Tests focus on capability reporting, request validation, and identifier
//! handling.

use std::collections::HashMap;
use std::sync::Arc;

use tonic::Request;

use linode_csi_driver::csi;
use linode_csi_driver::csi::controller_server::Controller;
use linode_csi_driver::csi::identity_server::Identity;
use linode_csi_driver::csi::node_server::Node;
use linode_csi_driver::device::{ByIdResolver, SysBlockInventory};
use linode_csi_driver::linode::{CloudVolumeService, LinodeClient};
use linode_csi_driver::luks::CryptSetup;
use linode_csi_driver::mount::SystemMounter;
use linode_csi_driver::policy;
use linode_csi_driver::types::VolumeKey;
use linode_csi_driver::{
    ControllerService, DRIVER_NAME, IdentityService, NodeMetadata, NodeService, ReadinessState,
};

/// A controller whose cloud client points at a dead endpoint; only
/// validation paths are exercised.
fn offline_controller() -> ControllerService {
    let cloud: Arc<dyn CloudVolumeService> =
        Arc::new(LinodeClient::new("http://127.0.0.1:1", "test-token").unwrap());
    ControllerService::new(cloud, "us-east".to_string())
}

/// A node service over the real host backends; only validation paths are
/// exercised.
fn offline_node() -> NodeService {
    NodeService::new(
        Arc::new(ByIdResolver::new()),
        Arc::new(SystemMounter::new()),
        Arc::new(CryptSetup::new()),
        Arc::new(SysBlockInventory::new()),
        NodeMetadata {
            instance_id: 1,
            region: "us-east".to_string(),
            memory_bytes: 8 << 30,
        },
    )
}

// ============================================================================
// Identity Service
// ============================================================================

#[tokio::test]
async fn test_plugin_info_reports_driver_identity() {
    let service = IdentityService::new(Some(Arc::new(ReadinessState::new()))).unwrap();

    let info = Identity::get_plugin_info(&service, Request::new(csi::GetPluginInfoRequest {}))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(info.name, DRIVER_NAME);
    // CSI driver names follow DNS naming conventions
    assert!(
        info.name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    );
    assert!(!info.vendor_version.is_empty());
}

#[tokio::test]
async fn test_identity_requires_driver_handle() {
    assert!(IdentityService::new(None).is_err());
}

#[tokio::test]
async fn test_plugin_capabilities_include_controller_service() {
    let service = IdentityService::new(Some(Arc::new(ReadinessState::new()))).unwrap();

    let caps = Identity::get_plugin_capabilities(
        &service,
        Request::new(csi::GetPluginCapabilitiesRequest {}),
    )
    .await
    .unwrap()
    .into_inner();

    let has_controller = caps.capabilities.iter().any(|cap| {
        matches!(
            cap.r#type,
            Some(csi::plugin_capability::Type::Service(
                csi::plugin_capability::Service { r#type }
            )) if r#type == csi::plugin_capability::service::Type::ControllerService as i32
        )
    });
    assert!(has_controller);
}

#[tokio::test]
async fn test_probe_tracks_server_lifecycle() {
    let readiness = Arc::new(ReadinessState::new());
    let service = IdentityService::new(Some(readiness.clone())).unwrap();

    let probe = Identity::probe(&service, Request::new(csi::ProbeRequest {}))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(probe.ready, Some(false));

    readiness.set_ready(true);
    let probe = Identity::probe(&service, Request::new(csi::ProbeRequest {}))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(probe.ready, Some(true));
}

// ============================================================================
// Controller validation surface
// ============================================================================

#[tokio::test]
async fn test_create_volume_requires_name() {
    let controller = offline_controller();

    let err = Controller::create_volume(
        &controller,
        Request::new(csi::CreateVolumeRequest::default()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), tonic::Code::InvalidArgument);
}

#[tokio::test]
async fn test_delete_volume_requires_id() {
    let controller = offline_controller();

    let err = Controller::delete_volume(
        &controller,
        Request::new(csi::DeleteVolumeRequest::default()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), tonic::Code::InvalidArgument);
}

#[tokio::test]
async fn test_publish_requires_node_and_capability() {
    let controller = offline_controller();

    let err = Controller::controller_publish_volume(
        &controller,
        Request::new(csi::ControllerPublishVolumeRequest {
            volume_id: "1-vol".to_string(),
            ..Default::default()
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), tonic::Code::InvalidArgument);

    let err = Controller::controller_publish_volume(
        &controller,
        Request::new(csi::ControllerPublishVolumeRequest {
            volume_id: "1-vol".to_string(),
            node_id: "5".to_string(),
            ..Default::default()
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), tonic::Code::InvalidArgument);
}

#[tokio::test]
async fn test_malformed_volume_ids_are_rejected() {
    let controller = offline_controller();

    for volume_id in ["no-numeric", "0-label", "9-", "justone"] {
        let err = Controller::controller_unpublish_volume(
            &controller,
            Request::new(csi::ControllerUnpublishVolumeRequest {
                volume_id: volume_id.to_string(),
                ..Default::default()
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(
            err.code(),
            tonic::Code::InvalidArgument,
            "volume id '{}'",
            volume_id
        );
    }
}

#[tokio::test]
async fn test_snapshots_are_not_supported() {
    let controller = offline_controller();

    let err = Controller::create_snapshot(
        &controller,
        Request::new(csi::CreateSnapshotRequest::default()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), tonic::Code::Unimplemented);

    let err = Controller::delete_snapshot(
        &controller,
        Request::new(csi::DeleteSnapshotRequest::default()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), tonic::Code::Unimplemented);
}

#[tokio::test]
async fn test_controller_capabilities_cover_volume_lifecycle() {
    let controller = offline_controller();

    let caps = Controller::controller_get_capabilities(
        &controller,
        Request::new(csi::ControllerGetCapabilitiesRequest {}),
    )
    .await
    .unwrap()
    .into_inner();

    let mut reported: Vec<i32> = caps
        .capabilities
        .iter()
        .filter_map(|cap| match cap.r#type {
            Some(csi::controller_service_capability::Type::Rpc(
                csi::controller_service_capability::Rpc { r#type },
            )) => Some(r#type),
            None => None,
        })
        .collect();
    reported.sort();

    use csi::controller_service_capability::rpc::Type;
    for required in [
        Type::CreateDeleteVolume,
        Type::PublishUnpublishVolume,
        Type::ListVolumes,
        Type::ExpandVolume,
        Type::CloneVolume,
    ] {
        assert!(reported.contains(&(required as i32)), "{:?}", required);
    }
}

// ============================================================================
// Node validation surface
// ============================================================================

#[tokio::test]
async fn test_node_stage_validation_sequence() {
    let node = offline_node();

    // Missing volume id
    let err = Node::node_stage_volume(
        &node,
        Request::new(csi::NodeStageVolumeRequest::default()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), tonic::Code::InvalidArgument);

    // Missing staging target path
    let err = Node::node_stage_volume(
        &node,
        Request::new(csi::NodeStageVolumeRequest {
            volume_id: "1-vol".to_string(),
            ..Default::default()
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), tonic::Code::InvalidArgument);

    // Missing volume capability
    let err = Node::node_stage_volume(
        &node,
        Request::new(csi::NodeStageVolumeRequest {
            volume_id: "1-vol".to_string(),
            staging_target_path: "/var/lib/kubelet/staging/vol".to_string(),
            ..Default::default()
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), tonic::Code::InvalidArgument);
}

#[tokio::test]
async fn test_node_unstage_and_unpublish_validation() {
    let node = offline_node();

    let err = Node::node_unstage_volume(
        &node,
        Request::new(csi::NodeUnstageVolumeRequest::default()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), tonic::Code::InvalidArgument);

    let err = Node::node_unpublish_volume(
        &node,
        Request::new(csi::NodeUnpublishVolumeRequest::default()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), tonic::Code::InvalidArgument);

    let err = Node::node_expand_volume(
        &node,
        Request::new(csi::NodeExpandVolumeRequest::default()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), tonic::Code::InvalidArgument);
}

#[tokio::test]
async fn test_node_reports_stage_unstage_capability() {
    let node = offline_node();

    let caps = Node::node_get_capabilities(&node, Request::new(csi::NodeGetCapabilitiesRequest {}))
        .await
        .unwrap()
        .into_inner();

    let has_stage_unstage = caps.capabilities.iter().any(|cap| {
        matches!(
            cap.r#type,
            Some(csi::node_service_capability::Type::Rpc(
                csi::node_service_capability::Rpc { r#type }
            )) if r#type == csi::node_service_capability::rpc::Type::StageUnstageVolume as i32
        )
    });
    assert!(has_stage_unstage);
}

#[tokio::test]
async fn test_node_volume_stats_not_supported() {
    let node = offline_node();

    let err = Node::node_get_volume_stats(
        &node,
        Request::new(csi::NodeGetVolumeStatsRequest::default()),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), tonic::Code::Unimplemented);
}

// ============================================================================
// Identifier and policy properties
// ============================================================================

/// The orchestrator-visible volume id survives a round trip.
#[test]
fn test_volume_key_round_trip() {
    for (id, label) in [(1u64, "a"), (123, "pvc-with-dashes"), (u64::MAX, "x_y")] {
        let key = VolumeKey::new(id, label);
        let parsed: VolumeKey = key.to_string().parse().unwrap();
        assert_eq!(parsed.volume_id, id);
        assert_eq!(parsed.label, label);
    }
}

/// Attachment caps follow the platform's memory table.
#[test]
fn test_attachment_cap_table() {
    for (memory_gib, expected) in [
        (1u64, 8usize),
        (2, 8),
        (4, 8),
        (8, 8),
        (16, 16),
        (32, 32),
        (64, 64),
        (96, 64),
        (128, 64),
        (256, 64),
        (512, 64),
    ] {
        assert_eq!(
            policy::max_block_devices(memory_gib << 30),
            expected,
            "{} GiB",
            memory_gib
        );
    }
}
