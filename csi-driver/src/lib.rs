//! Linode Block Storage CSI Driver Library
//!
//! Kubernetes CSI driver that provisions and attaches Linode Block Storage
//! volumes through the Linode API and manages their lifecycle on the node:
//! device discovery, optional LUKS encryption, formatting and mounting.
//!
//! This library provides:
//! - CSI Identity, Controller, and Node service implementations
//! - A Linode API client for volume CRUD and attachment
//! - Host-facing mount, device-discovery and LUKS layers

/// CSI proto generated types
pub mod csi {
    tonic::include_proto!("csi.v1");
}

pub mod controller;
pub mod device;
pub mod identity;
pub mod linode;
pub mod locks;
pub mod luks;
pub mod metrics;
pub mod mount;
pub mod node;
pub mod policy;
pub mod types;

pub use controller::ControllerService;
pub use identity::{DRIVER_NAME, DRIVER_VERSION, IdentityService, ReadinessState};
pub use node::{NodeMetadata, NodeService};
