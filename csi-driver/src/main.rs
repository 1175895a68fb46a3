//! Linode Block Storage CSI Driver
//!
//! Kubernetes CSI driver that provisions Linode Block Storage volumes via
//! the Linode API and stages them on the node, serving the CSI Identity,
//! Controller and Node services over a Unix socket.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

use linode_csi_driver::csi::controller_server::ControllerServer;
use linode_csi_driver::csi::identity_server::IdentityServer;
use linode_csi_driver::csi::node_server::NodeServer;
use linode_csi_driver::device::{ByIdResolver, SysBlockInventory};
use linode_csi_driver::linode::{CloudVolumeService, DEFAULT_API_URL, LinodeClient};
use linode_csi_driver::luks::CryptSetup;
use linode_csi_driver::mount::SystemMounter;
use linode_csi_driver::{
    ControllerService, DRIVER_NAME, DRIVER_VERSION, IdentityService, NodeMetadata, NodeService,
    ReadinessState, metrics,
};

/// CLI arguments for the CSI driver
#[derive(Parser, Debug)]
#[command(name = "linode-csi-driver")]
#[command(about = "Linode Block Storage CSI Driver for Kubernetes")]
#[command(version = DRIVER_VERSION)]
struct Args {
    /// CSI endpoint (unix socket path)
    #[arg(long, default_value = "unix:///var/run/csi/csi.sock")]
    endpoint: String,

    /// Node name; defaults to this host's hostname
    #[arg(long, env = "NODE_NAME")]
    node_name: Option<String>,

    /// Linode API token
    #[arg(long, env = "LINODE_TOKEN", hide_env_values = true)]
    linode_token: String,

    /// Linode API endpoint
    #[arg(long, default_value = DEFAULT_API_URL)]
    linode_url: String,

    /// Region override for newly created volumes
    #[arg(long)]
    region: Option<String>,

    /// Prometheus metrics listen address (disabled when unset)
    #[arg(long)]
    metrics_address: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Determine the node name this driver runs on
    let node_name = match args.node_name {
        Some(name) => name,
        None => hostname::get()?.to_string_lossy().to_string(),
    };

    let cloud = LinodeClient::new(&args.linode_url, &args.linode_token)?;

    // Resolve the local instance; the node service needs its id, region
    // and memory for topology and attachment-cap reporting.
    let instance = cloud
        .find_instance_by_label(&node_name)
        .await?
        .ok_or_else(|| format!("no instance named '{}' visible to this token", node_name))?;
    let specs = instance
        .specs
        .as_ref()
        .ok_or_else(|| format!("instance {} reports no hardware specs", instance.id))?;

    let region = args.region.unwrap_or_else(|| instance.region.clone());
    let metadata = NodeMetadata {
        instance_id: instance.id,
        region: region.clone(),
        memory_bytes: specs.memory_bytes(),
    };

    info!(
        driver_name = DRIVER_NAME,
        version = DRIVER_VERSION,
        endpoint = %args.endpoint,
        node_name = %node_name,
        instance_id = instance.id,
        region = %region,
        "Starting Linode Block Storage CSI Driver"
    );

    if let Some(addr) = args.metrics_address {
        metrics::init_metrics(addr)?;
    }

    let readiness = Arc::new(ReadinessState::new());
    let identity = IdentityService::new(Some(readiness.clone()))?;

    let cloud: Arc<dyn CloudVolumeService> = Arc::new(cloud);
    let controller = ControllerService::new(cloud, region);
    let node = NodeService::new(
        Arc::new(ByIdResolver::new()),
        Arc::new(SystemMounter::new()),
        Arc::new(CryptSetup::new()),
        Arc::new(SysBlockInventory::new()),
        metadata,
    );

    // Bind the CSI Unix socket, replacing any stale socket file
    let socket_path = args
        .endpoint
        .strip_prefix("unix://")
        .unwrap_or(&args.endpoint)
        .to_string();
    if let Some(parent) = Path::new(&socket_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    if Path::new(&socket_path).exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let listener = UnixListener::bind(&socket_path)?;
    info!(socket = %socket_path, "CSI server listening");

    readiness.set_ready(true);

    Server::builder()
        .add_service(IdentityServer::new(identity))
        .add_service(ControllerServer::new(controller))
        .add_service(NodeServer::new(node))
        .serve_with_incoming_shutdown(
            UnixListenerStream::new(listener),
            shutdown_signal(readiness),
        )
        .await?;

    // Leave no stale socket behind for the next start
    if Path::new(&socket_path).exists() {
        std::fs::remove_file(&socket_path)?;
    }

    info!("CSI driver stopped");
    Ok(())
}

/// Resolve on SIGTERM or ctrl-c and flip the readiness probe first.
async fn shutdown_signal(readiness: Arc<ReadinessState>) {
    use tokio::signal::unix::{SignalKind, signal};

    let sigterm = signal(SignalKind::terminate());
    match sigterm {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler, falling back to ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
        }
    }

    info!("shutdown signal received");
    readiness.set_ready(false);
}
