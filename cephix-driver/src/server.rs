//! gRPC server setup and lifecycle.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::net::UnixListener;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::transport::Server;
use tracing::{info, warn};

use cephix_core::{
    AdminFactory, CephAdmin, CliAdminFactory, ClusterInfo, ClusterRegistry, Credentials,
    MockCluster,
};
use cephix_proto::{
    ControllerServer, EncryptionKeyRotationServer, GroupControllerServer, IdentityServer,
    NetworkFenceServer, NodeServer, ReclaimSpaceControllerServer, ReclaimSpaceNodeServer,
    ReplicationServer, VolumeGroupControllerServer,
};

use crate::config::Config;
use crate::driver::Driver;
use crate::mount::{Mounter, SystemMounter};
use crate::service::addons::{
    EncryptionKeyRotationService, NetworkFenceService, ReclaimSpaceControllerService,
    ReclaimSpaceNodeService, ReplicationService, VolumeGroupService,
};
use crate::service::controller::ControllerService;
use crate::service::group::GroupControllerService;
use crate::service::identity::IdentityService;
use crate::service::node::NodeService;

/// Factory handing every connection the same in-memory cluster, for
/// development without Ceph tooling.
struct DevFactory {
    cluster: Arc<MockCluster>,
}

impl DevFactory {
    fn new() -> Self {
        let cluster = Arc::new(MockCluster::new());
        cluster.add_filesystem("myfs", 1, "myfs-metadata");
        cluster.add_pool("rbd", 2);
        Self { cluster }
    }
}

#[async_trait]
impl AdminFactory for DevFactory {
    async fn connect(
        &self,
        _monitors: &str,
        _creds: &Credentials,
    ) -> cephix_core::Result<Arc<dyn CephAdmin>> {
        let admin: Arc<dyn CephAdmin> = self.cluster.clone();
        Ok(admin)
    }
}

/// Run the gRPC server until the process is asked to stop.
pub async fn run(config: Config) -> Result<()> {
    // Resolve the cluster map. Development mode falls back to a synthetic
    // single-cluster registry when no config file is present.
    let registry = match ClusterRegistry::load(&config.driver.cluster_config_path) {
        Ok(registry) => registry,
        Err(e) if config.driver.dev_mode => {
            warn!(error = %e, "no cluster config, using the dev registry");
            ClusterRegistry::from_entries(vec![ClusterInfo {
                cluster_id: "dev".to_string(),
                monitors: vec!["127.0.0.1:6789".to_string()],
                cephfs: Default::default(),
                rbd: Default::default(),
                read_affinity: Default::default(),
            }])
        }
        Err(e) => return Err(anyhow::anyhow!("failed to load cluster config: {e}")),
    };
    info!(clusters = ?registry.cluster_ids(), "cluster config loaded");

    let factory: Arc<dyn AdminFactory> = if config.driver.dev_mode {
        info!("using the in-memory mock cluster backend");
        Arc::new(DevFactory::new())
    } else {
        Arc::new(CliAdminFactory)
    };

    let driver = Arc::new(Driver::new(&config, registry, factory));
    let mounter: Arc<dyn Mounter> = Arc::new(SystemMounter);

    info!(
        driver = %driver.name,
        node_id = %driver.node_id,
        endpoint = %config.server.endpoint,
        "starting CSI gRPC server"
    );

    let router = Server::builder()
        .add_service(IdentityServer::new(IdentityService::new(driver.clone())))
        .add_service(ControllerServer::new(ControllerService::new(driver.clone())))
        .add_service(NodeServer::new(NodeService::new(
            driver.clone(),
            mounter.clone(),
        )))
        .add_service(GroupControllerServer::new(GroupControllerService::new(
            driver.clone(),
        )))
        .add_service(ReplicationServer::new(ReplicationService::new(
            driver.clone(),
        )))
        .add_service(ReclaimSpaceControllerServer::new(
            ReclaimSpaceControllerService::new(driver.clone()),
        ))
        .add_service(ReclaimSpaceNodeServer::new(ReclaimSpaceNodeService::new(
            driver.clone(),
            mounter.clone(),
        )))
        .add_service(NetworkFenceServer::new(NetworkFenceService::new(
            driver.clone(),
        )))
        .add_service(EncryptionKeyRotationServer::new(
            EncryptionKeyRotationService::new(driver.clone()),
        ))
        .add_service(VolumeGroupControllerServer::new(VolumeGroupService::new(
            driver.clone(),
        )));

    let endpoint = config.server.endpoint.clone();
    if let Some(path) = endpoint.strip_prefix("unix://") {
        // A previous run may have left its socket behind; a stale file
        // makes bind fail.
        if tokio::fs::metadata(path).await.is_ok() {
            warn!(path = %path, "removing stale CSI socket");
            let _ = tokio::fs::remove_file(path).await;
        }
        if let Some(parent) = std::path::Path::new(path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let listener = UnixListener::bind(path)?;
        let incoming = UnixListenerStream::new(listener);
        router
            .serve_with_incoming_shutdown(incoming, shutdown_signal())
            .await?;
        let _ = tokio::fs::remove_file(path).await;
    } else {
        let addr: std::net::SocketAddr = endpoint
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid endpoint {endpoint}: {e}"))?;
        router.serve_with_shutdown(addr, shutdown_signal()).await?;
    }

    cephix_core::reset_cluster_cache();
    info!("CSI server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
