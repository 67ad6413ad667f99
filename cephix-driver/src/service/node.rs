//! CSI Node service: staging and publishing of provisioned volumes.
//!
//! All heavy lifting happens behind the [`Mounter`] seam; this service only
//! validates, serialises per volume id and picks the right mount shape from
//! the volume context the controller produced.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::{info, instrument};

use cephix_core::{CephixError, Credentials, Result};
use cephix_proto::csi::{
    node_service_capability, volume_capability, NodeGetCapabilitiesRequest,
    NodeGetCapabilitiesResponse, NodeGetInfoRequest, NodeGetInfoResponse,
    NodePublishVolumeRequest, NodePublishVolumeResponse, NodeServiceCapability,
    NodeStageVolumeRequest, NodeStageVolumeResponse, NodeUnpublishVolumeRequest,
    NodeUnpublishVolumeResponse, NodeUnstageVolumeRequest, NodeUnstageVolumeResponse, Topology,
};
use cephix_proto::Node;

use crate::driver::Driver;
use crate::mount::Mounter;
use crate::service::{operation_in_flight, status_from};

/// Node service implementation.
pub struct NodeService {
    driver: Arc<Driver>,
    mounter: Arc<dyn Mounter>,
}

impl NodeService {
    pub fn new(driver: Arc<Driver>, mounter: Arc<dyn Mounter>) -> Self {
        Self { driver, mounter }
    }

    async fn do_stage(&self, req: &NodeStageVolumeRequest) -> Result<()> {
        let (_, cluster) = self.driver.decode(&req.volume_id)?;
        let creds = Credentials::from_user_secrets(&req.secrets)?;
        let mon_host = cluster.mon_host();
        let context = &req.volume_context;

        let readonly = context.get("backingSnapshotID").is_some();
        let is_block = matches!(
            req.volume_capability.as_ref().and_then(|c| c.access_type.as_ref()),
            Some(volume_capability::AccessType::Block(_))
        );

        if let Some(image) = context.get("imageName") {
            let pool = context.get("pool").cloned().unwrap_or_default();
            if pool.is_empty() {
                return Err(CephixError::InvalidArgument(
                    "volume context misses the pool of the image".to_string(),
                ));
            }
            let namespace = context.get("radosNamespace").cloned().unwrap_or_default();
            let device = self
                .mounter
                .map_rbd(
                    &mon_host,
                    &pool,
                    &namespace,
                    image,
                    &creds.id,
                    creds.keyfile_path(),
                )
                .await?;
            if !is_block {
                let (fs_type, flags) = match req
                    .volume_capability
                    .as_ref()
                    .and_then(|c| c.access_type.as_ref())
                {
                    Some(volume_capability::AccessType::Mount(m)) => {
                        (m.fs_type.clone(), m.mount_flags.clone())
                    }
                    _ => (String::new(), vec![]),
                };
                self.mounter
                    .mount_device(&device, &req.staging_target_path, &fs_type, &flags)
                    .await?;
            }
            info!(volume_id = %req.volume_id, device = %device, "rbd volume staged");
            return Ok(());
        }

        let path = context.get("subvolumePath").cloned().ok_or_else(|| {
            CephixError::InvalidArgument("volume context misses subvolumePath".to_string())
        })?;
        let fuse = context.get("mounter").map(String::as_str) == Some("fuse");
        let mut options: Vec<String> = if fuse {
            split_options(&cluster.cephfs.fuse_mount_options)
        } else {
            split_options(&cluster.cephfs.kernel_mount_options)
        };
        if readonly {
            options.push("ro".to_string());
        }
        if let Some(affinity) = cluster.crush_location_options(&self.driver.node_labels) {
            if !fuse {
                options.push(affinity);
            }
        }

        self.mounter
            .mount_cephfs(
                &mon_host,
                &path,
                &req.staging_target_path,
                &options,
                fuse,
                &creds.id,
                creds.keyfile_path(),
            )
            .await?;
        info!(volume_id = %req.volume_id, path = %path, "cephfs volume staged");
        Ok(())
    }

    async fn do_unstage(&self, req: &NodeUnstageVolumeRequest) -> Result<()> {
        self.mounter.unmount(&req.staging_target_path).await?;
        info!(volume_id = %req.volume_id, "volume unstaged");
        Ok(())
    }
}

fn split_options(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

#[tonic::async_trait]
impl Node for NodeService {
    #[instrument(skip(self, request))]
    async fn node_stage_volume(
        &self,
        request: Request<NodeStageVolumeRequest>,
    ) -> std::result::Result<Response<NodeStageVolumeResponse>, Status> {
        let req = request.into_inner();
        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("volume id is missing"));
        }
        if req.staging_target_path.is_empty() {
            return Err(Status::invalid_argument("staging target path is missing"));
        }
        if req.volume_capability.is_none() {
            return Err(Status::invalid_argument("volume capability is missing"));
        }

        let _lock = self
            .driver
            .volume_id_locks
            .try_acquire(&req.volume_id)
            .ok_or_else(|| operation_in_flight(&req.volume_id))?;

        self.do_stage(&req)
            .await
            .map(|_| Response::new(NodeStageVolumeResponse {}))
            .map_err(status_from)
    }

    #[instrument(skip(self, request))]
    async fn node_unstage_volume(
        &self,
        request: Request<NodeUnstageVolumeRequest>,
    ) -> std::result::Result<Response<NodeUnstageVolumeResponse>, Status> {
        let req = request.into_inner();
        if req.volume_id.is_empty() || req.staging_target_path.is_empty() {
            return Err(Status::invalid_argument(
                "volume id and staging target path are required",
            ));
        }

        let _lock = self
            .driver
            .volume_id_locks
            .try_acquire(&req.volume_id)
            .ok_or_else(|| operation_in_flight(&req.volume_id))?;

        self.do_unstage(&req)
            .await
            .map(|_| Response::new(NodeUnstageVolumeResponse {}))
            .map_err(status_from)
    }

    #[instrument(skip(self, request))]
    async fn node_publish_volume(
        &self,
        request: Request<NodePublishVolumeRequest>,
    ) -> std::result::Result<Response<NodePublishVolumeResponse>, Status> {
        let req = request.into_inner();
        if req.volume_id.is_empty() || req.target_path.is_empty() {
            return Err(Status::invalid_argument(
                "volume id and target path are required",
            ));
        }
        if req.staging_target_path.is_empty() {
            return Err(Status::invalid_argument("staging target path is missing"));
        }

        let _lock = self
            .driver
            .volume_id_locks
            .try_acquire(&req.volume_id)
            .ok_or_else(|| operation_in_flight(&req.volume_id))?;

        let readonly = req.readonly || req.volume_context.get("backingSnapshotID").is_some();
        self.mounter
            .bind_mount(&req.staging_target_path, &req.target_path, readonly)
            .await
            .map(|_| Response::new(NodePublishVolumeResponse {}))
            .map_err(status_from)
    }

    #[instrument(skip(self, request))]
    async fn node_unpublish_volume(
        &self,
        request: Request<NodeUnpublishVolumeRequest>,
    ) -> std::result::Result<Response<NodeUnpublishVolumeResponse>, Status> {
        let req = request.into_inner();
        if req.volume_id.is_empty() || req.target_path.is_empty() {
            return Err(Status::invalid_argument(
                "volume id and target path are required",
            ));
        }

        let _lock = self
            .driver
            .volume_id_locks
            .try_acquire(&req.volume_id)
            .ok_or_else(|| operation_in_flight(&req.volume_id))?;

        self.mounter
            .unmount(&req.target_path)
            .await
            .map(|_| Response::new(NodeUnpublishVolumeResponse {}))
            .map_err(status_from)
    }

    async fn node_get_info(
        &self,
        _request: Request<NodeGetInfoRequest>,
    ) -> std::result::Result<Response<NodeGetInfoResponse>, Status> {
        let topology = if self.driver.node_labels.is_empty() {
            None
        } else {
            Some(Topology {
                segments: self.driver.node_labels.clone(),
            })
        };
        Ok(Response::new(NodeGetInfoResponse {
            node_id: self.driver.node_id.clone(),
            max_volumes_per_node: 0,
            accessible_topology: topology,
        }))
    }

    async fn node_get_capabilities(
        &self,
        _request: Request<NodeGetCapabilitiesRequest>,
    ) -> std::result::Result<Response<NodeGetCapabilitiesResponse>, Status> {
        use cephix_proto::csi::node_service_capability::rpc::Type;
        let capability = |kind: Type| NodeServiceCapability {
            rpc: Some(node_service_capability::Rpc { r#type: kind as i32 }),
        };
        Ok(Response::new(NodeGetCapabilitiesResponse {
            capabilities: vec![
                capability(Type::StageUnstageVolume),
                capability(Type::ExpandVolume),
            ],
        }))
    }
}
