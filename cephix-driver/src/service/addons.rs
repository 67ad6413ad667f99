//! CSI-Addons services: volume replication, reclaim space, network
//! fencing, encryption key rotation and RBD volume groups.

use std::collections::HashMap;
use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::{info, instrument, warn};

use cephix_core::{
    parse_replication_params, resync_ready, CephixError, Connection, Credentials, CsiIdentifier,
    Journal, MirrorManager, NetworkFence as FenceController, RbdManager, Result,
};
use cephix_proto::addons::{
    ControllerReclaimSpaceRequest, ControllerReclaimSpaceResponse, CreateVolumeGroupRequest,
    CreateVolumeGroupResponse, DeleteVolumeGroupRequest, DeleteVolumeGroupResponse,
    DemoteVolumeRequest, DemoteVolumeResponse, DisableVolumeReplicationRequest,
    DisableVolumeReplicationResponse, EnableVolumeReplicationRequest,
    EnableVolumeReplicationResponse, EncryptionKeyRotateRequest, EncryptionKeyRotateResponse,
    FenceClusterNetworkRequest, FenceClusterNetworkResponse, GetVolumeGroupRequest,
    GetVolumeGroupResponse, GetVolumeReplicationInfoRequest, GetVolumeReplicationInfoResponse,
    ModifyVolumeGroupMembershipRequest, ModifyVolumeGroupMembershipResponse,
    NodeReclaimSpaceRequest, NodeReclaimSpaceResponse, PromoteVolumeRequest,
    PromoteVolumeResponse, ResyncVolumeRequest, ResyncVolumeResponse, UnfenceClusterNetworkRequest,
    UnfenceClusterNetworkResponse, VolumeGroup,
};
use cephix_proto::csi::volume_capability;
use cephix_proto::{
    EncryptionKeyRotation, NetworkFence, ReclaimSpaceController, ReclaimSpaceNode, Replication,
    VolumeGroupController,
};

use crate::driver::{Driver, VolumeBackend};
use crate::mount::Mounter;
use crate::service::{operation_in_flight, status_from, to_proto_timestamp};

/// An RBD volume resolved for an addons operation.
struct RbdVolume {
    conn: Connection,
    pool: String,
    namespace: String,
    image: String,
}

async fn resolve_rbd_volume(
    driver: &Driver,
    volume_id: &str,
    secrets: &HashMap<String, String>,
) -> Result<RbdVolume> {
    let (ident, cluster) = driver.decode(volume_id)?;
    let creds = Credentials::from_admin_secrets(secrets)?;
    let conn = driver.connect(cluster, &creds).await?;
    let resolved = driver.resolve_volume(&conn, cluster, ident).await?;
    match &resolved.backend {
        VolumeBackend::Rbd { pool, namespace, .. } => Ok(RbdVolume {
            pool: pool.clone(),
            namespace: namespace.clone(),
            image: resolved.attrs.backend_name.clone(),
            conn,
        }),
        VolumeBackend::CephFs { .. } => Err(CephixError::InvalidArgument(format!(
            "volume {volume_id} is not an RBD volume"
        ))),
    }
}

// =============================================================================
// REPLICATION
// =============================================================================

/// Volume replication service.
pub struct ReplicationService {
    driver: Arc<Driver>,
}

impl ReplicationService {
    pub fn new(driver: Arc<Driver>) -> Self {
        Self { driver }
    }
}

#[tonic::async_trait]
impl Replication for ReplicationService {
    #[instrument(skip(self, request))]
    async fn enable_volume_replication(
        &self,
        request: Request<EnableVolumeReplicationRequest>,
    ) -> std::result::Result<Response<EnableVolumeReplicationResponse>, Status> {
        let req = request.into_inner();
        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("volume id is missing"));
        }
        let _lock = self
            .driver
            .volume_id_locks
            .try_acquire(&req.volume_id)
            .ok_or_else(|| operation_in_flight(&req.volume_id))?;

        let result: Result<()> = async {
            let config = parse_replication_params(&req.parameters)?;
            let vol = resolve_rbd_volume(&self.driver, &req.volume_id, &req.secrets).await?;
            let mgr = MirrorManager::new(vol.conn.admin().rbd(), &vol.pool, &vol.namespace);
            mgr.enable(&vol.image, &config).await
        }
        .await;
        result
            .map(|_| Response::new(EnableVolumeReplicationResponse {}))
            .map_err(status_from)
    }

    #[instrument(skip(self, request))]
    async fn disable_volume_replication(
        &self,
        request: Request<DisableVolumeReplicationRequest>,
    ) -> std::result::Result<Response<DisableVolumeReplicationResponse>, Status> {
        let req = request.into_inner();
        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("volume id is missing"));
        }
        let _lock = self
            .driver
            .volume_id_locks
            .try_acquire(&req.volume_id)
            .ok_or_else(|| operation_in_flight(&req.volume_id))?;

        let result: Result<()> = async {
            let vol = resolve_rbd_volume(&self.driver, &req.volume_id, &req.secrets).await?;
            let mgr = MirrorManager::new(vol.conn.admin().rbd(), &vol.pool, &vol.namespace);
            let force = req.parameters.get("force").map(|v| v == "true").unwrap_or(false);
            mgr.disable(&vol.image, force).await
        }
        .await;
        result
            .map(|_| Response::new(DisableVolumeReplicationResponse {}))
            .map_err(status_from)
    }

    #[instrument(skip(self, request))]
    async fn promote_volume(
        &self,
        request: Request<PromoteVolumeRequest>,
    ) -> std::result::Result<Response<PromoteVolumeResponse>, Status> {
        let req = request.into_inner();
        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("volume id is missing"));
        }
        let _lock = self
            .driver
            .volume_id_locks
            .try_acquire(&req.volume_id)
            .ok_or_else(|| operation_in_flight(&req.volume_id))?;

        let result: Result<()> = async {
            let vol = resolve_rbd_volume(&self.driver, &req.volume_id, &req.secrets).await?;
            let mgr = MirrorManager::new(vol.conn.admin().rbd(), &vol.pool, &vol.namespace);
            let mirror_info = mgr.info(&vol.image).await?;
            if mirror_info.primary {
                // Idempotent: promotion of a primary is complete by
                // definition.
                return Ok(());
            }
            mgr.promote(&vol.image, req.force).await
        }
        .await;
        result
            .map(|_| Response::new(PromoteVolumeResponse {}))
            .map_err(status_from)
    }

    #[instrument(skip(self, request))]
    async fn demote_volume(
        &self,
        request: Request<DemoteVolumeRequest>,
    ) -> std::result::Result<Response<DemoteVolumeResponse>, Status> {
        let req = request.into_inner();
        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("volume id is missing"));
        }
        let _lock = self
            .driver
            .volume_id_locks
            .try_acquire(&req.volume_id)
            .ok_or_else(|| operation_in_flight(&req.volume_id))?;

        let result: Result<()> = async {
            let vol = resolve_rbd_volume(&self.driver, &req.volume_id, &req.secrets).await?;
            let mgr = MirrorManager::new(vol.conn.admin().rbd(), &vol.pool, &vol.namespace);
            mgr.demote(&vol.image).await
        }
        .await;
        result
            .map(|_| Response::new(DemoteVolumeResponse {}))
            .map_err(status_from)
    }

    #[instrument(skip(self, request))]
    async fn resync_volume(
        &self,
        request: Request<ResyncVolumeRequest>,
    ) -> std::result::Result<Response<ResyncVolumeResponse>, Status> {
        let req = request.into_inner();
        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("volume id is missing"));
        }
        let _lock = self
            .driver
            .volume_id_locks
            .try_acquire(&req.volume_id)
            .ok_or_else(|| operation_in_flight(&req.volume_id))?;

        let result: Result<bool> = async {
            let vol = resolve_rbd_volume(&self.driver, &req.volume_id, &req.secrets).await?;
            let mgr = MirrorManager::new(vol.conn.admin().rbd(), &vol.pool, &vol.namespace);
            mgr.resync(&vol.image).await?;
            let status = vol
                .conn
                .admin()
                .rbd()
                .mirror_status(&vol.pool, &vol.namespace, &vol.image)
                .await?;
            Ok(resync_ready(&status))
        }
        .await;
        result
            .map(|ready| Response::new(ResyncVolumeResponse { ready }))
            .map_err(status_from)
    }

    #[instrument(skip(self, request))]
    async fn get_volume_replication_info(
        &self,
        request: Request<GetVolumeReplicationInfoRequest>,
    ) -> std::result::Result<Response<GetVolumeReplicationInfoResponse>, Status> {
        let req = request.into_inner();
        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("volume id is missing"));
        }

        let result: Result<GetVolumeReplicationInfoResponse> = async {
            let vol = resolve_rbd_volume(&self.driver, &req.volume_id, &req.secrets).await?;
            let mgr = MirrorManager::new(vol.conn.admin().rbd(), &vol.pool, &vol.namespace);
            let mirror_info = mgr.info(&vol.image).await?;
            if !mirror_info.primary {
                return Err(CephixError::ImageNotPrimary(vol.image.clone()));
            }
            let sync = mgr.replication_info(&vol.image).await?;
            Ok(GetVolumeReplicationInfoResponse {
                last_sync_time: Some(to_proto_timestamp(sync.last_sync_time)),
                last_sync_duration: sync.last_sync_duration_secs.map(|secs| {
                    prost_types::Duration {
                        seconds: secs as i64,
                        nanos: ((secs - secs.trunc()) * 1e9) as i32,
                    }
                }),
                last_sync_bytes: sync.last_sync_bytes,
            })
        }
        .await;
        result.map(Response::new).map_err(status_from)
    }
}

// =============================================================================
// RECLAIM SPACE
// =============================================================================

/// Controller-side reclaim: sparsify the image on the cluster.
pub struct ReclaimSpaceControllerService {
    driver: Arc<Driver>,
}

impl ReclaimSpaceControllerService {
    pub fn new(driver: Arc<Driver>) -> Self {
        Self { driver }
    }
}

#[tonic::async_trait]
impl ReclaimSpaceController for ReclaimSpaceControllerService {
    #[instrument(skip(self, request))]
    async fn controller_reclaim_space(
        &self,
        request: Request<ControllerReclaimSpaceRequest>,
    ) -> std::result::Result<Response<ControllerReclaimSpaceResponse>, Status> {
        let req = request.into_inner();
        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("volume id is missing"));
        }
        let _lock = self
            .driver
            .volume_id_locks
            .try_acquire(&req.volume_id)
            .ok_or_else(|| operation_in_flight(&req.volume_id))?;

        let result: Result<()> = async {
            let vol = resolve_rbd_volume(&self.driver, &req.volume_id, &req.secrets).await?;
            let mgr = RbdManager::new(vol.conn.admin().rbd(), &vol.pool, &vol.namespace);
            mgr.sparsify(&vol.image).await
        }
        .await;
        result
            .map(|_| {
                Response::new(ControllerReclaimSpaceResponse {
                    pre_usage: None,
                    post_usage: None,
                })
            })
            .map_err(status_from)
    }
}

/// Node-side reclaim: trim the mounted filesystem.
pub struct ReclaimSpaceNodeService {
    driver: Arc<Driver>,
    mounter: Arc<dyn Mounter>,
}

impl ReclaimSpaceNodeService {
    pub fn new(driver: Arc<Driver>, mounter: Arc<dyn Mounter>) -> Self {
        Self { driver, mounter }
    }
}

#[tonic::async_trait]
impl ReclaimSpaceNode for ReclaimSpaceNodeService {
    #[instrument(skip(self, request))]
    async fn node_reclaim_space(
        &self,
        request: Request<NodeReclaimSpaceRequest>,
    ) -> std::result::Result<Response<NodeReclaimSpaceResponse>, Status> {
        let req = request.into_inner();
        if req.volume_id.is_empty() || req.volume_path.is_empty() {
            return Err(Status::invalid_argument(
                "volume id and volume path are required",
            ));
        }
        // Trimming a raw multi-writer block device would race other nodes.
        if let Some(cap) = &req.volume_capability {
            let is_block = matches!(
                cap.access_type,
                Some(volume_capability::AccessType::Block(_))
            );
            let multi_writer = cap.access_mode.as_ref().map(|m| m.mode)
                == Some(volume_capability::access_mode::Mode::MultiNodeMultiWriter as i32);
            if is_block && multi_writer {
                return Err(Status::invalid_argument(
                    "reclaim space is not supported on multi-writer block volumes",
                ));
            }
        }

        let _lock = self
            .driver
            .volume_id_locks
            .try_acquire(&req.volume_id)
            .ok_or_else(|| operation_in_flight(&req.volume_id))?;

        self.mounter
            .fstrim(&req.volume_path)
            .await
            .map(|_| Response::new(NodeReclaimSpaceResponse {}))
            .map_err(status_from)
    }
}

// =============================================================================
// NETWORK FENCE
// =============================================================================

/// Network fence service over the OSD blocklist.
pub struct NetworkFenceService {
    driver: Arc<Driver>,
}

impl NetworkFenceService {
    pub fn new(driver: Arc<Driver>) -> Self {
        Self { driver }
    }

    async fn connect(
        &self,
        parameters: &HashMap<String, String>,
        secrets: &HashMap<String, String>,
    ) -> Result<Connection> {
        let cluster_id = parameters
            .get("clusterID")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                CephixError::InvalidArgument("clusterID parameter is missing".to_string())
            })?;
        let cluster = self.driver.registry.get(cluster_id)?;
        let creds = Credentials::from_admin_secrets(secrets)?;
        self.driver.connect(cluster, &creds).await
    }
}

#[tonic::async_trait]
impl NetworkFence for NetworkFenceService {
    #[instrument(skip(self, request))]
    async fn fence_cluster_network(
        &self,
        request: Request<FenceClusterNetworkRequest>,
    ) -> std::result::Result<Response<FenceClusterNetworkResponse>, Status> {
        let req = request.into_inner();
        let result: Result<()> = async {
            let conn = self.connect(&req.parameters, &req.secrets).await?;
            FenceController::new(conn.admin().osd()).fence(&req.cidrs).await
        }
        .await;
        result
            .map(|_| Response::new(FenceClusterNetworkResponse {}))
            .map_err(status_from)
    }

    #[instrument(skip(self, request))]
    async fn unfence_cluster_network(
        &self,
        request: Request<UnfenceClusterNetworkRequest>,
    ) -> std::result::Result<Response<UnfenceClusterNetworkResponse>, Status> {
        let req = request.into_inner();
        let result: Result<()> = async {
            let conn = self.connect(&req.parameters, &req.secrets).await?;
            FenceController::new(conn.admin().osd()).unfence(&req.cidrs).await
        }
        .await;
        result
            .map(|_| Response::new(UnfenceClusterNetworkResponse {}))
            .map_err(status_from)
    }
}

// =============================================================================
// ENCRYPTION KEY ROTATION
// =============================================================================

/// Encryption key rotation service.
pub struct EncryptionKeyRotationService {
    driver: Arc<Driver>,
}

impl EncryptionKeyRotationService {
    pub fn new(driver: Arc<Driver>) -> Self {
        Self { driver }
    }
}

#[tonic::async_trait]
impl EncryptionKeyRotation for EncryptionKeyRotationService {
    #[instrument(skip(self, request))]
    async fn encryption_key_rotate(
        &self,
        request: Request<EncryptionKeyRotateRequest>,
    ) -> std::result::Result<Response<EncryptionKeyRotateResponse>, Status> {
        let req = request.into_inner();
        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("volume id is missing"));
        }
        let _lock = self
            .driver
            .volume_id_locks
            .try_acquire(&req.volume_id)
            .ok_or_else(|| operation_in_flight(&req.volume_id))?;

        let result: Result<()> = async {
            let vol = resolve_rbd_volume(&self.driver, &req.volume_id, &req.secrets).await?;
            let mgr = RbdManager::new(vol.conn.admin().rbd(), &vol.pool, &vol.namespace);
            mgr.rotate_encryption_key(&vol.image).await
        }
        .await;
        result
            .map(|_| Response::new(EncryptionKeyRotateResponse {}))
            .map_err(status_from)
    }
}

// =============================================================================
// VOLUME GROUPS (RBD)
// =============================================================================

/// RBD volume-group service.
pub struct VolumeGroupService {
    driver: Arc<Driver>,
}

impl VolumeGroupService {
    pub fn new(driver: Arc<Driver>) -> Self {
        Self { driver }
    }

    /// Resolve a group handle into its journal home and member map.
    async fn resolve_group(
        &self,
        group_id: &str,
        secrets: &HashMap<String, String>,
    ) -> Result<(Connection, String, String, CsiIdentifier, cephix_core::JournalAttrs, HashMap<String, String>)>
    {
        let (ident, cluster) = self.driver.decode(group_id)?;
        let creds = Credentials::from_admin_secrets(secrets)?;
        let conn = self.driver.connect(cluster, &creds).await?;
        let backend = self
            .driver
            .backend_by_location(&conn, cluster, ident.location_id)
            .await?;
        let (pool, namespace) = match &backend {
            VolumeBackend::Rbd { pool, namespace, .. } => (pool.clone(), namespace.clone()),
            VolumeBackend::CephFs { .. } => {
                return Err(CephixError::InvalidArgument(format!(
                    "volume group {group_id} does not point at an RBD pool"
                )));
            }
        };
        let journal = Journal::groups();
        let attrs = journal
            .get_attributes(conn.admin().omap(), &pool, &namespace, &ident.object_uuid)
            .await?;
        let mapping = journal
            .get_volumes_mapping(conn.admin().omap(), &pool, &namespace, &ident.object_uuid)
            .await?;
        Ok((conn, pool, namespace, ident, attrs, mapping))
    }

    fn group_response(
        group_id: &str,
        mapping: &HashMap<String, String>,
    ) -> Option<VolumeGroup> {
        let mut volume_ids: Vec<String> = mapping.keys().cloned().collect();
        volume_ids.sort_unstable();
        Some(VolumeGroup {
            volume_group_id: group_id.to_string(),
            volume_ids,
            volume_group_context: HashMap::new(),
        })
    }
}

#[tonic::async_trait]
impl VolumeGroupController for VolumeGroupService {
    #[instrument(skip(self, request), fields(name))]
    async fn create_volume_group(
        &self,
        request: Request<CreateVolumeGroupRequest>,
    ) -> std::result::Result<Response<CreateVolumeGroupResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("name", req.name.as_str());
        if req.name.is_empty() {
            return Err(Status::invalid_argument("volume group name is missing"));
        }

        let _name_lock = self
            .driver
            .group_name_locks
            .try_acquire(&req.name)
            .ok_or_else(|| operation_in_flight(&req.name))?;

        let result: Result<CreateVolumeGroupResponse> = async {
            let cluster_id = req
                .parameters
                .get("clusterID")
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    CephixError::InvalidArgument("clusterID parameter is missing".to_string())
                })?;
            let pool = req
                .parameters
                .get("pool")
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    CephixError::InvalidArgument("pool parameter is missing".to_string())
                })?;
            let cluster = self.driver.registry.get(cluster_id)?;
            let creds = Credentials::from_admin_secrets(&req.secrets)?;
            let conn = self.driver.connect(cluster, &creds).await?;
            let backend = self.driver.rbd_backend(&conn, cluster, pool).await?;
            let (pool_id, namespace) = match &backend {
                VolumeBackend::Rbd { pool_id, namespace, .. } => (*pool_id, namespace.clone()),
                VolumeBackend::CephFs { .. } => unreachable!("rbd_backend returns rbd"),
            };
            let omap = conn.admin().omap();
            let journal = Journal::groups();

            let reservation = match journal
                .check_reservation(omap, pool, &namespace, &req.name, None)
                .await?
            {
                Some(existing) => existing,
                None => {
                    journal
                        .reserve_name(
                            omap,
                            pool,
                            &namespace,
                            &cephix_core::ReserveRequest {
                                request_name: &req.name,
                                name_prefix: "csi-group",
                                cluster_name: self.driver.cluster_name.as_deref(),
                                ..Default::default()
                            },
                        )
                        .await?
                }
            };

            conn.admin()
                .rbd()
                .group_create(pool, &namespace, &reservation.backend_name)
                .await?;

            let mut mapping = HashMap::new();
            for volume_id in &req.volume_ids {
                let (member_ident, member_cluster) = self.driver.decode(volume_id)?;
                if member_cluster.cluster_id != cluster.cluster_id {
                    return Err(CephixError::InvalidArgument(
                        "group members must live on one cluster".to_string(),
                    ));
                }
                let resolved = self
                    .driver
                    .resolve_volume(&conn, cluster, member_ident)
                    .await?;
                conn.admin()
                    .rbd()
                    .group_image_add(
                        pool,
                        &namespace,
                        &reservation.backend_name,
                        &resolved.attrs.backend_name,
                    )
                    .await?;
                mapping.insert(volume_id.clone(), resolved.attrs.backend_name);
            }
            if !mapping.is_empty() {
                journal
                    .add_volumes_mapping(omap, pool, &namespace, &reservation.uuid, &mapping)
                    .await?;
            }

            let group_id =
                CsiIdentifier::new(&cluster.cluster_id, pool_id, &reservation.uuid).encode()?;
            info!(group_id = %group_id, members = mapping.len(), "volume group ready");
            Ok(CreateVolumeGroupResponse {
                volume_group: Self::group_response(&group_id, &mapping),
            })
        }
        .await;
        result.map(Response::new).map_err(status_from)
    }

    #[instrument(skip(self, request))]
    async fn delete_volume_group(
        &self,
        request: Request<DeleteVolumeGroupRequest>,
    ) -> std::result::Result<Response<DeleteVolumeGroupResponse>, Status> {
        let req = request.into_inner();
        if req.volume_group_id.is_empty() {
            return Err(Status::invalid_argument("volume group id is missing"));
        }

        let _id_lock = self
            .driver
            .volume_id_locks
            .try_acquire(&req.volume_group_id)
            .ok_or_else(|| operation_in_flight(&req.volume_group_id))?;

        let result: Result<()> = async {
            let (conn, pool, namespace, ident, attrs, mapping) =
                match self.resolve_group(&req.volume_group_id, &req.secrets).await {
                    Ok(resolved) => resolved,
                    Err(e) if e.is_not_found() => return Ok(()),
                    Err(e) => return Err(e),
                };
            if !mapping.is_empty() {
                return Err(CephixError::FailedPrecondition(format!(
                    "volume group {} still has {} members",
                    req.volume_group_id,
                    mapping.len()
                )));
            }
            match conn
                .admin()
                .rbd()
                .group_remove(&pool, &namespace, &attrs.backend_name)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
            Journal::groups()
                .undo_reservation(
                    conn.admin().omap(),
                    &pool,
                    &namespace,
                    &attrs.request_name,
                    &ident.object_uuid,
                )
                .await
        }
        .await;
        result
            .map(|_| Response::new(DeleteVolumeGroupResponse {}))
            .map_err(status_from)
    }

    #[instrument(skip(self, request))]
    async fn modify_volume_group_membership(
        &self,
        request: Request<ModifyVolumeGroupMembershipRequest>,
    ) -> std::result::Result<Response<ModifyVolumeGroupMembershipResponse>, Status> {
        let req = request.into_inner();
        if req.volume_group_id.is_empty() {
            return Err(Status::invalid_argument("volume group id is missing"));
        }

        let _id_lock = self
            .driver
            .volume_id_locks
            .try_acquire(&req.volume_group_id)
            .ok_or_else(|| operation_in_flight(&req.volume_group_id))?;

        let result: Result<ModifyVolumeGroupMembershipResponse> = async {
            let (conn, pool, namespace, ident, attrs, mapping) = self
                .resolve_group(&req.volume_group_id, &req.secrets)
                .await?;
            let (_, cluster) = self.driver.decode(&req.volume_group_id)?;
            let journal = Journal::groups();
            let omap = conn.admin().omap();

            // Diff the requested membership against the recorded one and
            // apply only the delta, so repeating the call is a no-op.
            let desired: std::collections::HashSet<&String> = req.volume_ids.iter().collect();
            let current: std::collections::HashSet<&String> = mapping.keys().collect();

            let mut new_mapping = mapping.clone();
            for (volume_id, image) in &mapping {
                if !desired.contains(volume_id) {
                    conn.admin()
                        .rbd()
                        .group_image_remove(&pool, &namespace, &attrs.backend_name, image)
                        .await?;
                    journal
                        .remove_volumes_mapping(
                            omap,
                            &pool,
                            &namespace,
                            &ident.object_uuid,
                            &[volume_id.clone()],
                        )
                        .await?;
                    new_mapping.remove(volume_id);
                }
            }

            for volume_id in &req.volume_ids {
                if current.contains(volume_id) {
                    continue;
                }
                let (member_ident, _) = self.driver.decode(volume_id)?;
                let resolved = self
                    .driver
                    .resolve_volume(&conn, cluster, member_ident)
                    .await?;
                conn.admin()
                    .rbd()
                    .group_image_add(
                        &pool,
                        &namespace,
                        &attrs.backend_name,
                        &resolved.attrs.backend_name,
                    )
                    .await?;
                let mut entry = HashMap::new();
                entry.insert(volume_id.clone(), resolved.attrs.backend_name.clone());
                journal
                    .add_volumes_mapping(omap, &pool, &namespace, &ident.object_uuid, &entry)
                    .await?;
                new_mapping.insert(volume_id.clone(), resolved.attrs.backend_name);
            }

            Ok(ModifyVolumeGroupMembershipResponse {
                volume_group: Self::group_response(&req.volume_group_id, &new_mapping),
            })
        }
        .await;
        result.map(Response::new).map_err(status_from)
    }

    #[instrument(skip(self, request))]
    async fn get_volume_group(
        &self,
        request: Request<GetVolumeGroupRequest>,
    ) -> std::result::Result<Response<GetVolumeGroupResponse>, Status> {
        let req = request.into_inner();
        if req.volume_group_id.is_empty() {
            return Err(Status::invalid_argument("volume group id is missing"));
        }

        let result: Result<GetVolumeGroupResponse> = async {
            let (_conn, _pool, _namespace, _ident, _attrs, mapping) = self
                .resolve_group(&req.volume_group_id, &req.secrets)
                .await?;
            Ok(GetVolumeGroupResponse {
                volume_group: Self::group_response(&req.volume_group_id, &mapping),
            })
        }
        .await;
        result.map(Response::new).map_err(status_from)
    }
}
