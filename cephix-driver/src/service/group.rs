//! CSI GroupController service: crash-consistent snapshots of volume
//! groups spanning CephFS filesystems.

use std::collections::HashMap;
use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::{info, instrument, warn};

use cephix_core::locks::OpLockGuard;
use cephix_core::{
    CephixError, ClusterInfo, Connection, Credentials, CsiIdentifier, GroupMember,
    GroupSnapshotEngine, Journal, OpClass, Result,
};
use cephix_proto::csi::{
    group_controller_service_capability, CreateVolumeGroupSnapshotRequest,
    CreateVolumeGroupSnapshotResponse, DeleteVolumeGroupSnapshotRequest,
    DeleteVolumeGroupSnapshotResponse, GetVolumeGroupSnapshotRequest,
    GetVolumeGroupSnapshotResponse, GroupControllerGetCapabilitiesRequest,
    GroupControllerGetCapabilitiesResponse, GroupControllerServiceCapability, Snapshot,
    VolumeGroupSnapshot,
};
use cephix_proto::GroupController;

use crate::driver::Driver;
use crate::service::{operation_in_flight, status_from, to_proto_timestamp};

/// One resolved member of a group request.
struct ResolvedMember {
    member: GroupMember,
    fs_id: i64,
    metadata_pool: String,
}

/// GroupController service implementation.
pub struct GroupControllerService {
    driver: Arc<Driver>,
}

impl GroupControllerService {
    pub fn new(driver: Arc<Driver>) -> Self {
        Self { driver }
    }

    /// Resolve every source volume of the request; all must be CephFS
    /// subvolumes on one cluster.
    async fn resolve_members(
        &self,
        conn: &Connection,
        cluster: &ClusterInfo,
        volume_ids: &[String],
    ) -> Result<Vec<ResolvedMember>> {
        let mut members = Vec::with_capacity(volume_ids.len());
        for volume_id in volume_ids {
            let (ident, member_cluster) = self.driver.decode(volume_id)?;
            if member_cluster.cluster_id != cluster.cluster_id {
                return Err(CephixError::InvalidArgument(
                    "group members must live on one cluster".to_string(),
                ));
            }
            let resolved = self.driver.resolve_volume(conn, cluster, ident).await?;
            let (fs_name, fs_id, metadata_pool) = match &resolved.backend {
                crate::driver::VolumeBackend::CephFs {
                    fs_name,
                    fs_id,
                    metadata_pool,
                } => (fs_name.clone(), *fs_id, metadata_pool.clone()),
                crate::driver::VolumeBackend::Rbd { .. } => {
                    return Err(CephixError::InvalidArgument(format!(
                        "volume {volume_id} is not a filesystem volume"
                    )));
                }
            };
            let subvol_info = conn
                .admin()
                .fs()
                .subvolume_info(&fs_name, cluster.subvolume_group(), &resolved.attrs.backend_name)
                .await?;
            members.push(ResolvedMember {
                member: GroupMember {
                    volume_id: volume_id.clone(),
                    fs_name,
                    subvolume: resolved.attrs.backend_name.clone(),
                    path: subvol_info.path,
                },
                fs_id,
                metadata_pool,
            });
        }
        Ok(members)
    }

    /// Lock every member volume against concurrent snapshots.
    fn lock_members(&self, volume_ids: &[String]) -> std::result::Result<Vec<OpLockGuard>, Status> {
        let mut guards = Vec::with_capacity(volume_ids.len());
        for volume_id in volume_ids {
            match self.driver.op_locks.try_acquire(OpClass::SnapCreate, volume_id) {
                Some(guard) => guards.push(guard),
                None => return Err(operation_in_flight(volume_id)),
            }
        }
        Ok(guards)
    }

    async fn do_create(
        &self,
        req: &CreateVolumeGroupSnapshotRequest,
    ) -> Result<CreateVolumeGroupSnapshotResponse> {
        let mut volume_ids = req.source_volume_ids.clone();
        volume_ids.sort_unstable();
        volume_ids.dedup();

        let (_, cluster) = self.driver.decode(&volume_ids[0])?;
        let creds = Credentials::from_admin_secrets(&req.secrets)?;
        let conn = self.driver.connect(cluster, &creds).await?;

        let resolved = self.resolve_members(&conn, cluster, &volume_ids).await?;
        // The group journal lives in the metadata pool of the (sorted)
        // first member's filesystem; the location id of the group handle
        // points there as well.
        let journal_pool = resolved[0].metadata_pool.clone();
        let group_location = resolved[0].fs_id;
        let fs_ids: HashMap<String, i64> = resolved
            .iter()
            .map(|m| (m.member.volume_id.clone(), m.fs_id))
            .collect();
        let member_pools: HashMap<String, String> = resolved
            .iter()
            .map(|m| (m.member.volume_id.clone(), m.metadata_pool.clone()))
            .collect();
        let members: Vec<GroupMember> = resolved.into_iter().map(|m| m.member).collect();

        let engine = GroupSnapshotEngine::new(
            conn.admin(),
            &journal_pool,
            "",
            cluster.subvolume_group(),
        );
        let result = engine.create(&req.name, &members).await?;

        // Register every member snapshot in the snapshot journal so it can
        // be introspected (and deleted) individually. Reservations use the
        // snapshot's own UUID, so a retry rewrites the same entries.
        let omap = conn.admin().omap();
        for (member, snap) in members.iter().zip(result.members.iter()) {
            let request_name = format!("{}-{}", req.name, snap.snap_uuid);
            let pool = member_pools
                .get(&member.volume_id)
                .map(String::as_str)
                .unwrap_or(journal_pool.as_str());
            self.driver
                .snapshot_journal
                .reserve_name(
                    omap,
                    pool,
                    "",
                    &cephix_core::ReserveRequest {
                        request_name: &request_name,
                        name_prefix: &self.driver.snapshot_name_prefix,
                        parent_name: Some(&member.subvolume),
                        cluster_name: self.driver.cluster_name.as_deref(),
                        reserved_id: Some(&snap.snap_uuid),
                        ..Default::default()
                    },
                )
                .await?;
        }

        let group_snapshot_id =
            CsiIdentifier::new(&cluster.cluster_id, group_location, &result.group_uuid).encode()?;
        let now = chrono::Utc::now();
        let snapshots = result
            .members
            .iter()
            .map(|snap| {
                let fs_id = fs_ids.get(&snap.volume_id).copied().unwrap_or(group_location);
                Ok(Snapshot {
                    size_bytes: 0,
                    snapshot_id: CsiIdentifier::new(&cluster.cluster_id, fs_id, &snap.snap_uuid)
                        .encode()?,
                    source_volume_id: snap.volume_id.clone(),
                    creation_time: Some(to_proto_timestamp(now)),
                    ready_to_use: true,
                    group_snapshot_id: group_snapshot_id.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            group_snapshot_id = %group_snapshot_id,
            members = snapshots.len(),
            "volume group snapshot ready"
        );
        Ok(CreateVolumeGroupSnapshotResponse {
            group_snapshot: Some(VolumeGroupSnapshot {
                group_snapshot_id,
                snapshots,
                creation_time: Some(to_proto_timestamp(now)),
                ready_to_use: true,
            }),
        })
    }

    async fn do_delete(&self, req: &DeleteVolumeGroupSnapshotRequest) -> Result<()> {
        let (ident, cluster) = match self.driver.decode(&req.group_snapshot_id) {
            Ok(decoded) => decoded,
            Err(CephixError::InvalidArgument(_)) => {
                warn!(group_snapshot_id = %req.group_snapshot_id, "delete of undecodable group id");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let creds = Credentials::from_admin_secrets(&req.secrets)?;
        let conn = self.driver.connect(cluster, &creds).await?;
        let backend = match self
            .driver
            .backend_by_location(&conn, cluster, ident.location_id)
            .await
        {
            Ok(backend) => backend,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        let pool = backend.journal_pool().to_string();
        let omap = conn.admin().omap();
        let group_journal = Journal::groups();

        let attrs = match group_journal
            .get_attributes(omap, &pool, "", &ident.object_uuid)
            .await
        {
            Ok(attrs) => attrs,
            Err(CephixError::KeyNotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        let mapping = group_journal
            .get_volumes_mapping(omap, &pool, "", &ident.object_uuid)
            .await?;

        // Resolve the members still known to the volume journal, collecting
        // their snapshot journal entries along the way; a member whose
        // volume vanished can no longer be located and is skipped.
        let mut members = Vec::new();
        for (volume_id, snap_uuid) in &mapping {
            match self.driver.decode(volume_id) {
                Ok((member_ident, member_cluster)) => {
                    match self
                        .driver
                        .resolve_volume(&conn, member_cluster, member_ident)
                        .await
                    {
                        Ok(resolved) => {
                            if let crate::driver::VolumeBackend::CephFs { fs_name, .. } =
                                &resolved.backend
                            {
                                members.push(GroupMember {
                                    volume_id: volume_id.clone(),
                                    fs_name: fs_name.clone(),
                                    subvolume: resolved.attrs.backend_name.clone(),
                                    path: String::new(),
                                });
                            }
                            let member_pool = resolved.backend.journal_pool();
                            match self
                                .driver
                                .snapshot_journal
                                .get_attributes(omap, member_pool, "", snap_uuid)
                                .await
                            {
                                Ok(snap_attrs) => {
                                    self.driver
                                        .snapshot_journal
                                        .undo_reservation(
                                            omap,
                                            member_pool,
                                            "",
                                            &snap_attrs.request_name,
                                            snap_uuid,
                                        )
                                        .await?;
                                }
                                Err(CephixError::KeyNotFound(_)) => {}
                                Err(e) => return Err(e),
                            }
                        }
                        Err(e) if e.is_not_found() => {
                            warn!(volume_id = %volume_id, "group member volume no longer resolvable");
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(_) => warn!(volume_id = %volume_id, "unparseable group member id"),
            }
        }

        let engine =
            GroupSnapshotEngine::new(conn.admin(), &pool, "", cluster.subvolume_group());
        engine
            .delete(&attrs.request_name, &ident.object_uuid, &members)
            .await
    }

    async fn do_get(
        &self,
        req: &GetVolumeGroupSnapshotRequest,
    ) -> Result<GetVolumeGroupSnapshotResponse> {
        let (ident, cluster) = self.driver.decode(&req.group_snapshot_id)?;
        let creds = Credentials::from_admin_secrets(&req.secrets)?;
        let conn = self.driver.connect(cluster, &creds).await?;
        let backend = self
            .driver
            .backend_by_location(&conn, cluster, ident.location_id)
            .await?;
        let pool = backend.journal_pool().to_string();
        let omap = conn.admin().omap();
        let group_journal = Journal::groups();

        // Existence check before assembling the member list.
        group_journal
            .get_attributes(omap, &pool, "", &ident.object_uuid)
            .await?;
        let mapping = group_journal
            .get_volumes_mapping(omap, &pool, "", &ident.object_uuid)
            .await?;

        let now = chrono::Utc::now();
        let snapshots = mapping
            .iter()
            .map(|(volume_id, snap_uuid)| {
                Ok(Snapshot {
                    size_bytes: 0,
                    snapshot_id: CsiIdentifier::new(
                        &cluster.cluster_id,
                        ident.location_id,
                        snap_uuid,
                    )
                    .encode()?,
                    source_volume_id: volume_id.clone(),
                    creation_time: Some(to_proto_timestamp(now)),
                    ready_to_use: true,
                    group_snapshot_id: req.group_snapshot_id.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(GetVolumeGroupSnapshotResponse {
            group_snapshot: Some(VolumeGroupSnapshot {
                group_snapshot_id: req.group_snapshot_id.clone(),
                snapshots,
                creation_time: Some(to_proto_timestamp(now)),
                ready_to_use: true,
            }),
        })
    }
}

#[tonic::async_trait]
impl GroupController for GroupControllerService {
    async fn group_controller_get_capabilities(
        &self,
        _request: Request<GroupControllerGetCapabilitiesRequest>,
    ) -> std::result::Result<Response<GroupControllerGetCapabilitiesResponse>, Status> {
        use cephix_proto::csi::group_controller_service_capability::rpc::Type;
        Ok(Response::new(GroupControllerGetCapabilitiesResponse {
            capabilities: vec![GroupControllerServiceCapability {
                rpc: Some(group_controller_service_capability::Rpc {
                    r#type: Type::CreateDeleteGetVolumeGroupSnapshot as i32,
                }),
            }],
        }))
    }

    #[instrument(skip(self, request), fields(name))]
    async fn create_volume_group_snapshot(
        &self,
        request: Request<CreateVolumeGroupSnapshotRequest>,
    ) -> std::result::Result<Response<CreateVolumeGroupSnapshotResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("name", req.name.as_str());

        if req.name.is_empty() {
            return Err(Status::invalid_argument("group snapshot name is missing"));
        }
        if req.source_volume_ids.is_empty() {
            return Err(Status::invalid_argument("source volume ids are missing"));
        }

        let _name_lock = self
            .driver
            .snapshot_name_locks
            .try_acquire(&req.name)
            .ok_or_else(|| operation_in_flight(&req.name))?;
        let _member_locks = self.lock_members(&req.source_volume_ids)?;

        self.do_create(&req)
            .await
            .map(Response::new)
            .map_err(status_from)
    }

    #[instrument(skip(self, request))]
    async fn delete_volume_group_snapshot(
        &self,
        request: Request<DeleteVolumeGroupSnapshotRequest>,
    ) -> std::result::Result<Response<DeleteVolumeGroupSnapshotResponse>, Status> {
        let req = request.into_inner();
        if req.group_snapshot_id.is_empty() {
            return Err(Status::invalid_argument("group snapshot id is missing"));
        }

        let _id_lock = self
            .driver
            .snapshot_id_locks
            .try_acquire(&req.group_snapshot_id)
            .ok_or_else(|| operation_in_flight(&req.group_snapshot_id))?;

        self.do_delete(&req)
            .await
            .map(|_| Response::new(DeleteVolumeGroupSnapshotResponse {}))
            .map_err(status_from)
    }

    #[instrument(skip(self, request))]
    async fn get_volume_group_snapshot(
        &self,
        request: Request<GetVolumeGroupSnapshotRequest>,
    ) -> std::result::Result<Response<GetVolumeGroupSnapshotResponse>, Status> {
        let req = request.into_inner();
        if req.group_snapshot_id.is_empty() {
            return Err(Status::invalid_argument("group snapshot id is missing"));
        }

        self.do_get(&req)
            .await
            .map(Response::new)
            .map_err(status_from)
    }
}
