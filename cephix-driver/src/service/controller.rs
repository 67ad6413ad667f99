//! CSI Controller service: provisioning, deletion, expansion and
//! snapshots for CephFS subvolumes, NFS-exported subvolumes and RBD
//! images.
//!
//! Every handler follows the same shape: validate, take the locks the
//! operation requires, resolve identifiers through the journal, drive the
//! backend managers, and translate the outcome at the very end. In-progress
//! backend operations surface `ABORTED` with the reservation kept so a CO
//! retry resumes instead of restarting.

use std::collections::HashMap;
use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::{info, instrument, warn};

use cephix_core::{
    round_up_to_grain, CephFsSnapshots, CephixError, CloneOrchestrator, ClusterInfo, Connection,
    Credentials, CsiIdentifier, FlattenMode, NfsExporter, OpClass, RbdManager, RbdSnapshots,
    Result, SnapshotEngine, SubvolumeManager,
};
use cephix_proto::csi::{
    validate_volume_capabilities_response, volume_content_source, ControllerGetCapabilitiesRequest,
    ControllerGetCapabilitiesResponse, ControllerExpandVolumeRequest,
    ControllerExpandVolumeResponse, ControllerServiceCapability, CreateSnapshotRequest,
    CreateSnapshotResponse, CreateVolumeRequest, CreateVolumeResponse, DeleteSnapshotRequest,
    DeleteSnapshotResponse, DeleteVolumeRequest, DeleteVolumeResponse, Snapshot,
    ValidateVolumeCapabilitiesRequest, ValidateVolumeCapabilitiesResponse, Volume,
    controller_service_capability,
};
use cephix_proto::Controller;

use crate::driver::{
    Driver, VolumeBackend, ATTR_BACKEND, ATTR_BACKING_SNAPSHOT_ID, ATTR_BACKING_SNAPSHOT_PARENT,
};
use crate::service::{
    all_read_only, operation_in_flight, status_from, to_proto_timestamp, validate_capabilities,
};

/// Parameter names understood by CreateVolume.
const PARAM_CLUSTER_ID: &str = "clusterID";
const PARAM_FS_NAME: &str = "fsName";
const PARAM_POOL: &str = "pool";
const PARAM_MOUNTER: &str = "mounter";
const PARAM_NFS_CLUSTER: &str = "nfsCluster";
const PARAM_BACKING_SNAPSHOT: &str = "backingSnapshot";
const PARAM_ENCRYPTION_KMS: &str = "encryptionKMSID";
const PARAM_FLATTEN_MODE: &str = "flattenMode";

/// Default capacity when the CO leaves the range empty.
const DEFAULT_VOLUME_SIZE: u64 = 1 << 30;

/// Content source of a new volume, resolved to backend names.
enum ContentSource {
    Volume {
        backend_name: String,
    },
    Snapshot {
        snap_uuid: String,
        snap_name: String,
        parent_name: String,
        csi_id: String,
    },
}

impl ContentSource {
    fn parent_name(&self) -> &str {
        match self {
            ContentSource::Volume { backend_name } => backend_name,
            ContentSource::Snapshot { snap_name, .. } => snap_name,
        }
    }
}

/// Controller service implementation.
pub struct ControllerService {
    driver: Arc<Driver>,
}

impl ControllerService {
    pub fn new(driver: Arc<Driver>) -> Self {
        Self { driver }
    }

    fn cluster_from_params<'a>(
        &'a self,
        parameters: &HashMap<String, String>,
    ) -> Result<&'a ClusterInfo> {
        let cluster_id = parameters
            .get(PARAM_CLUSTER_ID)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                CephixError::InvalidArgument("clusterID parameter is missing".to_string())
            })?;
        self.driver.registry.get(cluster_id)
    }

    /// Resolve the request's content source against the same cluster.
    async fn resolve_source(
        &self,
        conn: &Connection,
        cluster: &ClusterInfo,
        req: &CreateVolumeRequest,
    ) -> Result<Option<ContentSource>> {
        let Some(source) = &req.volume_content_source else {
            return Ok(None);
        };
        match &source.r#type {
            Some(volume_content_source::Type::Volume(v)) => {
                let (ident, src_cluster) = self.driver.decode(&v.volume_id)?;
                if src_cluster.cluster_id != cluster.cluster_id {
                    return Err(CephixError::InvalidArgument(
                        "source volume lives on a different cluster".to_string(),
                    ));
                }
                let resolved = self.driver.resolve_volume(conn, cluster, ident).await?;
                Ok(Some(ContentSource::Volume {
                    backend_name: resolved.attrs.backend_name,
                }))
            }
            Some(volume_content_source::Type::Snapshot(s)) => {
                let (ident, src_cluster) = self.driver.decode(&s.snapshot_id)?;
                if src_cluster.cluster_id != cluster.cluster_id {
                    return Err(CephixError::InvalidArgument(
                        "source snapshot lives on a different cluster".to_string(),
                    ));
                }
                let resolved = self.driver.resolve_snapshot(conn, cluster, ident).await?;
                let parent_name = resolved.attrs.parent_name.clone().ok_or_else(|| {
                    CephixError::Internal(format!(
                        "snapshot {} has no recorded parent",
                        s.snapshot_id
                    ))
                })?;
                Ok(Some(ContentSource::Snapshot {
                    snap_uuid: resolved.ident.object_uuid.clone(),
                    snap_name: resolved.attrs.backend_name.clone(),
                    parent_name,
                    csi_id: s.snapshot_id.clone(),
                }))
            }
            None => Err(CephixError::InvalidArgument(
                "volume content source carries no type".to_string(),
            )),
        }
    }

    /// Lock the content source against deletion for the duration of the
    /// clone.
    fn lock_source(
        &self,
        req: &CreateVolumeRequest,
    ) -> std::result::Result<Option<cephix_core::locks::OpLockGuard>, Status> {
        let Some(source) = &req.volume_content_source else {
            return Ok(None);
        };
        match &source.r#type {
            Some(volume_content_source::Type::Volume(v)) => self
                .driver
                .op_locks
                .try_acquire(OpClass::Clone, &v.volume_id)
                .map(Some)
                .ok_or_else(|| operation_in_flight(&v.volume_id)),
            Some(volume_content_source::Type::Snapshot(s)) => self
                .driver
                .op_locks
                .try_acquire(OpClass::Restore, &s.snapshot_id)
                .map(Some)
                .ok_or_else(|| operation_in_flight(&s.snapshot_id)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // CreateVolume (CephFS / NFS)
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    async fn provision_cephfs(
        &self,
        conn: &Connection,
        backend: &VolumeBackend,
        subvols: &SubvolumeManager<'_>,
        orch: &CloneOrchestrator<'_>,
        uuid: &str,
        backend_name: &str,
        source: &Option<ContentSource>,
        backing: bool,
        size: u64,
    ) -> Result<()> {
        let omap = conn.admin().omap();
        let pool = backend.journal_pool();
        match (backing, source) {
            (true, Some(ContentSource::Snapshot { snap_uuid, parent_name, csi_id, .. })) => {
                // A snapshot-backed volume creates no subvolume; it pins
                // the snapshot through the reftracker instead.
                self.driver
                    .reftracker
                    .add_ref(omap, pool, "", snap_uuid, uuid)
                    .await?;
                self.driver
                    .volume_journal
                    .store_attribute(omap, pool, "", uuid, ATTR_BACKING_SNAPSHOT_ID, csi_id)
                    .await?;
                self.driver
                    .volume_journal
                    .store_attribute(
                        omap,
                        pool,
                        "",
                        uuid,
                        ATTR_BACKING_SNAPSHOT_PARENT,
                        parent_name,
                    )
                    .await?;
            }
            (true, _) => {
                return Err(CephixError::InvalidArgument(
                    "backingSnapshot requires a snapshot content source".to_string(),
                ));
            }
            (false, None) => subvols.create(backend_name, size).await?,
            (false, Some(ContentSource::Volume { backend_name: src })) => {
                orch.clone_from_subvolume(subvols, src, backend_name, size).await?
            }
            (false, Some(ContentSource::Snapshot { snap_name, parent_name, .. })) => {
                orch.clone_from_snapshot(subvols, parent_name, snap_name, backend_name, size)
                    .await?
            }
        }

        if self.driver.set_metadata && !backing {
            // Stamping is best-effort; a cluster without subvolume metadata
            // support must not fail provisioning.
            if let Err(e) = subvols
                .set_metadata(backend_name, "csi.storage.k8s.io/volume/name", backend_name)
                .await
            {
                warn!(error = %e, "failed to stamp subvolume metadata");
            }
        }
        Ok(())
    }

    async fn create_cephfs_volume(
        &self,
        req: &CreateVolumeRequest,
        fs_name: &str,
    ) -> Result<CreateVolumeResponse> {
        let cluster = self.cluster_from_params(&req.parameters)?;
        let creds = Credentials::from_admin_secrets(&req.secrets)?;
        let conn = self.driver.connect(cluster, &creds).await?;
        let backend = self.driver.cephfs_backend(&conn, fs_name).await?;
        let (fs_id, metadata_pool) = match &backend {
            VolumeBackend::CephFs { fs_id, metadata_pool, .. } => (*fs_id, metadata_pool.clone()),
            VolumeBackend::Rbd { .. } => unreachable!("cephfs_backend returns cephfs"),
        };
        let group = cluster.subvolume_group();
        let subvols = SubvolumeManager::new(
            conn.admin().fs(),
            &cluster.cluster_id,
            fs_name,
            group,
            cluster.cephfs.allow_recreate_on_resize,
        );
        let orch = CloneOrchestrator::new(conn.admin().fs(), fs_name, group);
        let omap = conn.admin().omap();

        let size = round_up_to_grain(requested_size(req)?);
        let source = self.resolve_source(&conn, cluster, req).await?;
        let backing = req
            .parameters
            .get(PARAM_BACKING_SNAPSHOT)
            .map(|v| v == "true")
            .unwrap_or(false);
        if backing {
            if !matches!(source, Some(ContentSource::Snapshot { .. })) {
                return Err(CephixError::InvalidArgument(
                    "backingSnapshot requires a snapshot content source".to_string(),
                ));
            }
            if !all_read_only(&req.volume_capabilities) {
                return Err(CephixError::InvalidArgument(
                    "backingSnapshot volumes must be requested read-only".to_string(),
                ));
            }
        }
        let parent_name = source.as_ref().map(ContentSource::parent_name);

        // Idempotency: a prior call may have reserved (and possibly built)
        // this volume already.
        let reservation = match self
            .driver
            .volume_journal
            .check_reservation(omap, &metadata_pool, "", &req.name, parent_name)
            .await?
        {
            Some(existing) => {
                match subvols.info(&existing.backend_name).await {
                    Ok(_) => {
                        if let (Some(src), false) = (&source, backing) {
                            // Resume the clone ladder; in-progress states
                            // abort out of here with the reservation kept.
                            match src {
                                ContentSource::Volume { backend_name } => {
                                    orch.finish_clone_from_subvolume(
                                        &subvols,
                                        backend_name,
                                        &existing.backend_name,
                                        size,
                                    )
                                    .await?
                                }
                                ContentSource::Snapshot { .. } => {
                                    orch.finish_clone_from_snapshot(
                                        &subvols,
                                        &existing.backend_name,
                                        size,
                                    )
                                    .await?
                                }
                            }
                        }
                        return self
                            .cephfs_volume_response(
                                req, &conn, cluster, &backend, &subvols, fs_id, fs_name, size,
                                &existing.uuid, &existing.backend_name, backing, &source,
                            )
                            .await;
                    }
                    Err(CephixError::VolumeNotFound(_)) if backing => {
                        return self
                            .cephfs_volume_response(
                                req, &conn, cluster, &backend, &subvols, fs_id, fs_name, size,
                                &existing.uuid, &existing.backend_name, backing, &source,
                            )
                            .await;
                    }
                    // Reservation exists but the backend artifact does not:
                    // the previous attempt crashed before creation.
                    Err(CephixError::VolumeNotFound(_)) => existing,
                    Err(e) => return Err(e),
                }
            }
            None => {
                self.driver
                    .volume_journal
                    .reserve_name(
                        omap,
                        &metadata_pool,
                        "",
                        &cephix_core::ReserveRequest {
                            request_name: &req.name,
                            name_prefix: &self.driver.volume_name_prefix,
                            parent_name,
                            encryption_kms: req
                                .parameters
                                .get(PARAM_ENCRYPTION_KMS)
                                .map(String::as_str),
                            cluster_name: self.driver.cluster_name.as_deref(),
                            flatten_mode: None,
                            reserved_id: None,
                        },
                    )
                    .await?
            }
        };

        let provisioned = self
            .provision_cephfs(
                &conn,
                &backend,
                &subvols,
                &orch,
                &reservation.uuid,
                &reservation.backend_name,
                &source,
                backing,
                size,
            )
            .await;
        if let Err(e) = provisioned {
            if e.is_retryable() {
                // The backend is still working; keep the reservation so the
                // retry resumes.
                return Err(e);
            }
            if let Err(undo_err) = self
                .driver
                .volume_journal
                .undo_reservation(omap, &metadata_pool, "", &req.name, &reservation.uuid)
                .await
            {
                warn!(error = %undo_err, "failed to undo volume reservation");
            }
            return Err(e);
        }
        self.driver
            .volume_journal
            .store_attribute(
                omap,
                &metadata_pool,
                "",
                &reservation.uuid,
                ATTR_BACKEND,
                "cephfs",
            )
            .await?;

        self.cephfs_volume_response(
            req, &conn, cluster, &backend, &subvols, fs_id, fs_name, size, &reservation.uuid,
            &reservation.backend_name, backing, &source,
        )
        .await
    }

    /// Assemble the response, wiring the NFS export first when requested.
    #[allow(clippy::too_many_arguments)]
    async fn cephfs_volume_response(
        &self,
        req: &CreateVolumeRequest,
        conn: &Connection,
        cluster: &ClusterInfo,
        backend: &VolumeBackend,
        subvols: &SubvolumeManager<'_>,
        fs_id: i64,
        fs_name: &str,
        size: u64,
        uuid: &str,
        backend_name: &str,
        backing: bool,
        source: &Option<ContentSource>,
    ) -> Result<CreateVolumeResponse> {
        let csi_id = CsiIdentifier::new(&cluster.cluster_id, fs_id, uuid).encode()?;

        let mut context = HashMap::new();
        context.insert(PARAM_CLUSTER_ID.to_string(), cluster.cluster_id.clone());
        context.insert(PARAM_FS_NAME.to_string(), fs_name.to_string());
        context.insert("subvolumeName".to_string(), backend_name.to_string());
        if let Some(mounter) = req.parameters.get(PARAM_MOUNTER) {
            context.insert(PARAM_MOUNTER.to_string(), mounter.clone());
        }
        if let Some(kms) = req.parameters.get(PARAM_ENCRYPTION_KMS) {
            context.insert(PARAM_ENCRYPTION_KMS.to_string(), kms.clone());
            context.insert("encrypted".to_string(), "true".to_string());
        }

        // The node plugin mounts by path: the subvolume's own for regular
        // volumes, the backing snapshot's parent for snapshot-backed ones.
        let path_owner = if backing {
            match source {
                Some(ContentSource::Snapshot { parent_name, .. }) => parent_name.clone(),
                _ => backend_name.to_string(),
            }
        } else {
            backend_name.to_string()
        };
        match subvols.info(&path_owner).await {
            Ok(info) => {
                context.insert("subvolumePath".to_string(), info.path);
            }
            Err(e) if backing => return Err(e),
            Err(_) => {}
        }
        if backing {
            if let Some(ContentSource::Snapshot { csi_id: snap_id, snap_name, .. }) = source {
                context.insert("backingSnapshotID".to_string(), snap_id.clone());
                context.insert("backingSnapshotName".to_string(), snap_name.clone());
            }
        }

        if let Some(nfs_cluster) = req.parameters.get(PARAM_NFS_CLUSTER) {
            let exporter = NfsExporter::new(conn.admin().nfs());
            let path = context.get("subvolumePath").cloned().unwrap_or_default();
            exporter
                .create_export(
                    conn.admin().omap(),
                    &self.driver.volume_journal,
                    backend.journal_pool(),
                    "",
                    nfs_cluster,
                    fs_name,
                    &path,
                    &csi_id,
                    uuid,
                )
                .await?;
            context.insert(PARAM_NFS_CLUSTER.to_string(), nfs_cluster.clone());
        }

        info!(volume_id = %csi_id, subvolume = %backend_name, "volume ready");
        Ok(CreateVolumeResponse {
            volume: Some(Volume {
                capacity_bytes: size as i64,
                volume_id: csi_id,
                volume_context: context,
                content_source: req.volume_content_source.clone(),
                accessible_topology: vec![],
            }),
        })
    }

    // =========================================================================
    // CreateVolume (RBD)
    // =========================================================================

    async fn create_rbd_volume(
        &self,
        req: &CreateVolumeRequest,
        pool: &str,
    ) -> Result<CreateVolumeResponse> {
        let cluster = self.cluster_from_params(&req.parameters)?;
        let creds = Credentials::from_admin_secrets(&req.secrets)?;
        let conn = self.driver.connect(cluster, &creds).await?;
        let backend = self.driver.rbd_backend(&conn, cluster, pool).await?;
        let (pool_id, namespace) = match &backend {
            VolumeBackend::Rbd { pool_id, namespace, .. } => (*pool_id, namespace.clone()),
            VolumeBackend::CephFs { .. } => unreachable!("rbd_backend returns rbd"),
        };
        let mgr = RbdManager::new(conn.admin().rbd(), pool, &namespace);
        let omap = conn.admin().omap();

        let size = requested_size(req)?;
        let flatten = FlattenMode::parse(
            req.parameters
                .get(PARAM_FLATTEN_MODE)
                .map(String::as_str)
                .unwrap_or(""),
        )?;
        let source = self.resolve_source(&conn, cluster, req).await?;
        let parent_name = source.as_ref().map(ContentSource::parent_name);

        let reservation = match self
            .driver
            .volume_journal
            .check_reservation(omap, pool, &namespace, &req.name, parent_name)
            .await?
        {
            Some(existing) => match mgr.info(&existing.backend_name).await {
                Ok(_) => {
                    return self.rbd_volume_response(
                        req, cluster, pool, pool_id, size, &existing.uuid,
                        &existing.backend_name,
                    );
                }
                Err(CephixError::ImageNotFound(_)) => existing,
                Err(e) => return Err(e),
            },
            None => {
                self.driver
                    .volume_journal
                    .reserve_name(
                        omap,
                        pool,
                        &namespace,
                        &cephix_core::ReserveRequest {
                            request_name: &req.name,
                            name_prefix: &self.driver.volume_name_prefix,
                            parent_name,
                            encryption_kms: req
                                .parameters
                                .get(PARAM_ENCRYPTION_KMS)
                                .map(String::as_str),
                            cluster_name: self.driver.cluster_name.as_deref(),
                            flatten_mode: Some(flatten.as_str()),
                            reserved_id: None,
                        },
                    )
                    .await?
            }
        };

        let provisioned: Result<()> = async {
            match &source {
                None => mgr.create(&reservation.backend_name, size, &[]).await?,
                Some(ContentSource::Volume { backend_name }) => {
                    mgr.create_from_volume(backend_name, &reservation.backend_name, size, flatten)
                        .await?
                }
                Some(ContentSource::Snapshot { snap_name, parent_name, .. }) => {
                    mgr.create_from_snapshot(
                        parent_name,
                        snap_name,
                        &reservation.backend_name,
                        size,
                        flatten,
                    )
                    .await?
                }
            }
            if req.parameters.get(PARAM_ENCRYPTION_KMS).is_some() {
                mgr.set_metadata(
                    &reservation.backend_name,
                    cephix_core::rbd::META_ENCRYPTION_PASSPHRASE,
                    &uuid::Uuid::new_v4().simple().to_string(),
                )
                .await?;
            }
            if self.driver.set_metadata {
                if let Err(e) = mgr
                    .set_metadata(&reservation.backend_name, "csi.volume.owner", &req.name)
                    .await
                {
                    warn!(error = %e, "failed to stamp image metadata");
                }
            }
            self.driver
                .volume_journal
                .store_attribute(omap, pool, &namespace, &reservation.uuid, ATTR_BACKEND, "rbd")
                .await?;
            Ok(())
        }
        .await;

        if let Err(e) = provisioned {
            if e.is_retryable() {
                return Err(e);
            }
            if let Err(undo_err) = self
                .driver
                .volume_journal
                .undo_reservation(omap, pool, &namespace, &req.name, &reservation.uuid)
                .await
            {
                warn!(error = %undo_err, "failed to undo volume reservation");
            }
            return Err(e);
        }

        self.rbd_volume_response(req, cluster, pool, pool_id, size, &reservation.uuid, &reservation.backend_name)
    }

    fn rbd_volume_response(
        &self,
        req: &CreateVolumeRequest,
        cluster: &ClusterInfo,
        pool: &str,
        pool_id: i64,
        size: u64,
        uuid: &str,
        backend_name: &str,
    ) -> Result<CreateVolumeResponse> {
        let csi_id = CsiIdentifier::new(&cluster.cluster_id, pool_id, uuid).encode()?;
        let mut context = HashMap::new();
        context.insert(PARAM_CLUSTER_ID.to_string(), cluster.cluster_id.clone());
        context.insert(PARAM_POOL.to_string(), pool.to_string());
        context.insert("imageName".to_string(), backend_name.to_string());
        if !cluster.rbd.rados_namespace.is_empty() {
            context.insert(
                "radosNamespace".to_string(),
                cluster.rbd.rados_namespace.clone(),
            );
        }
        if let Some(kms) = req.parameters.get(PARAM_ENCRYPTION_KMS) {
            context.insert(PARAM_ENCRYPTION_KMS.to_string(), kms.clone());
            context.insert("encrypted".to_string(), "true".to_string());
        }
        info!(volume_id = %csi_id, image = %backend_name, "volume ready");
        Ok(CreateVolumeResponse {
            volume: Some(Volume {
                capacity_bytes: size as i64,
                volume_id: csi_id,
                volume_context: context,
                content_source: req.volume_content_source.clone(),
                accessible_topology: vec![],
            }),
        })
    }

    // =========================================================================
    // DeleteVolume
    // =========================================================================

    async fn delete_cephfs_volume(
        &self,
        conn: &Connection,
        cluster: &ClusterInfo,
        backend: &VolumeBackend,
        ident: &CsiIdentifier,
        attrs: &cephix_core::JournalAttrs,
        volume_id: &str,
        fs_name: &str,
    ) -> Result<()> {
        let omap = conn.admin().omap();
        let pool = backend.journal_pool();
        let group = cluster.subvolume_group();
        let subvols = SubvolumeManager::new(
            conn.admin().fs(),
            &cluster.cluster_id,
            fs_name,
            group,
            cluster.cephfs.allow_recreate_on_resize,
        );

        let backing_id = self
            .driver
            .volume_journal
            .fetch_attribute(omap, pool, "", &ident.object_uuid, ATTR_BACKING_SNAPSHOT_ID)
            .await
            .ok();

        if let Some(backing_id) = backing_id {
            self.delete_snapshot_backed_volume(conn, cluster, backend, ident, &backing_id, fs_name)
                .await?;
        } else {
            // NFS-exported volumes lose their export before the backend.
            let exporter = NfsExporter::new(conn.admin().nfs());
            exporter
                .delete_export(
                    omap,
                    &self.driver.volume_journal,
                    pool,
                    "",
                    volume_id,
                    &ident.object_uuid,
                )
                .await?;

            match subvols.purge(&attrs.backend_name, false, false).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(CephixError::VolumeHasSnapshots(_)) => {
                    // Snapshots that only exist to back read-only descendant
                    // volumes permit a retained delete; user-visible
                    // snapshots block the volume's deletion.
                    if self
                        .snapshots_all_pinned(conn, backend, fs_name, group, &attrs.backend_name)
                        .await?
                    {
                        subvols.purge(&attrs.backend_name, false, true).await?;
                    } else {
                        return Err(CephixError::VolumeHasSnapshots(
                            attrs.backend_name.clone(),
                        ));
                    }
                }
                Err(e) => return Err(e),
            }
        }

        self.driver
            .volume_journal
            .undo_reservation(omap, pool, "", &attrs.request_name, &ident.object_uuid)
            .await
    }

    /// Whether every snapshot of a subvolume is a driver-named snapshot
    /// pinned by snapshot-backed descendants.
    async fn snapshots_all_pinned(
        &self,
        conn: &Connection,
        backend: &VolumeBackend,
        fs_name: &str,
        group: &str,
        subvol: &str,
    ) -> Result<bool> {
        let snaps = conn.admin().fs().list_snapshots(fs_name, group, subvol).await?;
        if snaps.is_empty() {
            return Ok(false);
        }
        let omap = conn.admin().omap();
        let pool = backend.journal_pool();
        let prefix = format!("{}-", self.driver.snapshot_name_prefix);
        for snap in snaps {
            let Some(uuid) = snap.strip_prefix(&prefix) else {
                return Ok(false);
            };
            match self.driver.reftracker.fetch(omap, pool, "", uuid).await? {
                Some(refs) if refs.refs.iter().any(|r| r != uuid) => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    /// Unreference the backing snapshot; the last volume out deletes it and
    /// collects a retained parent subvolume.
    async fn delete_snapshot_backed_volume(
        &self,
        conn: &Connection,
        cluster: &ClusterInfo,
        backend: &VolumeBackend,
        ident: &CsiIdentifier,
        backing_id: &str,
        fs_name: &str,
    ) -> Result<()> {
        let omap = conn.admin().omap();
        let pool = backend.journal_pool();
        let group = cluster.subvolume_group();
        let snap_ident = CsiIdentifier::decode(backing_id)?;

        let needs_backing_delete = match self
            .driver
            .reftracker
            .fetch(omap, pool, "", &snap_ident.object_uuid)
            .await?
        {
            Some(refs) => {
                self.driver
                    .reftracker
                    .unref(
                        omap,
                        pool,
                        "",
                        &snap_ident.object_uuid,
                        &ident.object_uuid,
                        refs.epoch,
                    )
                    .await?
            }
            None => true,
        };
        if !needs_backing_delete {
            return Ok(());
        }

        let parent = match self
            .driver
            .volume_journal
            .fetch_attribute(
                omap,
                pool,
                "",
                &ident.object_uuid,
                ATTR_BACKING_SNAPSHOT_PARENT,
            )
            .await
        {
            Ok(parent) => parent,
            Err(CephixError::KeyNotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        let snap_name = format!(
            "{}-{}",
            self.driver.snapshot_name_prefix, snap_ident.object_uuid
        );

        let snaps = CephFsSnapshots::new(conn.admin().fs(), fs_name, group);
        match snaps.info(&parent, &snap_name).await {
            Ok(status) if status.pending_clones > 0 => {
                return Err(CephixError::SnapshotHasPendingClones(snap_name));
            }
            Ok(_) => {
                snaps.unprotect(&parent, &snap_name).await?;
                snaps.delete(&parent, &snap_name).await?;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        // A retained parent whose last snapshot just went away is purged.
        let subvols = SubvolumeManager::new(
            conn.admin().fs(),
            &cluster.cluster_id,
            fs_name,
            group,
            cluster.cephfs.allow_recreate_on_resize,
        );
        match subvols.info(&parent).await {
            Ok(info) if info.is_snapshot_retained() => {
                match subvols.purge(&parent, true, false).await {
                    Ok(()) => {}
                    Err(CephixError::VolumeHasSnapshots(_)) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn do_delete_volume(&self, req: &DeleteVolumeRequest) -> Result<()> {
        let (ident, cluster) = match self.driver.decode(&req.volume_id) {
            Ok(decoded) => decoded,
            // A malformed or foreign handle cannot name anything we own.
            Err(CephixError::InvalidArgument(_)) => {
                warn!(volume_id = %req.volume_id, "delete of undecodable volume id");
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
        let attrs = match self
            .driver
            .volume_journal
            .get_attributes(
                conn.admin().omap(),
                backend.journal_pool(),
                backend.journal_namespace(),
                &ident.object_uuid,
            )
            .await
        {
            Ok(attrs) => attrs,
            Err(CephixError::KeyNotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        match &backend {
            VolumeBackend::CephFs { fs_name, .. } => {
                let fs_name = fs_name.clone();
                self.delete_cephfs_volume(
                    &conn,
                    cluster,
                    &backend,
                    &ident,
                    &attrs,
                    &req.volume_id,
                    &fs_name,
                )
                .await
            }
            VolumeBackend::Rbd { pool, namespace, .. } => {
                let mgr = RbdManager::new(conn.admin().rbd(), pool, namespace);
                match mgr.delete(&attrs.backend_name).await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
                self.driver
                    .volume_journal
                    .undo_reservation(
                        conn.admin().omap(),
                        pool,
                        namespace,
                        &attrs.request_name,
                        &ident.object_uuid,
                    )
                    .await
            }
        }
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    async fn do_create_snapshot(&self, req: &CreateSnapshotRequest) -> Result<CreateSnapshotResponse> {
        let (ident, cluster) = self.driver.decode(&req.source_volume_id)?;
        let creds = Credentials::from_admin_secrets(&req.secrets)?;
        let conn = self.driver.connect(cluster, &creds).await?;
        let resolved = self.driver.resolve_volume(&conn, cluster, ident).await?;
        let omap = conn.admin().omap();
        let pool = resolved.backend.journal_pool();
        let namespace = resolved.backend.journal_namespace().to_string();

        // Snapshot-backed volumes are projections of another snapshot;
        // snapshotting one would alias content it does not own.
        if self
            .driver
            .volume_journal
            .fetch_attribute(
                omap,
                pool,
                &namespace,
                &resolved.ident.object_uuid,
                ATTR_BACKING_SNAPSHOT_ID,
            )
            .await
            .is_ok()
        {
            return Err(CephixError::InvalidArgument(
                "cannot snapshot a snapshot-backed volume".to_string(),
            ));
        }

        match &resolved.backend {
            VolumeBackend::CephFs { fs_name, fs_id, .. } => {
                let group = cluster.subvolume_group();
                let subvols = SubvolumeManager::new(
                    conn.admin().fs(),
                    &cluster.cluster_id,
                    fs_name,
                    group,
                    cluster.cephfs.allow_recreate_on_resize,
                );
                // Parent must be introspectable; clusters without subvolume
                // info cannot host snapshots safely.
                let parent_info = subvols.info(&resolved.attrs.backend_name).await?;
                let size = parent_info.bytes_quota.unwrap_or(0);
                let engine = CephFsSnapshots::new(conn.admin().fs(), fs_name, group);
                self.snapshot_common(
                    req,
                    &conn,
                    cluster,
                    pool,
                    "",
                    *fs_id,
                    &resolved.attrs.backend_name,
                    size,
                    &engine,
                )
                .await
            }
            VolumeBackend::Rbd { pool: rbd_pool, pool_id, namespace } => {
                let mgr = RbdManager::new(conn.admin().rbd(), rbd_pool, namespace);
                let size = mgr.info(&resolved.attrs.backend_name).await?.size_bytes;
                let engine = RbdSnapshots::new(conn.admin().rbd(), rbd_pool, namespace);
                self.snapshot_common(
                    req,
                    &conn,
                    cluster,
                    rbd_pool,
                    namespace,
                    *pool_id,
                    &resolved.attrs.backend_name,
                    size,
                    &engine,
                )
                .await
            }
        }
    }

    /// Backend-independent reserve / create / protect / respond cycle.
    #[allow(clippy::too_many_arguments)]
    async fn snapshot_common(
        &self,
        req: &CreateSnapshotRequest,
        conn: &Connection,
        cluster: &ClusterInfo,
        pool: &str,
        namespace: &str,
        location_id: i64,
        parent_backend_name: &str,
        size: u64,
        engine: &dyn SnapshotEngine,
    ) -> Result<CreateSnapshotResponse> {
        let omap = conn.admin().omap();

        if let Some(existing) = self
            .driver
            .snapshot_journal
            .check_reservation(omap, pool, namespace, &req.name, Some(parent_backend_name))
            .await?
        {
            match engine.info(parent_backend_name, &existing.backend_name).await {
                Ok(status) => {
                    if !status.ready {
                        engine.protect(parent_backend_name, &existing.backend_name).await?;
                    }
                    return self.snapshot_response(
                        req,
                        cluster,
                        location_id,
                        &existing.uuid,
                        size,
                        status.created_at,
                    );
                }
                // Reservation without a backend snapshot: fall through and
                // cut it now under the same identity.
                Err(CephixError::SnapshotNotFound(_)) => {
                    self.cut_snapshot(
                        conn, pool, namespace, &existing.uuid, parent_backend_name,
                        &existing.backend_name, engine,
                    )
                    .await?;
                    return self.snapshot_response(
                        req,
                        cluster,
                        location_id,
                        &existing.uuid,
                        size,
                        chrono::Utc::now(),
                    );
                }
                Err(e) => return Err(e),
            }
        }

        let reservation = self
            .driver
            .snapshot_journal
            .reserve_name(
                omap,
                pool,
                namespace,
                &cephix_core::ReserveRequest {
                    request_name: &req.name,
                    name_prefix: &self.driver.snapshot_name_prefix,
                    parent_name: Some(parent_backend_name),
                    cluster_name: self.driver.cluster_name.as_deref(),
                    ..Default::default()
                },
            )
            .await?;

        if let Err(e) = self
            .cut_snapshot(
                conn,
                pool,
                namespace,
                &reservation.uuid,
                parent_backend_name,
                &reservation.backend_name,
                engine,
            )
            .await
        {
            if let Err(undo_err) = self
                .driver
                .snapshot_journal
                .undo_reservation(omap, pool, namespace, &req.name, &reservation.uuid)
                .await
            {
                warn!(error = %undo_err, "failed to undo snapshot reservation");
            }
            return Err(e);
        }

        self.snapshot_response(
            req,
            cluster,
            location_id,
            &reservation.uuid,
            size,
            chrono::Utc::now(),
        )
    }

    /// Create + protect a snapshot, registering its self-reference; the
    /// compensating delete on a failed protect is logged only.
    #[allow(clippy::too_many_arguments)]
    async fn cut_snapshot(
        &self,
        conn: &Connection,
        pool: &str,
        namespace: &str,
        snap_uuid: &str,
        parent: &str,
        snap_name: &str,
        engine: &dyn SnapshotEngine,
    ) -> Result<()> {
        engine.create(parent, snap_name).await?;
        if let Err(e) = engine.protect(parent, snap_name).await {
            if let Err(cleanup) = engine.delete(parent, snap_name).await {
                if !cleanup.is_not_found() {
                    warn!(snap = %snap_name, error = %cleanup, "failed to delete unprotectable snapshot");
                }
            }
            return Err(e);
        }
        self.driver
            .reftracker
            .add_ref(conn.admin().omap(), pool, namespace, snap_uuid, snap_uuid)
            .await
    }

    fn snapshot_response(
        &self,
        req: &CreateSnapshotRequest,
        cluster: &ClusterInfo,
        location_id: i64,
        uuid: &str,
        size: u64,
        created_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<CreateSnapshotResponse> {
        let snapshot_id = CsiIdentifier::new(&cluster.cluster_id, location_id, uuid).encode()?;
        Ok(CreateSnapshotResponse {
            snapshot: Some(Snapshot {
                size_bytes: size as i64,
                snapshot_id,
                source_volume_id: req.source_volume_id.clone(),
                creation_time: Some(to_proto_timestamp(created_at)),
                ready_to_use: true,
                group_snapshot_id: String::new(),
            }),
        })
    }

    async fn do_delete_snapshot(&self, req: &DeleteSnapshotRequest) -> Result<()> {
        let (ident, cluster) = match self.driver.decode(&req.snapshot_id) {
            Ok(decoded) => decoded,
            Err(CephixError::InvalidArgument(_)) => {
                warn!(snapshot_id = %req.snapshot_id, "delete of undecodable snapshot id");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let creds = Credentials::from_admin_secrets(&req.secrets)?;
        let conn = self.driver.connect(cluster, &creds).await?;
        let omap = conn.admin().omap();

        let backend = match self
            .driver
            .backend_by_location(&conn, cluster, ident.location_id)
            .await
        {
            Ok(backend) => backend,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        let pool = backend.journal_pool();
        let namespace = backend.journal_namespace();
        let attrs = match self
            .driver
            .snapshot_journal
            .get_attributes(omap, pool, namespace, &ident.object_uuid)
            .await
        {
            Ok(attrs) => attrs,
            Err(CephixError::KeyNotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };
        let parent = attrs.parent_name.clone().unwrap_or_default();

        // Dependants decide whether the backend snapshot survives; the
        // journal entry goes either way.
        let needs_backend_delete = match self
            .driver
            .reftracker
            .fetch(omap, pool, namespace, &ident.object_uuid)
            .await?
        {
            Some(refs) => {
                self.driver
                    .reftracker
                    .unref(
                        omap,
                        pool,
                        namespace,
                        &ident.object_uuid,
                        &ident.object_uuid,
                        refs.epoch,
                    )
                    .await?
            }
            None => true,
        };

        if needs_backend_delete {
            match &backend {
                VolumeBackend::CephFs { fs_name, .. } => {
                    let group = cluster.subvolume_group();
                    let engine = CephFsSnapshots::new(conn.admin().fs(), fs_name, group);
                    match engine.info(&parent, &attrs.backend_name).await {
                        Ok(status) if status.pending_clones > 0 => {
                            return Err(CephixError::SnapshotHasPendingClones(
                                attrs.backend_name.clone(),
                            ));
                        }
                        Ok(_) => {
                            engine.unprotect(&parent, &attrs.backend_name).await?;
                            engine.delete(&parent, &attrs.backend_name).await?;
                        }
                        Err(e) if e.is_not_found() => {}
                        Err(e) => return Err(e),
                    }
                }
                VolumeBackend::Rbd { pool: rbd_pool, namespace, .. } => {
                    let engine = RbdSnapshots::new(conn.admin().rbd(), rbd_pool, namespace);
                    match engine.info(&parent, &attrs.backend_name).await {
                        Ok(status) if status.pending_clones > 0 => {
                            return Err(CephixError::SnapshotHasPendingClones(
                                attrs.backend_name.clone(),
                            ));
                        }
                        Ok(_) => {
                            engine.unprotect(&parent, &attrs.backend_name).await?;
                            engine.delete(&parent, &attrs.backend_name).await?;
                        }
                        Err(e) if e.is_not_found() => {}
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        self.driver
            .snapshot_journal
            .undo_reservation(omap, pool, namespace, &attrs.request_name, &ident.object_uuid)
            .await
    }

    // =========================================================================
    // Expand
    // =========================================================================

    async fn do_expand_volume(
        &self,
        req: &ControllerExpandVolumeRequest,
    ) -> Result<ControllerExpandVolumeResponse> {
        let (ident, cluster) = self.driver.decode(&req.volume_id)?;
        let creds = Credentials::from_admin_secrets(&req.secrets)?;
        let conn = self.driver.connect(cluster, &creds).await?;
        let resolved = self.driver.resolve_volume(&conn, cluster, ident).await?;
        let omap = conn.admin().omap();

        let requested = req
            .capacity_range
            .as_ref()
            .map(|r| r.required_bytes.max(0) as u64)
            .filter(|size| *size > 0)
            .ok_or_else(|| {
                CephixError::InvalidArgument("capacity range is missing".to_string())
            })?;

        if self
            .driver
            .volume_journal
            .fetch_attribute(
                omap,
                resolved.backend.journal_pool(),
                resolved.backend.journal_namespace(),
                &resolved.ident.object_uuid,
                ATTR_BACKING_SNAPSHOT_ID,
            )
            .await
            .is_ok()
        {
            return Err(CephixError::FailedPrecondition(
                "snapshot-backed volumes are read-only and cannot be expanded".to_string(),
            ));
        }

        match &resolved.backend {
            VolumeBackend::CephFs { fs_name, .. } => {
                let size = round_up_to_grain(requested);
                let subvols = SubvolumeManager::new(
                    conn.admin().fs(),
                    &cluster.cluster_id,
                    fs_name,
                    cluster.subvolume_group(),
                    cluster.cephfs.allow_recreate_on_resize,
                );
                subvols.resize(&resolved.attrs.backend_name, size).await?;
                Ok(ControllerExpandVolumeResponse {
                    capacity_bytes: size as i64,
                    node_expansion_required: false,
                })
            }
            VolumeBackend::Rbd { pool, namespace, .. } => {
                let mgr = RbdManager::new(conn.admin().rbd(), pool, namespace);
                mgr.resize(&resolved.attrs.backend_name, requested).await?;
                Ok(ControllerExpandVolumeResponse {
                    capacity_bytes: requested as i64,
                    node_expansion_required: true,
                })
            }
        }
    }
}

fn requested_size(req: &CreateVolumeRequest) -> Result<u64> {
    match &req.capacity_range {
        None => Ok(DEFAULT_VOLUME_SIZE),
        Some(range) => {
            if range.required_bytes < 0 || range.limit_bytes < 0 {
                return Err(CephixError::InvalidArgument(
                    "capacity range must not be negative".to_string(),
                ));
            }
            let size = if range.required_bytes > 0 {
                range.required_bytes as u64
            } else {
                DEFAULT_VOLUME_SIZE
            };
            if range.limit_bytes > 0 && size > range.limit_bytes as u64 {
                return Err(CephixError::InvalidArgument(
                    "required bytes exceed the capacity limit".to_string(),
                ));
            }
            Ok(size)
        }
    }
}

#[tonic::async_trait]
impl Controller for ControllerService {
    #[instrument(skip(self, request), fields(name))]
    async fn create_volume(
        &self,
        request: Request<CreateVolumeRequest>,
    ) -> std::result::Result<Response<CreateVolumeResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("name", req.name.as_str());

        if req.name.is_empty() {
            return Err(Status::invalid_argument("volume name is missing"));
        }
        validate_capabilities(&req.volume_capabilities).map_err(status_from)?;

        let _name_lock = self
            .driver
            .volume_name_locks
            .try_acquire(&req.name)
            .ok_or_else(|| operation_in_flight(&req.name))?;
        let _source_lock = self.lock_source(&req)?;

        let response = if let Some(fs_name) = req.parameters.get(PARAM_FS_NAME) {
            let fs_name = fs_name.clone();
            self.create_cephfs_volume(&req, &fs_name).await
        } else if let Some(pool) = req.parameters.get(PARAM_POOL) {
            let pool = pool.clone();
            self.create_rbd_volume(&req, &pool).await
        } else {
            Err(CephixError::InvalidArgument(
                "either fsName or pool parameter is required".to_string(),
            ))
        };
        response.map(Response::new).map_err(status_from)
    }

    #[instrument(skip(self, request))]
    async fn delete_volume(
        &self,
        request: Request<DeleteVolumeRequest>,
    ) -> std::result::Result<Response<DeleteVolumeResponse>, Status> {
        let req = request.into_inner();
        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("volume id is missing"));
        }

        let _id_lock = self
            .driver
            .volume_id_locks
            .try_acquire(&req.volume_id)
            .ok_or_else(|| operation_in_flight(&req.volume_id))?;
        let _op_lock = self
            .driver
            .op_locks
            .try_acquire(OpClass::Delete, &req.volume_id)
            .ok_or_else(|| operation_in_flight(&req.volume_id))?;

        self.do_delete_volume(&req)
            .await
            .map(|_| Response::new(DeleteVolumeResponse {}))
            .map_err(status_from)
    }

    #[instrument(skip(self, request))]
    async fn controller_expand_volume(
        &self,
        request: Request<ControllerExpandVolumeRequest>,
    ) -> std::result::Result<Response<ControllerExpandVolumeResponse>, Status> {
        let req = request.into_inner();
        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("volume id is missing"));
        }

        let _id_lock = self
            .driver
            .volume_id_locks
            .try_acquire(&req.volume_id)
            .ok_or_else(|| operation_in_flight(&req.volume_id))?;
        let _op_lock = self
            .driver
            .op_locks
            .try_acquire(OpClass::Expand, &req.volume_id)
            .ok_or_else(|| operation_in_flight(&req.volume_id))?;

        self.do_expand_volume(&req)
            .await
            .map(Response::new)
            .map_err(status_from)
    }

    #[instrument(skip(self, request), fields(name))]
    async fn create_snapshot(
        &self,
        request: Request<CreateSnapshotRequest>,
    ) -> std::result::Result<Response<CreateSnapshotResponse>, Status> {
        let req = request.into_inner();
        tracing::Span::current().record("name", req.name.as_str());

        if req.name.is_empty() {
            return Err(Status::invalid_argument("snapshot name is missing"));
        }
        if req.source_volume_id.is_empty() {
            return Err(Status::invalid_argument("source volume id is missing"));
        }

        let _name_lock = self
            .driver
            .snapshot_name_locks
            .try_acquire(&req.name)
            .ok_or_else(|| operation_in_flight(&req.name))?;
        let _snap_create_lock = self
            .driver
            .op_locks
            .try_acquire(OpClass::SnapCreate, &req.source_volume_id)
            .ok_or_else(|| operation_in_flight(&req.source_volume_id))?;

        self.do_create_snapshot(&req)
            .await
            .map(Response::new)
            .map_err(status_from)
    }

    #[instrument(skip(self, request))]
    async fn delete_snapshot(
        &self,
        request: Request<DeleteSnapshotRequest>,
    ) -> std::result::Result<Response<DeleteSnapshotResponse>, Status> {
        let req = request.into_inner();
        if req.snapshot_id.is_empty() {
            return Err(Status::invalid_argument("snapshot id is missing"));
        }

        let _id_lock = self
            .driver
            .snapshot_id_locks
            .try_acquire(&req.snapshot_id)
            .ok_or_else(|| operation_in_flight(&req.snapshot_id))?;
        let _op_lock = self
            .driver
            .op_locks
            .try_acquire(OpClass::Delete, &req.snapshot_id)
            .ok_or_else(|| operation_in_flight(&req.snapshot_id))?;

        self.do_delete_snapshot(&req)
            .await
            .map(|_| Response::new(DeleteSnapshotResponse {}))
            .map_err(status_from)
    }

    async fn validate_volume_capabilities(
        &self,
        request: Request<ValidateVolumeCapabilitiesRequest>,
    ) -> std::result::Result<Response<ValidateVolumeCapabilitiesResponse>, Status> {
        let req = request.into_inner();
        if req.volume_id.is_empty() {
            return Err(Status::invalid_argument("volume id is missing"));
        }
        if req.volume_capabilities.is_empty() {
            return Err(Status::invalid_argument("volume capabilities are missing"));
        }

        let result: Result<ValidateVolumeCapabilitiesResponse> = async {
            let (ident, cluster) = self.driver.decode(&req.volume_id)?;
            let creds = Credentials::from_admin_secrets(&req.secrets)?;
            let conn = self.driver.connect(cluster, &creds).await?;
            // Existence check; unknown handles are NOT_FOUND.
            self.driver.resolve_volume(&conn, cluster, ident).await?;

            match validate_capabilities(&req.volume_capabilities) {
                Ok(()) => Ok(ValidateVolumeCapabilitiesResponse {
                    confirmed: Some(validate_volume_capabilities_response::Confirmed {
                        volume_context: req.volume_context.clone(),
                        volume_capabilities: req.volume_capabilities.clone(),
                        parameters: req.parameters.clone(),
                    }),
                    message: String::new(),
                }),
                Err(e) => Ok(ValidateVolumeCapabilitiesResponse {
                    confirmed: None,
                    message: e.to_string(),
                }),
            }
        }
        .await;
        result.map(Response::new).map_err(status_from)
    }

    async fn controller_get_capabilities(
        &self,
        _request: Request<ControllerGetCapabilitiesRequest>,
    ) -> std::result::Result<Response<ControllerGetCapabilitiesResponse>, Status> {
        use cephix_proto::csi::controller_service_capability::rpc::Type;
        let capability = |kind: Type| ControllerServiceCapability {
            rpc: Some(controller_service_capability::Rpc { r#type: kind as i32 }),
        };
        Ok(Response::new(ControllerGetCapabilitiesResponse {
            capabilities: vec![
                capability(Type::CreateDeleteVolume),
                capability(Type::CreateDeleteSnapshot),
                capability(Type::CloneVolume),
                capability(Type::ExpandVolume),
            ],
        }))
    }
}
