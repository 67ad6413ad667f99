//! Shared driver state and identifier resolution.
//!
//! One [`Driver`] is built at startup and shared by every CSI service. It
//! owns the cluster registry, the connection pool, the lock manager
//! instances and the journal configurations; per-RPC state (credentials,
//! connections) never lives here.

use std::collections::HashMap;
use std::sync::Arc;

use cephix_core::{
    AdminFactory, CephixError, ClusterInfo, ClusterRegistry, Connection, ConnectionPool,
    Credentials, CsiIdentifier, Journal, JournalAttrs, OperationLocks, RefTracker, Result,
    VolumeLocks,
};

use crate::config::Config;

/// Journal attribute distinguishing the backend serving a volume.
pub const ATTR_BACKEND: &str = "csi.backend";
/// Journal attribute holding the CSI id of a backing snapshot.
pub const ATTR_BACKING_SNAPSHOT_ID: &str = "csi.backingsnapshotid";
/// Journal attribute holding the parent subvolume of a backing snapshot.
pub const ATTR_BACKING_SNAPSHOT_PARENT: &str = "csi.backingsnapshot.parent";

/// Location of a volume or snapshot on the cluster.
#[derive(Debug, Clone)]
pub enum VolumeBackend {
    CephFs {
        fs_name: String,
        fs_id: i64,
        metadata_pool: String,
    },
    Rbd {
        pool: String,
        pool_id: i64,
        namespace: String,
    },
}

impl VolumeBackend {
    /// Pool holding the journals of this backend.
    pub fn journal_pool(&self) -> &str {
        match self {
            VolumeBackend::CephFs { metadata_pool, .. } => metadata_pool,
            VolumeBackend::Rbd { pool, .. } => pool,
        }
    }

    /// RADOS namespace the journals live in.
    pub fn journal_namespace(&self) -> &str {
        match self {
            VolumeBackend::CephFs { .. } => "",
            VolumeBackend::Rbd { namespace, .. } => namespace,
        }
    }

    /// Location id encoded into CSI handles.
    pub fn location_id(&self) -> i64 {
        match self {
            VolumeBackend::CephFs { fs_id, .. } => *fs_id,
            VolumeBackend::Rbd { pool_id, .. } => *pool_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            VolumeBackend::CephFs { .. } => "cephfs",
            VolumeBackend::Rbd { .. } => "rbd",
        }
    }
}

/// A volume or snapshot resolved through the journal.
#[derive(Debug)]
pub struct Resolved {
    pub ident: CsiIdentifier,
    pub backend: VolumeBackend,
    pub attrs: JournalAttrs,
}

/// Process-wide driver state.
pub struct Driver {
    pub name: String,
    pub node_id: String,
    pub node_labels: HashMap<String, String>,
    pub registry: ClusterRegistry,
    pub conn_pool: ConnectionPool,

    /// Request-name locks for volumes.
    pub volume_name_locks: VolumeLocks,
    /// Request-name locks for snapshots and group snapshots.
    pub snapshot_name_locks: VolumeLocks,
    /// Request-name locks for volume groups.
    pub group_name_locks: VolumeLocks,
    /// Per-volume-id locks.
    pub volume_id_locks: VolumeLocks,
    /// Per-snapshot-id locks.
    pub snapshot_id_locks: VolumeLocks,
    /// Class-typed operation locks.
    pub op_locks: OperationLocks,

    pub volume_journal: Journal,
    pub snapshot_journal: Journal,
    pub reftracker: RefTracker,

    pub set_metadata: bool,
    pub cluster_name: Option<String>,
    pub volume_name_prefix: String,
    pub snapshot_name_prefix: String,
}

impl Driver {
    pub fn new(config: &Config, registry: ClusterRegistry, factory: Arc<dyn AdminFactory>) -> Self {
        Self {
            name: config.driver.name.clone(),
            node_id: config.node.get_id(),
            node_labels: config.node.labels.clone(),
            registry,
            conn_pool: ConnectionPool::new(factory),
            volume_name_locks: VolumeLocks::new(),
            snapshot_name_locks: VolumeLocks::new(),
            group_name_locks: VolumeLocks::new(),
            volume_id_locks: VolumeLocks::new(),
            snapshot_id_locks: VolumeLocks::new(),
            op_locks: OperationLocks::new(),
            volume_journal: Journal::volumes(),
            snapshot_journal: Journal::snapshots(),
            reftracker: RefTracker::new(),
            set_metadata: config.driver.set_metadata,
            cluster_name: config.driver.cluster_name.clone(),
            volume_name_prefix: config.driver.volume_name_prefix.clone(),
            snapshot_name_prefix: config.driver.snapshot_name_prefix.clone(),
        }
    }

    /// Decode a CSI handle and resolve the cluster it points at.
    pub fn decode(&self, id: &str) -> Result<(CsiIdentifier, &ClusterInfo)> {
        let ident = CsiIdentifier::decode(id)?;
        let cluster = self.registry.get(&ident.cluster_id)?;
        Ok((ident, cluster))
    }

    /// Borrow a pooled connection for a cluster.
    pub async fn connect(&self, cluster: &ClusterInfo, creds: &Credentials) -> Result<Connection> {
        self.conn_pool.connect(&cluster.mon_host(), creds).await
    }

    /// Locate the backend a location id refers to: a CephFS filesystem id
    /// or, failing that, an RBD pool id.
    pub async fn backend_by_location(
        &self,
        conn: &Connection,
        cluster: &ClusterInfo,
        location_id: i64,
    ) -> Result<VolumeBackend> {
        let filesystems = conn.admin().fs().list_filesystems().await?;
        if let Some(fs) = filesystems.into_iter().find(|fs| fs.id == location_id) {
            return Ok(VolumeBackend::CephFs {
                fs_name: fs.name,
                fs_id: fs.id,
                metadata_pool: fs.metadata_pool,
            });
        }
        let pool = conn.admin().osd().pool_name(location_id).await?;
        Ok(VolumeBackend::Rbd {
            pool,
            pool_id: location_id,
            namespace: cluster.rbd.rados_namespace.clone(),
        })
    }

    /// Backend for a named CephFS filesystem.
    pub async fn cephfs_backend(&self, conn: &Connection, fs_name: &str) -> Result<VolumeBackend> {
        let filesystems = conn.admin().fs().list_filesystems().await?;
        filesystems
            .into_iter()
            .find(|fs| fs.name == fs_name)
            .map(|fs| VolumeBackend::CephFs {
                fs_name: fs.name,
                fs_id: fs.id,
                metadata_pool: fs.metadata_pool,
            })
            .ok_or_else(|| CephixError::FilesystemNotFound(fs_name.to_string()))
    }

    /// Backend for a named RBD pool.
    pub async fn rbd_backend(
        &self,
        conn: &Connection,
        cluster: &ClusterInfo,
        pool: &str,
    ) -> Result<VolumeBackend> {
        let pool_id = conn.admin().osd().pool_id(pool).await?;
        Ok(VolumeBackend::Rbd {
            pool: pool.to_string(),
            pool_id,
            namespace: cluster.rbd.rados_namespace.clone(),
        })
    }

    /// Resolve a volume handle to its backend and journal attributes.
    pub async fn resolve_volume(
        &self,
        conn: &Connection,
        cluster: &ClusterInfo,
        ident: CsiIdentifier,
    ) -> Result<Resolved> {
        let backend = self
            .backend_by_location(conn, cluster, ident.location_id)
            .await?;
        let attrs = self
            .volume_journal
            .get_attributes(
                conn.admin().omap(),
                backend.journal_pool(),
                backend.journal_namespace(),
                &ident.object_uuid,
            )
            .await?;
        Ok(Resolved {
            ident,
            backend,
            attrs,
        })
    }

    /// Resolve a snapshot handle to its backend and journal attributes.
    pub async fn resolve_snapshot(
        &self,
        conn: &Connection,
        cluster: &ClusterInfo,
        ident: CsiIdentifier,
    ) -> Result<Resolved> {
        let backend = self
            .backend_by_location(conn, cluster, ident.location_id)
            .await?;
        let attrs = self
            .snapshot_journal
            .get_attributes(
                conn.admin().omap(),
                backend.journal_pool(),
                backend.journal_namespace(),
                &ident.object_uuid,
            )
            .await?;
        Ok(Resolved {
            ident,
            backend,
            attrs,
        })
    }
}
