//! Ceph admin surface consumed by the control plane.
//!
//! Every interaction with the cluster goes through these traits. The
//! production implementation invokes the `ceph`/`rbd`/`rados` tooling; the
//! in-memory mock implements the same traits for the test suites. Managers
//! never talk to the cluster any other way, which is what makes the
//! provisioning state machines testable.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{CloneState, MirrorMode, MirrorSiteStatus, QuiesceState};

// =============================================================================
// INFO TYPES
// =============================================================================

/// A CephFS filesystem known to the cluster.
#[derive(Debug, Clone)]
pub struct FilesystemInfo {
    pub name: String,
    /// Filesystem id; used as the location id in CSI handles.
    pub id: i64,
    pub metadata_pool: String,
}

/// Details of one subvolume.
#[derive(Debug, Clone)]
pub struct SubvolumeInfo {
    /// Quota in bytes; `None` means unlimited.
    pub bytes_quota: Option<u64>,
    pub bytes_used: u64,
    /// Pool the subvolume data lands in.
    pub data_pool: String,
    /// Feature strings (`snapshot-clone`, `snapshot-autoprotect`,
    /// `snapshot-retention`).
    pub features: Vec<String>,
    /// `complete` or `snapshot-retained`.
    pub state: String,
    /// Full path of the subvolume root.
    pub path: String,
}

impl SubvolumeInfo {
    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    /// Subvolume was deleted with retained snapshots.
    pub fn is_snapshot_retained(&self) -> bool {
        self.state == "snapshot-retained"
    }
}

/// Details of one subvolume snapshot.
#[derive(Debug, Clone)]
pub struct SubvolumeSnapshotInfo {
    pub created_at: DateTime<Utc>,
    pub protected: bool,
    /// Clones still hydrating from this snapshot.
    pub pending_clones: usize,
}

/// Parent of a cloned RBD image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RbdSnapSpec {
    pub pool: String,
    pub namespace: String,
    pub image: String,
    pub snapshot: String,
}

/// Details of one RBD image.
#[derive(Debug, Clone)]
pub struct RbdImageInfo {
    pub size_bytes: u64,
    pub features: Vec<String>,
    pub parent: Option<RbdSnapSpec>,
}

/// One snapshot of an RBD image.
#[derive(Debug, Clone)]
pub struct RbdSnapInfo {
    pub name: String,
    pub size_bytes: u64,
    pub protected: bool,
    pub created_at: Option<DateTime<Utc>>,
}

/// Mirroring introspection for one image.
#[derive(Debug, Clone)]
pub struct MirrorImageInfo {
    /// `None` when mirroring is disabled.
    pub mode: Option<MirrorMode>,
    /// `disabled`, `enabled` or `creating`.
    pub state: String,
    pub primary: bool,
    pub global_id: String,
}

impl MirrorImageInfo {
    pub fn is_enabled(&self) -> bool {
        self.state == "enabled"
    }
}

/// Global (all-site) mirroring status of one image.
#[derive(Debug, Clone)]
pub struct MirrorImageStatus {
    pub local: MirrorSiteStatus,
    pub remotes: Vec<MirrorSiteStatus>,
}

/// One OSD blocklist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlocklistEntry {
    /// `ip:port/nonce` as printed by `ceph osd blocklist ls`.
    pub addr: String,
    /// Expiry of the entry.
    pub until: Option<String>,
}

// =============================================================================
// ADMIN TRAITS
// =============================================================================

/// RADOS object-map key/value access, the substrate of the journal and the
/// reftracker.
///
/// Reads on a missing object return the empty map; removals of missing keys
/// or objects succeed. Single-object writes are durable once acknowledged.
#[async_trait]
pub trait OmapStore: Send + Sync {
    /// Read the requested keys; absent keys are simply missing from the
    /// result.
    async fn get_keys(
        &self,
        pool: &str,
        namespace: &str,
        oid: &str,
        keys: &[String],
    ) -> Result<HashMap<String, String>>;

    /// Read every key/value pair of the object.
    async fn list_keys(&self, pool: &str, namespace: &str, oid: &str)
        -> Result<HashMap<String, String>>;

    /// Write (create or overwrite) key/value pairs; creates the object when
    /// missing.
    async fn set_keys(
        &self,
        pool: &str,
        namespace: &str,
        oid: &str,
        pairs: &HashMap<String, String>,
    ) -> Result<()>;

    /// Remove keys from the object.
    async fn remove_keys(&self, pool: &str, namespace: &str, oid: &str, keys: &[String])
        -> Result<()>;

    /// Remove the whole object.
    async fn remove_object(&self, pool: &str, namespace: &str, oid: &str) -> Result<()>;
}

/// CephFS filesystem administration.
#[async_trait]
pub trait FsAdmin: Send + Sync {
    /// Filesystems on the cluster, with ids.
    async fn list_filesystems(&self) -> Result<Vec<FilesystemInfo>>;

    /// Create the subvolume group; idempotent.
    async fn create_subvolume_group(&self, fs: &str, group: &str) -> Result<()>;

    /// Create a subvolume with the given quota.
    async fn create_subvolume(&self, fs: &str, group: &str, name: &str, size_bytes: u64)
        -> Result<()>;

    /// Inspect a subvolume; `VolumeNotFound` when absent.
    async fn subvolume_info(&self, fs: &str, group: &str, name: &str) -> Result<SubvolumeInfo>;

    /// Change the quota in place. Clusters without the command return
    /// `InvalidCommand`.
    async fn resize_subvolume(&self, fs: &str, group: &str, name: &str, size_bytes: u64)
        -> Result<()>;

    /// Remove a subvolume. `retain_snapshots` keeps its snapshots alive in
    /// the retained state; `force` ignores hydration leftovers.
    async fn remove_subvolume(
        &self,
        fs: &str,
        group: &str,
        name: &str,
        force: bool,
        retain_snapshots: bool,
    ) -> Result<()>;

    /// Stamp a metadata key onto a subvolume.
    async fn set_subvolume_metadata(
        &self,
        fs: &str,
        group: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<()>;

    /// Create a snapshot of a subvolume.
    async fn create_snapshot(&self, fs: &str, group: &str, subvol: &str, snap: &str)
        -> Result<()>;

    /// Remove a snapshot; `force` tolerates metadata leftovers.
    async fn remove_snapshot(
        &self,
        fs: &str,
        group: &str,
        subvol: &str,
        snap: &str,
        force: bool,
    ) -> Result<()>;

    /// Snapshot names present on a subvolume.
    async fn list_snapshots(&self, fs: &str, group: &str, subvol: &str) -> Result<Vec<String>>;

    /// Inspect a snapshot; `SnapshotNotFound` when absent.
    async fn snapshot_info(
        &self,
        fs: &str,
        group: &str,
        subvol: &str,
        snap: &str,
    ) -> Result<SubvolumeSnapshotInfo>;

    /// Protect a snapshot so it can be cloned. Clusters with
    /// snapshot-autoprotect report success without doing anything.
    async fn protect_snapshot(&self, fs: &str, group: &str, subvol: &str, snap: &str)
        -> Result<()>;

    /// Unprotect a snapshot. Already-unprotected is reported as success by
    /// the implementation.
    async fn unprotect_snapshot(&self, fs: &str, group: &str, subvol: &str, snap: &str)
        -> Result<()>;

    /// Start cloning a snapshot into a new subvolume.
    async fn clone_snapshot(
        &self,
        fs: &str,
        group: &str,
        subvol: &str,
        snap: &str,
        target: &str,
    ) -> Result<()>;

    /// Hydration state of a clone target.
    async fn clone_status(&self, fs: &str, group: &str, clone: &str) -> Result<CloneState>;

    /// Freeze the given subvolume paths under a quiesce set, refreshing the
    /// expiry timeout when the set already exists.
    async fn quiesce(
        &self,
        fs: &str,
        set_id: &str,
        members: &[String],
        timeout_secs: u64,
        expiration_secs: u64,
    ) -> Result<QuiesceState>;

    /// Release a quiesce set.
    async fn release_quiesce(&self, fs: &str, set_id: &str) -> Result<QuiesceState>;

    /// Abort a quiesce set after a failure.
    async fn reset_quiesce(&self, fs: &str, set_id: &str) -> Result<()>;
}

/// RBD image administration.
#[async_trait]
pub trait RbdAdmin: Send + Sync {
    /// Create an image with the given size and feature set.
    async fn create_image(
        &self,
        pool: &str,
        namespace: &str,
        name: &str,
        size_bytes: u64,
        features: &[String],
    ) -> Result<()>;

    /// Inspect an image; `ImageNotFound` when absent.
    async fn image_info(&self, pool: &str, namespace: &str, name: &str) -> Result<RbdImageInfo>;

    /// Remove an image. Images with snapshots fail with
    /// `VolumeHasSnapshots`.
    async fn remove_image(&self, pool: &str, namespace: &str, name: &str) -> Result<()>;

    /// Grow an image.
    async fn resize_image(&self, pool: &str, namespace: &str, name: &str, size_bytes: u64)
        -> Result<()>;

    /// Clone a protected snapshot into a new image.
    async fn clone_image(&self, parent: &RbdSnapSpec, child_name: &str, features: &[String])
        -> Result<()>;

    /// Detach an image from its parent snapshot.
    async fn flatten_image(&self, pool: &str, namespace: &str, name: &str) -> Result<()>;

    /// Reclaim zeroed space.
    async fn sparsify_image(&self, pool: &str, namespace: &str, name: &str) -> Result<()>;

    /// Create a snapshot on an image.
    async fn create_snapshot(&self, pool: &str, namespace: &str, image: &str, snap: &str)
        -> Result<()>;

    /// Remove a snapshot; protected snapshots fail with
    /// `SnapshotProtected`.
    async fn remove_snapshot(&self, pool: &str, namespace: &str, image: &str, snap: &str)
        -> Result<()>;

    /// Snapshots of an image.
    async fn list_snapshots(&self, pool: &str, namespace: &str, image: &str)
        -> Result<Vec<RbdSnapInfo>>;

    /// Protect a snapshot for cloning; already-protected is success.
    async fn protect_snapshot(&self, pool: &str, namespace: &str, image: &str, snap: &str)
        -> Result<()>;

    /// Unprotect a snapshot; already-unprotected is success.
    async fn unprotect_snapshot(&self, pool: &str, namespace: &str, image: &str, snap: &str)
        -> Result<()>;

    /// Children cloned from a snapshot.
    async fn children(&self, parent: &RbdSnapSpec) -> Result<Vec<String>>;

    /// Stamp image metadata.
    async fn set_image_meta(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        key: &str,
        value: &str,
    ) -> Result<()>;

    /// Read image metadata; `KeyNotFound` when the key is absent.
    async fn get_image_meta(&self, pool: &str, namespace: &str, image: &str, key: &str)
        -> Result<String>;

    /// Enable mirroring in the given mode.
    async fn mirror_enable(&self, pool: &str, namespace: &str, image: &str, mode: MirrorMode)
        -> Result<()>;

    /// Disable mirroring; `force` skips peer demotion checks.
    async fn mirror_disable(&self, pool: &str, namespace: &str, image: &str, force: bool)
        -> Result<()>;

    /// Promote the image to primary; `force` is the disaster-failover path.
    async fn mirror_promote(&self, pool: &str, namespace: &str, image: &str, force: bool)
        -> Result<()>;

    /// Demote the image to secondary.
    async fn mirror_demote(&self, pool: &str, namespace: &str, image: &str) -> Result<()>;

    /// Request a resync of a split-brained secondary.
    async fn mirror_resync(&self, pool: &str, namespace: &str, image: &str) -> Result<()>;

    /// Mirroring mode/primary introspection.
    async fn mirror_info(&self, pool: &str, namespace: &str, image: &str)
        -> Result<MirrorImageInfo>;

    /// All-site mirroring status.
    async fn mirror_status(&self, pool: &str, namespace: &str, image: &str)
        -> Result<MirrorImageStatus>;

    /// Add a mirror-snapshot schedule for the image.
    async fn snapshot_schedule_add(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        interval: &str,
        start_time: Option<&str>,
    ) -> Result<()>;

    /// Create an RBD group; idempotent.
    async fn group_create(&self, pool: &str, namespace: &str, group: &str) -> Result<()>;

    /// Remove an RBD group. The caller is responsible for emptying it
    /// first.
    async fn group_remove(&self, pool: &str, namespace: &str, group: &str) -> Result<()>;

    /// Add an image to a group; already-a-member is success.
    async fn group_image_add(&self, pool: &str, namespace: &str, group: &str, image: &str)
        -> Result<()>;

    /// Remove an image from a group; not-a-member is success.
    async fn group_image_remove(
        &self,
        pool: &str,
        namespace: &str,
        group: &str,
        image: &str,
    ) -> Result<()>;

    /// Images currently in a group; `VolumeNotFound` for an unknown group.
    async fn group_images(&self, pool: &str, namespace: &str, group: &str) -> Result<Vec<String>>;
}

/// Ceph-NFS export administration.
#[async_trait]
pub trait NfsAdmin: Send + Sync {
    /// Export `path` of `fs` at `pseudo_path` on the named NFS cluster.
    async fn create_export(
        &self,
        nfs_cluster: &str,
        fs: &str,
        path: &str,
        pseudo_path: &str,
    ) -> Result<()>;

    /// Remove an export; `ExportNotFound` when absent.
    async fn remove_export(&self, nfs_cluster: &str, pseudo_path: &str) -> Result<()>;
}

/// OSD-level administration: pools and the client blocklist.
#[async_trait]
pub trait OsdAdmin: Send + Sync {
    /// Numeric id of a pool; `PoolNotFound` when absent.
    async fn pool_id(&self, pool: &str) -> Result<i64>;

    /// Name of a pool by id; `PoolNotFound` when absent.
    async fn pool_name(&self, pool_id: i64) -> Result<String>;

    /// Add an address to the blocklist.
    async fn blocklist_add(&self, addr: &str) -> Result<()>;

    /// Remove an address from the blocklist.
    async fn blocklist_remove(&self, addr: &str) -> Result<()>;

    /// Current blocklist entries.
    async fn blocklist_list(&self) -> Result<Vec<BlocklistEntry>>;
}

/// Bundle of all admin interfaces offered by one cluster connection.
pub trait CephAdmin: Send + Sync {
    fn omap(&self) -> &dyn OmapStore;
    fn fs(&self) -> &dyn FsAdmin;
    fn rbd(&self) -> &dyn RbdAdmin;
    fn nfs(&self) -> &dyn NfsAdmin;
    fn osd(&self) -> &dyn OsdAdmin;
}
