//! Uniform snapshot operations over CephFS subvolumes and RBD images.
//!
//! The clone orchestrator and the CSI facade only see this capability
//! interface; which backend actually serves the snapshot is decided by the
//! volume being snapshotted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::admin::{FsAdmin, RbdAdmin, RbdSnapSpec};
use crate::cephfs::FEATURE_SNAPSHOT_AUTOPROTECT;
use crate::error::{CephixError, Result};

/// Backend-independent snapshot status.
#[derive(Debug, Clone)]
pub struct SnapshotStatus {
    pub created_at: DateTime<Utc>,
    /// Protected (or implicitly protected) and therefore clonable.
    pub ready: bool,
    /// Clones still depending on the snapshot.
    pub pending_clones: usize,
}

/// Snapshot capability interface with one implementation per backend.
#[async_trait]
pub trait SnapshotEngine: Send + Sync {
    async fn create(&self, parent: &str, snap: &str) -> Result<()>;
    async fn protect(&self, parent: &str, snap: &str) -> Result<()>;
    async fn unprotect(&self, parent: &str, snap: &str) -> Result<()>;
    async fn delete(&self, parent: &str, snap: &str) -> Result<()>;
    async fn info(&self, parent: &str, snap: &str) -> Result<SnapshotStatus>;
    /// Clone the snapshot into a new volume of the same backend.
    async fn clone(&self, parent: &str, snap: &str, target: &str) -> Result<()>;
}

/// Snapshots of CephFS subvolumes.
pub struct CephFsSnapshots<'a> {
    fs_admin: &'a dyn FsAdmin,
    fs_name: &'a str,
    group: &'a str,
}

impl<'a> CephFsSnapshots<'a> {
    pub fn new(fs_admin: &'a dyn FsAdmin, fs_name: &'a str, group: &'a str) -> Self {
        Self {
            fs_admin,
            fs_name,
            group,
        }
    }

    /// Whether the parent subvolume auto-protects its snapshots, making
    /// explicit (un)protect no-ops.
    async fn autoprotected(&self, parent: &str) -> Result<bool> {
        let info = self
            .fs_admin
            .subvolume_info(self.fs_name, self.group, parent)
            .await?;
        Ok(info.has_feature(FEATURE_SNAPSHOT_AUTOPROTECT))
    }
}

#[async_trait]
impl SnapshotEngine for CephFsSnapshots<'_> {
    async fn create(&self, parent: &str, snap: &str) -> Result<()> {
        self.fs_admin
            .create_snapshot(self.fs_name, self.group, parent, snap)
            .await
    }

    async fn protect(&self, parent: &str, snap: &str) -> Result<()> {
        if self.autoprotected(parent).await? {
            return Ok(());
        }
        self.fs_admin
            .protect_snapshot(self.fs_name, self.group, parent, snap)
            .await
    }

    async fn unprotect(&self, parent: &str, snap: &str) -> Result<()> {
        if self.autoprotected(parent).await? {
            return Ok(());
        }
        // Already-unprotected reads as success at the admin layer, so a
        // raced unprotect converges on the goal state.
        self.fs_admin
            .unprotect_snapshot(self.fs_name, self.group, parent, snap)
            .await
    }

    async fn delete(&self, parent: &str, snap: &str) -> Result<()> {
        self.fs_admin
            .remove_snapshot(self.fs_name, self.group, parent, snap, false)
            .await
    }

    async fn info(&self, parent: &str, snap: &str) -> Result<SnapshotStatus> {
        let autoprotect = self.autoprotected(parent).await?;
        let info = self
            .fs_admin
            .snapshot_info(self.fs_name, self.group, parent, snap)
            .await?;
        Ok(SnapshotStatus {
            created_at: info.created_at,
            ready: info.protected || autoprotect,
            pending_clones: info.pending_clones,
        })
    }

    async fn clone(&self, parent: &str, snap: &str, target: &str) -> Result<()> {
        self.fs_admin
            .clone_snapshot(self.fs_name, self.group, parent, snap, target)
            .await
    }
}

/// Snapshots of RBD images.
pub struct RbdSnapshots<'a> {
    rbd_admin: &'a dyn RbdAdmin,
    pool: &'a str,
    namespace: &'a str,
}

impl<'a> RbdSnapshots<'a> {
    pub fn new(rbd_admin: &'a dyn RbdAdmin, pool: &'a str, namespace: &'a str) -> Self {
        Self {
            rbd_admin,
            pool,
            namespace,
        }
    }

    fn snap_spec(&self, image: &str, snap: &str) -> RbdSnapSpec {
        RbdSnapSpec {
            pool: self.pool.to_string(),
            namespace: self.namespace.to_string(),
            image: image.to_string(),
            snapshot: snap.to_string(),
        }
    }
}

#[async_trait]
impl SnapshotEngine for RbdSnapshots<'_> {
    async fn create(&self, parent: &str, snap: &str) -> Result<()> {
        self.rbd_admin
            .create_snapshot(self.pool, self.namespace, parent, snap)
            .await
    }

    async fn protect(&self, parent: &str, snap: &str) -> Result<()> {
        self.rbd_admin
            .protect_snapshot(self.pool, self.namespace, parent, snap)
            .await
    }

    async fn unprotect(&self, parent: &str, snap: &str) -> Result<()> {
        self.rbd_admin
            .unprotect_snapshot(self.pool, self.namespace, parent, snap)
            .await
    }

    async fn delete(&self, parent: &str, snap: &str) -> Result<()> {
        self.rbd_admin
            .remove_snapshot(self.pool, self.namespace, parent, snap)
            .await
    }

    async fn info(&self, parent: &str, snap: &str) -> Result<SnapshotStatus> {
        let snaps = self
            .rbd_admin
            .list_snapshots(self.pool, self.namespace, parent)
            .await?;
        let entry = snaps
            .iter()
            .find(|s| s.name == snap)
            .ok_or_else(|| CephixError::SnapshotNotFound(format!("{parent}@{snap}")))?;
        let children = self
            .rbd_admin
            .children(&self.snap_spec(parent, snap))
            .await?;
        Ok(SnapshotStatus {
            created_at: entry.created_at.unwrap_or_else(Utc::now),
            ready: entry.protected,
            pending_clones: children.len(),
        })
    }

    async fn clone(&self, parent: &str, snap: &str, target: &str) -> Result<()> {
        self.rbd_admin
            .clone_image(&self.snap_spec(parent, snap), target, &[])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCluster;

    #[tokio::test]
    async fn test_cephfs_snapshot_lifecycle() {
        let cluster = MockCluster::new();
        cluster.add_filesystem("myfs", 1, "meta");
        cluster.create_subvolume_group("myfs", "csi").await.unwrap();
        cluster
            .create_subvolume("myfs", "csi", "sv", 4096)
            .await
            .unwrap();

        let snaps = CephFsSnapshots::new(&cluster, "myfs", "csi");
        snaps.create("sv", "s1").await.unwrap();
        assert!(!snaps.info("sv", "s1").await.unwrap().ready);

        snaps.protect("sv", "s1").await.unwrap();
        assert!(snaps.info("sv", "s1").await.unwrap().ready);

        snaps.unprotect("sv", "s1").await.unwrap();
        snaps.delete("sv", "s1").await.unwrap();
        assert!(matches!(
            snaps.info("sv", "s1").await,
            Err(CephixError::SnapshotNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cephfs_autoprotect_skips_protect_calls() {
        let cluster = MockCluster::new();
        cluster.add_filesystem("myfs", 1, "meta");
        cluster.set_autoprotect(true);
        cluster.create_subvolume_group("myfs", "csi").await.unwrap();
        cluster
            .create_subvolume("myfs", "csi", "sv", 4096)
            .await
            .unwrap();

        let snaps = CephFsSnapshots::new(&cluster, "myfs", "csi");
        snaps.create("sv", "s1").await.unwrap();
        // Ready without an explicit protect.
        assert!(snaps.info("sv", "s1").await.unwrap().ready);
        snaps.protect("sv", "s1").await.unwrap();
        snaps.unprotect("sv", "s1").await.unwrap();
        assert_eq!(cluster.op_count("fs.protect_snapshot"), 0);
        assert_eq!(cluster.op_count("fs.unprotect_snapshot"), 0);
    }

    #[tokio::test]
    async fn test_rbd_snapshot_pending_clones() {
        let cluster = MockCluster::new();
        cluster.add_pool("rbd", 2);
        cluster
            .create_image("rbd", "", "img", 1 << 30, &[])
            .await
            .unwrap();

        let snaps = RbdSnapshots::new(&cluster, "rbd", "");
        snaps.create("img", "s1").await.unwrap();
        snaps.protect("img", "s1").await.unwrap();
        snaps.clone("img", "s1", "child").await.unwrap();

        let status = snaps.info("img", "s1").await.unwrap();
        assert!(status.ready);
        assert_eq!(status.pending_clones, 1);
    }
}
