//! CephFS subvolume management.
//!
//! Wraps the filesystem admin seam with the driver's provisioning policy:
//! at-most-once subvolume-group creation per cluster, cached detection of
//! `subvolume resize` support, and snapshot-retention-aware purging.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use tracing::{debug, info, instrument, warn};

use crate::admin::{FsAdmin, SubvolumeInfo};
use crate::error::{CephixError, Result};

/// Subvolume feature advertising clone support.
pub const FEATURE_SNAPSHOT_CLONE: &str = "snapshot-clone";
/// Subvolume feature making (un)protect implicit.
pub const FEATURE_SNAPSHOT_AUTOPROTECT: &str = "snapshot-autoprotect";
/// Subvolume feature allowing deletion with retained snapshots.
pub const FEATURE_SNAPSHOT_RETENTION: &str = "snapshot-retention";

/// Server-side support verdict for `subvolume resize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeSupport {
    Unknown,
    Supported,
    Unsupported,
}

#[derive(Debug, Default)]
struct ClusterAdditionalInfo {
    groups_created: HashSet<(String, String)>,
    resize_support: Option<ResizeSupport>,
}

// Per-cluster capability cache shared by all RPCs in the process. Guarded by
// a mutex; entries live until `reset_cluster_cache` at driver shutdown.
static CLUSTER_ADDITIONAL_INFO: Lazy<Mutex<HashMap<String, ClusterAdditionalInfo>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Drop all cached cluster capabilities (driver shutdown and tests).
pub fn reset_cluster_cache() {
    CLUSTER_ADDITIONAL_INFO
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clear();
}

fn with_cluster_info<R>(cluster_id: &str, f: impl FnOnce(&mut ClusterAdditionalInfo) -> R) -> R {
    let mut map = CLUSTER_ADDITIONAL_INFO
        .lock()
        .unwrap_or_else(|e| e.into_inner());
    f(map.entry(cluster_id.to_string()).or_default())
}

/// Subvolume operations for one filesystem of one cluster.
pub struct SubvolumeManager<'a> {
    fs_admin: &'a dyn FsAdmin,
    cluster_id: &'a str,
    fs_name: &'a str,
    group: &'a str,
    /// Opt-in for the destructive create-as-resize fallback on clusters
    /// without native resize.
    allow_recreate_on_resize: bool,
}

impl<'a> SubvolumeManager<'a> {
    pub fn new(
        fs_admin: &'a dyn FsAdmin,
        cluster_id: &'a str,
        fs_name: &'a str,
        group: &'a str,
        allow_recreate_on_resize: bool,
    ) -> Self {
        Self {
            fs_admin,
            cluster_id,
            fs_name,
            group,
            allow_recreate_on_resize,
        }
    }

    pub fn group(&self) -> &str {
        self.group
    }

    /// Create the subvolume group if this process has not done so yet for
    /// the cluster. The backend call is idempotent; the cache only saves
    /// the round trip.
    pub async fn ensure_group(&self) -> Result<()> {
        let created = with_cluster_info(self.cluster_id, |info| {
            info.groups_created
                .contains(&(self.fs_name.to_string(), self.group.to_string()))
        });
        if created {
            return Ok(());
        }
        self.fs_admin
            .create_subvolume_group(self.fs_name, self.group)
            .await?;
        with_cluster_info(self.cluster_id, |info| {
            info.groups_created
                .insert((self.fs_name.to_string(), self.group.to_string()));
        });
        info!(
            fs = %self.fs_name,
            group = %self.group,
            "subvolume group ready"
        );
        Ok(())
    }

    /// Create a subvolume with the given quota.
    #[instrument(skip(self), fields(fs = %self.fs_name, group = %self.group))]
    pub async fn create(&self, name: &str, size_bytes: u64) -> Result<()> {
        self.ensure_group().await?;
        self.fs_admin
            .create_subvolume(self.fs_name, self.group, name, size_bytes)
            .await?;
        info!(subvolume = %name, size_bytes, "subvolume created");
        Ok(())
    }

    /// Inspect a subvolume.
    pub async fn info(&self, name: &str) -> Result<SubvolumeInfo> {
        self.fs_admin
            .subvolume_info(self.fs_name, self.group, name)
            .await
    }

    /// Resize a subvolume to the new quota.
    ///
    /// The first resize per cluster probes whether the server knows the
    /// command; the verdict is cached. Clusters without it only get the
    /// create-as-resize fallback when the operator opted in, because that
    /// path recreates the subvolume definition.
    pub async fn resize(&self, name: &str, new_size_bytes: u64) -> Result<()> {
        let support = with_cluster_info(self.cluster_id, |info| info.resize_support)
            .unwrap_or(ResizeSupport::Unknown);

        if support != ResizeSupport::Unsupported {
            match self
                .fs_admin
                .resize_subvolume(self.fs_name, self.group, name, new_size_bytes)
                .await
            {
                Ok(()) => {
                    if support == ResizeSupport::Unknown {
                        with_cluster_info(self.cluster_id, |info| {
                            info.resize_support = Some(ResizeSupport::Supported);
                        });
                        debug!(cluster = %self.cluster_id, "subvolume resize supported");
                    }
                    return Ok(());
                }
                Err(CephixError::InvalidCommand(_)) => {
                    with_cluster_info(self.cluster_id, |info| {
                        info.resize_support = Some(ResizeSupport::Unsupported);
                    });
                    warn!(
                        cluster = %self.cluster_id,
                        "cluster does not support subvolume resize"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        if !self.allow_recreate_on_resize {
            return Err(CephixError::Unsupported(format!(
                "cluster {} cannot resize subvolumes and the recreate fallback \
                 is not enabled",
                self.cluster_id
            )));
        }
        warn!(subvolume = %name, "falling back to create-as-resize");
        self.fs_admin
            .create_subvolume(self.fs_name, self.group, name, new_size_bytes)
            .await
    }

    /// Remove a subvolume.
    ///
    /// `retain_snapshots` keeps the snapshots alive in the retained state;
    /// the caller must first check that the cluster advertises
    /// snapshot-retention and that the snapshots deserve to survive.
    /// Without the flag a subvolume carrying snapshots is refused by the
    /// backend.
    #[instrument(skip(self), fields(fs = %self.fs_name, group = %self.group))]
    pub async fn purge(&self, name: &str, force: bool, retain_snapshots: bool) -> Result<()> {
        if retain_snapshots {
            let info = self.info(name).await?;
            if !info.has_feature(FEATURE_SNAPSHOT_RETENTION) {
                return Err(CephixError::VolumeHasSnapshots(name.to_string()));
            }
            debug!(subvolume = %name, "removing with retained snapshots");
        }
        self.fs_admin
            .remove_subvolume(self.fs_name, self.group, name, force, retain_snapshots)
            .await
    }

    /// Stamp a metadata key onto a subvolume; failures are surfaced to the
    /// caller, which decides whether stamping is best-effort.
    pub async fn set_metadata(&self, name: &str, key: &str, value: &str) -> Result<()> {
        self.fs_admin
            .set_subvolume_metadata(self.fs_name, self.group, name, key, value)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCluster;

    fn unique_cluster(tag: &str) -> String {
        // The capability cache is process-wide; keep test clusters apart.
        format!("cluster-{tag}-{}", uuid::Uuid::new_v4().simple())
    }

    #[tokio::test]
    async fn test_group_created_at_most_once() {
        let cluster = MockCluster::new();
        cluster.add_filesystem("myfs", 1, "meta");
        let id = unique_cluster("group");
        let mgr = SubvolumeManager::new(&cluster, &id, "myfs", "csi", false);

        mgr.create("sv1", 4096).await.unwrap();
        mgr.create("sv2", 4096).await.unwrap();
        assert_eq!(cluster.op_count("fs.create_subvolume_group"), 1);
    }

    #[tokio::test]
    async fn test_resize_support_is_cached() {
        let cluster = MockCluster::new();
        cluster.add_filesystem("myfs", 1, "meta");
        let id = unique_cluster("resize");
        let mgr = SubvolumeManager::new(&cluster, &id, "myfs", "csi", false);

        mgr.create("sv", 4096).await.unwrap();
        mgr.resize("sv", 8192).await.unwrap();
        mgr.resize("sv", 16384).await.unwrap();
        assert_eq!(cluster.op_count("fs.resize_subvolume"), 2);
        assert_eq!(mgr.info("sv").await.unwrap().bytes_quota, Some(16384));
    }

    #[tokio::test]
    async fn test_resize_fallback_requires_opt_in() {
        let cluster = MockCluster::new();
        cluster.add_filesystem("myfs", 1, "meta");
        cluster.set_resize_supported(false);
        let id = unique_cluster("fallback");

        let mgr = SubvolumeManager::new(&cluster, &id, "myfs", "csi", false);
        mgr.create("sv", 4096).await.unwrap();
        assert!(matches!(
            mgr.resize("sv", 8192).await,
            Err(CephixError::Unsupported(_))
        ));

        // The verdict is cached: the next attempt goes straight to the
        // fallback decision without probing the server again.
        assert!(mgr.resize("sv", 8192).await.is_err());
        assert_eq!(cluster.op_count("fs.resize_subvolume"), 1);

        // With the opt-in, the create-as-resize path runs.
        let mgr = SubvolumeManager::new(&cluster, &id, "myfs", "csi", true);
        mgr.resize("sv", 8192).await.unwrap();
        assert_eq!(mgr.info("sv").await.unwrap().bytes_quota, Some(8192));
    }

    #[tokio::test]
    async fn test_purge_refuses_snapshots_without_retain() {
        let cluster = MockCluster::new();
        cluster.add_filesystem("myfs", 1, "meta");
        let id = unique_cluster("purge");
        let mgr = SubvolumeManager::new(&cluster, &id, "myfs", "csi", false);

        mgr.create("sv", 4096).await.unwrap();
        cluster
            .create_snapshot("myfs", "csi", "sv", "snap")
            .await
            .unwrap();

        assert!(matches!(
            mgr.purge("sv", false, false).await,
            Err(CephixError::VolumeHasSnapshots(_))
        ));

        // With the retain flag the subvolume moves to the retained state.
        mgr.purge("sv", false, true).await.unwrap();
        let info = mgr.info("sv").await.unwrap();
        assert!(info.is_snapshot_retained());
    }

    #[tokio::test]
    async fn test_purge_missing_subvolume_propagates() {
        let cluster = MockCluster::new();
        cluster.add_filesystem("myfs", 1, "meta");
        let id = unique_cluster("missing");
        let mgr = SubvolumeManager::new(&cluster, &id, "myfs", "csi", false);
        assert!(matches!(
            mgr.purge("ghost", false, false).await,
            Err(CephixError::VolumeNotFound(_))
        ));
    }
}
