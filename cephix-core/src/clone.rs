//! CephFS clone orchestration.
//!
//! Subvolume clones are multi-step: snapshot, protect, clone, poll, resize,
//! unprotect, delete-snapshot. Every step has a compensating action so a
//! failure at any edge leaves nothing behind, and a clone still hydrating
//! surfaces `CloneInProgress` so the CO re-enters through the resolve path
//! rather than restarting the ladder.
//!
//! Compensating deletes inside failure paths are logged and swallowed so
//! they never mask the primary error; a delete that *is* the operation
//! propagates normally.

use tracing::{debug, error, info, instrument};

use crate::admin::FsAdmin;
use crate::cephfs::SubvolumeManager;
use crate::error::{CephixError, Result};
use crate::snapshot::{CephFsSnapshots, SnapshotEngine};
use crate::types::CloneState;

/// Name of the transient snapshot backing a volume-to-volume clone.
pub fn tmp_clone_snapshot_name(clone: &str) -> String {
    format!("csi-tmp-{clone}")
}

/// Orchestrates subvolume clones on one filesystem.
pub struct CloneOrchestrator<'a> {
    fs_admin: &'a dyn FsAdmin,
    fs_name: &'a str,
    group: &'a str,
}

impl<'a> CloneOrchestrator<'a> {
    pub fn new(fs_admin: &'a dyn FsAdmin, fs_name: &'a str, group: &'a str) -> Self {
        Self {
            fs_admin,
            fs_name,
            group,
        }
    }

    fn snapshots(&self) -> CephFsSnapshots<'a> {
        CephFsSnapshots::new(self.fs_admin, self.fs_name, self.group)
    }

    async fn compensate<F>(&self, what: &str, op: F)
    where
        F: std::future::Future<Output = Result<()>>,
    {
        if let Err(e) = op.await {
            if !e.is_not_found() {
                error!(step = %what, error = %e, "compensation failed");
            }
        }
    }

    /// Clone a live subvolume into `dst`.
    ///
    /// Creates the transient snapshot and starts hydration. The poll /
    /// finalize half lives in [`Self::finish_clone_from_subvolume`], which
    /// this calls once; `CloneInProgress` from there means the CO retries
    /// and the facade resumes via the resolve path.
    #[instrument(skip(self, subvolumes), fields(fs = %self.fs_name, src = %src, dst = %dst))]
    pub async fn clone_from_subvolume(
        &self,
        subvolumes: &SubvolumeManager<'a>,
        src: &str,
        dst: &str,
        size_bytes: u64,
    ) -> Result<()> {
        let snaps = self.snapshots();
        let tmp_snap = tmp_clone_snapshot_name(dst);

        snaps.create(src, &tmp_snap).await?;

        if let Err(e) = snaps.protect(src, &tmp_snap).await {
            self.compensate("delete tmp snapshot", snaps.delete(src, &tmp_snap))
                .await;
            return Err(e);
        }

        if let Err(e) = snaps.clone(src, &tmp_snap, dst).await {
            self.compensate("purge aborted clone", subvolumes.purge(dst, true, false))
                .await;
            self.compensate("unprotect tmp snapshot", snaps.unprotect(src, &tmp_snap))
                .await;
            self.compensate("delete tmp snapshot", snaps.delete(src, &tmp_snap))
                .await;
            return Err(e);
        }

        self.finish_clone_from_subvolume(subvolumes, src, dst, size_bytes)
            .await
    }

    /// Poll the hydration state of a subvolume-sourced clone and run the
    /// post-clone steps once it is complete. Also the re-entry point when a
    /// retried CreateVolume finds the reservation already bound.
    pub async fn finish_clone_from_subvolume(
        &self,
        subvolumes: &SubvolumeManager<'a>,
        src: &str,
        dst: &str,
        size_bytes: u64,
    ) -> Result<()> {
        let snaps = self.snapshots();
        let tmp_snap = tmp_clone_snapshot_name(dst);

        let state = self.fs_admin.clone_status(self.fs_name, self.group, dst).await?;
        match state {
            CloneState::Pending | CloneState::InProgress => {
                debug!(clone = %dst, state = ?state, "clone still hydrating");
                return Err(CephixError::CloneInProgress(dst.to_string()));
            }
            CloneState::Failed => {
                self.compensate("purge failed clone", subvolumes.purge(dst, true, false))
                    .await;
                self.compensate("unprotect tmp snapshot", snaps.unprotect(src, &tmp_snap))
                    .await;
                self.compensate("delete tmp snapshot", snaps.delete(src, &tmp_snap))
                    .await;
                return Err(CephixError::Internal(format!("clone {dst} failed")));
            }
            CloneState::Complete => {}
        }

        // The backend clone keeps the source quota; enforce the requested
        // size before handing the volume out.
        subvolumes.resize(dst, size_bytes).await?;

        // A repeated call after completion finds the transient snapshot
        // already gone; that is the goal state.
        match snaps.unprotect(src, &tmp_snap).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        match snaps.delete(src, &tmp_snap).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        info!(src = %src, dst = %dst, "clone from subvolume complete");
        Ok(())
    }

    /// Clone an existing (protected) snapshot into `dst`.
    #[instrument(skip(self, subvolumes), fields(fs = %self.fs_name, parent = %parent, snap = %snap, dst = %dst))]
    pub async fn clone_from_snapshot(
        &self,
        subvolumes: &SubvolumeManager<'a>,
        parent: &str,
        snap: &str,
        dst: &str,
        size_bytes: u64,
    ) -> Result<()> {
        let snaps = self.snapshots();

        snaps.protect(parent, snap).await?;
        snaps.clone(parent, snap, dst).await?;
        self.finish_clone_from_snapshot(subvolumes, dst, size_bytes).await
    }

    /// Poll / finalize a snapshot-sourced clone. The source snapshot is the
    /// CO's object and is never deleted here; on `CloneInProgress` the
    /// half-hydrated `dst` is preserved because the in-flight operation is
    /// the truth.
    pub async fn finish_clone_from_snapshot(
        &self,
        subvolumes: &SubvolumeManager<'a>,
        dst: &str,
        size_bytes: u64,
    ) -> Result<()> {
        let state = self.fs_admin.clone_status(self.fs_name, self.group, dst).await?;
        match state {
            CloneState::Pending | CloneState::InProgress => {
                return Err(CephixError::CloneInProgress(dst.to_string()));
            }
            CloneState::Failed => {
                self.compensate("purge failed clone", subvolumes.purge(dst, true, false))
                    .await;
                return Err(CephixError::Internal(format!("clone {dst} failed")));
            }
            CloneState::Complete => {}
        }

        subvolumes.resize(dst, size_bytes).await?;
        info!(dst = %dst, "clone from snapshot complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCluster;

    async fn setup(cluster: &MockCluster) {
        cluster.add_filesystem("myfs", 1, "meta");
        cluster.create_subvolume_group("myfs", "csi").await.unwrap();
        cluster
            .create_subvolume("myfs", "csi", "src", 8192)
            .await
            .unwrap();
    }

    fn managers(cluster: &MockCluster) -> (CloneOrchestrator<'_>, SubvolumeManager<'_>) {
        (
            CloneOrchestrator::new(cluster, "myfs", "csi"),
            SubvolumeManager::new(cluster, "test-cluster", "myfs", "csi", false),
        )
    }

    #[tokio::test]
    async fn test_clone_completes_after_retry() {
        let cluster = MockCluster::new();
        setup(&cluster).await;
        cluster.set_clone_polls(1);
        let (orch, subvols) = managers(&cluster);

        // First pass: hydration is in progress, the CO must retry.
        let err = orch
            .clone_from_subvolume(&subvols, "src", "dst", 16384)
            .await
            .unwrap_err();
        assert!(matches!(err, CephixError::CloneInProgress(_)));
        assert!(cluster.has_subvolume("myfs", "csi", "dst"));

        // Retry resumes at the poll, finishes the ladder.
        orch.finish_clone_from_subvolume(&subvols, "src", "dst", 16384)
            .await
            .unwrap();

        // Requested size enforced, transient snapshot cleaned up.
        let info = cluster.subvolume_info("myfs", "csi", "dst").await.unwrap();
        assert_eq!(info.bytes_quota, Some(16384));
        assert!(cluster.subvolume_snapshots("myfs", "csi", "src").is_empty());
    }

    #[tokio::test]
    async fn test_instant_clone_single_call() {
        let cluster = MockCluster::new();
        setup(&cluster).await;
        cluster.set_clone_polls(0);
        let (orch, subvols) = managers(&cluster);

        orch.clone_from_subvolume(&subvols, "src", "dst", 16384)
            .await
            .unwrap();
        assert!(cluster.has_subvolume("myfs", "csi", "dst"));
        assert!(cluster.subvolume_snapshots("myfs", "csi", "src").is_empty());
    }

    #[tokio::test]
    async fn test_failed_protect_cleans_tmp_snapshot() {
        let cluster = MockCluster::new();
        setup(&cluster).await;
        let (orch, subvols) = managers(&cluster);
        cluster.fail_once("fs.protect_snapshot");

        assert!(orch
            .clone_from_subvolume(&subvols, "src", "dst", 16384)
            .await
            .is_err());
        assert!(cluster.subvolume_snapshots("myfs", "csi", "src").is_empty());
        assert!(!cluster.has_subvolume("myfs", "csi", "dst"));
    }

    #[tokio::test]
    async fn test_failed_clone_start_compensates_fully() {
        let cluster = MockCluster::new();
        setup(&cluster).await;
        let (orch, subvols) = managers(&cluster);
        cluster.fail_once("fs.clone_snapshot");

        assert!(orch
            .clone_from_subvolume(&subvols, "src", "dst", 16384)
            .await
            .is_err());
        assert!(cluster.subvolume_snapshots("myfs", "csi", "src").is_empty());
        assert!(!cluster.has_subvolume("myfs", "csi", "dst"));
    }

    #[tokio::test]
    async fn test_clone_from_snapshot_preserves_source() {
        let cluster = MockCluster::new();
        setup(&cluster).await;
        cluster.set_clone_polls(0);
        cluster
            .create_snapshot("myfs", "csi", "src", "user-snap")
            .await
            .unwrap();
        let (orch, subvols) = managers(&cluster);

        orch.clone_from_snapshot(&subvols, "src", "user-snap", "restored", 16384)
            .await
            .unwrap();
        assert!(cluster.has_subvolume("myfs", "csi", "restored"));
        // The CO-owned snapshot survives the restore.
        assert_eq!(
            cluster.subvolume_snapshots("myfs", "csi", "src"),
            vec!["user-snap".to_string()]
        );
    }
}
