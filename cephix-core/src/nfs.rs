//! Ceph-NFS re-export of CephFS volumes.
//!
//! An NFS-backed volume is a CephFS subvolume plus an export of its path on
//! a named NFS cluster. The chosen cluster name is persisted as a journal
//! attribute at create time so deletion can reverse the export without any
//! request parameters.

use tracing::{info, instrument};

use crate::admin::{NfsAdmin, OmapStore};
use crate::error::{CephixError, Result};
use crate::journal::Journal;

/// Journal attribute holding the NFS cluster an export was created on.
pub const ATTR_NFS_CLUSTER: &str = "csi.nfscluster";

/// Export lifecycle for NFS-backed volumes.
pub struct NfsExporter<'a> {
    nfs_admin: &'a dyn NfsAdmin,
}

impl<'a> NfsExporter<'a> {
    pub fn new(nfs_admin: &'a dyn NfsAdmin) -> Self {
        Self { nfs_admin }
    }

    /// Pseudo path an exported volume is published under.
    pub fn pseudo_path(volume_id: &str) -> String {
        format!("/{volume_id}")
    }

    /// Export a provisioned subvolume and persist the NFS cluster name in
    /// the volume's journal entry.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self, omap, journal), fields(nfs_cluster = %nfs_cluster, volume_id = %volume_id))]
    pub async fn create_export(
        &self,
        omap: &dyn OmapStore,
        journal: &Journal,
        pool: &str,
        namespace: &str,
        nfs_cluster: &str,
        fs_name: &str,
        subvolume_path: &str,
        volume_id: &str,
        volume_uuid: &str,
    ) -> Result<()> {
        let pseudo = Self::pseudo_path(volume_id);
        self.nfs_admin
            .create_export(nfs_cluster, fs_name, subvolume_path, &pseudo)
            .await?;

        // Persisting the cluster name is what makes deletion self-contained;
        // if this write fails the export must not survive.
        if let Err(e) = journal
            .store_attribute(omap, pool, namespace, volume_uuid, ATTR_NFS_CLUSTER, nfs_cluster)
            .await
        {
            let _ = self.nfs_admin.remove_export(nfs_cluster, &pseudo).await;
            return Err(e);
        }

        info!(pseudo = %pseudo, "NFS export created");
        Ok(())
    }

    /// Remove the export of a volume. A missing export is benign: the
    /// backend deletion that follows must still proceed.
    #[instrument(skip(self, omap, journal), fields(volume_id = %volume_id))]
    pub async fn delete_export(
        &self,
        omap: &dyn OmapStore,
        journal: &Journal,
        pool: &str,
        namespace: &str,
        volume_id: &str,
        volume_uuid: &str,
    ) -> Result<()> {
        let nfs_cluster = match journal
            .fetch_attribute(omap, pool, namespace, volume_uuid, ATTR_NFS_CLUSTER)
            .await
        {
            Ok(name) => name,
            // No recorded cluster: the export was never created.
            Err(CephixError::KeyNotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        match self
            .nfs_admin
            .remove_export(&nfs_cluster, &Self::pseudo_path(volume_id))
            .await
        {
            Ok(()) => Ok(()),
            Err(CephixError::ExportNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::ReserveRequest;
    use crate::mock::MockCluster;

    const POOL: &str = "meta";

    async fn reserve(cluster: &MockCluster, journal: &Journal) -> String {
        journal
            .reserve_name(
                cluster,
                POOL,
                "",
                &ReserveRequest {
                    request_name: "pvc-nfs",
                    name_prefix: "csi-vol",
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .uuid
    }

    #[tokio::test]
    async fn test_export_round_trip() {
        let cluster = MockCluster::new();
        let journal = Journal::volumes();
        let uuid = reserve(&cluster, &journal).await;
        let exporter = NfsExporter::new(&cluster);

        exporter
            .create_export(
                &cluster,
                &journal,
                POOL,
                "",
                "nfs-east",
                "myfs",
                "/volumes/csi/sv1",
                "vol-handle-1",
                &uuid,
            )
            .await
            .unwrap();

        // The cluster name is recoverable from the journal alone.
        let stored = journal
            .fetch_attribute(&cluster, POOL, "", &uuid, ATTR_NFS_CLUSTER)
            .await
            .unwrap();
        assert_eq!(stored, "nfs-east");

        exporter
            .delete_export(&cluster, &journal, POOL, "", "vol-handle-1", &uuid)
            .await
            .unwrap();

        // Deleting again is benign even though the export is gone.
        exporter
            .delete_export(&cluster, &journal, POOL, "", "vol-handle-1", &uuid)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_without_recorded_cluster_is_noop() {
        let cluster = MockCluster::new();
        let journal = Journal::volumes();
        let uuid = reserve(&cluster, &journal).await;
        let exporter = NfsExporter::new(&cluster);

        exporter
            .delete_export(&cluster, &journal, POOL, "", "vol-handle-1", &uuid)
            .await
            .unwrap();
        assert_eq!(cluster.op_count("nfs.remove_export"), 0);
    }
}
