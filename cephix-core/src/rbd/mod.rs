//! RBD image management.
//!
//! Provisioning policy on top of the RBD admin seam: image creation with a
//! default feature set, copy-on-write clones with parent snapshot
//! bookkeeping, the flatten policy applied before an image leaves the
//! driver's hands, and metadata-hosted encryption passphrases.

pub mod mirror;

use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::admin::{RbdAdmin, RbdImageInfo, RbdSnapSpec};
use crate::error::{CephixError, Result};

/// Image feature every provisioned image carries; clones require it.
pub const FEATURE_LAYERING: &str = "layering";

/// Prefix of transient snapshots backing volume-to-volume clones.
const CLONE_SNAP_PREFIX: &str = "csi-clone-";

/// When a cloned image is decoupled from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlattenMode {
    /// Keep the copy-on-write relationship.
    #[default]
    Never,
    /// Flatten right after cloning, before mirroring or group membership.
    Force,
}

impl FlattenMode {
    /// Parse the storage-class / replication parameter.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "" | "never" => Ok(FlattenMode::Never),
            "force" => Ok(FlattenMode::Force),
            other => Err(CephixError::InvalidArgument(format!(
                "unknown flattenMode {other:?}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlattenMode::Never => "never",
            FlattenMode::Force => "force",
        }
    }
}

/// Image metadata key holding the encryption passphrase of a volume whose
/// DEK is wrapped by an external KMS.
pub const META_ENCRYPTION_PASSPHRASE: &str = "rbd.csi.cephix.encryption-passphrase";

/// Image operations within one pool / namespace.
pub struct RbdManager<'a> {
    rbd_admin: &'a dyn RbdAdmin,
    pool: &'a str,
    namespace: &'a str,
}

impl<'a> RbdManager<'a> {
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

    fn default_features(features: &[String]) -> Vec<String> {
        if features.is_empty() {
            vec![FEATURE_LAYERING.to_string()]
        } else {
            features.to_vec()
        }
    }

    /// Create an empty image.
    #[instrument(skip(self, features), fields(pool = %self.pool, image = %name))]
    pub async fn create(&self, name: &str, size_bytes: u64, features: &[String]) -> Result<()> {
        if size_bytes == 0 {
            return Err(CephixError::InvalidArgument(
                "image size must be greater than zero".to_string(),
            ));
        }
        self.rbd_admin
            .create_image(
                self.pool,
                self.namespace,
                name,
                size_bytes,
                &Self::default_features(features),
            )
            .await?;
        info!(image = %name, size_bytes, "rbd image created");
        Ok(())
    }

    /// Inspect an image.
    pub async fn info(&self, name: &str) -> Result<RbdImageInfo> {
        self.rbd_admin.image_info(self.pool, self.namespace, name).await
    }

    /// Clone a new image from an existing snapshot of `parent`.
    #[instrument(skip(self), fields(pool = %self.pool))]
    pub async fn create_from_snapshot(
        &self,
        parent: &str,
        snap: &str,
        child: &str,
        size_bytes: u64,
        flatten: FlattenMode,
    ) -> Result<()> {
        let parent_spec = self.snap_spec(parent, snap);
        self.rbd_admin.protect_snapshot(self.pool, self.namespace, parent, snap).await?;
        self.rbd_admin
            .clone_image(&parent_spec, child, &Self::default_features(&[]))
            .await?;

        if let Err(e) = self.finish_clone(child, size_bytes, flatten).await {
            self.compensate_failed_clone(child).await;
            return Err(e);
        }
        info!(parent = %parent, snap = %snap, child = %child, "rbd image cloned from snapshot");
        Ok(())
    }

    /// Clone a new image from a live volume through a transient snapshot.
    ///
    /// Without flattening, the transient snapshot stays protected as the
    /// clone's parent and is collected when the clone is deleted.
    #[instrument(skip(self), fields(pool = %self.pool))]
    pub async fn create_from_volume(
        &self,
        src: &str,
        child: &str,
        size_bytes: u64,
        flatten: FlattenMode,
    ) -> Result<()> {
        let tmp_snap = format!("{CLONE_SNAP_PREFIX}{}", Uuid::new_v4().simple());
        let parent_spec = self.snap_spec(src, &tmp_snap);

        self.rbd_admin
            .create_snapshot(self.pool, self.namespace, src, &tmp_snap)
            .await?;
        if let Err(e) = self
            .rbd_admin
            .protect_snapshot(self.pool, self.namespace, src, &tmp_snap)
            .await
        {
            self.cleanup_snapshot(src, &tmp_snap).await;
            return Err(e);
        }
        if let Err(e) = self
            .rbd_admin
            .clone_image(&parent_spec, child, &Self::default_features(&[]))
            .await
        {
            self.cleanup_snapshot(src, &tmp_snap).await;
            return Err(e);
        }

        if let Err(e) = self.finish_clone(child, size_bytes, flatten).await {
            self.compensate_failed_clone(child).await;
            self.cleanup_snapshot(src, &tmp_snap).await;
            return Err(e);
        }

        if flatten == FlattenMode::Force {
            // The flattened child no longer needs the transient snapshot.
            self.cleanup_snapshot(src, &tmp_snap).await;
        }
        info!(src = %src, child = %child, "rbd image cloned from volume");
        Ok(())
    }

    /// Post-clone steps shared by both clone paths.
    async fn finish_clone(&self, child: &str, size_bytes: u64, flatten: FlattenMode) -> Result<()> {
        if flatten == FlattenMode::Force {
            self.rbd_admin.flatten_image(self.pool, self.namespace, child).await?;
        }
        let current = self.info(child).await?;
        if size_bytes > 0 && current.size_bytes != size_bytes {
            self.rbd_admin
                .resize_image(self.pool, self.namespace, child, size_bytes)
                .await?;
        }
        Ok(())
    }

    /// Remove a half-created clone; failures are logged so the primary
    /// error wins.
    async fn compensate_failed_clone(&self, child: &str) {
        if let Err(e) = self.rbd_admin.remove_image(self.pool, self.namespace, child).await {
            if !e.is_not_found() {
                error!(image = %child, error = %e, "failed to remove aborted clone");
            }
        }
    }

    /// Unprotect and remove a transient clone snapshot when nothing depends
    /// on it any more. Deferred cleanup: log-only.
    async fn cleanup_snapshot(&self, image: &str, snap: &str) {
        let spec = self.snap_spec(image, snap);
        match self.rbd_admin.children(&spec).await {
            Ok(children) if children.is_empty() => {
                if let Err(e) = self
                    .rbd_admin
                    .unprotect_snapshot(self.pool, self.namespace, image, snap)
                    .await
                {
                    if !e.is_not_found() {
                        error!(snap = %snap, error = %e, "failed to unprotect transient snapshot");
                        return;
                    }
                }
                if let Err(e) = self
                    .rbd_admin
                    .remove_snapshot(self.pool, self.namespace, image, snap)
                    .await
                {
                    if !e.is_not_found() {
                        error!(snap = %snap, error = %e, "failed to remove transient snapshot");
                    }
                }
            }
            Ok(_) => debug!(snap = %snap, "transient snapshot still has children"),
            Err(e) => {
                if !e.is_not_found() {
                    error!(snap = %snap, error = %e, "failed to list snapshot children");
                }
            }
        }
    }

    /// Grow an image.
    pub async fn resize(&self, name: &str, size_bytes: u64) -> Result<()> {
        self.rbd_admin
            .resize_image(self.pool, self.namespace, name, size_bytes)
            .await
    }

    /// Delete an image and collect a transient parent snapshot it may have
    /// been cloned from.
    #[instrument(skip(self), fields(pool = %self.pool, image = %name))]
    pub async fn delete(&self, name: &str) -> Result<()> {
        let parent = match self.info(name).await {
            Ok(info) => info.parent,
            Err(e) => return Err(e),
        };

        self.rbd_admin.remove_image(self.pool, self.namespace, name).await?;

        if let Some(parent) = parent {
            if parent.snapshot.starts_with(CLONE_SNAP_PREFIX) {
                self.cleanup_snapshot(&parent.image, &parent.snapshot).await;
            }
        }
        info!(image = %name, "rbd image deleted");
        Ok(())
    }

    /// Punch out zeroed regions to give space back to the pool.
    pub async fn sparsify(&self, name: &str) -> Result<()> {
        self.rbd_admin.sparsify_image(self.pool, self.namespace, name).await
    }

    /// Stamp image metadata.
    pub async fn set_metadata(&self, name: &str, key: &str, value: &str) -> Result<()> {
        self.rbd_admin
            .set_image_meta(self.pool, self.namespace, name, key, value)
            .await
    }

    /// Snapshots currently present on an image.
    pub async fn has_snapshots(&self, name: &str) -> Result<bool> {
        let snaps = self
            .rbd_admin
            .list_snapshots(self.pool, self.namespace, name)
            .await?;
        // Transient clone snapshots do not count as user snapshots.
        Ok(snaps.iter().any(|s| !s.name.starts_with(CLONE_SNAP_PREFIX)))
    }

    /// Rotate the metadata-hosted encryption passphrase of an image.
    ///
    /// The volume must have been provisioned with encryption; rotating an
    /// unencrypted volume is a precondition failure, not a silent enable.
    #[instrument(skip(self), fields(pool = %self.pool, image = %name))]
    pub async fn rotate_encryption_key(&self, name: &str) -> Result<()> {
        match self
            .rbd_admin
            .get_image_meta(self.pool, self.namespace, name, META_ENCRYPTION_PASSPHRASE)
            .await
        {
            Ok(_) => {}
            Err(CephixError::KeyNotFound(_)) => {
                return Err(CephixError::FailedPrecondition(format!(
                    "image {name} is not encrypted"
                )));
            }
            Err(e) => return Err(e),
        }

        let new_passphrase = Uuid::new_v4().simple().to_string();
        self.rbd_admin
            .set_image_meta(
                self.pool,
                self.namespace,
                name,
                META_ENCRYPTION_PASSPHRASE,
                &new_passphrase,
            )
            .await?;
        info!(image = %name, "encryption passphrase rotated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::RbdAdmin;
    use crate::mock::MockCluster;

    fn manager(cluster: &MockCluster) -> RbdManager<'_> {
        RbdManager::new(cluster, "rbd", "")
    }

    async fn setup(cluster: &MockCluster) {
        cluster.add_pool("rbd", 2);
    }

    #[tokio::test]
    async fn test_create_and_delete() {
        let cluster = MockCluster::new();
        setup(&cluster).await;
        let mgr = manager(&cluster);

        mgr.create("img", 1 << 30, &[]).await.unwrap();
        let info = mgr.info("img").await.unwrap();
        assert_eq!(info.size_bytes, 1 << 30);
        assert!(info.features.contains(&FEATURE_LAYERING.to_string()));

        mgr.delete("img").await.unwrap();
        assert!(matches!(mgr.info("img").await, Err(CephixError::ImageNotFound(_))));
    }

    #[tokio::test]
    async fn test_zero_size_rejected() {
        let cluster = MockCluster::new();
        setup(&cluster).await;
        assert!(matches!(
            manager(&cluster).create("img", 0, &[]).await,
            Err(CephixError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_clone_from_volume_and_delete_collects_tmp_snap() {
        let cluster = MockCluster::new();
        setup(&cluster).await;
        let mgr = manager(&cluster);

        mgr.create("src", 1 << 30, &[]).await.unwrap();
        mgr.create_from_volume("src", "child", 2 << 30, FlattenMode::Never)
            .await
            .unwrap();

        let child = mgr.info("child").await.unwrap();
        assert_eq!(child.size_bytes, 2 << 30);
        let parent = child.parent.expect("unflattened clone keeps its parent");
        assert!(parent.snapshot.starts_with("csi-clone-"));

        // Deleting the clone collects the transient parent snapshot.
        mgr.delete("child").await.unwrap();
        let snaps = cluster.list_snapshots("rbd", "", "src").await.unwrap();
        assert!(snaps.is_empty());
    }

    #[tokio::test]
    async fn test_forced_flatten_detaches_clone() {
        let cluster = MockCluster::new();
        setup(&cluster).await;
        let mgr = manager(&cluster);

        mgr.create("src", 1 << 30, &[]).await.unwrap();
        mgr.create_from_volume("src", "child", 0, FlattenMode::Force)
            .await
            .unwrap();

        let child = mgr.info("child").await.unwrap();
        assert!(child.parent.is_none());
        // Transient snapshot already collected.
        let snaps = cluster.list_snapshots("rbd", "", "src").await.unwrap();
        assert!(snaps.is_empty());
    }

    #[tokio::test]
    async fn test_user_snapshots_block_delete_detection() {
        let cluster = MockCluster::new();
        setup(&cluster).await;
        let mgr = manager(&cluster);

        mgr.create("img", 1 << 30, &[]).await.unwrap();
        assert!(!mgr.has_snapshots("img").await.unwrap());
        cluster.create_snapshot("rbd", "", "img", "user-snap").await.unwrap();
        assert!(mgr.has_snapshots("img").await.unwrap());
    }

    #[tokio::test]
    async fn test_key_rotation_requires_encryption() {
        let cluster = MockCluster::new();
        setup(&cluster).await;
        let mgr = manager(&cluster);

        mgr.create("img", 1 << 30, &[]).await.unwrap();
        assert!(matches!(
            mgr.rotate_encryption_key("img").await,
            Err(CephixError::FailedPrecondition(_))
        ));

        mgr.set_metadata("img", META_ENCRYPTION_PASSPHRASE, "initial")
            .await
            .unwrap();
        mgr.rotate_encryption_key("img").await.unwrap();
        let rotated = cluster
            .get_image_meta("rbd", "", "img", META_ENCRYPTION_PASSPHRASE)
            .await
            .unwrap();
        assert_ne!(rotated, "initial");
    }
}
