//! Snapshot reference tracking.
//!
//! Snapshot-backed volumes serve their data directly from a parent
//! snapshot, so the snapshot must outlive the CO's deletion of its source.
//! Each tracked snapshot owns an omap object listing the volumes that
//! depend on it; the snapshot may be deleted only once that list is empty.
//!
//! Mutations bump an epoch key. Callers read the reference list together
//! with its epoch and present the epoch back when removing; a mismatch
//! means another RPC touched the list in between and the caller gets
//! `ObjectOutOfDate`, which the facade maps to `ABORTED` for a CO retry.

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument};

use crate::admin::OmapStore;
use crate::error::{CephixError, Result};

const REF_KEY_PREFIX: &str = "csi.ref.";
const EPOCH_KEY: &str = "csi.epoch";

/// Reference list of one tracked snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotRefs {
    /// Volume ids depending on the snapshot.
    pub refs: HashSet<String>,
    /// Epoch to present back on removal.
    pub epoch: u64,
}

/// Reference tracker over a pool's omap namespace.
#[derive(Debug, Clone, Default)]
pub struct RefTracker;

impl RefTracker {
    pub fn new() -> Self {
        Self
    }

    fn oid(snap_uuid: &str) -> String {
        format!("csi.ref.{snap_uuid}")
    }

    fn ref_key(volume_id: &str) -> String {
        format!("{REF_KEY_PREFIX}{volume_id}")
    }

    fn parse_epoch(pairs: &HashMap<String, String>) -> u64 {
        pairs
            .get(EPOCH_KEY)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Read the reference list of a snapshot; `None` when the snapshot was
    /// never tracked (or fully unreferenced and collected).
    pub async fn fetch(
        &self,
        omap: &dyn OmapStore,
        pool: &str,
        namespace: &str,
        snap_uuid: &str,
    ) -> Result<Option<SnapshotRefs>> {
        let pairs = omap.list_keys(pool, namespace, &Self::oid(snap_uuid)).await?;
        if pairs.is_empty() {
            return Ok(None);
        }
        let epoch = Self::parse_epoch(&pairs);
        let refs = pairs
            .keys()
            .filter_map(|k| k.strip_prefix(REF_KEY_PREFIX).map(str::to_string))
            .collect();
        Ok(Some(SnapshotRefs { refs, epoch }))
    }

    /// Record that `volume_id` depends on the snapshot. Idempotent; the
    /// epoch advances either way.
    #[instrument(skip(self, omap))]
    pub async fn add_ref(
        &self,
        omap: &dyn OmapStore,
        pool: &str,
        namespace: &str,
        snap_uuid: &str,
        volume_id: &str,
    ) -> Result<()> {
        let oid = Self::oid(snap_uuid);
        let current = omap.list_keys(pool, namespace, &oid).await?;
        let epoch = Self::parse_epoch(&current) + 1;

        let mut pairs = HashMap::new();
        pairs.insert(Self::ref_key(volume_id), String::new());
        pairs.insert(EPOCH_KEY.to_string(), epoch.to_string());
        omap.set_keys(pool, namespace, &oid, &pairs).await?;
        debug!(snap_uuid = %snap_uuid, volume_id = %volume_id, epoch, "snapshot reference added");
        Ok(())
    }

    /// Drop `volume_id`'s reference, presenting the `epoch` read earlier.
    ///
    /// Returns `true` when the last reference went away and the caller owns
    /// deleting the backing snapshot. A concurrent mutation since the read
    /// surfaces `ObjectOutOfDate`.
    #[instrument(skip(self, omap))]
    pub async fn unref(
        &self,
        omap: &dyn OmapStore,
        pool: &str,
        namespace: &str,
        snap_uuid: &str,
        volume_id: &str,
        epoch: u64,
    ) -> Result<bool> {
        let oid = Self::oid(snap_uuid);
        let current = omap.list_keys(pool, namespace, &oid).await?;
        if current.is_empty() {
            // Never tracked or already collected; nothing holds the
            // snapshot any more.
            return Ok(true);
        }
        let current_epoch = Self::parse_epoch(&current);
        if current_epoch != epoch {
            return Err(CephixError::ObjectOutOfDate(format!(
                "reflist of {snap_uuid} changed (epoch {current_epoch} != {epoch})"
            )));
        }

        let ref_key = Self::ref_key(volume_id);
        let remaining = current
            .keys()
            .filter(|k| k.starts_with(REF_KEY_PREFIX))
            .filter(|k| **k != ref_key)
            .count();

        if remaining == 0 {
            omap.remove_object(pool, namespace, &oid).await?;
            debug!(snap_uuid = %snap_uuid, "last snapshot reference removed");
            return Ok(true);
        }

        omap.remove_keys(pool, namespace, &oid, &[ref_key]).await?;
        let mut pairs = HashMap::new();
        pairs.insert(EPOCH_KEY.to_string(), (epoch + 1).to_string());
        omap.set_keys(pool, namespace, &oid, &pairs).await?;
        debug!(
            snap_uuid = %snap_uuid,
            volume_id = %volume_id,
            remaining,
            "snapshot reference removed"
        );
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCluster;

    const POOL: &str = "meta";

    #[tokio::test]
    async fn test_last_unref_signals_backing_delete() {
        let cluster = MockCluster::new();
        let tracker = RefTracker::new();

        tracker.add_ref(&cluster, POOL, "", "snap1", "vol-1").await.unwrap();
        tracker.add_ref(&cluster, POOL, "", "snap1", "vol-2").await.unwrap();

        let refs = tracker.fetch(&cluster, POOL, "", "snap1").await.unwrap().unwrap();
        assert_eq!(refs.refs.len(), 2);

        // First unref: snapshot must stay.
        let needs_delete = tracker
            .unref(&cluster, POOL, "", "snap1", "vol-1", refs.epoch)
            .await
            .unwrap();
        assert!(!needs_delete);

        // Second unref with a fresh read: last one out turns off the light.
        let refs = tracker.fetch(&cluster, POOL, "", "snap1").await.unwrap().unwrap();
        assert_eq!(refs.refs.len(), 1);
        let needs_delete = tracker
            .unref(&cluster, POOL, "", "snap1", "vol-2", refs.epoch)
            .await
            .unwrap();
        assert!(needs_delete);
        assert!(tracker.fetch(&cluster, POOL, "", "snap1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_epoch_is_rejected() {
        let cluster = MockCluster::new();
        let tracker = RefTracker::new();

        tracker.add_ref(&cluster, POOL, "", "snap2", "vol-1").await.unwrap();
        let refs = tracker.fetch(&cluster, POOL, "", "snap2").await.unwrap().unwrap();

        // Another RPC adds a dependant between our read and our removal.
        tracker.add_ref(&cluster, POOL, "", "snap2", "vol-2").await.unwrap();

        assert!(matches!(
            tracker
                .unref(&cluster, POOL, "", "snap2", "vol-1", refs.epoch)
                .await,
            Err(CephixError::ObjectOutOfDate(_))
        ));

        // With a fresh read it goes through and the snapshot survives.
        let refs = tracker.fetch(&cluster, POOL, "", "snap2").await.unwrap().unwrap();
        let needs_delete = tracker
            .unref(&cluster, POOL, "", "snap2", "vol-1", refs.epoch)
            .await
            .unwrap();
        assert!(!needs_delete);
    }

    #[tokio::test]
    async fn test_untracked_snapshot_unref_is_deletable() {
        let cluster = MockCluster::new();
        let tracker = RefTracker::new();
        let needs_delete = tracker
            .unref(&cluster, POOL, "", "never-tracked", "vol-x", 0)
            .await
            .unwrap();
        assert!(needs_delete);
    }

    #[tokio::test]
    async fn test_add_ref_is_idempotent() {
        let cluster = MockCluster::new();
        let tracker = RefTracker::new();

        tracker.add_ref(&cluster, POOL, "", "snap3", "vol-1").await.unwrap();
        tracker.add_ref(&cluster, POOL, "", "snap3", "vol-1").await.unwrap();

        let refs = tracker.fetch(&cluster, POOL, "", "snap3").await.unwrap().unwrap();
        assert_eq!(refs.refs.len(), 1);
        // Epoch still advanced on the repeat, so racing readers notice.
        assert_eq!(refs.epoch, 2);
    }
}
