//! Crash-consistent volume-group snapshots.
//!
//! A group snapshot spans subvolumes on several filesystems. The sequence
//! is quiesce-all, snapshot-each, release-all; the member map in the group
//! journal grows monotonically, so a crash or CO retry resumes exactly
//! where the previous attempt stopped. Liveness across retries comes from
//! refreshing the quiesce set's expiry timeout on every call.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::admin::CephAdmin;
use crate::error::{CephixError, Result};
use crate::journal::{Journal, ReserveRequest};
use crate::types::QuiesceState;

/// Journal attribute holding the sorted source-volume set of a group.
const ATTR_SOURCE_IDS: &str = "csi.sourceids";

/// Seconds a quiesce may take before the cluster gives up on it.
const QUIESCE_TIMEOUT_SECS: u64 = 180;
/// Expiry refreshed on every call; an abandoned set thaws on its own.
const QUIESCE_EXPIRATION_SECS: u64 = 180;

/// One member volume of a group snapshot request.
#[derive(Debug, Clone)]
pub struct GroupMember {
    /// Encoded CSI handle of the member volume.
    pub volume_id: String,
    /// Filesystem the subvolume lives on.
    pub fs_name: String,
    /// Backend subvolume name.
    pub subvolume: String,
    /// Subvolume path, the quiesce member string.
    pub path: String,
}

/// One snapshot taken as part of a group.
#[derive(Debug, Clone)]
pub struct MemberSnapshot {
    pub volume_id: String,
    /// UUID recorded in the group journal.
    pub snap_uuid: String,
    /// Backend snapshot name.
    pub snap_name: String,
}

/// Outcome of a completed group snapshot.
#[derive(Debug)]
pub struct GroupSnapshotResult {
    pub group_uuid: String,
    pub members: Vec<MemberSnapshot>,
}

/// Backend snapshot name for a group member snapshot UUID.
pub fn member_snap_name(snap_uuid: &str) -> String {
    format!("csi-snap-{snap_uuid}")
}

/// Engine driving the quiesce / snapshot-each / release cycle.
pub struct GroupSnapshotEngine<'a> {
    admin: &'a dyn CephAdmin,
    journal: Journal,
    /// Pool (and namespace) holding the group journal.
    pool: &'a str,
    namespace: &'a str,
    /// Subvolume group of the member volumes.
    subvolume_group: &'a str,
}

impl<'a> GroupSnapshotEngine<'a> {
    pub fn new(
        admin: &'a dyn CephAdmin,
        pool: &'a str,
        namespace: &'a str,
        subvolume_group: &'a str,
    ) -> Self {
        Self {
            admin,
            journal: Journal::groups(),
            pool,
            namespace,
            subvolume_group,
        }
    }

    fn sorted_ids(members: &[GroupMember]) -> String {
        let mut ids: Vec<&str> = members.iter().map(|m| m.volume_id.as_str()).collect();
        ids.sort_unstable();
        ids.join(",")
    }

    /// Member paths per filesystem, deterministically ordered.
    fn members_by_fs<'m>(members: &'m [GroupMember]) -> BTreeMap<&'m str, Vec<&'m GroupMember>> {
        let mut by_fs: BTreeMap<&str, Vec<&GroupMember>> = BTreeMap::new();
        for member in members {
            by_fs.entry(member.fs_name.as_str()).or_default().push(member);
        }
        by_fs
    }

    /// Create (or resume) a group snapshot for `request_name`.
    ///
    /// Returns `QuiesceInProgress` while any filesystem is still freezing
    /// or releasing; the CO retries and the call resumes. On a
    /// non-retryable error every snapshot taken so far is deleted, the
    /// quiesce sets are reset and the reservation undone, so either all
    /// members appear in the map or none do.
    #[instrument(skip(self, members), fields(request_name = %request_name, members = members.len()))]
    pub async fn create(
        &self,
        request_name: &str,
        members: &[GroupMember],
    ) -> Result<GroupSnapshotResult> {
        if members.is_empty() {
            return Err(CephixError::InvalidArgument(
                "group snapshot needs at least one source volume".to_string(),
            ));
        }
        let omap = self.admin.omap();
        let sorted = Self::sorted_ids(members);

        let group_uuid = match self
            .journal
            .check_reservation(omap, self.pool, self.namespace, request_name, None)
            .await?
        {
            Some(existing) => {
                match self
                    .journal
                    .fetch_attribute(omap, self.pool, self.namespace, &existing.uuid, ATTR_SOURCE_IDS)
                    .await
                {
                    Ok(stored) if stored == sorted => {}
                    Ok(_) => {
                        return Err(CephixError::InvalidArgument(format!(
                            "group snapshot {request_name} was requested with a \
                             different source volume set"
                        )));
                    }
                    // A crash split the reservation from the attribute
                    // write; adopt the current set and continue.
                    Err(CephixError::KeyNotFound(_)) => {
                        self.journal
                            .store_attribute(
                                omap,
                                self.pool,
                                self.namespace,
                                &existing.uuid,
                                ATTR_SOURCE_IDS,
                                &sorted,
                            )
                            .await?;
                    }
                    Err(e) => return Err(e),
                }
                existing.uuid
            }
            None => {
                let reserved = self
                    .journal
                    .reserve_name(
                        omap,
                        self.pool,
                        self.namespace,
                        &ReserveRequest {
                            request_name,
                            name_prefix: "csi-group",
                            ..Default::default()
                        },
                    )
                    .await?;
                self.journal
                    .store_attribute(
                        omap,
                        self.pool,
                        self.namespace,
                        &reserved.uuid,
                        ATTR_SOURCE_IDS,
                        &sorted,
                    )
                    .await?;
                reserved.uuid
            }
        };

        let mapping = self
            .journal
            .get_volumes_mapping(omap, self.pool, self.namespace, &group_uuid)
            .await?;

        // Every member snapshotted already: the freeze has served its
        // purpose, go straight to release.
        if mapping.len() < members.len() {
            match self.run_quiesce_and_snapshot(request_name, &group_uuid, members, mapping).await {
                Ok(()) => {}
                Err(e) if e.is_retryable() => return Err(e),
                Err(e) => {
                    self.abort(request_name, &group_uuid, members).await;
                    return Err(e);
                }
            }
        }

        self.release_all(&group_uuid, members).await?;

        let mapping = self
            .journal
            .get_volumes_mapping(omap, self.pool, self.namespace, &group_uuid)
            .await?;
        let result_members = members
            .iter()
            .map(|m| {
                let snap_uuid = mapping
                    .get(&m.volume_id)
                    .cloned()
                    .ok_or_else(|| {
                        CephixError::Internal(format!(
                            "member {} missing from completed group map",
                            m.volume_id
                        ))
                    })?;
                Ok(MemberSnapshot {
                    volume_id: m.volume_id.clone(),
                    snap_name: member_snap_name(&snap_uuid),
                    snap_uuid,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            request_name = %request_name,
            group_uuid = %group_uuid,
            members = result_members.len(),
            "group snapshot complete"
        );
        Ok(GroupSnapshotResult {
            group_uuid,
            members: result_members,
        })
    }

    /// Quiesce all filesystems, then snapshot members missing from the map.
    async fn run_quiesce_and_snapshot(
        &self,
        request_name: &str,
        group_uuid: &str,
        members: &[GroupMember],
        mut mapping: HashMap<String, String>,
    ) -> Result<()> {
        let fs_admin = self.admin.fs();
        let omap = self.admin.omap();

        // Freeze every filesystem first, then judge the combined state, so
        // one slow filesystem does not delay the others' freeze from even
        // starting.
        let mut pending_fs = None;
        for (fs, fs_members) in Self::members_by_fs(members) {
            let paths: Vec<String> = fs_members.iter().map(|m| m.path.clone()).collect();
            let state = fs_admin
                .quiesce(
                    fs,
                    group_uuid,
                    &paths,
                    QUIESCE_TIMEOUT_SECS,
                    QUIESCE_EXPIRATION_SECS,
                )
                .await?;
            match state {
                QuiesceState::Quiesced => {}
                QuiesceState::Quiescing => {
                    debug!(fs = %fs, "filesystem still quiescing");
                    pending_fs.get_or_insert(fs);
                }
                QuiesceState::Released => {
                    return Err(CephixError::Internal(format!(
                        "quiesce set for {fs} released before snapshots were taken"
                    )));
                }
            }
        }
        if pending_fs.is_some() {
            return Err(CephixError::QuiesceInProgress(request_name.to_string()));
        }

        for member in members {
            if mapping.contains_key(&member.volume_id) {
                continue;
            }
            let snap_uuid = Uuid::new_v4().simple().to_string();
            let snap_name = member_snap_name(&snap_uuid);
            fs_admin
                .create_snapshot(
                    &member.fs_name,
                    self.subvolume_group,
                    &member.subvolume,
                    &snap_name,
                )
                .await?;
            let mut entry = HashMap::new();
            entry.insert(member.volume_id.clone(), snap_uuid.clone());
            self.journal
                .add_volumes_mapping(omap, self.pool, self.namespace, group_uuid, &entry)
                .await?;
            mapping.insert(member.volume_id.clone(), snap_uuid);
            debug!(volume_id = %member.volume_id, "group member snapshotted");
        }
        Ok(())
    }

    /// Release the quiesce sets of every involved filesystem.
    async fn release_all(&self, group_uuid: &str, members: &[GroupMember]) -> Result<()> {
        let fs_admin = self.admin.fs();
        for (fs, _) in Self::members_by_fs(members) {
            match fs_admin.release_quiesce(fs, group_uuid).await {
                Ok(QuiesceState::Released) => {}
                Ok(_) => return Err(CephixError::QuiesceInProgress(fs.to_string())),
                // An expired or already-collected set is as released as it
                // gets.
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Best-effort teardown after a non-retryable failure: delete recorded
    /// snapshots, reset quiesce sets, undo the reservation. Errors here are
    /// logged so they never mask the primary failure.
    async fn abort(&self, request_name: &str, group_uuid: &str, members: &[GroupMember]) {
        let fs_admin = self.admin.fs();
        let omap = self.admin.omap();

        let mapping = match self
            .journal
            .get_volumes_mapping(omap, self.pool, self.namespace, group_uuid)
            .await
        {
            Ok(mapping) => mapping,
            Err(e) => {
                error!(error = %e, "failed to read group map during abort");
                HashMap::new()
            }
        };
        for member in members {
            if let Some(snap_uuid) = mapping.get(&member.volume_id) {
                let snap_name = member_snap_name(snap_uuid);
                if let Err(e) = fs_admin
                    .remove_snapshot(
                        &member.fs_name,
                        self.subvolume_group,
                        &member.subvolume,
                        &snap_name,
                        true,
                    )
                    .await
                {
                    if !e.is_not_found() {
                        error!(snap = %snap_name, error = %e, "failed to delete group member snapshot");
                    }
                }
            }
        }
        for (fs, _) in Self::members_by_fs(members) {
            if let Err(e) = fs_admin.reset_quiesce(fs, group_uuid).await {
                warn!(fs = %fs, error = %e, "failed to reset quiesce set");
            }
        }
        if let Err(e) = self
            .journal
            .undo_reservation(omap, self.pool, self.namespace, request_name, group_uuid)
            .await
        {
            error!(error = %e, "failed to undo group reservation");
        }
    }

    /// Delete a group snapshot: every member snapshot, the member map and
    /// the reservation. Member snapshot deletion is the primary operation
    /// here, so failures propagate.
    #[instrument(skip(self, members), fields(group_uuid = %group_uuid))]
    pub async fn delete(
        &self,
        request_name: &str,
        group_uuid: &str,
        members: &[GroupMember],
    ) -> Result<()> {
        let fs_admin = self.admin.fs();
        let omap = self.admin.omap();

        let mapping = self
            .journal
            .get_volumes_mapping(omap, self.pool, self.namespace, group_uuid)
            .await?;
        for member in members {
            if let Some(snap_uuid) = mapping.get(&member.volume_id) {
                let snap_name = member_snap_name(snap_uuid);
                match fs_admin
                    .remove_snapshot(
                        &member.fs_name,
                        self.subvolume_group,
                        &member.subvolume,
                        &snap_name,
                        false,
                    )
                    .await
                {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
                self.journal
                    .remove_volumes_mapping(
                        omap,
                        self.pool,
                        self.namespace,
                        group_uuid,
                        &[member.volume_id.clone()],
                    )
                    .await?;
            }
        }
        self.journal
            .undo_reservation(omap, self.pool, self.namespace, request_name, group_uuid)
            .await
    }

    /// Resolve an existing group snapshot by request name.
    pub async fn resolve(
        &self,
        request_name: &str,
    ) -> Result<Option<(String, HashMap<String, String>)>> {
        let omap = self.admin.omap();
        let Some(existing) = self
            .journal
            .check_reservation(omap, self.pool, self.namespace, request_name, None)
            .await?
        else {
            return Ok(None);
        };
        let mapping = self
            .journal
            .get_volumes_mapping(omap, self.pool, self.namespace, &existing.uuid)
            .await?;
        Ok(Some((existing.uuid, mapping)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::FsAdmin;
    use crate::mock::MockCluster;

    const POOL: &str = "fs1-meta";

    async fn setup(cluster: &MockCluster) -> Vec<GroupMember> {
        cluster.add_filesystem("fs1", 1, "fs1-meta");
        cluster.add_filesystem("fs2", 2, "fs2-meta");
        cluster.create_subvolume_group("fs1", "csi").await.unwrap();
        cluster.create_subvolume_group("fs2", "csi").await.unwrap();
        for (fs, name) in [("fs1", "sv-a"), ("fs1", "sv-b"), ("fs2", "sv-c")] {
            cluster.create_subvolume(fs, "csi", name, 4096).await.unwrap();
        }
        vec![
            GroupMember {
                volume_id: "vol-a".to_string(),
                fs_name: "fs1".to_string(),
                subvolume: "sv-a".to_string(),
                path: "/volumes/csi/sv-a".to_string(),
            },
            GroupMember {
                volume_id: "vol-b".to_string(),
                fs_name: "fs1".to_string(),
                subvolume: "sv-b".to_string(),
                path: "/volumes/csi/sv-b".to_string(),
            },
            GroupMember {
                volume_id: "vol-c".to_string(),
                fs_name: "fs2".to_string(),
                subvolume: "sv-c".to_string(),
                path: "/volumes/csi/sv-c".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn test_group_snapshot_retry_protocol() {
        let cluster = MockCluster::new();
        let members = setup(&cluster).await;
        let engine = GroupSnapshotEngine::new(&cluster, POOL, "", "csi");

        // First call: fs1 is still quiescing, the CO must retry.
        let err = engine.create("group-1", &members).await.unwrap_err();
        assert!(matches!(err, CephixError::QuiesceInProgress(_)));

        // Nothing was snapshotted while frozen-ness was unconfirmed.
        assert!(cluster.subvolume_snapshots("fs1", "csi", "sv-a").is_empty());

        // Retry: both filesystems reach quiesced, snapshots are cut and
        // released.
        let result = engine.create("group-1", &members).await.unwrap();
        assert_eq!(result.members.len(), 3);
        for member in ["sv-a", "sv-b"] {
            assert_eq!(cluster.subvolume_snapshots("fs1", "csi", member).len(), 1);
        }
        assert_eq!(cluster.subvolume_snapshots("fs2", "csi", "sv-c").len(), 1);

        // All members share the group; snapshot ids are per member.
        let ids: Vec<&str> = result.members.iter().map(|m| m.snap_uuid.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().all(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn test_group_snapshot_idempotent_completion() {
        let cluster = MockCluster::new();
        cluster.set_quiesce_polls(0);
        let members = setup(&cluster).await;
        let engine = GroupSnapshotEngine::new(&cluster, POOL, "", "csi");

        let first = engine.create("group-2", &members).await.unwrap();
        let second = engine.create("group-2", &members).await.unwrap();
        assert_eq!(first.group_uuid, second.group_uuid);
        // No extra snapshots on the repeat call.
        assert_eq!(cluster.subvolume_snapshots("fs1", "csi", "sv-a").len(), 1);
        // The repeat skipped quiesce entirely (2 filesystems, 1 call each).
        assert_eq!(cluster.op_count("fs.quiesce"), 2);
    }

    #[tokio::test]
    async fn test_group_snapshot_source_set_must_match() {
        let cluster = MockCluster::new();
        cluster.set_quiesce_polls(0);
        let members = setup(&cluster).await;
        let engine = GroupSnapshotEngine::new(&cluster, POOL, "", "csi");

        engine.create("group-3", &members).await.unwrap();
        let fewer = members[..2].to_vec();
        assert!(matches!(
            engine.create("group-3", &fewer).await,
            Err(CephixError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_group_snapshot_failure_rolls_back_all() {
        let cluster = MockCluster::new();
        cluster.set_quiesce_polls(0);
        let members = setup(&cluster).await;
        let engine = GroupSnapshotEngine::new(&cluster, POOL, "", "csi");

        // A member snapshot fails mid-sequence; nothing may survive.
        cluster.fail_once("fs.create_snapshot");
        let err = engine.create("group-4", &members).await.unwrap_err();
        assert!(!matches!(err, CephixError::QuiesceInProgress(_)));

        for (fs, name) in [("fs1", "sv-a"), ("fs1", "sv-b"), ("fs2", "sv-c")] {
            assert!(
                cluster.subvolume_snapshots(fs, "csi", name).is_empty(),
                "{fs}/{name} must have no snapshot after rollback"
            );
        }
        // The reservation was undone: a fresh call succeeds from scratch.
        let result = engine.create("group-4", &members).await.unwrap();
        assert_eq!(result.members.len(), 3);
    }

    #[tokio::test]
    async fn test_group_snapshot_delete() {
        let cluster = MockCluster::new();
        cluster.set_quiesce_polls(0);
        let members = setup(&cluster).await;
        let engine = GroupSnapshotEngine::new(&cluster, POOL, "", "csi");

        let result = engine.create("group-5", &members).await.unwrap();
        engine
            .delete("group-5", &result.group_uuid, &members)
            .await
            .unwrap();

        for (fs, name) in [("fs1", "sv-a"), ("fs1", "sv-b"), ("fs2", "sv-c")] {
            assert!(cluster.subvolume_snapshots(fs, "csi", name).is_empty());
        }
        assert!(engine.resolve("group-5").await.unwrap().is_none());
        // Idempotent delete of a vanished group.
        engine
            .delete("group-5", &result.group_uuid, &members)
            .await
            .unwrap();
    }
}
