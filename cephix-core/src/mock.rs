//! Mock Ceph cluster for testing and development.
//!
//! Implements every admin trait over in-memory state so the provisioning
//! state machines can be exercised without a cluster. Useful for:
//! - Unit and integration testing
//! - Development without Ceph tooling installed
//!
//! Long-running backend behaviour is simulated with poll counters: clones
//! hydrate and quiesce sets settle after a configurable number of status
//! calls, which lets tests drive the `ABORTED`-and-retry protocol.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::admin::{
    BlocklistEntry, CephAdmin, FilesystemInfo, FsAdmin, MirrorImageInfo, MirrorImageStatus,
    NfsAdmin, OmapStore, OsdAdmin, RbdAdmin, RbdImageInfo, RbdSnapInfo, RbdSnapSpec,
    SubvolumeInfo, SubvolumeSnapshotInfo,
};
use crate::error::{CephixError, Result};
use crate::types::{CloneState, MirrorMode, MirrorSiteStatus, QuiesceState};

#[derive(Debug, Clone)]
struct MockSubvolSnapshot {
    created_at: DateTime<Utc>,
    protected: bool,
    pending_clones: usize,
}

#[derive(Debug, Clone)]
struct MockCloneProgress {
    state: CloneState,
    polls_remaining: u32,
    source_subvol: String,
    source_snap: String,
}

#[derive(Debug, Clone)]
struct MockSubvolume {
    quota: Option<u64>,
    used: u64,
    features: Vec<String>,
    state: String,
    snapshots: HashMap<String, MockSubvolSnapshot>,
    clone: Option<MockCloneProgress>,
}

#[derive(Debug)]
struct MockFilesystem {
    id: i64,
    metadata_pool: String,
    /// group name -> subvolume name -> subvolume
    groups: HashMap<String, HashMap<String, MockSubvolume>>,
    metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
struct MockRbdSnap {
    size_bytes: u64,
    protected: bool,
    created_at: DateTime<Utc>,
    children: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct MockMirror {
    mode: Option<MirrorMode>,
    state: String,
    primary: bool,
    global_id: String,
}

impl MockMirror {
    fn is_enabled(&self) -> bool {
        self.mode.is_some()
    }
}

#[derive(Debug, Clone)]
struct MockImage {
    size_bytes: u64,
    features: Vec<String>,
    parent: Option<RbdSnapSpec>,
    snapshots: HashMap<String, MockRbdSnap>,
    meta: HashMap<String, String>,
    mirror: MockMirror,
    schedules: Vec<(String, Option<String>)>,
    site_statuses: Option<MirrorImageStatus>,
}

#[derive(Debug)]
struct MockQuiesceSet {
    state: QuiesceState,
    polls_remaining: u32,
    members: Vec<String>,
    expiration_secs: u64,
}

#[derive(Debug, Default)]
struct MockState {
    /// (pool, namespace, oid) -> key/value pairs
    omap: HashMap<(String, String, String), HashMap<String, String>>,
    filesystems: HashMap<String, MockFilesystem>,
    /// pool name -> id
    pools: HashMap<String, i64>,
    /// (pool, namespace) -> image name -> image
    images: HashMap<(String, String), HashMap<String, MockImage>>,
    /// (nfs cluster, pseudo path) -> (fs, path)
    exports: HashMap<(String, String), (String, String)>,
    blocklist: Vec<BlocklistEntry>,
    /// (fs, set id) -> quiesce set
    quiesce_sets: HashMap<(String, String), MockQuiesceSet>,
    /// (pool, namespace, group) -> member image names
    rbd_groups: HashMap<(String, String, String), Vec<String>>,
    created_groups: HashSet<(String, String)>,
    op_counts: HashMap<String, usize>,
    fail_once: HashSet<String>,
    resize_supported: bool,
    autoprotect: bool,
    clone_polls: u32,
    quiesce_polls: u32,
}

/// Mock Ceph cluster.
///
/// This backend simulates cluster state in memory without requiring actual
/// Ceph tooling.
pub struct MockCluster {
    state: RwLock<MockState>,
}

impl MockCluster {
    /// Create an empty mock cluster with sane simulation defaults: clones
    /// complete after one status poll, quiesce sets settle after one
    /// refresh, resize is supported and autoprotect is off.
    pub fn new() -> Self {
        debug!("creating mock ceph cluster");
        Self {
            state: RwLock::new(MockState {
                resize_supported: true,
                clone_polls: 1,
                quiesce_polls: 1,
                ..Default::default()
            }),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MockState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MockState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    // =========================================================================
    // Test setup / knobs
    // =========================================================================

    /// Register a CephFS filesystem.
    pub fn add_filesystem(&self, name: &str, id: i64, metadata_pool: &str) {
        let mut state = self.write();
        state.filesystems.insert(
            name.to_string(),
            MockFilesystem {
                id,
                metadata_pool: metadata_pool.to_string(),
                groups: HashMap::new(),
                metadata: HashMap::new(),
            },
        );
        state.pools.entry(metadata_pool.to_string()).or_insert(id + 100);
    }

    /// Register an RBD pool with an id.
    pub fn add_pool(&self, name: &str, id: i64) {
        self.write().pools.insert(name.to_string(), id);
    }

    /// Clones hydrate after this many `clone_status` polls (0 = instantly).
    pub fn set_clone_polls(&self, polls: u32) {
        self.write().clone_polls = polls;
    }

    /// Quiesce sets settle after this many refreshes (0 = instantly).
    pub fn set_quiesce_polls(&self, polls: u32) {
        self.write().quiesce_polls = polls;
    }

    /// Toggle server-side support for `subvolume resize`.
    pub fn set_resize_supported(&self, supported: bool) {
        self.write().resize_supported = supported;
    }

    /// Toggle the snapshot-autoprotect feature.
    pub fn set_autoprotect(&self, enabled: bool) {
        self.write().autoprotect = enabled;
    }

    /// Fail the next call of the named operation with an internal error.
    pub fn fail_once(&self, op: &str) {
        self.write().fail_once.insert(op.to_string());
    }

    /// How many times the named operation ran.
    pub fn op_count(&self, op: &str) -> usize {
        self.read().op_counts.get(op).copied().unwrap_or(0)
    }

    /// Override the mirror site statuses reported for an image.
    pub fn set_mirror_status(&self, pool: &str, namespace: &str, image: &str, status: MirrorImageStatus) {
        let mut state = self.write();
        if let Some(img) = state
            .images
            .get_mut(&(pool.to_string(), namespace.to_string()))
            .and_then(|images| images.get_mut(image))
        {
            img.site_statuses = Some(status);
        }
    }

    /// Whether a subvolume currently exists (including retained state).
    pub fn has_subvolume(&self, fs: &str, group: &str, name: &str) -> bool {
        self.read()
            .filesystems
            .get(fs)
            .and_then(|f| f.groups.get(group))
            .map(|g| g.contains_key(name))
            .unwrap_or(false)
    }

    /// Whether an RBD image currently exists.
    pub fn has_image(&self, pool: &str, namespace: &str, name: &str) -> bool {
        self.read()
            .images
            .get(&(pool.to_string(), namespace.to_string()))
            .map(|imgs| imgs.contains_key(name))
            .unwrap_or(false)
    }

    /// Snapshot names currently present on a subvolume.
    pub fn subvolume_snapshots(&self, fs: &str, group: &str, name: &str) -> Vec<String> {
        self.read()
            .filesystems
            .get(fs)
            .and_then(|f| f.groups.get(group))
            .and_then(|g| g.get(name))
            .map(|sv| sv.snapshots.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn bump(state: &mut MockState, op: &str) -> Result<()> {
        *state.op_counts.entry(op.to_string()).or_insert(0) += 1;
        if state.fail_once.remove(op) {
            return Err(CephixError::Internal(format!("injected failure: {op}")));
        }
        Ok(())
    }

    fn subvolume_mut<'a>(
        state: &'a mut MockState,
        fs: &str,
        group: &str,
        name: &str,
    ) -> Result<&'a mut MockSubvolume> {
        state
            .filesystems
            .get_mut(fs)
            .ok_or_else(|| CephixError::FilesystemNotFound(fs.to_string()))?
            .groups
            .get_mut(group)
            .and_then(|g| g.get_mut(name))
            .ok_or_else(|| CephixError::VolumeNotFound(format!("{group}/{name}")))
    }

    fn image_mut<'a>(
        state: &'a mut MockState,
        pool: &str,
        namespace: &str,
        name: &str,
    ) -> Result<&'a mut MockImage> {
        state
            .images
            .get_mut(&(pool.to_string(), namespace.to_string()))
            .and_then(|imgs| imgs.get_mut(name))
            .ok_or_else(|| CephixError::ImageNotFound(format!("{pool}/{name}")))
    }
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl CephAdmin for MockCluster {
    fn omap(&self) -> &dyn OmapStore {
        self
    }
    fn fs(&self) -> &dyn FsAdmin {
        self
    }
    fn rbd(&self) -> &dyn RbdAdmin {
        self
    }
    fn nfs(&self) -> &dyn NfsAdmin {
        self
    }
    fn osd(&self) -> &dyn OsdAdmin {
        self
    }
}

// =============================================================================
// OMAP
// =============================================================================

#[async_trait]
impl OmapStore for MockCluster {
    async fn get_keys(
        &self,
        pool: &str,
        namespace: &str,
        oid: &str,
        keys: &[String],
    ) -> Result<HashMap<String, String>> {
        let mut state = self.write();
        Self::bump(&mut state, "omap.get_keys")?;
        let obj = state
            .omap
            .get(&(pool.to_string(), namespace.to_string(), oid.to_string()));
        Ok(match obj {
            Some(pairs) => keys
                .iter()
                .filter_map(|k| pairs.get(k).map(|v| (k.clone(), v.clone())))
                .collect(),
            None => HashMap::new(),
        })
    }

    async fn list_keys(
        &self,
        pool: &str,
        namespace: &str,
        oid: &str,
    ) -> Result<HashMap<String, String>> {
        let mut state = self.write();
        Self::bump(&mut state, "omap.list_keys")?;
        Ok(state
            .omap
            .get(&(pool.to_string(), namespace.to_string(), oid.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn set_keys(
        &self,
        pool: &str,
        namespace: &str,
        oid: &str,
        pairs: &HashMap<String, String>,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "omap.set_keys")?;
        state
            .omap
            .entry((pool.to_string(), namespace.to_string(), oid.to_string()))
            .or_default()
            .extend(pairs.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn remove_keys(
        &self,
        pool: &str,
        namespace: &str,
        oid: &str,
        keys: &[String],
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "omap.remove_keys")?;
        if let Some(pairs) = state
            .omap
            .get_mut(&(pool.to_string(), namespace.to_string(), oid.to_string()))
        {
            for key in keys {
                pairs.remove(key);
            }
        }
        Ok(())
    }

    async fn remove_object(&self, pool: &str, namespace: &str, oid: &str) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "omap.remove_object")?;
        state
            .omap
            .remove(&(pool.to_string(), namespace.to_string(), oid.to_string()));
        Ok(())
    }
}

// =============================================================================
// CEPHFS
// =============================================================================

#[async_trait]
impl FsAdmin for MockCluster {
    async fn list_filesystems(&self) -> Result<Vec<FilesystemInfo>> {
        let state = self.read();
        Ok(state
            .filesystems
            .iter()
            .map(|(name, fs)| FilesystemInfo {
                name: name.clone(),
                id: fs.id,
                metadata_pool: fs.metadata_pool.clone(),
            })
            .collect())
    }

    async fn create_subvolume_group(&self, fs: &str, group: &str) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "fs.create_subvolume_group")?;
        if !state.filesystems.contains_key(fs) {
            return Err(CephixError::FilesystemNotFound(fs.to_string()));
        }
        state
            .created_groups
            .insert((fs.to_string(), group.to_string()));
        state
            .filesystems
            .get_mut(fs)
            .expect("checked above")
            .groups
            .entry(group.to_string())
            .or_default();
        Ok(())
    }

    async fn create_subvolume(
        &self,
        fs: &str,
        group: &str,
        name: &str,
        size_bytes: u64,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "fs.create_subvolume")?;
        let autoprotect = state.autoprotect;
        let filesystem = state
            .filesystems
            .get_mut(fs)
            .ok_or_else(|| CephixError::FilesystemNotFound(fs.to_string()))?;
        let group_map = filesystem.groups.entry(group.to_string()).or_default();
        let mut features = vec!["snapshot-clone".to_string(), "snapshot-retention".to_string()];
        if autoprotect {
            features.push("snapshot-autoprotect".to_string());
        }
        group_map.insert(
            name.to_string(),
            MockSubvolume {
                quota: Some(size_bytes),
                used: 0,
                features,
                state: "complete".to_string(),
                snapshots: HashMap::new(),
                clone: None,
            },
        );
        Ok(())
    }

    async fn subvolume_info(&self, fs: &str, group: &str, name: &str) -> Result<SubvolumeInfo> {
        let mut state = self.write();
        Self::bump(&mut state, "fs.subvolume_info")?;
        let sv = Self::subvolume_mut(&mut state, fs, group, name)?;
        Ok(SubvolumeInfo {
            bytes_quota: sv.quota,
            bytes_used: sv.used,
            data_pool: format!("{fs}-data"),
            features: sv.features.clone(),
            state: sv.state.clone(),
            path: format!("/volumes/{group}/{name}"),
        })
    }

    async fn resize_subvolume(
        &self,
        fs: &str,
        group: &str,
        name: &str,
        size_bytes: u64,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "fs.resize_subvolume")?;
        if !state.resize_supported {
            return Err(CephixError::InvalidCommand(
                "subvolume resize is not supported on this cluster".to_string(),
            ));
        }
        let sv = Self::subvolume_mut(&mut state, fs, group, name)?;
        sv.quota = Some(size_bytes);
        Ok(())
    }

    async fn remove_subvolume(
        &self,
        fs: &str,
        group: &str,
        name: &str,
        _force: bool,
        retain_snapshots: bool,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "fs.remove_subvolume")?;
        let sv = Self::subvolume_mut(&mut state, fs, group, name)?;
        if !sv.snapshots.is_empty() {
            if !retain_snapshots {
                return Err(CephixError::VolumeHasSnapshots(format!("{group}/{name}")));
            }
            sv.state = "snapshot-retained".to_string();
            sv.quota = None;
            return Ok(());
        }
        state
            .filesystems
            .get_mut(fs)
            .expect("subvolume_mut checked the filesystem")
            .groups
            .get_mut(group)
            .expect("subvolume_mut checked the group")
            .remove(name);
        Ok(())
    }

    async fn set_subvolume_metadata(
        &self,
        fs: &str,
        group: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "fs.set_subvolume_metadata")?;
        Self::subvolume_mut(&mut state, fs, group, name)?;
        let meta_key = format!("{group}/{name}/{key}");
        state
            .filesystems
            .get_mut(fs)
            .expect("subvolume_mut checked the filesystem")
            .metadata
            .insert(meta_key, value.to_string());
        Ok(())
    }

    async fn create_snapshot(&self, fs: &str, group: &str, subvol: &str, snap: &str) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "fs.create_snapshot")?;
        let autoprotect = state.autoprotect;
        let sv = Self::subvolume_mut(&mut state, fs, group, subvol)?;
        sv.snapshots.insert(
            snap.to_string(),
            MockSubvolSnapshot {
                created_at: Utc::now(),
                protected: autoprotect,
                pending_clones: 0,
            },
        );
        Ok(())
    }

    async fn remove_snapshot(
        &self,
        fs: &str,
        group: &str,
        subvol: &str,
        snap: &str,
        _force: bool,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "fs.remove_snapshot")?;
        let autoprotect = state.autoprotect;
        let sv = Self::subvolume_mut(&mut state, fs, group, subvol)?;
        let entry = sv
            .snapshots
            .get(snap)
            .ok_or_else(|| CephixError::SnapshotNotFound(format!("{subvol}@{snap}")))?;
        if entry.pending_clones > 0 {
            return Err(CephixError::SnapshotHasPendingClones(format!(
                "{subvol}@{snap}"
            )));
        }
        // With autoprotect the protected flag is implicit and removal is
        // allowed; otherwise a protected snapshot must be unprotected first.
        if entry.protected && !autoprotect {
            return Err(CephixError::SnapshotProtected(format!("{subvol}@{snap}")));
        }
        sv.snapshots.remove(snap);
        Ok(())
    }

    async fn list_snapshots(&self, fs: &str, group: &str, subvol: &str) -> Result<Vec<String>> {
        let mut state = self.write();
        Self::bump(&mut state, "fs.list_snapshots")?;
        let sv = Self::subvolume_mut(&mut state, fs, group, subvol)?;
        Ok(sv.snapshots.keys().cloned().collect())
    }

    async fn snapshot_info(
        &self,
        fs: &str,
        group: &str,
        subvol: &str,
        snap: &str,
    ) -> Result<SubvolumeSnapshotInfo> {
        let mut state = self.write();
        Self::bump(&mut state, "fs.snapshot_info")?;
        let sv = Self::subvolume_mut(&mut state, fs, group, subvol)?;
        let entry = sv
            .snapshots
            .get(snap)
            .ok_or_else(|| CephixError::SnapshotNotFound(format!("{subvol}@{snap}")))?;
        Ok(SubvolumeSnapshotInfo {
            created_at: entry.created_at,
            protected: entry.protected,
            pending_clones: entry.pending_clones,
        })
    }

    async fn protect_snapshot(&self, fs: &str, group: &str, subvol: &str, snap: &str) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "fs.protect_snapshot")?;
        if state.autoprotect {
            return Ok(());
        }
        let sv = Self::subvolume_mut(&mut state, fs, group, subvol)?;
        let entry = sv
            .snapshots
            .get_mut(snap)
            .ok_or_else(|| CephixError::SnapshotNotFound(format!("{subvol}@{snap}")))?;
        entry.protected = true;
        Ok(())
    }

    async fn unprotect_snapshot(
        &self,
        fs: &str,
        group: &str,
        subvol: &str,
        snap: &str,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "fs.unprotect_snapshot")?;
        if state.autoprotect {
            return Ok(());
        }
        let sv = Self::subvolume_mut(&mut state, fs, group, subvol)?;
        let entry = sv
            .snapshots
            .get_mut(snap)
            .ok_or_else(|| CephixError::SnapshotNotFound(format!("{subvol}@{snap}")))?;
        entry.protected = false;
        Ok(())
    }

    async fn clone_snapshot(
        &self,
        fs: &str,
        group: &str,
        subvol: &str,
        snap: &str,
        target: &str,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "fs.clone_snapshot")?;
        let clone_polls = state.clone_polls;
        let autoprotect = state.autoprotect;

        let sv = Self::subvolume_mut(&mut state, fs, group, subvol)?;
        let (quota, features) = (sv.quota, sv.features.clone());
        let entry = sv
            .snapshots
            .get_mut(snap)
            .ok_or_else(|| CephixError::SnapshotNotFound(format!("{subvol}@{snap}")))?;
        if !entry.protected && !autoprotect {
            return Err(CephixError::FailedPrecondition(format!(
                "snapshot {subvol}@{snap} is not protected"
            )));
        }
        entry.pending_clones += 1;

        let clone_state = if clone_polls == 0 {
            CloneState::Complete
        } else {
            CloneState::InProgress
        };
        if clone_state == CloneState::Complete {
            // Instant hydration: the parent reference is dropped right away.
            let sv = Self::subvolume_mut(&mut state, fs, group, subvol)?;
            if let Some(entry) = sv.snapshots.get_mut(snap) {
                entry.pending_clones -= 1;
            }
        }

        let group_map = state
            .filesystems
            .get_mut(fs)
            .expect("subvolume_mut checked the filesystem")
            .groups
            .get_mut(group)
            .expect("subvolume_mut checked the group");
        group_map.insert(
            target.to_string(),
            MockSubvolume {
                // Clones inherit the source quota; the requested size is
                // applied by a post-clone resize.
                quota,
                used: 0,
                features,
                state: "complete".to_string(),
                snapshots: HashMap::new(),
                clone: Some(MockCloneProgress {
                    state: clone_state,
                    polls_remaining: clone_polls,
                    source_subvol: subvol.to_string(),
                    source_snap: snap.to_string(),
                }),
            },
        );
        Ok(())
    }

    async fn clone_status(&self, fs: &str, group: &str, clone: &str) -> Result<CloneState> {
        let mut state = self.write();
        Self::bump(&mut state, "fs.clone_status")?;
        let sv = Self::subvolume_mut(&mut state, fs, group, clone)?;
        let progress = match sv.clone.as_mut() {
            Some(progress) => progress,
            None => return Ok(CloneState::Complete),
        };
        match progress.state {
            CloneState::Complete | CloneState::Failed => Ok(progress.state),
            CloneState::Pending | CloneState::InProgress => {
                if progress.polls_remaining > 0 {
                    progress.polls_remaining -= 1;
                    Ok(progress.state)
                } else {
                    progress.state = CloneState::Complete;
                    progress.polls_remaining = 0;
                    let (src, snap) = (
                        progress.source_subvol.clone(),
                        progress.source_snap.clone(),
                    );
                    let src_sv = Self::subvolume_mut(&mut state, fs, group, &src)?;
                    if let Some(entry) = src_sv.snapshots.get_mut(&snap) {
                        entry.pending_clones = entry.pending_clones.saturating_sub(1);
                    }
                    Ok(CloneState::Complete)
                }
            }
        }
    }

    async fn quiesce(
        &self,
        fs: &str,
        set_id: &str,
        members: &[String],
        _timeout_secs: u64,
        expiration_secs: u64,
    ) -> Result<QuiesceState> {
        let mut state = self.write();
        Self::bump(&mut state, "fs.quiesce")?;
        if !state.filesystems.contains_key(fs) {
            return Err(CephixError::FilesystemNotFound(fs.to_string()));
        }
        let quiesce_polls = state.quiesce_polls;
        let set = state
            .quiesce_sets
            .entry((fs.to_string(), set_id.to_string()))
            .or_insert_with(|| MockQuiesceSet {
                state: QuiesceState::Quiescing,
                polls_remaining: quiesce_polls,
                members: members.to_vec(),
                expiration_secs: 0,
            });
        // Refreshing the expiry is what keeps the set alive across retries.
        set.expiration_secs = expiration_secs;
        if set.state == QuiesceState::Quiescing {
            if set.polls_remaining > 0 {
                set.polls_remaining -= 1;
            } else {
                set.state = QuiesceState::Quiesced;
            }
        }
        Ok(set.state)
    }

    async fn release_quiesce(&self, fs: &str, set_id: &str) -> Result<QuiesceState> {
        let mut state = self.write();
        Self::bump(&mut state, "fs.release_quiesce")?;
        let set = state
            .quiesce_sets
            .get_mut(&(fs.to_string(), set_id.to_string()))
            .ok_or_else(|| CephixError::Internal(format!("unknown quiesce set {set_id}")))?;
        match set.state {
            QuiesceState::Quiescing => Err(CephixError::QuiesceInProgress(set_id.to_string())),
            QuiesceState::Quiesced | QuiesceState::Released => {
                set.state = QuiesceState::Released;
                Ok(QuiesceState::Released)
            }
        }
    }

    async fn reset_quiesce(&self, fs: &str, set_id: &str) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "fs.reset_quiesce")?;
        state
            .quiesce_sets
            .remove(&(fs.to_string(), set_id.to_string()));
        Ok(())
    }
}

// =============================================================================
// RBD
// =============================================================================

#[async_trait]
impl RbdAdmin for MockCluster {
    async fn create_image(
        &self,
        pool: &str,
        namespace: &str,
        name: &str,
        size_bytes: u64,
        features: &[String],
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.create_image")?;
        if !state.pools.contains_key(pool) {
            return Err(CephixError::PoolNotFound(pool.to_string()));
        }
        state
            .images
            .entry((pool.to_string(), namespace.to_string()))
            .or_default()
            .insert(
                name.to_string(),
                MockImage {
                    size_bytes,
                    features: features.to_vec(),
                    parent: None,
                    snapshots: HashMap::new(),
                    meta: HashMap::new(),
                    mirror: MockMirror {
                        state: "disabled".to_string(),
                        ..Default::default()
                    },
                    schedules: Vec::new(),
                    site_statuses: None,
                },
            );
        Ok(())
    }

    async fn image_info(&self, pool: &str, namespace: &str, name: &str) -> Result<RbdImageInfo> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.image_info")?;
        if !state.pools.contains_key(pool) {
            return Err(CephixError::PoolNotFound(pool.to_string()));
        }
        let img = Self::image_mut(&mut state, pool, namespace, name)?;
        Ok(RbdImageInfo {
            size_bytes: img.size_bytes,
            features: img.features.clone(),
            parent: img.parent.clone(),
        })
    }

    async fn remove_image(&self, pool: &str, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.remove_image")?;
        let img = Self::image_mut(&mut state, pool, namespace, name)?;
        if !img.snapshots.is_empty() {
            return Err(CephixError::VolumeHasSnapshots(name.to_string()));
        }
        let parent = img.parent.clone();
        state
            .images
            .get_mut(&(pool.to_string(), namespace.to_string()))
            .expect("image_mut checked the pool")
            .remove(name);
        // A deleted clone stops being a child of its parent snapshot.
        if let Some(parent) = parent {
            if let Ok(parent_img) =
                Self::image_mut(&mut state, &parent.pool, &parent.namespace, &parent.image)
            {
                if let Some(snap) = parent_img.snapshots.get_mut(&parent.snapshot) {
                    snap.children.retain(|c| c != name);
                }
            }
        }
        Ok(())
    }

    async fn resize_image(
        &self,
        pool: &str,
        namespace: &str,
        name: &str,
        size_bytes: u64,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.resize_image")?;
        let img = Self::image_mut(&mut state, pool, namespace, name)?;
        img.size_bytes = size_bytes;
        Ok(())
    }

    async fn clone_image(
        &self,
        parent: &RbdSnapSpec,
        child_name: &str,
        features: &[String],
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.clone_image")?;
        let img = Self::image_mut(&mut state, &parent.pool, &parent.namespace, &parent.image)?;
        let snap = img
            .snapshots
            .get_mut(&parent.snapshot)
            .ok_or_else(|| CephixError::SnapshotNotFound(parent.snapshot.clone()))?;
        if !snap.protected {
            return Err(CephixError::FailedPrecondition(format!(
                "snapshot {}@{} is not protected",
                parent.image, parent.snapshot
            )));
        }
        snap.children.push(child_name.to_string());
        let size = snap.size_bytes;
        state
            .images
            .entry((parent.pool.clone(), parent.namespace.clone()))
            .or_default()
            .insert(
                child_name.to_string(),
                MockImage {
                    size_bytes: size,
                    features: features.to_vec(),
                    parent: Some(parent.clone()),
                    snapshots: HashMap::new(),
                    meta: HashMap::new(),
                    mirror: MockMirror {
                        state: "disabled".to_string(),
                        ..Default::default()
                    },
                    schedules: Vec::new(),
                    site_statuses: None,
                },
            );
        Ok(())
    }

    async fn flatten_image(&self, pool: &str, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.flatten_image")?;
        let img = Self::image_mut(&mut state, pool, namespace, name)?;
        let parent = img.parent.take();
        if let Some(parent) = parent {
            if let Ok(parent_img) =
                Self::image_mut(&mut state, &parent.pool, &parent.namespace, &parent.image)
            {
                if let Some(snap) = parent_img.snapshots.get_mut(&parent.snapshot) {
                    snap.children.retain(|c| c != name);
                }
            }
        }
        Ok(())
    }

    async fn sparsify_image(&self, pool: &str, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.sparsify_image")?;
        Self::image_mut(&mut state, pool, namespace, name)?;
        Ok(())
    }

    async fn create_snapshot(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        snap: &str,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.create_snapshot")?;
        let img = Self::image_mut(&mut state, pool, namespace, image)?;
        let size = img.size_bytes;
        img.snapshots.insert(
            snap.to_string(),
            MockRbdSnap {
                size_bytes: size,
                protected: false,
                created_at: Utc::now(),
                children: Vec::new(),
            },
        );
        Ok(())
    }

    async fn remove_snapshot(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        snap: &str,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.remove_snapshot")?;
        let img = Self::image_mut(&mut state, pool, namespace, image)?;
        let entry = img
            .snapshots
            .get(snap)
            .ok_or_else(|| CephixError::SnapshotNotFound(format!("{image}@{snap}")))?;
        if entry.protected {
            return Err(CephixError::SnapshotProtected(format!("{image}@{snap}")));
        }
        img.snapshots.remove(snap);
        Ok(())
    }

    async fn list_snapshots(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
    ) -> Result<Vec<RbdSnapInfo>> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.list_snapshots")?;
        let img = Self::image_mut(&mut state, pool, namespace, image)?;
        Ok(img
            .snapshots
            .iter()
            .map(|(name, snap)| RbdSnapInfo {
                name: name.clone(),
                size_bytes: snap.size_bytes,
                protected: snap.protected,
                created_at: Some(snap.created_at),
            })
            .collect())
    }

    async fn protect_snapshot(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        snap: &str,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.protect_snapshot")?;
        let img = Self::image_mut(&mut state, pool, namespace, image)?;
        let entry = img
            .snapshots
            .get_mut(snap)
            .ok_or_else(|| CephixError::SnapshotNotFound(format!("{image}@{snap}")))?;
        entry.protected = true;
        Ok(())
    }

    async fn unprotect_snapshot(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        snap: &str,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.unprotect_snapshot")?;
        let img = Self::image_mut(&mut state, pool, namespace, image)?;
        let entry = img
            .snapshots
            .get_mut(snap)
            .ok_or_else(|| CephixError::SnapshotNotFound(format!("{image}@{snap}")))?;
        if !entry.children.is_empty() {
            return Err(CephixError::SnapshotHasPendingClones(format!(
                "{image}@{snap}"
            )));
        }
        entry.protected = false;
        Ok(())
    }

    async fn children(&self, parent: &RbdSnapSpec) -> Result<Vec<String>> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.children")?;
        let img = Self::image_mut(&mut state, &parent.pool, &parent.namespace, &parent.image)?;
        Ok(img
            .snapshots
            .get(&parent.snapshot)
            .map(|s| s.children.clone())
            .unwrap_or_default())
    }

    async fn set_image_meta(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.set_image_meta")?;
        let img = Self::image_mut(&mut state, pool, namespace, image)?;
        img.meta.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_image_meta(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        key: &str,
    ) -> Result<String> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.get_image_meta")?;
        let img = Self::image_mut(&mut state, pool, namespace, image)?;
        img.meta
            .get(key)
            .cloned()
            .ok_or_else(|| CephixError::KeyNotFound(format!("{image}/{key}")))
    }

    async fn mirror_enable(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        mode: MirrorMode,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.mirror_enable")?;
        let img = Self::image_mut(&mut state, pool, namespace, image)?;
        img.mirror = MockMirror {
            mode: Some(mode),
            state: "enabled".to_string(),
            primary: true,
            global_id: format!("gid-{image}"),
        };
        Ok(())
    }

    async fn mirror_disable(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        _force: bool,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.mirror_disable")?;
        let img = Self::image_mut(&mut state, pool, namespace, image)?;
        img.mirror = MockMirror {
            state: "disabled".to_string(),
            ..Default::default()
        };
        img.schedules.clear();
        Ok(())
    }

    async fn mirror_promote(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        _force: bool,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.mirror_promote")?;
        let img = Self::image_mut(&mut state, pool, namespace, image)?;
        if !img.mirror.is_enabled() {
            return Err(CephixError::FailedPrecondition(format!(
                "mirroring is not enabled on {image}"
            )));
        }
        img.mirror.primary = true;
        Ok(())
    }

    async fn mirror_demote(&self, pool: &str, namespace: &str, image: &str) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.mirror_demote")?;
        let img = Self::image_mut(&mut state, pool, namespace, image)?;
        if !img.mirror.is_enabled() {
            return Err(CephixError::FailedPrecondition(format!(
                "mirroring is not enabled on {image}"
            )));
        }
        img.mirror.primary = false;
        Ok(())
    }

    async fn mirror_resync(&self, pool: &str, namespace: &str, image: &str) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.mirror_resync")?;
        let img = Self::image_mut(&mut state, pool, namespace, image)?;
        if img.mirror.primary {
            return Err(CephixError::ImageNotPrimary(format!(
                "cannot resync primary image {image}"
            )));
        }
        Ok(())
    }

    async fn mirror_info(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
    ) -> Result<MirrorImageInfo> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.mirror_info")?;
        let img = Self::image_mut(&mut state, pool, namespace, image)?;
        Ok(MirrorImageInfo {
            mode: img.mirror.mode,
            state: img.mirror.state.clone(),
            primary: img.mirror.primary,
            global_id: img.mirror.global_id.clone(),
        })
    }

    async fn mirror_status(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
    ) -> Result<MirrorImageStatus> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.mirror_status")?;
        let img = Self::image_mut(&mut state, pool, namespace, image)?;
        if let Some(status) = &img.site_statuses {
            return Ok(status.clone());
        }
        Ok(MirrorImageStatus {
            local: MirrorSiteStatus {
                site_name: String::new(),
                state: "up+stopped".to_string(),
                up: true,
                description: "local image is primary".to_string(),
                last_update: Some(Utc::now()),
            },
            remotes: Vec::new(),
        })
    }

    async fn snapshot_schedule_add(
        &self,
        pool: &str,
        namespace: &str,
        image: &str,
        interval: &str,
        start_time: Option<&str>,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.snapshot_schedule_add")?;
        let img = Self::image_mut(&mut state, pool, namespace, image)?;
        img.schedules
            .push((interval.to_string(), start_time.map(str::to_string)));
        Ok(())
    }

    async fn group_create(&self, pool: &str, namespace: &str, group: &str) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.group_create")?;
        if !state.pools.contains_key(pool) {
            return Err(CephixError::PoolNotFound(pool.to_string()));
        }
        state
            .rbd_groups
            .entry((pool.to_string(), namespace.to_string(), group.to_string()))
            .or_default();
        Ok(())
    }

    async fn group_remove(&self, pool: &str, namespace: &str, group: &str) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.group_remove")?;
        state
            .rbd_groups
            .remove(&(pool.to_string(), namespace.to_string(), group.to_string()));
        Ok(())
    }

    async fn group_image_add(
        &self,
        pool: &str,
        namespace: &str,
        group: &str,
        image: &str,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.group_image_add")?;
        if !state
            .images
            .get(&(pool.to_string(), namespace.to_string()))
            .map(|imgs| imgs.contains_key(image))
            .unwrap_or(false)
        {
            return Err(CephixError::ImageNotFound(image.to_string()));
        }
        let members = state
            .rbd_groups
            .get_mut(&(pool.to_string(), namespace.to_string(), group.to_string()))
            .ok_or_else(|| CephixError::VolumeNotFound(format!("group {group}")))?;
        if !members.iter().any(|m| m == image) {
            members.push(image.to_string());
        }
        Ok(())
    }

    async fn group_image_remove(
        &self,
        pool: &str,
        namespace: &str,
        group: &str,
        image: &str,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "rbd.group_image_remove")?;
        let members = state
            .rbd_groups
            .get_mut(&(pool.to_string(), namespace.to_string(), group.to_string()))
            .ok_or_else(|| CephixError::VolumeNotFound(format!("group {group}")))?;
        members.retain(|m| m != image);
        Ok(())
    }

    async fn group_images(&self, pool: &str, namespace: &str, group: &str) -> Result<Vec<String>> {
        let state = self.read();
        state
            .rbd_groups
            .get(&(pool.to_string(), namespace.to_string(), group.to_string()))
            .cloned()
            .ok_or_else(|| CephixError::VolumeNotFound(format!("group {group}")))
    }
}

// =============================================================================
// NFS / OSD
// =============================================================================

#[async_trait]
impl NfsAdmin for MockCluster {
    async fn create_export(
        &self,
        nfs_cluster: &str,
        fs: &str,
        path: &str,
        pseudo_path: &str,
    ) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "nfs.create_export")?;
        state.exports.insert(
            (nfs_cluster.to_string(), pseudo_path.to_string()),
            (fs.to_string(), path.to_string()),
        );
        Ok(())
    }

    async fn remove_export(&self, nfs_cluster: &str, pseudo_path: &str) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "nfs.remove_export")?;
        state
            .exports
            .remove(&(nfs_cluster.to_string(), pseudo_path.to_string()))
            .map(|_| ())
            .ok_or_else(|| CephixError::ExportNotFound(pseudo_path.to_string()))
    }
}

#[async_trait]
impl OsdAdmin for MockCluster {
    async fn pool_id(&self, pool: &str) -> Result<i64> {
        let state = self.read();
        state
            .pools
            .get(pool)
            .copied()
            .ok_or_else(|| CephixError::PoolNotFound(pool.to_string()))
    }

    async fn pool_name(&self, pool_id: i64) -> Result<String> {
        let state = self.read();
        state
            .pools
            .iter()
            .find(|(_, id)| **id == pool_id)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| CephixError::PoolNotFound(format!("id {pool_id}")))
    }

    async fn blocklist_add(&self, addr: &str) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "osd.blocklist_add")?;
        if !state.blocklist.iter().any(|e| e.addr == addr) {
            state.blocklist.push(BlocklistEntry {
                addr: addr.to_string(),
                until: None,
            });
        }
        Ok(())
    }

    async fn blocklist_remove(&self, addr: &str) -> Result<()> {
        let mut state = self.write();
        Self::bump(&mut state, "osd.blocklist_remove")?;
        state.blocklist.retain(|e| e.addr != addr);
        Ok(())
    }

    async fn blocklist_list(&self) -> Result<Vec<BlocklistEntry>> {
        Ok(self.read().blocklist.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subvolume_lifecycle() {
        let cluster = MockCluster::new();
        cluster.add_filesystem("myfs", 1, "myfs-metadata");

        cluster.create_subvolume_group("myfs", "csi").await.unwrap();
        cluster
            .create_subvolume("myfs", "csi", "sv1", 1024)
            .await
            .unwrap();
        let info = cluster.subvolume_info("myfs", "csi", "sv1").await.unwrap();
        assert_eq!(info.bytes_quota, Some(1024));

        cluster
            .remove_subvolume("myfs", "csi", "sv1", false, false)
            .await
            .unwrap();
        assert!(matches!(
            cluster.subvolume_info("myfs", "csi", "sv1").await,
            Err(CephixError::VolumeNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_clone_polls_drive_state() {
        let cluster = MockCluster::new();
        cluster.add_filesystem("myfs", 1, "meta");
        cluster.set_clone_polls(1);
        cluster.create_subvolume_group("myfs", "csi").await.unwrap();
        cluster
            .create_subvolume("myfs", "csi", "src", 4096)
            .await
            .unwrap();
        FsAdmin::create_snapshot(&cluster, "myfs", "csi", "src", "s1")
            .await
            .unwrap();
        FsAdmin::protect_snapshot(&cluster, "myfs", "csi", "src", "s1")
            .await
            .unwrap();
        cluster
            .clone_snapshot("myfs", "csi", "src", "s1", "dst")
            .await
            .unwrap();

        assert_eq!(
            cluster.clone_status("myfs", "csi", "dst").await.unwrap(),
            CloneState::InProgress
        );
        assert_eq!(
            cluster.clone_status("myfs", "csi", "dst").await.unwrap(),
            CloneState::Complete
        );
        // Pending-clone count drained once hydration finished.
        let info = cluster
            .snapshot_info("myfs", "csi", "src", "s1")
            .await
            .unwrap();
        assert_eq!(info.pending_clones, 0);
    }

    #[tokio::test]
    async fn test_remove_subvolume_with_snapshots_requires_retain() {
        let cluster = MockCluster::new();
        cluster.add_filesystem("myfs", 1, "meta");
        cluster.create_subvolume_group("myfs", "csi").await.unwrap();
        cluster
            .create_subvolume("myfs", "csi", "sv", 4096)
            .await
            .unwrap();
        FsAdmin::create_snapshot(&cluster, "myfs", "csi", "sv", "snap")
            .await
            .unwrap();

        assert!(matches!(
            cluster.remove_subvolume("myfs", "csi", "sv", false, false).await,
            Err(CephixError::VolumeHasSnapshots(_))
        ));

        cluster
            .remove_subvolume("myfs", "csi", "sv", false, true)
            .await
            .unwrap();
        let info = cluster.subvolume_info("myfs", "csi", "sv").await.unwrap();
        assert!(info.is_snapshot_retained());
    }

    #[tokio::test]
    async fn test_rbd_clone_requires_protection() {
        let cluster = MockCluster::new();
        cluster.add_pool("rbd", 2);
        cluster
            .create_image("rbd", "", "img", 1 << 30, &[])
            .await
            .unwrap();
        RbdAdmin::create_snapshot(&cluster, "rbd", "", "img", "s1")
            .await
            .unwrap();

        let parent = RbdSnapSpec {
            pool: "rbd".to_string(),
            namespace: String::new(),
            image: "img".to_string(),
            snapshot: "s1".to_string(),
        };
        assert!(matches!(
            cluster.clone_image(&parent, "child", &[]).await,
            Err(CephixError::FailedPrecondition(_))
        ));

        RbdAdmin::protect_snapshot(&cluster, "rbd", "", "img", "s1")
            .await
            .unwrap();
        cluster.clone_image(&parent, "child", &[]).await.unwrap();
        assert_eq!(cluster.children(&parent).await.unwrap(), vec!["child"]);

        // Flatten detaches the child from the parent.
        cluster.flatten_image("rbd", "", "child").await.unwrap();
        assert!(cluster.children(&parent).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_quiesce_settles_after_polls() {
        let cluster = MockCluster::new();
        cluster.add_filesystem("fs1", 1, "meta");
        let members = vec!["/volumes/csi/sv1".to_string()];

        assert_eq!(
            cluster.quiesce("fs1", "set1", &members, 10, 60).await.unwrap(),
            QuiesceState::Quiescing
        );
        assert!(matches!(
            cluster.release_quiesce("fs1", "set1").await,
            Err(CephixError::QuiesceInProgress(_))
        ));
        assert_eq!(
            cluster.quiesce("fs1", "set1", &members, 10, 60).await.unwrap(),
            QuiesceState::Quiesced
        );
        assert_eq!(
            cluster.release_quiesce("fs1", "set1").await.unwrap(),
            QuiesceState::Released
        );
    }

    #[tokio::test]
    async fn test_fail_once_injection() {
        let cluster = MockCluster::new();
        cluster.add_filesystem("myfs", 1, "meta");
        cluster.create_subvolume_group("myfs", "csi").await.unwrap();
        cluster.fail_once("fs.create_subvolume");

        assert!(cluster
            .create_subvolume("myfs", "csi", "sv", 4096)
            .await
            .is_err());
        // Second attempt succeeds.
        cluster
            .create_subvolume("myfs", "csi", "sv", 4096)
            .await
            .unwrap();
    }
}
