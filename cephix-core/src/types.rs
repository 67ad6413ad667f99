//! Type definitions shared across the control plane.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CephixError, Result};

// =============================================================================
// CAPACITY
// =============================================================================

/// CephFS accounts quota in 4 MiB units; requested sizes are rounded up to
/// that grain so the provisioned quota never undercuts the request.
pub const CEPHFS_SIZE_GRAIN: u64 = 4 * 1024 * 1024;

/// Round a requested byte count up to the CephFS allocation grain.
pub fn round_up_to_grain(size_bytes: u64) -> u64 {
    if size_bytes == 0 {
        return CEPHFS_SIZE_GRAIN;
    }
    size_bytes.div_ceil(CEPHFS_SIZE_GRAIN) * CEPHFS_SIZE_GRAIN
}

// =============================================================================
// VOLUME / SNAPSHOT IDENTITY
// =============================================================================

/// Which backend serves a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// CephFS subvolume.
    CephFs,
    /// RBD block image.
    Rbd,
    /// CephFS subvolume re-exported over Ceph-NFS.
    Nfs,
}

/// Output of a reservation or resolution: the backend artifact name plus the
/// handle given back to the CO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeIdentifier {
    /// Name of the subvolume or image on the cluster.
    pub backend_name: String,
    /// Encoded CSI handle.
    pub csi_id: String,
}

/// Resolved snapshot identity.
#[derive(Debug, Clone)]
pub struct SnapshotIdentifier {
    /// Name of the snapshot on the backend.
    pub backend_name: String,
    /// Encoded CSI handle.
    pub csi_id: String,
    /// CO-supplied request name the snapshot was reserved under.
    pub request_name: String,
    /// Subvolume or image the snapshot was taken from.
    pub parent_name: String,
    /// Creation time reported by the backend.
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// VOLUME OPTIONS
// =============================================================================

/// Per-request provisioning options, derived from the CO parameters plus the
/// cluster configuration.
#[derive(Debug, Clone, Default)]
pub struct VolumeOptions {
    /// CO-supplied idempotency name.
    pub request_name: String,
    /// Prefix for derived backend names (`<prefix>-<uuid>`).
    pub name_prefix: String,
    /// Requested capacity in bytes, already rounded where applicable.
    pub size_bytes: u64,
    /// Cluster the volume is provisioned against.
    pub cluster_id: String,
    /// Human-readable cluster name stamped into metadata.
    pub cluster_name: Option<String>,
    /// CephFS filesystem name (file volumes).
    pub fs_name: String,
    /// RBD pool name (block volumes).
    pub pool: String,
    /// RADOS namespace within the pool, if any.
    pub rados_namespace: String,
    /// Subvolume group the volume lives in.
    pub subvolume_group: String,
    /// Preferred mounter (`kernel` or `fuse`).
    pub mounter: Option<String>,
    /// Volume is served read-only from a parent snapshot.
    pub backing_snapshot: bool,
    /// Encoded handle of the backing snapshot, when set.
    pub backing_snapshot_id: Option<String>,
    /// Encryption KMS configuration identifier, when encryption is requested.
    pub encryption_kms: Option<String>,
    /// Whether CSI metadata is stamped onto backend objects.
    pub set_metadata: bool,
    /// Raw CO parameters, kept for metadata stamping.
    pub parameters: HashMap<String, String>,
}

// =============================================================================
// BACKEND STATES
// =============================================================================

/// State of a CephFS subvolume clone as reported by the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneState {
    /// Queued, hydration not started.
    Pending,
    /// Hydration running.
    InProgress,
    /// Clone is ready for use.
    Complete,
    /// Hydration failed; the clone must be purged.
    Failed,
}

impl CloneState {
    /// Parse the state string from `ceph fs clone status`.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "pending" => Ok(CloneState::Pending),
            "in-progress" => Ok(CloneState::InProgress),
            "complete" => Ok(CloneState::Complete),
            "failed" => Ok(CloneState::Failed),
            other => Err(CephixError::Internal(format!(
                "unexpected clone state {other:?}"
            ))),
        }
    }

    /// Map a non-terminal state to the error the CO retries on.
    pub fn to_error(self, clone: &str) -> Option<CephixError> {
        match self {
            CloneState::Pending => Some(CephixError::ClonePending(clone.to_string())),
            CloneState::InProgress => Some(CephixError::CloneInProgress(clone.to_string())),
            CloneState::Failed => Some(CephixError::Internal(format!("clone {clone} failed"))),
            CloneState::Complete => None,
        }
    }
}

/// State of a filesystem quiesce set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuiesceState {
    /// Freeze requested, not yet confirmed on all members.
    Quiescing,
    /// All members confirmed frozen.
    Quiesced,
    /// Freeze released.
    Released,
}

impl QuiesceState {
    /// Parse the state string from the quiesce admin API.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "QUIESCING" | "quiescing" => Ok(QuiesceState::Quiescing),
            "QUIESCED" | "quiesced" => Ok(QuiesceState::Quiesced),
            "RELEASING" | "RELEASED" | "released" => Ok(QuiesceState::Released),
            other => Err(CephixError::Internal(format!(
                "unexpected quiesce state {other:?}"
            ))),
        }
    }
}

// =============================================================================
// MIRRORING
// =============================================================================

/// RBD cross-cluster replication strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorMode {
    /// Periodic mirror-snapshots shipped to the peer.
    Snapshot,
    /// Journal-based streaming replication.
    Journal,
}

impl MirrorMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "snapshot" => Ok(MirrorMode::Snapshot),
            "journal" => Ok(MirrorMode::Journal),
            other => Err(CephixError::InvalidArgument(format!(
                "unknown mirroring mode {other:?}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MirrorMode::Snapshot => "snapshot",
            MirrorMode::Journal => "journal",
        }
    }
}

/// Mirror-snapshot schedule, valid only in snapshot mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorSchedule {
    /// Interval matching `^\d+[mhd]$`.
    pub interval: String,
    /// Optional ISO-8601 start time.
    pub start_time: Option<String>,
}

/// Mirroring state of one RBD image.
#[derive(Debug, Clone)]
pub struct MirrorState {
    pub enabled: bool,
    pub mode: MirrorMode,
    pub primary: bool,
    pub schedule: Option<MirrorSchedule>,
}

/// Health of one mirroring site as reported by the global status.
#[derive(Debug, Clone)]
pub struct MirrorSiteStatus {
    /// Site name; empty for the local site.
    pub site_name: String,
    /// Mirror state string (`up+stopped`, `up+replaying`, ...).
    pub state: String,
    /// Daemon reachability.
    pub up: bool,
    /// Human-readable description; snapshot mode appends JSON after the
    /// first comma with last-sync details.
    pub description: String,
    /// Last update timestamp.
    pub last_update: Option<DateTime<Utc>>,
}

/// Parsed last-sync details from a site description.
#[derive(Debug, Clone, PartialEq)]
pub struct LastSyncInfo {
    pub last_sync_time: DateTime<Utc>,
    pub last_sync_bytes: u64,
    pub last_sync_duration_secs: Option<f64>,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_up_to_grain() {
        assert_eq!(round_up_to_grain(0), CEPHFS_SIZE_GRAIN);
        assert_eq!(round_up_to_grain(1), CEPHFS_SIZE_GRAIN);
        assert_eq!(round_up_to_grain(CEPHFS_SIZE_GRAIN), CEPHFS_SIZE_GRAIN);
        assert_eq!(round_up_to_grain(CEPHFS_SIZE_GRAIN + 1), 2 * CEPHFS_SIZE_GRAIN);
        // 5 GiB is already aligned
        assert_eq!(round_up_to_grain(5 * 1024 * 1024 * 1024), 5 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_clone_state_parse() {
        assert_eq!(CloneState::parse("complete").unwrap(), CloneState::Complete);
        assert_eq!(CloneState::parse("in-progress").unwrap(), CloneState::InProgress);
        assert!(CloneState::parse("bogus").is_err());
    }

    #[test]
    fn test_clone_state_to_error() {
        assert!(CloneState::Complete.to_error("c").is_none());
        assert!(matches!(
            CloneState::InProgress.to_error("c"),
            Some(CephixError::CloneInProgress(_))
        ));
        assert!(matches!(
            CloneState::Pending.to_error("c"),
            Some(CephixError::ClonePending(_))
        ));
    }

    #[test]
    fn test_mirror_mode_parse() {
        assert_eq!(MirrorMode::parse("snapshot").unwrap(), MirrorMode::Snapshot);
        assert_eq!(MirrorMode::parse("journal").unwrap(), MirrorMode::Journal);
        assert!(MirrorMode::parse("none").is_err());
    }
}
