//! Error types for the CSI control plane.
//!
//! The variants are a flat rendering of the driver's error taxonomy; every
//! RPC handler funnels them through a single gRPC translator at the service
//! boundary, so new variants must be added to that map as well.

use thiserror::Error;

/// Errors that can occur during control-plane operations.
#[derive(Error, Debug)]
pub enum CephixError {
    /// A request field failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Credentials were missing or rejected by the cluster.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// RADOS pool does not exist.
    #[error("pool not found: {0}")]
    PoolNotFound(String),

    /// RBD image does not exist.
    #[error("image not found: {0}")]
    ImageNotFound(String),

    /// CephFS subvolume does not exist.
    #[error("volume not found: {0}")]
    VolumeNotFound(String),

    /// Snapshot does not exist on the backend.
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// An omap key expected by the journal is missing.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// NFS export does not exist.
    #[error("export not found: {0}")]
    ExportNotFound(String),

    /// CephFS filesystem does not exist.
    #[error("filesystem not found: {0}")]
    FilesystemNotFound(String),

    /// Mirror status description carried no last-sync information.
    #[error("last sync info not found: {0}")]
    LastSyncNotFound(String),

    /// Snapshot is protected and cannot be removed yet.
    #[error("snapshot is protected: {0}")]
    SnapshotProtected(String),

    /// A subvolume clone is still being hydrated by the backend.
    #[error("clone in progress: {0}")]
    CloneInProgress(String),

    /// A subvolume clone is queued but not started.
    #[error("clone pending: {0}")]
    ClonePending(String),

    /// An RBD flatten is still running.
    #[error("flatten in progress: {0}")]
    FlattenInProgress(String),

    /// A filesystem quiesce has not reached the quiesced state yet.
    #[error("quiesce in progress: {0}")]
    QuiesceInProgress(String),

    /// The cluster rejected the admin command as unknown.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The operation is not supported in the current configuration.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Volume still carries snapshots and cannot be deleted.
    #[error("volume has snapshots: {0}")]
    VolumeHasSnapshots(String),

    /// Snapshot still has clones hydrating from it.
    #[error("snapshot has pending clones: {0}")]
    SnapshotHasPendingClones(String),

    /// Mirror operation requires the image to be primary.
    #[error("image is not primary: {0}")]
    ImageNotPrimary(String),

    /// Generic precondition failure.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// Journal epoch moved underneath the caller; the CO must retry.
    #[error("object out of date: {0}")]
    ObjectOutOfDate(String),

    /// Another operation holds a lock on the same identifier.
    #[error("operation already in progress: {0}")]
    OperationInProgress(String),

    /// Connecting to the cluster failed.
    #[error("failed to connect to cluster: {0}")]
    ConnectFailed(String),

    /// Executing an admin command failed.
    #[error("command execution failed: {0}")]
    ExecFailed(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CephixError {
    /// True for states where the backend is still working and the CO should
    /// simply retry the call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CephixError::CloneInProgress(_)
                | CephixError::ClonePending(_)
                | CephixError::FlattenInProgress(_)
                | CephixError::QuiesceInProgress(_)
                | CephixError::OperationInProgress(_)
                | CephixError::ObjectOutOfDate(_)
        )
    }

    /// True when the error means the target is already gone, which delete
    /// paths treat as success.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CephixError::PoolNotFound(_)
                | CephixError::ImageNotFound(_)
                | CephixError::VolumeNotFound(_)
                | CephixError::SnapshotNotFound(_)
                | CephixError::KeyNotFound(_)
                | CephixError::ExportNotFound(_)
                | CephixError::FilesystemNotFound(_)
        )
    }
}

/// Result type alias for control-plane operations.
pub type Result<T> = std::result::Result<T, CephixError>;
