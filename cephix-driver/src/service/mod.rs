//! CSI service implementations.
//!
//! Each service validates the request, takes the locks its operation
//! requires, runs the control-plane logic in terms of [`CephixError`] and
//! funnels the outcome through the single [`status_from`] translator at the
//! gRPC boundary.

pub mod addons;
pub mod controller;
pub mod group;
pub mod identity;
pub mod node;

use cephix_core::CephixError;
use chrono::{DateTime, Utc};
use tonic::Status;

use cephix_proto::csi::{volume_capability, VolumeCapability};

/// The single error translator at the gRPC boundary.
///
/// Keep this map aligned with the error taxonomy: in-progress states abort
/// so the CO retries, gone-ness is NOT_FOUND, refusals that a caller can
/// resolve are FAILED_PRECONDITION, everything unexplained is INTERNAL.
pub fn status_from(err: CephixError) -> Status {
    let message = err.to_string();
    match err {
        CephixError::InvalidArgument(_) => Status::invalid_argument(message),
        CephixError::Unauthenticated(_) => Status::unauthenticated(message),

        CephixError::PoolNotFound(_)
        | CephixError::ImageNotFound(_)
        | CephixError::VolumeNotFound(_)
        | CephixError::SnapshotNotFound(_)
        | CephixError::KeyNotFound(_)
        | CephixError::ExportNotFound(_)
        | CephixError::FilesystemNotFound(_)
        | CephixError::LastSyncNotFound(_) => Status::not_found(message),

        CephixError::CloneInProgress(_)
        | CephixError::ClonePending(_)
        | CephixError::FlattenInProgress(_)
        | CephixError::QuiesceInProgress(_)
        | CephixError::ObjectOutOfDate(_)
        | CephixError::OperationInProgress(_) => Status::aborted(message),

        CephixError::VolumeHasSnapshots(_)
        | CephixError::SnapshotHasPendingClones(_)
        | CephixError::ImageNotPrimary(_)
        | CephixError::InvalidCommand(_)
        | CephixError::Unsupported(_)
        | CephixError::FailedPrecondition(_) => Status::failed_precondition(message),

        CephixError::ConnectFailed(_) => Status::unavailable(message),

        CephixError::SnapshotProtected(_)
        | CephixError::ExecFailed(_)
        | CephixError::Internal(_) => Status::internal(message),
    }
}

/// `ABORTED` for lock contention, uniformly worded.
pub fn operation_in_flight(id: &str) -> Status {
    Status::aborted(format!("an operation with the given identifier {id} already exists"))
}

/// Validate the capability set of a create/stage request.
///
/// Raw block plus multi-writer is refused: block RWX would hand the same
/// image to several writers with no filesystem arbitration.
pub fn validate_capabilities(caps: &[VolumeCapability]) -> Result<(), CephixError> {
    if caps.is_empty() {
        return Err(CephixError::InvalidArgument(
            "volume capabilities are missing".to_string(),
        ));
    }
    for cap in caps {
        let is_block = matches!(
            cap.access_type,
            Some(volume_capability::AccessType::Block(_))
        );
        let mode = cap
            .access_mode
            .as_ref()
            .map(|m| m.mode)
            .unwrap_or(volume_capability::access_mode::Mode::Unknown as i32);
        let multi_writer =
            mode == volume_capability::access_mode::Mode::MultiNodeMultiWriter as i32;
        if is_block && multi_writer {
            return Err(CephixError::InvalidArgument(
                "multi-node read-write block volumes are not supported".to_string(),
            ));
        }
    }
    Ok(())
}

/// Whether every capability requests read-only access (required for
/// snapshot-backed volumes).
pub fn all_read_only(caps: &[VolumeCapability]) -> bool {
    use cephix_proto::csi::volume_capability::access_mode::Mode;
    !caps.is_empty()
        && caps.iter().all(|cap| {
            matches!(
                cap.access_mode.as_ref().map(|m| m.mode),
                Some(mode)
                    if mode == Mode::SingleNodeReaderOnly as i32
                        || mode == Mode::MultiNodeReaderOnly as i32
            )
        })
}

/// Convert a chrono timestamp into the protobuf form.
pub fn to_proto_timestamp(ts: DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: ts.timestamp(),
        nanos: ts.timestamp_subsec_nanos() as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cephix_proto::csi::volume_capability::{AccessMode, AccessType, BlockVolume, MountVolume};

    fn cap(mode: volume_capability::access_mode::Mode, block: bool) -> VolumeCapability {
        VolumeCapability {
            access_mode: Some(AccessMode { mode: mode as i32 }),
            access_type: Some(if block {
                AccessType::Block(BlockVolume {})
            } else {
                AccessType::Mount(MountVolume {
                    fs_type: String::new(),
                    mount_flags: vec![],
                })
            }),
        }
    }

    #[test]
    fn test_rwx_block_rejected() {
        use cephix_proto::csi::volume_capability::access_mode::Mode;
        let caps = vec![cap(Mode::MultiNodeMultiWriter, true)];
        assert!(validate_capabilities(&caps).is_err());

        // RWX mount is fine (CephFS), block single-writer is fine (RBD).
        assert!(validate_capabilities(&[cap(Mode::MultiNodeMultiWriter, false)]).is_ok());
        assert!(validate_capabilities(&[cap(Mode::SingleNodeWriter, true)]).is_ok());
        assert!(validate_capabilities(&[]).is_err());
    }

    #[test]
    fn test_all_read_only() {
        use cephix_proto::csi::volume_capability::access_mode::Mode;
        assert!(all_read_only(&[cap(Mode::MultiNodeReaderOnly, false)]));
        assert!(!all_read_only(&[
            cap(Mode::MultiNodeReaderOnly, false),
            cap(Mode::SingleNodeWriter, false)
        ]));
        assert!(!all_read_only(&[]));
    }

    #[test]
    fn test_status_mapping() {
        use tonic::Code;
        assert_eq!(
            status_from(CephixError::CloneInProgress("x".into())).code(),
            Code::Aborted
        );
        assert_eq!(
            status_from(CephixError::VolumeHasSnapshots("x".into())).code(),
            Code::FailedPrecondition
        );
        assert_eq!(
            status_from(CephixError::ImageNotFound("x".into())).code(),
            Code::NotFound
        );
        assert_eq!(
            status_from(CephixError::InvalidCommand("x".into())).code(),
            Code::FailedPrecondition
        );
        assert_eq!(
            status_from(CephixError::ExecFailed("x".into())).code(),
            Code::Internal
        );
        assert_eq!(
            status_from(CephixError::ConnectFailed("x".into())).code(),
            Code::Unavailable
        );
    }
}
