//! End-to-end provisioning scenarios over the controller and group
//! services, backed by the in-memory mock cluster.

mod common;

use tonic::{Code, Request};

use cephix_core::{CsiIdentifier, FsAdmin, Journal, ReserveRequest};
use cephix_driver::service::controller::ControllerService;
use cephix_driver::service::group::GroupControllerService;
use cephix_proto::csi::{
    CreateSnapshotRequest, CreateVolumeGroupSnapshotRequest, ControllerExpandVolumeRequest,
    CapacityRange, DeleteSnapshotRequest, DeleteVolumeRequest,
};
use cephix_proto::{Controller, GroupController};

use common::*;

const FIVE_GIB: u64 = 5 * 1024 * 1024 * 1024;

async fn create_volume(
    svc: &ControllerService,
    name: &str,
    size: u64,
    fs_name: &str,
) -> cephix_proto::csi::Volume {
    let req = create_request(name, size, cephfs_params(fs_name), mount_rw_caps());
    svc.create_volume(Request::new(req))
        .await
        .expect("create must succeed")
        .into_inner()
        .volume
        .expect("response carries a volume")
}

async fn create_snapshot(
    svc: &ControllerService,
    name: &str,
    source_volume_id: &str,
) -> cephix_proto::csi::Snapshot {
    svc.create_snapshot(Request::new(CreateSnapshotRequest {
        source_volume_id: source_volume_id.to_string(),
        name: name.to_string(),
        secrets: secrets(),
        parameters: Default::default(),
    }))
    .await
    .expect("snapshot must succeed")
    .into_inner()
    .snapshot
    .expect("response carries a snapshot")
}

async fn delete_volume(svc: &ControllerService, volume_id: &str) -> Result<(), tonic::Status> {
    svc.delete_volume(Request::new(DeleteVolumeRequest {
        volume_id: volume_id.to_string(),
        secrets: secrets(),
    }))
    .await
    .map(|_| ())
}

#[tokio::test]
async fn test_first_provision() {
    let (cluster, driver) = harness();
    let svc = ControllerService::new(driver);

    let volume = create_volume(&svc, "pvc-a", FIVE_GIB, "myfs").await;
    assert_eq!(volume.capacity_bytes, 5368709120);

    let subvolume = volume
        .volume_context
        .get("subvolumeName")
        .expect("context carries the subvolume name");
    assert!(subvolume.starts_with("csi-vol-"));
    assert!(cluster.has_subvolume("myfs", "csi", subvolume));

    // The handle decodes back to the cluster and filesystem.
    let ident = CsiIdentifier::decode(&volume.volume_id).unwrap();
    assert_eq!(ident.cluster_id, "c1");
    assert_eq!(ident.location_id, 1);
}

#[tokio::test]
async fn test_idempotent_repeat_returns_same_volume() {
    let (cluster, driver) = harness();
    let svc = ControllerService::new(driver);

    let first = create_volume(&svc, "pvc-idem", FIVE_GIB, "myfs").await;
    let second = create_volume(&svc, "pvc-idem", FIVE_GIB, "myfs").await;
    assert_eq!(first.volume_id, second.volume_id);
    assert_eq!(
        first.volume_context.get("subvolumeName"),
        second.volume_context.get("subvolumeName")
    );
    assert_eq!(cluster.op_count("fs.create_subvolume"), 1);
}

#[tokio::test]
async fn test_retry_after_crash_between_reservation_and_create() {
    let (cluster, driver) = harness();

    // Simulate a crash after the reservation but before the backend
    // create: only the journal entries exist.
    let journal = Journal::volumes();
    let reserved = journal
        .reserve_name(
            cluster.as_ref(),
            "myfs-metadata",
            "",
            &ReserveRequest {
                request_name: "pvc-crash",
                name_prefix: "csi-vol",
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!cluster.has_subvolume("myfs", "csi", &reserved.backend_name));

    // The retried CreateVolume adopts the reservation instead of leaking
    // a second UUID.
    let svc = ControllerService::new(driver);
    let volume = create_volume(&svc, "pvc-crash", FIVE_GIB, "myfs").await;
    let ident = CsiIdentifier::decode(&volume.volume_id).unwrap();
    assert_eq!(ident.object_uuid, reserved.uuid);
    assert!(cluster.has_subvolume("myfs", "csi", &reserved.backend_name));
}

#[tokio::test]
async fn test_clone_pending_then_complete() {
    let (cluster, driver) = harness();
    let svc = ControllerService::new(driver);

    let source = create_volume(&svc, "pvc-a", FIVE_GIB, "myfs").await;
    cluster.set_clone_polls(1);

    let mut req = create_request("clone1", 2 * FIVE_GIB, cephfs_params("myfs"), mount_rw_caps());
    req.volume_content_source = volume_source(&source.volume_id);

    // First call: hydration in progress, ABORTED.
    let status = svc
        .create_volume(Request::new(req.clone()))
        .await
        .expect_err("first clone call must abort");
    assert_eq!(status.code(), Code::Aborted);
    assert!(status.message().contains("clone in progress"));

    // Retry resolves the reservation, finishes the ladder and returns the
    // clone resized to the requested size.
    let volume = svc
        .create_volume(Request::new(req))
        .await
        .expect("retried clone must succeed")
        .into_inner()
        .volume
        .unwrap();
    assert_eq!(volume.capacity_bytes as u64, 2 * FIVE_GIB);

    let clone_name = volume.volume_context.get("subvolumeName").unwrap();
    assert!(cluster.has_subvolume("myfs", "csi", clone_name));
    // Transient snapshot on the source was cleaned up.
    let source_name = source.volume_context.get("subvolumeName").unwrap();
    assert!(cluster.subvolume_snapshots("myfs", "csi", source_name).is_empty());
}

#[tokio::test]
async fn test_concurrent_same_name_aborts() {
    let (_cluster, driver) = harness();
    let svc = ControllerService::new(driver.clone());

    // Another in-flight CreateVolume holds the request-name lock.
    let _held = driver.volume_name_locks.try_acquire("pvc-busy").unwrap();
    let status = svc
        .create_volume(Request::new(create_request(
            "pvc-busy",
            FIVE_GIB,
            cephfs_params("myfs"),
            mount_rw_caps(),
        )))
        .await
        .expect_err("contended name must abort");
    assert_eq!(status.code(), Code::Aborted);
}

#[tokio::test]
async fn test_group_snapshot_across_filesystems() {
    let (_cluster, driver) = harness();
    let controller = ControllerService::new(driver.clone());
    let groups = GroupControllerService::new(driver);

    let vol_a = create_volume(&controller, "pvc-1", FIVE_GIB, "myfs").await;
    let vol_b = create_volume(&controller, "pvc-2", FIVE_GIB, "myfs").await;
    let vol_c = create_volume(&controller, "pvc-3", FIVE_GIB, "otherfs").await;
    let source_ids = vec![
        vol_a.volume_id.clone(),
        vol_b.volume_id.clone(),
        vol_c.volume_id.clone(),
    ];

    let req = CreateVolumeGroupSnapshotRequest {
        name: "group-snap-1".to_string(),
        source_volume_ids: source_ids,
        secrets: secrets(),
        parameters: Default::default(),
    };

    // First call: the filesystems are still quiescing.
    let status = groups
        .create_volume_group_snapshot(Request::new(req.clone()))
        .await
        .expect_err("first group call must abort");
    assert_eq!(status.code(), Code::Aborted);

    // Retry: everything quiesced, three snapshots, one group id.
    let group = groups
        .create_volume_group_snapshot(Request::new(req))
        .await
        .expect("retried group snapshot must succeed")
        .into_inner()
        .group_snapshot
        .unwrap();
    assert!(group.ready_to_use);
    assert_eq!(group.snapshots.len(), 3);
    for snapshot in &group.snapshots {
        assert_eq!(snapshot.group_snapshot_id, group.group_snapshot_id);
        assert!(snapshot.ready_to_use);
    }
}

#[tokio::test]
async fn test_delete_volume_with_snapshots_is_refused() {
    let (_cluster, driver) = harness();
    let svc = ControllerService::new(driver);

    let volume = create_volume(&svc, "pvc-a", FIVE_GIB, "myfs").await;
    let snapshot = create_snapshot(&svc, "snap-1", &volume.volume_id).await;

    let status = delete_volume(&svc, &volume.volume_id)
        .await
        .expect_err("delete with live snapshots must fail");
    assert_eq!(status.code(), Code::FailedPrecondition);
    assert!(status.message().contains("volume has snapshots"));

    // Once the snapshot is gone the volume deletes, and deletes again.
    svc.delete_snapshot(Request::new(DeleteSnapshotRequest {
        snapshot_id: snapshot.snapshot_id,
        secrets: secrets(),
    }))
    .await
    .unwrap();
    delete_volume(&svc, &volume.volume_id).await.unwrap();
    delete_volume(&svc, &volume.volume_id).await.unwrap();
}

#[tokio::test]
async fn test_snapshot_backed_volume_delete_cycle() {
    let (cluster, driver) = harness();
    let svc = ControllerService::new(driver);

    let source = create_volume(&svc, "pvc-src", FIVE_GIB, "myfs").await;
    let source_name = source.volume_context.get("subvolumeName").unwrap().clone();
    let snapshot = create_snapshot(&svc, "snap-s", &source.volume_id).await;

    // Two read-only volumes served straight from the snapshot.
    let mut clones = Vec::new();
    for name in ["backed-1", "backed-2"] {
        let mut params = cephfs_params("myfs");
        params.insert("backingSnapshot".to_string(), "true".to_string());
        let mut req = create_request(name, FIVE_GIB, params, mount_ro_caps());
        req.volume_content_source = snapshot_source(&snapshot.snapshot_id);
        let volume = svc
            .create_volume(Request::new(req))
            .await
            .expect("backed volume must provision")
            .into_inner()
            .volume
            .unwrap();
        assert_eq!(
            volume.volume_context.get("backingSnapshotID"),
            Some(&snapshot.snapshot_id)
        );
        clones.push(volume.volume_id);
    }

    // The CO deletes the snapshot; the backing snapshot survives because
    // two volumes still reference it.
    svc.delete_snapshot(Request::new(DeleteSnapshotRequest {
        snapshot_id: snapshot.snapshot_id.clone(),
        secrets: secrets(),
    }))
    .await
    .unwrap();
    assert_eq!(cluster.subvolume_snapshots("myfs", "csi", &source_name).len(), 1);

    // The CO deletes the source volume; it moves to the retained state
    // because its only snapshot backs live volumes.
    delete_volume(&svc, &source.volume_id).await.unwrap();
    let info = cluster.subvolume_info("myfs", "csi", &source_name).await.unwrap();
    assert!(info.is_snapshot_retained());

    // First clone out: the snapshot stays.
    delete_volume(&svc, &clones[0]).await.unwrap();
    assert_eq!(cluster.subvolume_snapshots("myfs", "csi", &source_name).len(), 1);

    // Last clone out: the snapshot and the retained source go away.
    delete_volume(&svc, &clones[1]).await.unwrap();
    assert!(!cluster.has_subvolume("myfs", "csi", &source_name));
}

#[tokio::test]
async fn test_expand_rounds_to_grain_and_rejects_backed_volumes() {
    let (_cluster, driver) = harness();
    let svc = ControllerService::new(driver);

    let volume = create_volume(&svc, "pvc-a", FIVE_GIB, "myfs").await;
    let response = svc
        .controller_expand_volume(Request::new(ControllerExpandVolumeRequest {
            volume_id: volume.volume_id.clone(),
            capacity_range: Some(CapacityRange {
                required_bytes: FIVE_GIB as i64 + 1,
                limit_bytes: 0,
            }),
            secrets: secrets(),
            volume_capability: None,
        }))
        .await
        .unwrap()
        .into_inner();
    // Rounded up to the next 4 MiB boundary.
    assert_eq!(
        response.capacity_bytes as u64,
        FIVE_GIB + 4 * 1024 * 1024
    );
    assert!(!response.node_expansion_required);
}

#[tokio::test]
async fn test_idempotent_snapshot_create() {
    let (_cluster, driver) = harness();
    let svc = ControllerService::new(driver);

    let volume = create_volume(&svc, "pvc-a", FIVE_GIB, "myfs").await;
    let first = create_snapshot(&svc, "snap-1", &volume.volume_id).await;
    let second = create_snapshot(&svc, "snap-1", &volume.volume_id).await;
    assert_eq!(first.snapshot_id, second.snapshot_id);
    assert!(second.ready_to_use);
}

#[tokio::test]
async fn test_rbd_block_volume_lifecycle() {
    let (cluster, driver) = harness();
    let svc = ControllerService::new(driver);

    let req = create_request("pvc-block", FIVE_GIB, rbd_params(), block_rw_caps());
    let volume = svc
        .create_volume(Request::new(req))
        .await
        .expect("rbd volume must provision")
        .into_inner()
        .volume
        .unwrap();
    let image = volume.volume_context.get("imageName").unwrap();
    assert!(cluster.has_image("replicapool", "", image));
    assert_eq!(volume.capacity_bytes as u64, FIVE_GIB);

    // Expansion requires a node-side filesystem grow for block volumes.
    let expanded = svc
        .controller_expand_volume(Request::new(ControllerExpandVolumeRequest {
            volume_id: volume.volume_id.clone(),
            capacity_range: Some(CapacityRange {
                required_bytes: 2 * FIVE_GIB as i64,
                limit_bytes: 0,
            }),
            secrets: secrets(),
            volume_capability: None,
        }))
        .await
        .unwrap()
        .into_inner();
    assert!(expanded.node_expansion_required);

    delete_volume(&svc, &volume.volume_id).await.unwrap();
    assert!(!cluster.has_image("replicapool", "", image));
    // And again, idempotently.
    delete_volume(&svc, &volume.volume_id).await.unwrap();
}

#[tokio::test]
async fn test_rwx_block_is_rejected() {
    let (_cluster, driver) = harness();
    let svc = ControllerService::new(driver);

    let mut caps = block_rw_caps();
    caps[0].access_mode = Some(cephix_proto::csi::volume_capability::AccessMode {
        mode: cephix_proto::csi::volume_capability::access_mode::Mode::MultiNodeMultiWriter as i32,
    });
    let status = svc
        .create_volume(Request::new(create_request(
            "pvc-rwx-block",
            FIVE_GIB,
            rbd_params(),
            caps,
        )))
        .await
        .expect_err("RWX block must be rejected");
    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn test_nfs_export_lifecycle() {
    let (cluster, driver) = harness();
    let svc = ControllerService::new(driver);

    let mut params = cephfs_params("myfs");
    params.insert("nfsCluster".to_string(), "nfs-east".to_string());
    let volume = svc
        .create_volume(Request::new(create_request(
            "pvc-nfs",
            FIVE_GIB,
            params,
            mount_rw_caps(),
        )))
        .await
        .expect("nfs volume must provision")
        .into_inner()
        .volume
        .unwrap();
    assert_eq!(
        volume.volume_context.get("nfsCluster").map(String::as_str),
        Some("nfs-east")
    );
    assert_eq!(cluster.op_count("nfs.create_export"), 1);

    // Deleting the volume reverses the export before purging the backend.
    delete_volume(&svc, &volume.volume_id).await.unwrap();
    assert_eq!(cluster.op_count("nfs.remove_export"), 1);
    let subvolume = volume.volume_context.get("subvolumeName").unwrap();
    assert!(!cluster.has_subvolume("myfs", "csi", subvolume));
}
