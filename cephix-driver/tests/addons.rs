//! CSI-Addons service tests: replication, fencing, key rotation and RBD
//! volume groups over the mock cluster.

mod common;

use tonic::{Code, Request};

use cephix_core::{OsdAdmin, RbdAdmin};
use cephix_driver::service::addons::{
    EncryptionKeyRotationService, NetworkFenceService, ReplicationService, VolumeGroupService,
};
use cephix_driver::service::controller::ControllerService;
use cephix_proto::addons::{
    CreateVolumeGroupRequest, DeleteVolumeGroupRequest, DemoteVolumeRequest,
    EnableVolumeReplicationRequest, EncryptionKeyRotateRequest, FenceClusterNetworkRequest,
    GetVolumeGroupRequest, ModifyVolumeGroupMembershipRequest, PromoteVolumeRequest,
    ResyncVolumeRequest, UnfenceClusterNetworkRequest,
};
use cephix_proto::{
    Controller, EncryptionKeyRotation, NetworkFence, Replication, VolumeGroupController,
};

use common::*;

const ONE_GIB: u64 = 1 << 30;

async fn rbd_volume(svc: &ControllerService, name: &str) -> cephix_proto::csi::Volume {
    svc.create_volume(Request::new(create_request(
        name,
        ONE_GIB,
        rbd_params(),
        block_rw_caps(),
    )))
    .await
    .expect("rbd volume must provision")
    .into_inner()
    .volume
    .unwrap()
}

#[tokio::test]
async fn test_replication_lifecycle() {
    let (cluster, driver) = harness();
    let controller = ControllerService::new(driver.clone());
    let replication = ReplicationService::new(driver);

    let volume = rbd_volume(&controller, "pvc-repl").await;
    let image = volume.volume_context.get("imageName").unwrap().clone();

    let mut params = std::collections::HashMap::new();
    params.insert("mirroringMode".to_string(), "snapshot".to_string());
    params.insert("schedulingInterval".to_string(), "1h".to_string());
    replication
        .enable_volume_replication(Request::new(EnableVolumeReplicationRequest {
            volume_id: volume.volume_id.clone(),
            parameters: params.clone(),
            secrets: secrets(),
        }))
        .await
        .unwrap();
    let info = cluster.mirror_info("replicapool", "", &image).await.unwrap();
    assert!(info.is_enabled());
    assert!(info.primary);
    assert_eq!(cluster.op_count("rbd.snapshot_schedule_add"), 1);

    // Promoting an already-primary image is idempotent.
    replication
        .promote_volume(Request::new(PromoteVolumeRequest {
            volume_id: volume.volume_id.clone(),
            force: false,
            parameters: Default::default(),
            secrets: secrets(),
        }))
        .await
        .unwrap();

    // Resync of a primary image is refused; after demotion it goes ahead.
    let status = replication
        .resync_volume(Request::new(ResyncVolumeRequest {
            volume_id: volume.volume_id.clone(),
            parameters: Default::default(),
            secrets: secrets(),
        }))
        .await
        .expect_err("resync of a primary must fail");
    assert_eq!(status.code(), Code::FailedPrecondition);

    replication
        .demote_volume(Request::new(DemoteVolumeRequest {
            volume_id: volume.volume_id.clone(),
            parameters: Default::default(),
            secrets: secrets(),
        }))
        .await
        .unwrap();
    replication
        .resync_volume(Request::new(ResyncVolumeRequest {
            volume_id: volume.volume_id.clone(),
            parameters: Default::default(),
            secrets: secrets(),
        }))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_replication_rejects_bad_interval() {
    let (_cluster, driver) = harness();
    let controller = ControllerService::new(driver.clone());
    let replication = ReplicationService::new(driver);

    let volume = rbd_volume(&controller, "pvc-repl-bad").await;
    let mut params = std::collections::HashMap::new();
    params.insert("mirroringMode".to_string(), "snapshot".to_string());
    params.insert("schedulingInterval".to_string(), "15s".to_string());
    let status = replication
        .enable_volume_replication(Request::new(EnableVolumeReplicationRequest {
            volume_id: volume.volume_id,
            parameters: params,
            secrets: secrets(),
        }))
        .await
        .expect_err("bad interval must be rejected");
    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn test_network_fence_round_trip() {
    let (cluster, driver) = harness();
    let fence = NetworkFenceService::new(driver);

    let mut params = std::collections::HashMap::new();
    params.insert("clusterID".to_string(), "c1".to_string());

    fence
        .fence_cluster_network(Request::new(FenceClusterNetworkRequest {
            parameters: params.clone(),
            secrets: secrets(),
            cidrs: vec!["10.90.0.0/30".to_string()],
        }))
        .await
        .unwrap();
    assert_eq!(cluster.blocklist_list().await.unwrap().len(), 4);

    fence
        .unfence_cluster_network(Request::new(UnfenceClusterNetworkRequest {
            parameters: params,
            secrets: secrets(),
            cidrs: vec!["10.90.0.0/30".to_string()],
        }))
        .await
        .unwrap();
    assert!(cluster.blocklist_list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_key_rotation_requires_encrypted_volume() {
    let (_cluster, driver) = harness();
    let controller = ControllerService::new(driver.clone());
    let rotation = EncryptionKeyRotationService::new(driver);

    let plain = rbd_volume(&controller, "pvc-plain").await;
    let status = rotation
        .encryption_key_rotate(Request::new(EncryptionKeyRotateRequest {
            volume_id: plain.volume_id,
            parameters: Default::default(),
            secrets: secrets(),
        }))
        .await
        .expect_err("rotating an unencrypted volume must fail");
    assert_eq!(status.code(), Code::FailedPrecondition);

    let mut params = rbd_params();
    params.insert("encryptionKMSID".to_string(), "vault".to_string());
    let encrypted = controller
        .create_volume(Request::new(create_request(
            "pvc-encrypted",
            ONE_GIB,
            params,
            block_rw_caps(),
        )))
        .await
        .unwrap()
        .into_inner()
        .volume
        .unwrap();
    rotation
        .encryption_key_rotate(Request::new(EncryptionKeyRotateRequest {
            volume_id: encrypted.volume_id,
            parameters: Default::default(),
            secrets: secrets(),
        }))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_volume_group_membership_reconciliation() {
    let (cluster, driver) = harness();
    let controller = ControllerService::new(driver.clone());
    let groups = VolumeGroupService::new(driver);

    let vol_a = rbd_volume(&controller, "pvc-g1").await;
    let vol_b = rbd_volume(&controller, "pvc-g2").await;

    let mut params = std::collections::HashMap::new();
    params.insert("clusterID".to_string(), "c1".to_string());
    params.insert("pool".to_string(), "replicapool".to_string());

    let group = groups
        .create_volume_group(Request::new(CreateVolumeGroupRequest {
            name: "vg-1".to_string(),
            volume_ids: vec![vol_a.volume_id.clone()],
            parameters: params,
            secrets: secrets(),
        }))
        .await
        .unwrap()
        .into_inner()
        .volume_group
        .unwrap();
    assert_eq!(group.volume_ids, vec![vol_a.volume_id.clone()]);

    // Swap membership from {a} to {b}: one add, one remove.
    let modified = groups
        .modify_volume_group_membership(Request::new(ModifyVolumeGroupMembershipRequest {
            volume_group_id: group.volume_group_id.clone(),
            volume_ids: vec![vol_b.volume_id.clone()],
            parameters: Default::default(),
            secrets: secrets(),
        }))
        .await
        .unwrap()
        .into_inner()
        .volume_group
        .unwrap();
    assert_eq!(modified.volume_ids, vec![vol_b.volume_id.clone()]);
    assert_eq!(cluster.op_count("rbd.group_image_add"), 2);
    assert_eq!(cluster.op_count("rbd.group_image_remove"), 1);

    // Repeating the same membership is a no-op.
    groups
        .modify_volume_group_membership(Request::new(ModifyVolumeGroupMembershipRequest {
            volume_group_id: group.volume_group_id.clone(),
            volume_ids: vec![vol_b.volume_id.clone()],
            parameters: Default::default(),
            secrets: secrets(),
        }))
        .await
        .unwrap();
    assert_eq!(cluster.op_count("rbd.group_image_add"), 2);
    assert_eq!(cluster.op_count("rbd.group_image_remove"), 1);

    // A populated group refuses deletion.
    let status = groups
        .delete_volume_group(Request::new(DeleteVolumeGroupRequest {
            volume_group_id: group.volume_group_id.clone(),
            secrets: secrets(),
        }))
        .await
        .expect_err("non-empty group must not delete");
    assert_eq!(status.code(), Code::FailedPrecondition);

    // Empty it, then delete.
    groups
        .modify_volume_group_membership(Request::new(ModifyVolumeGroupMembershipRequest {
            volume_group_id: group.volume_group_id.clone(),
            volume_ids: vec![],
            parameters: Default::default(),
            secrets: secrets(),
        }))
        .await
        .unwrap();
    groups
        .delete_volume_group(Request::new(DeleteVolumeGroupRequest {
            volume_group_id: group.volume_group_id.clone(),
            secrets: secrets(),
        }))
        .await
        .unwrap();

    let status = groups
        .get_volume_group(Request::new(GetVolumeGroupRequest {
            volume_group_id: group.volume_group_id,
            secrets: secrets(),
        }))
        .await
        .expect_err("deleted group must be gone");
    assert_eq!(status.code(), Code::NotFound);
}
