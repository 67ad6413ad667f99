//! Node service tests over the recording mock mounter.

mod common;

use std::sync::Arc;

use tonic::{Code, Request};

use cephix_driver::mount::MockMounter;
use cephix_driver::service::controller::ControllerService;
use cephix_driver::service::node::NodeService;
use cephix_proto::csi::{
    NodePublishVolumeRequest, NodeStageVolumeRequest, NodeUnpublishVolumeRequest,
    NodeUnstageVolumeRequest,
};
use cephix_proto::{Controller, Node};

use common::*;

const ONE_GIB: u64 = 1 << 30;

fn user_secrets() -> std::collections::HashMap<String, String> {
    let mut secrets = std::collections::HashMap::new();
    secrets.insert("userID".to_string(), "csi-user".to_string());
    secrets.insert("userKey".to_string(), "k".to_string());
    secrets
}

#[tokio::test]
async fn test_stage_publish_cycle_for_cephfs() {
    let (_cluster, driver) = harness();
    let controller = ControllerService::new(driver.clone());
    let mounter = Arc::new(MockMounter::new());
    let node = NodeService::new(driver, mounter.clone());

    let volume = controller
        .create_volume(Request::new(create_request(
            "pvc-a",
            ONE_GIB,
            cephfs_params("myfs"),
            mount_rw_caps(),
        )))
        .await
        .unwrap()
        .into_inner()
        .volume
        .unwrap();

    node.node_stage_volume(Request::new(NodeStageVolumeRequest {
        volume_id: volume.volume_id.clone(),
        publish_context: Default::default(),
        staging_target_path: "/var/lib/kubelet/staging/pvc-a".to_string(),
        volume_capability: mount_rw_caps().pop(),
        secrets: user_secrets(),
        volume_context: volume.volume_context.clone(),
    }))
    .await
    .unwrap();

    node.node_publish_volume(Request::new(NodePublishVolumeRequest {
        volume_id: volume.volume_id.clone(),
        publish_context: Default::default(),
        staging_target_path: "/var/lib/kubelet/staging/pvc-a".to_string(),
        target_path: "/var/lib/kubelet/pods/x/volumes/pvc-a".to_string(),
        volume_capability: mount_rw_caps().pop(),
        readonly: false,
        secrets: user_secrets(),
        volume_context: volume.volume_context.clone(),
    }))
    .await
    .unwrap();

    node.node_unpublish_volume(Request::new(NodeUnpublishVolumeRequest {
        volume_id: volume.volume_id.clone(),
        target_path: "/var/lib/kubelet/pods/x/volumes/pvc-a".to_string(),
    }))
    .await
    .unwrap();

    node.node_unstage_volume(Request::new(NodeUnstageVolumeRequest {
        volume_id: volume.volume_id.clone(),
        staging_target_path: "/var/lib/kubelet/staging/pvc-a".to_string(),
    }))
    .await
    .unwrap();

    let calls = mounter.recorded();
    assert_eq!(calls.len(), 4);
    assert!(calls[0].starts_with("mount_cephfs"));
    assert!(calls[0].contains("/volumes/csi/"));
    assert!(calls[1].starts_with("bind_mount"));
    assert!(calls[2].starts_with("unmount /var/lib/kubelet/pods"));
    assert!(calls[3].starts_with("unmount /var/lib/kubelet/staging"));
}

#[tokio::test]
async fn test_stage_maps_rbd_images() {
    let (_cluster, driver) = harness();
    let controller = ControllerService::new(driver.clone());
    let mounter = Arc::new(MockMounter::new());
    let node = NodeService::new(driver, mounter.clone());

    let volume = controller
        .create_volume(Request::new(create_request(
            "pvc-block",
            ONE_GIB,
            rbd_params(),
            block_rw_caps(),
        )))
        .await
        .unwrap()
        .into_inner()
        .volume
        .unwrap();

    node.node_stage_volume(Request::new(NodeStageVolumeRequest {
        volume_id: volume.volume_id.clone(),
        publish_context: Default::default(),
        staging_target_path: "/var/lib/kubelet/staging/pvc-block".to_string(),
        volume_capability: block_rw_caps().pop(),
        secrets: user_secrets(),
        volume_context: volume.volume_context.clone(),
    }))
    .await
    .unwrap();

    let calls = mounter.recorded();
    assert_eq!(calls.len(), 1, "block staging maps without mounting");
    assert!(calls[0].starts_with("map_rbd replicapool"));
}

#[tokio::test]
async fn test_stage_requires_capability() {
    let (_cluster, driver) = harness();
    let node = NodeService::new(driver, Arc::new(MockMounter::new()));

    let status = node
        .node_stage_volume(Request::new(NodeStageVolumeRequest {
            volume_id: "anything".to_string(),
            publish_context: Default::default(),
            staging_target_path: "/staging".to_string(),
            volume_capability: None,
            secrets: user_secrets(),
            volume_context: Default::default(),
        }))
        .await
        .expect_err("missing capability must be rejected");
    assert_eq!(status.code(), Code::InvalidArgument);
}
