#![allow(dead_code)]

//! Shared harness for the service-level tests: a driver wired to the
//! in-memory mock cluster.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use cephix_core::{AdminFactory, CephAdmin, ClusterRegistry, Credentials, MockCluster};
use cephix_driver::config::Config;
use cephix_driver::driver::Driver;
use cephix_proto::csi::volume_capability::{self, AccessMode, AccessType, BlockVolume, MountVolume};
use cephix_proto::csi::{
    volume_content_source, CapacityRange, CreateVolumeRequest, VolumeCapability,
    VolumeContentSource,
};

pub struct TestFactory {
    cluster: Arc<MockCluster>,
}

#[async_trait]
impl AdminFactory for TestFactory {
    async fn connect(
        &self,
        _monitors: &str,
        _creds: &Credentials,
    ) -> cephix_core::Result<Arc<dyn CephAdmin>> {
        let admin: Arc<dyn CephAdmin> = self.cluster.clone();
        Ok(admin)
    }
}

/// A mock cluster with two filesystems and an RBD pool, plus a driver
/// talking to it.
pub fn harness() -> (Arc<MockCluster>, Arc<Driver>) {
    let cluster = Arc::new(MockCluster::new());
    cluster.add_filesystem("myfs", 1, "myfs-metadata");
    cluster.add_filesystem("otherfs", 2, "otherfs-metadata");
    cluster.add_pool("replicapool", 3);

    let registry = ClusterRegistry::parse(
        r#"[{"clusterID": "c1", "monitors": ["10.0.0.1:6789", "10.0.0.2:6789"]}]"#,
    )
    .expect("static registry must parse");
    let config = Config::default();
    let driver = Arc::new(Driver::new(
        &config,
        registry,
        Arc::new(TestFactory {
            cluster: cluster.clone(),
        }),
    ));
    (cluster, driver)
}

pub fn secrets() -> HashMap<String, String> {
    let mut secrets = HashMap::new();
    secrets.insert("adminID".to_string(), "admin".to_string());
    secrets.insert("adminKey".to_string(), "k".to_string());
    secrets
}

pub fn cephfs_params(fs_name: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    params.insert("clusterID".to_string(), "c1".to_string());
    params.insert("fsName".to_string(), fs_name.to_string());
    params
}

pub fn rbd_params() -> HashMap<String, String> {
    let mut params = HashMap::new();
    params.insert("clusterID".to_string(), "c1".to_string());
    params.insert("pool".to_string(), "replicapool".to_string());
    params
}

pub fn mount_rw_caps() -> Vec<VolumeCapability> {
    vec![VolumeCapability {
        access_mode: Some(AccessMode {
            mode: volume_capability::access_mode::Mode::MultiNodeMultiWriter as i32,
        }),
        access_type: Some(AccessType::Mount(MountVolume {
            fs_type: String::new(),
            mount_flags: vec![],
        })),
    }]
}

pub fn mount_ro_caps() -> Vec<VolumeCapability> {
    vec![VolumeCapability {
        access_mode: Some(AccessMode {
            mode: volume_capability::access_mode::Mode::MultiNodeReaderOnly as i32,
        }),
        access_type: Some(AccessType::Mount(MountVolume {
            fs_type: String::new(),
            mount_flags: vec![],
        })),
    }]
}

pub fn block_rw_caps() -> Vec<VolumeCapability> {
    vec![VolumeCapability {
        access_mode: Some(AccessMode {
            mode: volume_capability::access_mode::Mode::SingleNodeWriter as i32,
        }),
        access_type: Some(AccessType::Block(BlockVolume {})),
    }]
}

pub fn create_request(
    name: &str,
    size: u64,
    params: HashMap<String, String>,
    caps: Vec<VolumeCapability>,
) -> CreateVolumeRequest {
    CreateVolumeRequest {
        name: name.to_string(),
        capacity_range: Some(CapacityRange {
            required_bytes: size as i64,
            limit_bytes: 0,
        }),
        volume_capabilities: caps,
        parameters: params,
        secrets: secrets(),
        volume_content_source: None,
        accessibility_requirements: None,
    }
}

pub fn volume_source(volume_id: &str) -> Option<VolumeContentSource> {
    Some(VolumeContentSource {
        r#type: Some(volume_content_source::Type::Volume(
            volume_content_source::VolumeSource {
                volume_id: volume_id.to_string(),
            },
        )),
    })
}

pub fn snapshot_source(snapshot_id: &str) -> Option<VolumeContentSource> {
    Some(VolumeContentSource {
        r#type: Some(volume_content_source::Type::Snapshot(
            volume_content_source::SnapshotSource {
                snapshot_id: snapshot_id.to_string(),
            },
        )),
    })
}
