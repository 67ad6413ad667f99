//! CSI 1.x message types and services.
//!
//! Tag numbers follow the upstream `csi.proto`; fields the driver never
//! reads are omitted.

use std::collections::HashMap;

// =============================================================================
// COMMON MESSAGES
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Topology {
    #[prost(map = "string, string", tag = "1")]
    pub segments: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TopologyRequirement {
    #[prost(message, repeated, tag = "1")]
    pub requisite: Vec<Topology>,
    #[prost(message, repeated, tag = "2")]
    pub preferred: Vec<Topology>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CapacityRange {
    #[prost(int64, tag = "1")]
    pub required_bytes: i64,
    #[prost(int64, tag = "2")]
    pub limit_bytes: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VolumeCapability {
    #[prost(message, optional, tag = "3")]
    pub access_mode: Option<volume_capability::AccessMode>,
    #[prost(oneof = "volume_capability::AccessType", tags = "1, 2")]
    pub access_type: Option<volume_capability::AccessType>,
}

pub mod volume_capability {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct BlockVolume {}

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MountVolume {
        #[prost(string, tag = "1")]
        pub fs_type: String,
        #[prost(string, repeated, tag = "2")]
        pub mount_flags: Vec<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AccessMode {
        #[prost(enumeration = "access_mode::Mode", tag = "1")]
        pub mode: i32,
    }

    pub mod access_mode {
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
        )]
        #[repr(i32)]
        pub enum Mode {
            Unknown = 0,
            SingleNodeWriter = 1,
            SingleNodeReaderOnly = 2,
            MultiNodeReaderOnly = 3,
            MultiNodeSingleWriter = 4,
            MultiNodeMultiWriter = 5,
        }
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum AccessType {
        #[prost(message, tag = "1")]
        Block(BlockVolume),
        #[prost(message, tag = "2")]
        Mount(MountVolume),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VolumeContentSource {
    #[prost(oneof = "volume_content_source::Type", tags = "1, 2")]
    pub r#type: Option<volume_content_source::Type>,
}

pub mod volume_content_source {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SnapshotSource {
        #[prost(string, tag = "1")]
        pub snapshot_id: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct VolumeSource {
        #[prost(string, tag = "1")]
        pub volume_id: String,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Type {
        #[prost(message, tag = "1")]
        Snapshot(SnapshotSource),
        #[prost(message, tag = "2")]
        Volume(VolumeSource),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Volume {
    #[prost(int64, tag = "1")]
    pub capacity_bytes: i64,
    #[prost(string, tag = "2")]
    pub volume_id: String,
    #[prost(map = "string, string", tag = "3")]
    pub volume_context: HashMap<String, String>,
    #[prost(message, optional, tag = "4")]
    pub content_source: Option<VolumeContentSource>,
    #[prost(message, repeated, tag = "5")]
    pub accessible_topology: Vec<Topology>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Snapshot {
    #[prost(int64, tag = "1")]
    pub size_bytes: i64,
    #[prost(string, tag = "2")]
    pub snapshot_id: String,
    #[prost(string, tag = "3")]
    pub source_volume_id: String,
    #[prost(message, optional, tag = "4")]
    pub creation_time: Option<::prost_types::Timestamp>,
    #[prost(bool, tag = "5")]
    pub ready_to_use: bool,
    #[prost(string, tag = "6")]
    pub group_snapshot_id: String,
}

// =============================================================================
// IDENTITY
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPluginInfoRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPluginInfoResponse {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub vendor_version: String,
    #[prost(map = "string, string", tag = "3")]
    pub manifest: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPluginCapabilitiesRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPluginCapabilitiesResponse {
    #[prost(message, repeated, tag = "1")]
    pub capabilities: Vec<PluginCapability>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PluginCapability {
    #[prost(message, optional, tag = "1")]
    pub service: Option<plugin_capability::Service>,
}

pub mod plugin_capability {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Service {
        #[prost(enumeration = "service::Type", tag = "1")]
        pub r#type: i32,
    }

    pub mod service {
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
        )]
        #[repr(i32)]
        pub enum Type {
            Unknown = 0,
            ControllerService = 1,
            VolumeAccessibilityConstraints = 2,
            GroupControllerService = 3,
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProbeRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProbeResponse {
    #[prost(message, optional, tag = "1")]
    pub ready: Option<bool>,
}

// =============================================================================
// CONTROLLER
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateVolumeRequest {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, optional, tag = "2")]
    pub capacity_range: Option<CapacityRange>,
    #[prost(message, repeated, tag = "3")]
    pub volume_capabilities: Vec<VolumeCapability>,
    #[prost(map = "string, string", tag = "4")]
    pub parameters: HashMap<String, String>,
    #[prost(map = "string, string", tag = "5")]
    pub secrets: HashMap<String, String>,
    #[prost(message, optional, tag = "6")]
    pub volume_content_source: Option<VolumeContentSource>,
    #[prost(message, optional, tag = "7")]
    pub accessibility_requirements: Option<TopologyRequirement>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateVolumeResponse {
    #[prost(message, optional, tag = "1")]
    pub volume: Option<Volume>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteVolumeRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(map = "string, string", tag = "2")]
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteVolumeResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerExpandVolumeRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(message, optional, tag = "2")]
    pub capacity_range: Option<CapacityRange>,
    #[prost(map = "string, string", tag = "3")]
    pub secrets: HashMap<String, String>,
    #[prost(message, optional, tag = "4")]
    pub volume_capability: Option<VolumeCapability>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerExpandVolumeResponse {
    #[prost(int64, tag = "1")]
    pub capacity_bytes: i64,
    #[prost(bool, tag = "2")]
    pub node_expansion_required: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateSnapshotRequest {
    #[prost(string, tag = "1")]
    pub source_volume_id: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(map = "string, string", tag = "3")]
    pub secrets: HashMap<String, String>,
    #[prost(map = "string, string", tag = "4")]
    pub parameters: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateSnapshotResponse {
    #[prost(message, optional, tag = "1")]
    pub snapshot: Option<Snapshot>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteSnapshotRequest {
    #[prost(string, tag = "1")]
    pub snapshot_id: String,
    #[prost(map = "string, string", tag = "2")]
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteSnapshotResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidateVolumeCapabilitiesRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(map = "string, string", tag = "2")]
    pub volume_context: HashMap<String, String>,
    #[prost(message, repeated, tag = "3")]
    pub volume_capabilities: Vec<VolumeCapability>,
    #[prost(map = "string, string", tag = "4")]
    pub parameters: HashMap<String, String>,
    #[prost(map = "string, string", tag = "5")]
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValidateVolumeCapabilitiesResponse {
    #[prost(message, optional, tag = "1")]
    pub confirmed: Option<validate_volume_capabilities_response::Confirmed>,
    #[prost(string, tag = "2")]
    pub message: String,
}

pub mod validate_volume_capabilities_response {
    use super::*;

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Confirmed {
        #[prost(map = "string, string", tag = "1")]
        pub volume_context: HashMap<String, String>,
        #[prost(message, repeated, tag = "2")]
        pub volume_capabilities: Vec<VolumeCapability>,
        #[prost(map = "string, string", tag = "3")]
        pub parameters: HashMap<String, String>,
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerGetCapabilitiesRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerGetCapabilitiesResponse {
    #[prost(message, repeated, tag = "1")]
    pub capabilities: Vec<ControllerServiceCapability>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerServiceCapability {
    #[prost(message, optional, tag = "1")]
    pub rpc: Option<controller_service_capability::Rpc>,
}

pub mod controller_service_capability {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Rpc {
        #[prost(enumeration = "rpc::Type", tag = "1")]
        pub r#type: i32,
    }

    pub mod rpc {
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
        )]
        #[repr(i32)]
        pub enum Type {
            Unknown = 0,
            CreateDeleteVolume = 1,
            CreateDeleteSnapshot = 5,
            CloneVolume = 7,
            ExpandVolume = 9,
        }
    }
}

// =============================================================================
// NODE
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeStageVolumeRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(map = "string, string", tag = "2")]
    pub publish_context: HashMap<String, String>,
    #[prost(string, tag = "3")]
    pub staging_target_path: String,
    #[prost(message, optional, tag = "4")]
    pub volume_capability: Option<VolumeCapability>,
    #[prost(map = "string, string", tag = "5")]
    pub secrets: HashMap<String, String>,
    #[prost(map = "string, string", tag = "6")]
    pub volume_context: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeStageVolumeResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeUnstageVolumeRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(string, tag = "2")]
    pub staging_target_path: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeUnstageVolumeResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodePublishVolumeRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(map = "string, string", tag = "2")]
    pub publish_context: HashMap<String, String>,
    #[prost(string, tag = "3")]
    pub staging_target_path: String,
    #[prost(string, tag = "4")]
    pub target_path: String,
    #[prost(message, optional, tag = "5")]
    pub volume_capability: Option<VolumeCapability>,
    #[prost(bool, tag = "6")]
    pub readonly: bool,
    #[prost(map = "string, string", tag = "7")]
    pub secrets: HashMap<String, String>,
    #[prost(map = "string, string", tag = "8")]
    pub volume_context: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodePublishVolumeResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeUnpublishVolumeRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(string, tag = "2")]
    pub target_path: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeUnpublishVolumeResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeGetInfoRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeGetInfoResponse {
    #[prost(string, tag = "1")]
    pub node_id: String,
    #[prost(int64, tag = "2")]
    pub max_volumes_per_node: i64,
    #[prost(message, optional, tag = "3")]
    pub accessible_topology: Option<Topology>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeGetCapabilitiesRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeGetCapabilitiesResponse {
    #[prost(message, repeated, tag = "1")]
    pub capabilities: Vec<NodeServiceCapability>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeServiceCapability {
    #[prost(message, optional, tag = "1")]
    pub rpc: Option<node_service_capability::Rpc>,
}

pub mod node_service_capability {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Rpc {
        #[prost(enumeration = "rpc::Type", tag = "1")]
        pub r#type: i32,
    }

    pub mod rpc {
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
        )]
        #[repr(i32)]
        pub enum Type {
            Unknown = 0,
            StageUnstageVolume = 1,
            GetVolumeStats = 2,
            ExpandVolume = 3,
        }
    }
}

// =============================================================================
// GROUP CONTROLLER
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GroupControllerGetCapabilitiesRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GroupControllerGetCapabilitiesResponse {
    #[prost(message, repeated, tag = "1")]
    pub capabilities: Vec<GroupControllerServiceCapability>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GroupControllerServiceCapability {
    #[prost(message, optional, tag = "1")]
    pub rpc: Option<group_controller_service_capability::Rpc>,
}

pub mod group_controller_service_capability {
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Rpc {
        #[prost(enumeration = "rpc::Type", tag = "1")]
        pub r#type: i32,
    }

    pub mod rpc {
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
        )]
        #[repr(i32)]
        pub enum Type {
            Unknown = 0,
            CreateDeleteGetVolumeGroupSnapshot = 1,
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateVolumeGroupSnapshotRequest {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, repeated, tag = "2")]
    pub source_volume_ids: Vec<String>,
    #[prost(map = "string, string", tag = "3")]
    pub secrets: HashMap<String, String>,
    #[prost(map = "string, string", tag = "4")]
    pub parameters: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VolumeGroupSnapshot {
    #[prost(string, tag = "1")]
    pub group_snapshot_id: String,
    #[prost(message, repeated, tag = "2")]
    pub snapshots: Vec<Snapshot>,
    #[prost(message, optional, tag = "3")]
    pub creation_time: Option<::prost_types::Timestamp>,
    #[prost(bool, tag = "4")]
    pub ready_to_use: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateVolumeGroupSnapshotResponse {
    #[prost(message, optional, tag = "1")]
    pub group_snapshot: Option<VolumeGroupSnapshot>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteVolumeGroupSnapshotRequest {
    #[prost(string, tag = "1")]
    pub group_snapshot_id: String,
    #[prost(string, repeated, tag = "2")]
    pub snapshot_ids: Vec<String>,
    #[prost(map = "string, string", tag = "3")]
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteVolumeGroupSnapshotResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetVolumeGroupSnapshotRequest {
    #[prost(string, tag = "1")]
    pub group_snapshot_id: String,
    #[prost(string, repeated, tag = "2")]
    pub snapshot_ids: Vec<String>,
    #[prost(map = "string, string", tag = "3")]
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetVolumeGroupSnapshotResponse {
    #[prost(message, optional, tag = "1")]
    pub group_snapshot: Option<VolumeGroupSnapshot>,
}

// =============================================================================
// SERVICES
// =============================================================================

pub mod identity_server {
    use super::*;
    use tonic::codegen::*;

    #[async_trait]
    pub trait Identity: Send + Sync + 'static {
        async fn get_plugin_info(
            &self,
            request: tonic::Request<GetPluginInfoRequest>,
        ) -> std::result::Result<tonic::Response<GetPluginInfoResponse>, tonic::Status>;

        async fn get_plugin_capabilities(
            &self,
            request: tonic::Request<GetPluginCapabilitiesRequest>,
        ) -> std::result::Result<tonic::Response<GetPluginCapabilitiesResponse>, tonic::Status>;

        async fn probe(
            &self,
            request: tonic::Request<ProbeRequest>,
        ) -> std::result::Result<tonic::Response<ProbeResponse>, tonic::Status>;
    }

    #[derive(Debug)]
    pub struct IdentityServer<T: Identity> {
        inner: Arc<T>,
    }

    impl<T: Identity> IdentityServer<T> {
        pub fn new(inner: T) -> Self {
            Self::from_arc(Arc::new(inner))
        }

        pub fn from_arc(inner: Arc<T>) -> Self {
            Self { inner }
        }
    }

    impl<T: Identity> Clone for IdentityServer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<T, B> Service<http::Request<B>> for IdentityServer<T>
    where
        T: Identity,
        B: Body + Send + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = std::convert::Infallible;
        type Future = BoxFuture<Self::Response, Self::Error>;

        fn poll_ready(
            &mut self,
            _cx: &mut Context<'_>,
        ) -> Poll<std::result::Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            match req.uri().path() {
                "/csi.v1.Identity/GetPluginInfo" => crate::unary!(
                    &self.inner,
                    req,
                    Identity,
                    get_plugin_info,
                    GetPluginInfoRequest,
                    GetPluginInfoResponse
                ),
                "/csi.v1.Identity/GetPluginCapabilities" => crate::unary!(
                    &self.inner,
                    req,
                    Identity,
                    get_plugin_capabilities,
                    GetPluginCapabilitiesRequest,
                    GetPluginCapabilitiesResponse
                ),
                "/csi.v1.Identity/Probe" => {
                    crate::unary!(&self.inner, req, Identity, probe, ProbeRequest, ProbeResponse)
                }
                _ => crate::unimplemented_route!(),
            }
        }
    }

    impl<T: Identity> tonic::server::NamedService for IdentityServer<T> {
        const NAME: &'static str = "csi.v1.Identity";
    }
}

pub mod controller_server {
    use super::*;
    use tonic::codegen::*;

    #[async_trait]
    pub trait Controller: Send + Sync + 'static {
        async fn create_volume(
            &self,
            request: tonic::Request<CreateVolumeRequest>,
        ) -> std::result::Result<tonic::Response<CreateVolumeResponse>, tonic::Status>;

        async fn delete_volume(
            &self,
            request: tonic::Request<DeleteVolumeRequest>,
        ) -> std::result::Result<tonic::Response<DeleteVolumeResponse>, tonic::Status>;

        async fn controller_expand_volume(
            &self,
            request: tonic::Request<ControllerExpandVolumeRequest>,
        ) -> std::result::Result<tonic::Response<ControllerExpandVolumeResponse>, tonic::Status>;

        async fn create_snapshot(
            &self,
            request: tonic::Request<CreateSnapshotRequest>,
        ) -> std::result::Result<tonic::Response<CreateSnapshotResponse>, tonic::Status>;

        async fn delete_snapshot(
            &self,
            request: tonic::Request<DeleteSnapshotRequest>,
        ) -> std::result::Result<tonic::Response<DeleteSnapshotResponse>, tonic::Status>;

        async fn validate_volume_capabilities(
            &self,
            request: tonic::Request<ValidateVolumeCapabilitiesRequest>,
        ) -> std::result::Result<tonic::Response<ValidateVolumeCapabilitiesResponse>, tonic::Status>;

        async fn controller_get_capabilities(
            &self,
            request: tonic::Request<ControllerGetCapabilitiesRequest>,
        ) -> std::result::Result<tonic::Response<ControllerGetCapabilitiesResponse>, tonic::Status>;
    }

    #[derive(Debug)]
    pub struct ControllerServer<T: Controller> {
        inner: Arc<T>,
    }

    impl<T: Controller> ControllerServer<T> {
        pub fn new(inner: T) -> Self {
            Self::from_arc(Arc::new(inner))
        }

        pub fn from_arc(inner: Arc<T>) -> Self {
            Self { inner }
        }
    }

    impl<T: Controller> Clone for ControllerServer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<T, B> Service<http::Request<B>> for ControllerServer<T>
    where
        T: Controller,
        B: Body + Send + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = std::convert::Infallible;
        type Future = BoxFuture<Self::Response, Self::Error>;

        fn poll_ready(
            &mut self,
            _cx: &mut Context<'_>,
        ) -> Poll<std::result::Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            match req.uri().path() {
                "/csi.v1.Controller/CreateVolume" => crate::unary!(
                    &self.inner,
                    req,
                    Controller,
                    create_volume,
                    CreateVolumeRequest,
                    CreateVolumeResponse
                ),
                "/csi.v1.Controller/DeleteVolume" => crate::unary!(
                    &self.inner,
                    req,
                    Controller,
                    delete_volume,
                    DeleteVolumeRequest,
                    DeleteVolumeResponse
                ),
                "/csi.v1.Controller/ControllerExpandVolume" => crate::unary!(
                    &self.inner,
                    req,
                    Controller,
                    controller_expand_volume,
                    ControllerExpandVolumeRequest,
                    ControllerExpandVolumeResponse
                ),
                "/csi.v1.Controller/CreateSnapshot" => crate::unary!(
                    &self.inner,
                    req,
                    Controller,
                    create_snapshot,
                    CreateSnapshotRequest,
                    CreateSnapshotResponse
                ),
                "/csi.v1.Controller/DeleteSnapshot" => crate::unary!(
                    &self.inner,
                    req,
                    Controller,
                    delete_snapshot,
                    DeleteSnapshotRequest,
                    DeleteSnapshotResponse
                ),
                "/csi.v1.Controller/ValidateVolumeCapabilities" => crate::unary!(
                    &self.inner,
                    req,
                    Controller,
                    validate_volume_capabilities,
                    ValidateVolumeCapabilitiesRequest,
                    ValidateVolumeCapabilitiesResponse
                ),
                "/csi.v1.Controller/ControllerGetCapabilities" => crate::unary!(
                    &self.inner,
                    req,
                    Controller,
                    controller_get_capabilities,
                    ControllerGetCapabilitiesRequest,
                    ControllerGetCapabilitiesResponse
                ),
                _ => crate::unimplemented_route!(),
            }
        }
    }

    impl<T: Controller> tonic::server::NamedService for ControllerServer<T> {
        const NAME: &'static str = "csi.v1.Controller";
    }
}

pub mod node_server {
    use super::*;
    use tonic::codegen::*;

    #[async_trait]
    pub trait Node: Send + Sync + 'static {
        async fn node_stage_volume(
            &self,
            request: tonic::Request<NodeStageVolumeRequest>,
        ) -> std::result::Result<tonic::Response<NodeStageVolumeResponse>, tonic::Status>;

        async fn node_unstage_volume(
            &self,
            request: tonic::Request<NodeUnstageVolumeRequest>,
        ) -> std::result::Result<tonic::Response<NodeUnstageVolumeResponse>, tonic::Status>;

        async fn node_publish_volume(
            &self,
            request: tonic::Request<NodePublishVolumeRequest>,
        ) -> std::result::Result<tonic::Response<NodePublishVolumeResponse>, tonic::Status>;

        async fn node_unpublish_volume(
            &self,
            request: tonic::Request<NodeUnpublishVolumeRequest>,
        ) -> std::result::Result<tonic::Response<NodeUnpublishVolumeResponse>, tonic::Status>;

        async fn node_get_info(
            &self,
            request: tonic::Request<NodeGetInfoRequest>,
        ) -> std::result::Result<tonic::Response<NodeGetInfoResponse>, tonic::Status>;

        async fn node_get_capabilities(
            &self,
            request: tonic::Request<NodeGetCapabilitiesRequest>,
        ) -> std::result::Result<tonic::Response<NodeGetCapabilitiesResponse>, tonic::Status>;
    }

    #[derive(Debug)]
    pub struct NodeServer<T: Node> {
        inner: Arc<T>,
    }

    impl<T: Node> NodeServer<T> {
        pub fn new(inner: T) -> Self {
            Self::from_arc(Arc::new(inner))
        }

        pub fn from_arc(inner: Arc<T>) -> Self {
            Self { inner }
        }
    }

    impl<T: Node> Clone for NodeServer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<T, B> Service<http::Request<B>> for NodeServer<T>
    where
        T: Node,
        B: Body + Send + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = std::convert::Infallible;
        type Future = BoxFuture<Self::Response, Self::Error>;

        fn poll_ready(
            &mut self,
            _cx: &mut Context<'_>,
        ) -> Poll<std::result::Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            match req.uri().path() {
                "/csi.v1.Node/NodeStageVolume" => crate::unary!(
                    &self.inner,
                    req,
                    Node,
                    node_stage_volume,
                    NodeStageVolumeRequest,
                    NodeStageVolumeResponse
                ),
                "/csi.v1.Node/NodeUnstageVolume" => crate::unary!(
                    &self.inner,
                    req,
                    Node,
                    node_unstage_volume,
                    NodeUnstageVolumeRequest,
                    NodeUnstageVolumeResponse
                ),
                "/csi.v1.Node/NodePublishVolume" => crate::unary!(
                    &self.inner,
                    req,
                    Node,
                    node_publish_volume,
                    NodePublishVolumeRequest,
                    NodePublishVolumeResponse
                ),
                "/csi.v1.Node/NodeUnpublishVolume" => crate::unary!(
                    &self.inner,
                    req,
                    Node,
                    node_unpublish_volume,
                    NodeUnpublishVolumeRequest,
                    NodeUnpublishVolumeResponse
                ),
                "/csi.v1.Node/NodeGetInfo" => crate::unary!(
                    &self.inner,
                    req,
                    Node,
                    node_get_info,
                    NodeGetInfoRequest,
                    NodeGetInfoResponse
                ),
                "/csi.v1.Node/NodeGetCapabilities" => crate::unary!(
                    &self.inner,
                    req,
                    Node,
                    node_get_capabilities,
                    NodeGetCapabilitiesRequest,
                    NodeGetCapabilitiesResponse
                ),
                _ => crate::unimplemented_route!(),
            }
        }
    }

    impl<T: Node> tonic::server::NamedService for NodeServer<T> {
        const NAME: &'static str = "csi.v1.Node";
    }
}

pub mod group_controller_server {
    use super::*;
    use tonic::codegen::*;

    #[async_trait]
    pub trait GroupController: Send + Sync + 'static {
        async fn group_controller_get_capabilities(
            &self,
            request: tonic::Request<GroupControllerGetCapabilitiesRequest>,
        ) -> std::result::Result<
            tonic::Response<GroupControllerGetCapabilitiesResponse>,
            tonic::Status,
        >;

        async fn create_volume_group_snapshot(
            &self,
            request: tonic::Request<CreateVolumeGroupSnapshotRequest>,
        ) -> std::result::Result<tonic::Response<CreateVolumeGroupSnapshotResponse>, tonic::Status>;

        async fn delete_volume_group_snapshot(
            &self,
            request: tonic::Request<DeleteVolumeGroupSnapshotRequest>,
        ) -> std::result::Result<tonic::Response<DeleteVolumeGroupSnapshotResponse>, tonic::Status>;

        async fn get_volume_group_snapshot(
            &self,
            request: tonic::Request<GetVolumeGroupSnapshotRequest>,
        ) -> std::result::Result<tonic::Response<GetVolumeGroupSnapshotResponse>, tonic::Status>;
    }

    #[derive(Debug)]
    pub struct GroupControllerServer<T: GroupController> {
        inner: Arc<T>,
    }

    impl<T: GroupController> GroupControllerServer<T> {
        pub fn new(inner: T) -> Self {
            Self::from_arc(Arc::new(inner))
        }

        pub fn from_arc(inner: Arc<T>) -> Self {
            Self { inner }
        }
    }

    impl<T: GroupController> Clone for GroupControllerServer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<T, B> Service<http::Request<B>> for GroupControllerServer<T>
    where
        T: GroupController,
        B: Body + Send + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = std::convert::Infallible;
        type Future = BoxFuture<Self::Response, Self::Error>;

        fn poll_ready(
            &mut self,
            _cx: &mut Context<'_>,
        ) -> Poll<std::result::Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            match req.uri().path() {
                "/csi.v1.GroupController/GroupControllerGetCapabilities" => crate::unary!(
                    &self.inner,
                    req,
                    GroupController,
                    group_controller_get_capabilities,
                    GroupControllerGetCapabilitiesRequest,
                    GroupControllerGetCapabilitiesResponse
                ),
                "/csi.v1.GroupController/CreateVolumeGroupSnapshot" => crate::unary!(
                    &self.inner,
                    req,
                    GroupController,
                    create_volume_group_snapshot,
                    CreateVolumeGroupSnapshotRequest,
                    CreateVolumeGroupSnapshotResponse
                ),
                "/csi.v1.GroupController/DeleteVolumeGroupSnapshot" => crate::unary!(
                    &self.inner,
                    req,
                    GroupController,
                    delete_volume_group_snapshot,
                    DeleteVolumeGroupSnapshotRequest,
                    DeleteVolumeGroupSnapshotResponse
                ),
                "/csi.v1.GroupController/GetVolumeGroupSnapshot" => crate::unary!(
                    &self.inner,
                    req,
                    GroupController,
                    get_volume_group_snapshot,
                    GetVolumeGroupSnapshotRequest,
                    GetVolumeGroupSnapshotResponse
                ),
                _ => crate::unimplemented_route!(),
            }
        }
    }

    impl<T: GroupController> tonic::server::NamedService for GroupControllerServer<T> {
        const NAME: &'static str = "csi.v1.GroupController";
    }
}
