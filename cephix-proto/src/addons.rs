//! CSI-Addons message types and services: volume replication, reclaim
//! space, network fencing, encryption key rotation and volume groups.

use std::collections::HashMap;

// =============================================================================
// REPLICATION
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EnableVolumeReplicationRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(map = "string, string", tag = "2")]
    pub parameters: HashMap<String, String>,
    #[prost(map = "string, string", tag = "3")]
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EnableVolumeReplicationResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DisableVolumeReplicationRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(map = "string, string", tag = "2")]
    pub parameters: HashMap<String, String>,
    #[prost(map = "string, string", tag = "3")]
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DisableVolumeReplicationResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PromoteVolumeRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(bool, tag = "2")]
    pub force: bool,
    #[prost(map = "string, string", tag = "3")]
    pub parameters: HashMap<String, String>,
    #[prost(map = "string, string", tag = "4")]
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PromoteVolumeResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DemoteVolumeRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(map = "string, string", tag = "2")]
    pub parameters: HashMap<String, String>,
    #[prost(map = "string, string", tag = "3")]
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DemoteVolumeResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResyncVolumeRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(map = "string, string", tag = "2")]
    pub parameters: HashMap<String, String>,
    #[prost(map = "string, string", tag = "3")]
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResyncVolumeResponse {
    #[prost(bool, tag = "1")]
    pub ready: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetVolumeReplicationInfoRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(map = "string, string", tag = "2")]
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetVolumeReplicationInfoResponse {
    #[prost(message, optional, tag = "1")]
    pub last_sync_time: Option<::prost_types::Timestamp>,
    #[prost(message, optional, tag = "2")]
    pub last_sync_duration: Option<::prost_types::Duration>,
    #[prost(uint64, tag = "3")]
    pub last_sync_bytes: u64,
}

// =============================================================================
// RECLAIM SPACE
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerReclaimSpaceRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(map = "string, string", tag = "2")]
    pub parameters: HashMap<String, String>,
    #[prost(map = "string, string", tag = "3")]
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StorageConsumption {
    #[prost(int64, tag = "1")]
    pub usage_bytes: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ControllerReclaimSpaceResponse {
    #[prost(message, optional, tag = "1")]
    pub pre_usage: Option<StorageConsumption>,
    #[prost(message, optional, tag = "2")]
    pub post_usage: Option<StorageConsumption>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeReclaimSpaceRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(string, tag = "2")]
    pub volume_path: String,
    #[prost(string, tag = "3")]
    pub staging_target_path: String,
    #[prost(message, optional, tag = "4")]
    pub volume_capability: Option<crate::csi::VolumeCapability>,
    #[prost(map = "string, string", tag = "5")]
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeReclaimSpaceResponse {}

// =============================================================================
// NETWORK FENCE
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FenceClusterNetworkRequest {
    #[prost(map = "string, string", tag = "1")]
    pub parameters: HashMap<String, String>,
    #[prost(map = "string, string", tag = "2")]
    pub secrets: HashMap<String, String>,
    #[prost(string, repeated, tag = "3")]
    pub cidrs: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FenceClusterNetworkResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UnfenceClusterNetworkRequest {
    #[prost(map = "string, string", tag = "1")]
    pub parameters: HashMap<String, String>,
    #[prost(map = "string, string", tag = "2")]
    pub secrets: HashMap<String, String>,
    #[prost(string, repeated, tag = "3")]
    pub cidrs: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UnfenceClusterNetworkResponse {}

// =============================================================================
// ENCRYPTION KEY ROTATION
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EncryptionKeyRotateRequest {
    #[prost(string, tag = "1")]
    pub volume_id: String,
    #[prost(map = "string, string", tag = "2")]
    pub parameters: HashMap<String, String>,
    #[prost(map = "string, string", tag = "3")]
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EncryptionKeyRotateResponse {}

// =============================================================================
// VOLUME GROUP
// =============================================================================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VolumeGroup {
    #[prost(string, tag = "1")]
    pub volume_group_id: String,
    #[prost(string, repeated, tag = "2")]
    pub volume_ids: Vec<String>,
    #[prost(map = "string, string", tag = "3")]
    pub volume_group_context: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateVolumeGroupRequest {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, repeated, tag = "2")]
    pub volume_ids: Vec<String>,
    #[prost(map = "string, string", tag = "3")]
    pub parameters: HashMap<String, String>,
    #[prost(map = "string, string", tag = "4")]
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateVolumeGroupResponse {
    #[prost(message, optional, tag = "1")]
    pub volume_group: Option<VolumeGroup>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteVolumeGroupRequest {
    #[prost(string, tag = "1")]
    pub volume_group_id: String,
    #[prost(map = "string, string", tag = "2")]
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteVolumeGroupResponse {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModifyVolumeGroupMembershipRequest {
    #[prost(string, tag = "1")]
    pub volume_group_id: String,
    #[prost(string, repeated, tag = "2")]
    pub volume_ids: Vec<String>,
    #[prost(map = "string, string", tag = "3")]
    pub parameters: HashMap<String, String>,
    #[prost(map = "string, string", tag = "4")]
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModifyVolumeGroupMembershipResponse {
    #[prost(message, optional, tag = "1")]
    pub volume_group: Option<VolumeGroup>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetVolumeGroupRequest {
    #[prost(string, tag = "1")]
    pub volume_group_id: String,
    #[prost(map = "string, string", tag = "2")]
    pub secrets: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetVolumeGroupResponse {
    #[prost(message, optional, tag = "1")]
    pub volume_group: Option<VolumeGroup>,
}

// =============================================================================
// SERVICES
// =============================================================================

pub mod replication_server {
    use super::*;
    use tonic::codegen::*;

    #[async_trait]
    pub trait Replication: Send + Sync + 'static {
        async fn enable_volume_replication(
            &self,
            request: tonic::Request<EnableVolumeReplicationRequest>,
        ) -> std::result::Result<tonic::Response<EnableVolumeReplicationResponse>, tonic::Status>;

        async fn disable_volume_replication(
            &self,
            request: tonic::Request<DisableVolumeReplicationRequest>,
        ) -> std::result::Result<tonic::Response<DisableVolumeReplicationResponse>, tonic::Status>;

        async fn promote_volume(
            &self,
            request: tonic::Request<PromoteVolumeRequest>,
        ) -> std::result::Result<tonic::Response<PromoteVolumeResponse>, tonic::Status>;

        async fn demote_volume(
            &self,
            request: tonic::Request<DemoteVolumeRequest>,
        ) -> std::result::Result<tonic::Response<DemoteVolumeResponse>, tonic::Status>;

        async fn resync_volume(
            &self,
            request: tonic::Request<ResyncVolumeRequest>,
        ) -> std::result::Result<tonic::Response<ResyncVolumeResponse>, tonic::Status>;

        async fn get_volume_replication_info(
            &self,
            request: tonic::Request<GetVolumeReplicationInfoRequest>,
        ) -> std::result::Result<tonic::Response<GetVolumeReplicationInfoResponse>, tonic::Status>;
    }

    #[derive(Debug)]
    pub struct ReplicationServer<T: Replication> {
        inner: Arc<T>,
    }

    impl<T: Replication> ReplicationServer<T> {
        pub fn new(inner: T) -> Self {
            Self::from_arc(Arc::new(inner))
        }

        pub fn from_arc(inner: Arc<T>) -> Self {
            Self { inner }
        }
    }

    impl<T: Replication> Clone for ReplicationServer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<T, B> Service<http::Request<B>> for ReplicationServer<T>
    where
        T: Replication,
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
                "/replication.Controller/EnableVolumeReplication" => crate::unary!(
                    &self.inner,
                    req,
                    Replication,
                    enable_volume_replication,
                    EnableVolumeReplicationRequest,
                    EnableVolumeReplicationResponse
                ),
                "/replication.Controller/DisableVolumeReplication" => crate::unary!(
                    &self.inner,
                    req,
                    Replication,
                    disable_volume_replication,
                    DisableVolumeReplicationRequest,
                    DisableVolumeReplicationResponse
                ),
                "/replication.Controller/PromoteVolume" => crate::unary!(
                    &self.inner,
                    req,
                    Replication,
                    promote_volume,
                    PromoteVolumeRequest,
                    PromoteVolumeResponse
                ),
                "/replication.Controller/DemoteVolume" => crate::unary!(
                    &self.inner,
                    req,
                    Replication,
                    demote_volume,
                    DemoteVolumeRequest,
                    DemoteVolumeResponse
                ),
                "/replication.Controller/ResyncVolume" => crate::unary!(
                    &self.inner,
                    req,
                    Replication,
                    resync_volume,
                    ResyncVolumeRequest,
                    ResyncVolumeResponse
                ),
                "/replication.Controller/GetVolumeReplicationInfo" => crate::unary!(
                    &self.inner,
                    req,
                    Replication,
                    get_volume_replication_info,
                    GetVolumeReplicationInfoRequest,
                    GetVolumeReplicationInfoResponse
                ),
                _ => crate::unimplemented_route!(),
            }
        }
    }

    impl<T: Replication> tonic::server::NamedService for ReplicationServer<T> {
        const NAME: &'static str = "replication.Controller";
    }
}

pub mod reclaim_space_controller_server {
    use super::*;
    use tonic::codegen::*;

    #[async_trait]
    pub trait ReclaimSpaceController: Send + Sync + 'static {
        async fn controller_reclaim_space(
            &self,
            request: tonic::Request<ControllerReclaimSpaceRequest>,
        ) -> std::result::Result<tonic::Response<ControllerReclaimSpaceResponse>, tonic::Status>;
    }

    #[derive(Debug)]
    pub struct ReclaimSpaceControllerServer<T: ReclaimSpaceController> {
        inner: Arc<T>,
    }

    impl<T: ReclaimSpaceController> ReclaimSpaceControllerServer<T> {
        pub fn new(inner: T) -> Self {
            Self::from_arc(Arc::new(inner))
        }

        pub fn from_arc(inner: Arc<T>) -> Self {
            Self { inner }
        }
    }

    impl<T: ReclaimSpaceController> Clone for ReclaimSpaceControllerServer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<T, B> Service<http::Request<B>> for ReclaimSpaceControllerServer<T>
    where
        T: ReclaimSpaceController,
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
                "/reclaimspace.ControllerReclaimSpace/ControllerReclaimSpace" => crate::unary!(
                    &self.inner,
                    req,
                    ReclaimSpaceController,
                    controller_reclaim_space,
                    ControllerReclaimSpaceRequest,
                    ControllerReclaimSpaceResponse
                ),
                _ => crate::unimplemented_route!(),
            }
        }
    }

    impl<T: ReclaimSpaceController> tonic::server::NamedService for ReclaimSpaceControllerServer<T> {
        const NAME: &'static str = "reclaimspace.ControllerReclaimSpace";
    }
}

pub mod reclaim_space_node_server {
    use super::*;
    use tonic::codegen::*;

    #[async_trait]
    pub trait ReclaimSpaceNode: Send + Sync + 'static {
        async fn node_reclaim_space(
            &self,
            request: tonic::Request<NodeReclaimSpaceRequest>,
        ) -> std::result::Result<tonic::Response<NodeReclaimSpaceResponse>, tonic::Status>;
    }

    #[derive(Debug)]
    pub struct ReclaimSpaceNodeServer<T: ReclaimSpaceNode> {
        inner: Arc<T>,
    }

    impl<T: ReclaimSpaceNode> ReclaimSpaceNodeServer<T> {
        pub fn new(inner: T) -> Self {
            Self::from_arc(Arc::new(inner))
        }

        pub fn from_arc(inner: Arc<T>) -> Self {
            Self { inner }
        }
    }

    impl<T: ReclaimSpaceNode> Clone for ReclaimSpaceNodeServer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<T, B> Service<http::Request<B>> for ReclaimSpaceNodeServer<T>
    where
        T: ReclaimSpaceNode,
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
                "/reclaimspace.NodeReclaimSpace/NodeReclaimSpace" => crate::unary!(
                    &self.inner,
                    req,
                    ReclaimSpaceNode,
                    node_reclaim_space,
                    NodeReclaimSpaceRequest,
                    NodeReclaimSpaceResponse
                ),
                _ => crate::unimplemented_route!(),
            }
        }
    }

    impl<T: ReclaimSpaceNode> tonic::server::NamedService for ReclaimSpaceNodeServer<T> {
        const NAME: &'static str = "reclaimspace.NodeReclaimSpace";
    }
}

pub mod network_fence_server {
    use super::*;
    use tonic::codegen::*;

    #[async_trait]
    pub trait NetworkFence: Send + Sync + 'static {
        async fn fence_cluster_network(
            &self,
            request: tonic::Request<FenceClusterNetworkRequest>,
        ) -> std::result::Result<tonic::Response<FenceClusterNetworkResponse>, tonic::Status>;

        async fn unfence_cluster_network(
            &self,
            request: tonic::Request<UnfenceClusterNetworkRequest>,
        ) -> std::result::Result<tonic::Response<UnfenceClusterNetworkResponse>, tonic::Status>;
    }

    #[derive(Debug)]
    pub struct NetworkFenceServer<T: NetworkFence> {
        inner: Arc<T>,
    }

    impl<T: NetworkFence> NetworkFenceServer<T> {
        pub fn new(inner: T) -> Self {
            Self::from_arc(Arc::new(inner))
        }

        pub fn from_arc(inner: Arc<T>) -> Self {
            Self { inner }
        }
    }

    impl<T: NetworkFence> Clone for NetworkFenceServer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<T, B> Service<http::Request<B>> for NetworkFenceServer<T>
    where
        T: NetworkFence,
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
                "/fence.FenceController/FenceClusterNetwork" => crate::unary!(
                    &self.inner,
                    req,
                    NetworkFence,
                    fence_cluster_network,
                    FenceClusterNetworkRequest,
                    FenceClusterNetworkResponse
                ),
                "/fence.FenceController/UnfenceClusterNetwork" => crate::unary!(
                    &self.inner,
                    req,
                    NetworkFence,
                    unfence_cluster_network,
                    UnfenceClusterNetworkRequest,
                    UnfenceClusterNetworkResponse
                ),
                _ => crate::unimplemented_route!(),
            }
        }
    }

    impl<T: NetworkFence> tonic::server::NamedService for NetworkFenceServer<T> {
        const NAME: &'static str = "fence.FenceController";
    }
}

pub mod encryption_key_rotation_server {
    use super::*;
    use tonic::codegen::*;

    #[async_trait]
    pub trait EncryptionKeyRotation: Send + Sync + 'static {
        async fn encryption_key_rotate(
            &self,
            request: tonic::Request<EncryptionKeyRotateRequest>,
        ) -> std::result::Result<tonic::Response<EncryptionKeyRotateResponse>, tonic::Status>;
    }

    #[derive(Debug)]
    pub struct EncryptionKeyRotationServer<T: EncryptionKeyRotation> {
        inner: Arc<T>,
    }

    impl<T: EncryptionKeyRotation> EncryptionKeyRotationServer<T> {
        pub fn new(inner: T) -> Self {
            Self::from_arc(Arc::new(inner))
        }

        pub fn from_arc(inner: Arc<T>) -> Self {
            Self { inner }
        }
    }

    impl<T: EncryptionKeyRotation> Clone for EncryptionKeyRotationServer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<T, B> Service<http::Request<B>> for EncryptionKeyRotationServer<T>
    where
        T: EncryptionKeyRotation,
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
                "/encryptionkeyrotation.EncryptionKeyRotationController/EncryptionKeyRotate" => {
                    crate::unary!(
                        &self.inner,
                        req,
                        EncryptionKeyRotation,
                        encryption_key_rotate,
                        EncryptionKeyRotateRequest,
                        EncryptionKeyRotateResponse
                    )
                }
                _ => crate::unimplemented_route!(),
            }
        }
    }

    impl<T: EncryptionKeyRotation> tonic::server::NamedService for EncryptionKeyRotationServer<T> {
        const NAME: &'static str = "encryptionkeyrotation.EncryptionKeyRotationController";
    }
}

pub mod volume_group_controller_server {
    use super::*;
    use tonic::codegen::*;

    #[async_trait]
    pub trait VolumeGroupController: Send + Sync + 'static {
        async fn create_volume_group(
            &self,
            request: tonic::Request<CreateVolumeGroupRequest>,
        ) -> std::result::Result<tonic::Response<CreateVolumeGroupResponse>, tonic::Status>;

        async fn delete_volume_group(
            &self,
            request: tonic::Request<DeleteVolumeGroupRequest>,
        ) -> std::result::Result<tonic::Response<DeleteVolumeGroupResponse>, tonic::Status>;

        async fn modify_volume_group_membership(
            &self,
            request: tonic::Request<ModifyVolumeGroupMembershipRequest>,
        ) -> std::result::Result<tonic::Response<ModifyVolumeGroupMembershipResponse>, tonic::Status>;

        async fn get_volume_group(
            &self,
            request: tonic::Request<GetVolumeGroupRequest>,
        ) -> std::result::Result<tonic::Response<GetVolumeGroupResponse>, tonic::Status>;
    }

    #[derive(Debug)]
    pub struct VolumeGroupControllerServer<T: VolumeGroupController> {
        inner: Arc<T>,
    }

    impl<T: VolumeGroupController> VolumeGroupControllerServer<T> {
        pub fn new(inner: T) -> Self {
            Self::from_arc(Arc::new(inner))
        }

        pub fn from_arc(inner: Arc<T>) -> Self {
            Self { inner }
        }
    }

    impl<T: VolumeGroupController> Clone for VolumeGroupControllerServer<T> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
            }
        }
    }

    impl<T, B> Service<http::Request<B>> for VolumeGroupControllerServer<T>
    where
        T: VolumeGroupController,
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
                "/volumegroup.Controller/CreateVolumeGroup" => crate::unary!(
                    &self.inner,
                    req,
                    VolumeGroupController,
                    create_volume_group,
                    CreateVolumeGroupRequest,
                    CreateVolumeGroupResponse
                ),
                "/volumegroup.Controller/DeleteVolumeGroup" => crate::unary!(
                    &self.inner,
                    req,
                    VolumeGroupController,
                    delete_volume_group,
                    DeleteVolumeGroupRequest,
                    DeleteVolumeGroupResponse
                ),
                "/volumegroup.Controller/ModifyVolumeGroupMembership" => crate::unary!(
                    &self.inner,
                    req,
                    VolumeGroupController,
                    modify_volume_group_membership,
                    ModifyVolumeGroupMembershipRequest,
                    ModifyVolumeGroupMembershipResponse
                ),
                "/volumegroup.Controller/GetVolumeGroup" => crate::unary!(
                    &self.inner,
                    req,
                    VolumeGroupController,
                    get_volume_group,
                    GetVolumeGroupRequest,
                    GetVolumeGroupResponse
                ),
                _ => crate::unimplemented_route!(),
            }
        }
    }

    impl<T: VolumeGroupController> tonic::server::NamedService for VolumeGroupControllerServer<T> {
        const NAME: &'static str = "volumegroup.Controller";
    }
}
