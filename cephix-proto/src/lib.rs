//! # Cephix Proto
//!
//! Message types and gRPC service definitions for the Cephix CSI driver:
//! the CSI 1.x Identity, Controller, Node and GroupController services plus
//! the CSI-Addons services (replication, reclaim-space, network-fence,
//! encryption-key-rotation, volume-group).
//!
//! The messages are prost-derived and the server glue is maintained by hand
//! in the same shape `tonic-build` emits, so building the workspace does
//! not require `protoc`. When a field is added here, keep the tag numbers
//! aligned with the upstream proto definitions.

/// Dispatch one unary RPC inside a `Service::call` match arm, mirroring the
/// code `tonic-build` generates for each method.
macro_rules! unary {
    ($inner:expr, $req:ident, $trait_:ident, $method:ident, $request:ty, $response:ty) => {{
        struct Svc<T: $trait_>(std::sync::Arc<T>);
        impl<T: $trait_> tonic::server::UnaryService<$request> for Svc<T> {
            type Response = $response;
            type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
            fn call(&mut self, request: tonic::Request<$request>) -> Self::Future {
                let inner = std::sync::Arc::clone(&self.0);
                Box::pin(async move { inner.$method(request).await })
            }
        }
        let inner = std::sync::Arc::clone($inner);
        Box::pin(async move {
            let mut grpc = tonic::server::Grpc::new(tonic::codec::ProstCodec::default());
            let res = grpc.unary(Svc(inner), $req).await;
            Ok(res)
        })
    }};
}

/// The catch-all arm of a `Service::call` match: gRPC status 12
/// (unimplemented).
macro_rules! unimplemented_route {
    () => {
        Box::pin(async move {
            Ok(http::Response::builder()
                .status(200)
                .header("grpc-status", "12")
                .header("content-type", "application/grpc")
                .body(empty_body())
                .unwrap())
        })
    };
}

pub(crate) use unary;
pub(crate) use unimplemented_route;

pub mod addons;
pub mod csi;

// Service re-exports, one level up for the daemon's convenience.
pub use addons::encryption_key_rotation_server::{
    EncryptionKeyRotation, EncryptionKeyRotationServer,
};
pub use addons::network_fence_server::{NetworkFence, NetworkFenceServer};
pub use addons::reclaim_space_controller_server::{
    ReclaimSpaceController, ReclaimSpaceControllerServer,
};
pub use addons::reclaim_space_node_server::{ReclaimSpaceNode, ReclaimSpaceNodeServer};
pub use addons::replication_server::{Replication, ReplicationServer};
pub use addons::volume_group_controller_server::{
    VolumeGroupController, VolumeGroupControllerServer,
};
pub use csi::controller_server::{Controller, ControllerServer};
pub use csi::group_controller_server::{GroupController, GroupControllerServer};
pub use csi::identity_server::{Identity, IdentityServer};
pub use csi::node_server::{Node, NodeServer};
