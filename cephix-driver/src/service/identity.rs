//! CSI Identity service.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::debug;

use cephix_proto::csi::{
    plugin_capability, GetPluginCapabilitiesRequest, GetPluginCapabilitiesResponse,
    GetPluginInfoRequest, GetPluginInfoResponse, PluginCapability, ProbeRequest, ProbeResponse,
};
use cephix_proto::Identity;

use crate::driver::Driver;

/// Identity service implementation.
pub struct IdentityService {
    driver: Arc<Driver>,
}

impl IdentityService {
    pub fn new(driver: Arc<Driver>) -> Self {
        Self { driver }
    }
}

#[tonic::async_trait]
impl Identity for IdentityService {
    async fn get_plugin_info(
        &self,
        _request: Request<GetPluginInfoRequest>,
    ) -> Result<Response<GetPluginInfoResponse>, Status> {
        Ok(Response::new(GetPluginInfoResponse {
            name: self.driver.name.clone(),
            vendor_version: env!("CARGO_PKG_VERSION").to_string(),
            manifest: Default::default(),
        }))
    }

    async fn get_plugin_capabilities(
        &self,
        _request: Request<GetPluginCapabilitiesRequest>,
    ) -> Result<Response<GetPluginCapabilitiesResponse>, Status> {
        let capability = |kind: plugin_capability::service::Type| PluginCapability {
            service: Some(plugin_capability::Service { r#type: kind as i32 }),
        };
        Ok(Response::new(GetPluginCapabilitiesResponse {
            capabilities: vec![
                capability(plugin_capability::service::Type::ControllerService),
                capability(plugin_capability::service::Type::VolumeAccessibilityConstraints),
                capability(plugin_capability::service::Type::GroupControllerService),
            ],
        }))
    }

    async fn probe(
        &self,
        _request: Request<ProbeRequest>,
    ) -> Result<Response<ProbeResponse>, Status> {
        debug!("probe");
        Ok(Response::new(ProbeResponse { ready: Some(true) }))
    }
}
