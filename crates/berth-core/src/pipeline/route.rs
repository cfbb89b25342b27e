use async_trait::async_trait;
use berth_model::PortSpec;

use crate::error::RouteError;

/// Public route requested for a ready workload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteRequest {
    pub name: String,
    pub tenant_id: String,
    pub port: PortSpec,
    /// Verified custom domain, if any.
    pub domain: Option<String>,
}

/// Routing collaborator.
#[async_trait]
pub trait RouteProvisioner: Send + Sync + 'static {
    /// Create or update the route and return its public URL.
    async fn ensure_route(&self, ns: &str, request: &RouteRequest) -> Result<String, RouteError>;
}
