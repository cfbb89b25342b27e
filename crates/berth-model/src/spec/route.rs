use serde::{Deserialize, Serialize};

/// Public routing requested for a container.
///
/// When present, the pipeline asks the routing collaborator for a route once the workload is
/// ready. A custom `domain` is only routed after its ownership challenge is visible in DNS.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    /// Name of the container port to publish. Defaults to the first declared port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Custom domain to serve the route on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}
