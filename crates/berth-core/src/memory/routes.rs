use std::{collections::BTreeMap, sync::Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::{
    error::RouteError,
    pipeline::{RouteProvisioner, RouteRequest},
};

/// Route table held in memory.
///
/// Without a custom domain a workload is served on `<name>-<tenant>.<suffix>`.
#[derive(Debug)]
pub struct MemoryRoutes {
    suffix: String,
    routes: Mutex<BTreeMap<(String, String), RouteRequest>>,
}

impl MemoryRoutes {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            routes: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn get(&self, ns: &str, name: &str) -> Option<RouteRequest> {
        let routes = self.routes.lock().ok()?;
        routes.get(&(ns.to_string(), name.to_string())).cloned()
    }
}

#[async_trait]
impl RouteProvisioner for MemoryRoutes {
    async fn ensure_route(&self, ns: &str, request: &RouteRequest) -> Result<String, RouteError> {
        let host = match &request.domain {
            Some(domain) => domain.clone(),
            None => format!("{}-{}.{}", request.name, request.tenant_id, self.suffix),
        };
        let mut routes = self.routes.lock().map_err(|_| RouteError::Failed {
            name: request.name.clone(),
            reason: "route table lock poisoned".into(),
        })?;
        routes.insert((ns.to_string(), request.name.clone()), request.clone());
        debug!(%host, port = request.port.number, "route ensured");
        Ok(format!("https://{host}"))
    }
}
