use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    Env, LABEL_NAME, Labels,
    error::{ModelError, ModelResult},
    spec::{PortSpec, Replicas, RouteSpec},
};

/// Declarative description of a container to run.
///
/// `ContainerSpec` is immutable input to the provisioning pipeline. It describes *what* should
/// be running (`image`, `command`, `env`, `ports`, resources, `replicas`) and *how* the caller
/// wants to interact with it once it is (`interactive`, `terminal`, `detach`).
///
/// `force` controls what happens when a workload with the same name already exists: without it
/// the run is a no-op, with it the existing workload is deleted and recreated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    /// Workload name, a DNS label unique within the tenant namespace.
    pub name: String,
    /// Image reference (e.g. `nginx:1.27`, `ghcr.io/acme/api:sha-abc`).
    pub image: String,
    /// Entrypoint override. `None` keeps the image default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// Environment variables in declaration order.
    #[serde(default, skip_serializing_if = "Env::is_empty")]
    pub env: Env,
    /// Ports exposed by the container.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortSpec>,
    /// CPU quantity (e.g. `"500m"`), applied as both request and limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    /// Memory quantity (e.g. `"256Mi"`), applied as both request and limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default)]
    pub replicas: Replicas,
    /// Keep stdin open and forward local input to the container.
    #[serde(default)]
    pub interactive: bool,
    /// Allocate a terminal for the container process.
    #[serde(default)]
    pub terminal: bool,
    /// Return as soon as the workload is ready instead of attaching or following logs.
    #[serde(default)]
    pub detach: bool,
    /// Delete and recreate an existing workload with the same name.
    #[serde(default)]
    pub force: bool,
    /// Optional public routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<RouteSpec>,
}

impl ContainerSpec {
    /// Minimal spec: one replica, no ports, not interactive.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            command: None,
            env: Env::default(),
            ports: Vec::new(),
            cpu: None,
            memory: None,
            replicas: Replicas::default(),
            interactive: false,
            terminal: false,
            detach: false,
            force: false,
            route: None,
        }
    }

    /// Label selector that matches this container's workload and pods.
    pub fn selector(&self) -> Labels {
        let mut labels = Labels::new();
        labels.insert(LABEL_NAME, self.name.as_str());
        labels
    }

    /// Check the container spec before anything is sent to the cluster.
    ///
    /// Rules:
    /// - `name` is a DNS label;
    /// - `image` is not blank;
    /// - env keys are uppercase identifiers;
    /// - ports are valid and their names unique;
    /// - replica range is ordered;
    /// - a route names an existing port, or there is at least one port to default to.
    pub fn validate(&self) -> ModelResult<()> {
        if !is_dns_label(&self.name) {
            return Err(ModelError::InvalidName(self.name.clone()));
        }
        if self.image.trim().is_empty() {
            return Err(ModelError::Invalid("image is empty".into()));
        }
        if let Some(kv) = self.env.first_invalid() {
            return Err(ModelError::InvalidEnv(kv.to_string()));
        }

        let mut seen = HashSet::new();
        for port in &self.ports {
            port.validate()?;
            if !seen.insert(port.name.as_str()) {
                return Err(ModelError::InvalidPort(format!(
                    "duplicate port name '{}'",
                    port.name
                )));
            }
        }
        self.replicas.validate()?;

        if let Some(route) = &self.route {
            match &route.port {
                Some(name) if !seen.contains(name.as_str()) => {
                    return Err(ModelError::InvalidPort(format!(
                        "route refers to unknown port '{name}'"
                    )));
                }
                None if self.ports.is_empty() => {
                    return Err(ModelError::Invalid(
                        "route requires at least one port".into(),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Port a route should target, if routing was requested.
    pub fn route_port(&self) -> Option<&PortSpec> {
        let route = self.route.as_ref()?;
        match &route.port {
            Some(name) => self.ports.iter().find(|p| &p.name == name),
            None => self.ports.first(),
        }
    }
}

fn is_dns_label(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 63
        && !s.starts_with('-')
        && !s.ends_with('-')
        && s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}
