//! Target workload description built from a container spec.
mod security;
pub use security::{Capability, SecurityPosture};

use berth_model::{
    ContainerSpec, Env, LABEL_MANAGED_BY, LABEL_NAME, Labels, MANAGED_BY_VALUE, PortSpec,
};

/// Restart behaviour of the workload's containers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RestartPolicy {
    #[default]
    Always,
    OnFailure,
    Never,
}

/// CPU and memory quantities, kept as the substrate's quantity strings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Quantities {
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resources {
    pub requests: Quantities,
    pub limits: Quantities,
}

/// Everything the cluster needs to create a workload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadDescription {
    pub name: String,
    pub image: String,
    pub command: Option<Vec<String>>,
    pub env: Env,
    pub ports: Vec<PortSpec>,
    pub resources: Resources,
    pub security: SecurityPosture,
    pub restart: RestartPolicy,
    /// Labels put on the workload and its pods.
    pub labels: Labels,
    /// Selector matching the pods of this workload.
    pub selector: Labels,
    pub stdin: bool,
    pub tty: bool,
    /// Initial desired replica count.
    pub replicas: u32,
    /// Upper bound of a replica range. Recorded, not enforced.
    pub max_replicas: u32,
}

impl WorkloadDescription {
    /// Requested quantities are used as both request and limit.
    pub fn from_spec(spec: &ContainerSpec) -> Self {
        let quantities = Quantities {
            cpu: spec.cpu.clone(),
            memory: spec.memory.clone(),
        };

        let selector = spec.selector();
        let mut labels = selector.clone();
        labels.insert(LABEL_MANAGED_BY, MANAGED_BY_VALUE);

        Self {
            name: spec.name.clone(),
            image: spec.image.clone(),
            command: spec.command.clone(),
            env: spec.env.clone(),
            ports: spec.ports.clone(),
            resources: Resources {
                requests: quantities.clone(),
                limits: quantities,
            },
            security: SecurityPosture::hardened(),
            restart: RestartPolicy::Always,
            labels,
            selector,
            stdin: spec.interactive,
            tty: spec.terminal,
            replicas: spec.replicas.initial(),
            max_replicas: spec.replicas.max(),
        }
    }

    pub fn name_label(&self) -> Option<&str> {
        self.labels.get(LABEL_NAME)
    }
}
