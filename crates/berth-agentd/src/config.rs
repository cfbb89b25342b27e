use std::{net::SocketAddr, path::Path};

use anyhow::Context;
use berth_core::{memory::MemoryOptions, pipeline::PipelineConfig};
use berth_observe::LoggerConfig;
use serde::{Deserialize, Serialize};

pub const CONFIG_ENV: &str = "BERTH_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub logger: LoggerConfig,
    pub pipeline: PipelineConfig,
    pub listen: SocketAddr,
    /// Suffix of generated hostnames: `<name>-<tenant>.<suffix>`.
    pub ingress_suffix: String,
    pub memory_cluster: MemoryOptions,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            logger: LoggerConfig::default(),
            pipeline: PipelineConfig::default(),
            listen: SocketAddr::from(([127, 0, 0, 1], 7070)),
            ingress_suffix: "apps.berth.local".to_string(),
            memory_cluster: MemoryOptions::default(),
        }
    }
}

impl AgentConfig {
    /// Read the file named by `BERTH_CONFIG`; defaults when the variable is unset.
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
