use async_trait::async_trait;
use berth_model::{ContainerSpec, SessionFrame, Tenant};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{ApiError, WireStream};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunRequest {
    pub tenant: Tenant,
    pub spec: ContainerSpec,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttachRequest {
    pub tenant: Tenant,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecRequest {
    pub tenant: Tenant,
    pub command: Vec<String>,
}

/// First line of a session body. Every following line is a client [`SessionFrame`].
///
/// Sessions always forward stdin; `terminal` asks for a remote tty, raw mode on the client and
/// forwarding of `signal` frames.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum SessionRequest {
    /// Provision an interactive container and attach to it.
    Run { tenant: Tenant, spec: ContainerSpec },
    Attach {
        tenant: Tenant,
        name: String,
        #[serde(default)]
        terminal: bool,
    },
    Exec {
        tenant: Tenant,
        name: String,
        command: Vec<String>,
        #[serde(default)]
        terminal: bool,
    },
}

/// Backend behind [`crate::HttpApi`].
///
/// Implement it directly to add authentication or admission checks; [`crate::PipelineAdapter`]
/// forwards straight to a pipeline.
#[async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    /// Provision a container. The returned stream stops when `cancel` fires.
    async fn run(&self, req: RunRequest, cancel: CancellationToken)
    -> Result<WireStream, ApiError>;

    /// Follow the main process of an existing container.
    async fn attach(
        &self,
        name: String,
        req: AttachRequest,
        cancel: CancellationToken,
    ) -> Result<WireStream, ApiError>;

    /// Run a command inside an existing container.
    async fn exec(
        &self,
        name: String,
        req: ExecRequest,
        cancel: CancellationToken,
    ) -> Result<WireStream, ApiError>;

    /// Run an interactive operation whose local end is driven by `frames`.
    async fn session(
        &self,
        req: SessionRequest,
        frames: mpsc::Receiver<SessionFrame>,
        cancel: CancellationToken,
    ) -> Result<WireStream, ApiError>;

    /// Metrics in the Prometheus text format, with their content type.
    async fn metrics(&self) -> Result<(Vec<u8>, String), ApiError>;
}
