use async_trait::async_trait;
use berth_core::{pipeline::Pipeline, progress::ProgressStream};
use berth_prometheus::PrometheusMetrics;
use berth_model::SessionFrame;
use berth_session::{LocalIo, TunnelOptions};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    ApiError, ApiHandler, AttachRequest, ExecRequest, RunRequest, SessionRequest, WireStream,
    wire::merge,
};

/// [`ApiHandler`] that drives a [`Pipeline`] directly.
pub struct PipelineAdapter {
    pipeline: Pipeline,
    metrics: Option<PrometheusMetrics>,
}

impl PipelineAdapter {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            metrics: None,
        }
    }

    /// Serve `GET /metrics` from `metrics`. The same backend should be attached to the pipeline.
    pub fn with_metrics(mut self, metrics: PrometheusMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Local end fed by `inbound` client frames; session output becomes frames on the stream.
    fn start(
        cancel: CancellationToken,
        inbound: mpsc::Receiver<SessionFrame>,
        op: impl FnOnce(LocalIo, &CancellationToken) -> ProgressStream,
    ) -> WireStream {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let progress = op(LocalIo::from_frames(inbound, outbound_tx), &cancel);
        merge(progress, outbound_rx, cancel)
    }

    /// Output-only local end: stdin is closed up front.
    fn start_output_only(
        cancel: CancellationToken,
        op: impl FnOnce(LocalIo, &CancellationToken) -> ProgressStream,
    ) -> WireStream {
        let (inbound_tx, inbound_rx) = mpsc::channel(1);
        drop(inbound_tx);
        Self::start(cancel, inbound_rx, op)
    }
}

fn session_options(terminal: bool) -> TunnelOptions {
    TunnelOptions {
        interactive: true,
        terminal,
    }
}

const OUTPUT_ONLY: TunnelOptions = TunnelOptions {
    interactive: false,
    terminal: false,
};

#[async_trait]
impl ApiHandler for PipelineAdapter {
    async fn run(
        &self,
        req: RunRequest,
        cancel: CancellationToken,
    ) -> Result<WireStream, ApiError> {
        if req.spec.interactive || req.spec.terminal {
            return Err(ApiError::InvalidRequest(
                "interactive runs need a session, use POST /api/v1/sessions".into(),
            ));
        }
        debug!(name = %req.spec.name, namespace = %req.tenant.namespace, "run requested");

        Ok(Self::start_output_only(cancel, |local, cancel| {
            self.pipeline.run(req.tenant, req.spec, local, cancel)
        }))
    }

    async fn attach(
        &self,
        name: String,
        req: AttachRequest,
        cancel: CancellationToken,
    ) -> Result<WireStream, ApiError> {
        Ok(Self::start_output_only(cancel, |local, cancel| {
            self.pipeline.attach(req.tenant, name, OUTPUT_ONLY, local, cancel)
        }))
    }

    async fn exec(
        &self,
        name: String,
        req: ExecRequest,
        cancel: CancellationToken,
    ) -> Result<WireStream, ApiError> {
        if req.command.is_empty() {
            return Err(ApiError::InvalidRequest("command cannot be empty".into()));
        }

        Ok(Self::start_output_only(cancel, |local, cancel| {
            self.pipeline
                .exec(req.tenant, name, req.command, OUTPUT_ONLY, local, cancel)
        }))
    }

    async fn session(
        &self,
        req: SessionRequest,
        frames: mpsc::Receiver<SessionFrame>,
        cancel: CancellationToken,
    ) -> Result<WireStream, ApiError> {
        match req {
            SessionRequest::Run { tenant, spec } => {
                if !spec.interactive {
                    return Err(ApiError::InvalidRequest(
                        "a session run must be interactive, use POST /api/v1/containers".into(),
                    ));
                }
                debug!(name = %spec.name, namespace = %tenant.namespace, "session run requested");
                Ok(Self::start(cancel, frames, |local, cancel| {
                    self.pipeline.run(tenant, spec, local, cancel)
                }))
            }
            SessionRequest::Attach {
                tenant,
                name,
                terminal,
            } => {
                debug!(%name, terminal, "session attach requested");
                Ok(Self::start(cancel, frames, |local, cancel| {
                    self.pipeline
                        .attach(tenant, name, session_options(terminal), local, cancel)
                }))
            }
            SessionRequest::Exec {
                tenant,
                name,
                command,
                terminal,
            } => {
                if command.is_empty() {
                    return Err(ApiError::InvalidRequest("command cannot be empty".into()));
                }
                debug!(%name, terminal, "session exec requested");
                Ok(Self::start(cancel, frames, |local, cancel| {
                    self.pipeline.exec(
                        tenant,
                        name,
                        command,
                        session_options(terminal),
                        local,
                        cancel,
                    )
                }))
            }
        }
    }

    async fn metrics(&self) -> Result<(Vec<u8>, String), ApiError> {
        let Some(metrics) = &self.metrics else {
            return Err(ApiError::NotFound("no metrics backend configured".into()));
        };
        Ok(metrics.encode()?)
    }
}
