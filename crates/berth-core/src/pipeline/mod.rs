//! Top-level provisioning flow: converge, route, then attach a session or follow logs.
mod route;
pub use route::{RouteProvisioner, RouteRequest};

mod session;

use std::{future::Future, sync::Arc};

use berth_model::{ContainerSpec, RouteSpec, RunResult, Tenant};
use berth_session::{LocalIo, TunnelOptions};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::{
    cluster::{Cluster, ProcessOptions},
    controller::{Controller, Convergence, abortable},
    domain::{DnsResolver, Verifier, VerifyConfig},
    error::{CoreError, RouteError},
    metrics::{MetricsHandle, RunOutcome, noop_metrics},
    progress::{ProgressSink, ProgressStream},
};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub verify: VerifyConfig,
}

/// Entry point for drivers (CLI, HTTP).
///
/// Cheap to clone. Every operation streams [`berth_model::ProgressEvent`]s through a
/// [`ProgressStream`]; dropping the stream cancels the operation. Exit codes of sessions are
/// delivered through the exit sink of the [`LocalIo`] handed in, never on the stream.
#[derive(Clone)]
pub struct Pipeline {
    cluster: Arc<dyn Cluster>,
    controller: Controller,
    verifier: Verifier,
    routes: Arc<dyn RouteProvisioner>,
    metrics: MetricsHandle,
}

impl Pipeline {
    pub fn new(
        cluster: Arc<dyn Cluster>,
        resolver: Arc<dyn DnsResolver>,
        routes: Arc<dyn RouteProvisioner>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            controller: Controller::new(Arc::clone(&cluster)),
            verifier: Verifier::new(resolver, config.verify),
            cluster,
            routes,
            metrics: noop_metrics(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.verifier = self.verifier.with_metrics(Arc::clone(&metrics));
        self.metrics = metrics;
        self
    }

    /// Provision `spec` in the tenant namespace and stream progress.
    pub fn run(
        &self,
        tenant: Tenant,
        spec: ContainerSpec,
        local: LocalIo,
        cancel: &CancellationToken,
    ) -> ProgressStream {
        let this = self.clone();
        ProgressStream::spawn(cancel, move |sink, cancel| async move {
            this.measured("run", this.execute(&tenant, &spec, local, &sink, &cancel))
                .await
        })
    }

    /// Attach to the main process of an existing workload.
    pub fn attach(
        &self,
        tenant: Tenant,
        name: String,
        opts: TunnelOptions,
        local: LocalIo,
        cancel: &CancellationToken,
    ) -> ProgressStream {
        let this = self.clone();
        ProgressStream::spawn(cancel, move |sink, cancel| async move {
            let op = this.attach_to(&tenant.namespace, &name, opts, local, &sink, &cancel);
            this.measured("attach", op).await
        })
    }

    /// Run `command` inside an existing workload.
    pub fn exec(
        &self,
        tenant: Tenant,
        name: String,
        command: Vec<String>,
        opts: TunnelOptions,
        local: LocalIo,
        cancel: &CancellationToken,
    ) -> ProgressStream {
        let this = self.clone();
        ProgressStream::spawn(cancel, move |sink, cancel| async move {
            let op = this.exec_in(&tenant.namespace, &name, &command, opts, local, &sink, &cancel);
            this.measured("exec", op).await
        })
    }

    /// The whole `run` flow on the caller's task.
    ///
    /// 1. validate the container spec;
    /// 2. converge (no-op if the workload exists and `force` is unset);
    /// 3. if a route is requested: verify the custom domain, then ensure the route;
    /// 4. `detach`: return; `interactive`: attach a session; otherwise follow the logs.
    #[instrument(skip_all, fields(namespace = %tenant.namespace, name = %spec.name))]
    pub async fn execute(
        &self,
        tenant: &Tenant,
        spec: &ContainerSpec,
        local: LocalIo,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunResult, CoreError> {
        spec.validate()?;
        let ns = tenant.namespace.as_str();
        let name = spec.name.clone();

        let state = match self.controller.converge(ns, spec, progress, cancel).await? {
            Convergence::AlreadyExists => return Ok(RunResult::AlreadyExists { name }),
            Convergence::Running(state) => state,
        };

        let url = match &spec.route {
            Some(route) => Some(self.route(tenant, spec, route, progress, cancel).await?),
            None => None,
        };

        if spec.detach {
            return Ok(RunResult::Running {
                name,
                replicas: state.ready_replicas,
                url,
            });
        }

        if spec.interactive {
            let opts = TunnelOptions {
                interactive: true,
                terminal: spec.terminal,
            };
            let process = abortable(
                cancel,
                self.cluster.attach(ns, &name, process_options(opts)),
            )
            .await?;
            progress
                .progress(format!("attached to container '{name}'"))
                .await;
            return session::run(name, process, local, opts, cancel).await;
        }

        session::follow_logs(self.cluster.as_ref(), ns, name, local, progress, cancel).await
    }

    async fn route(
        &self,
        tenant: &Tenant,
        spec: &ContainerSpec,
        route: &RouteSpec,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<String, CoreError> {
        let port = spec
            .route_port()
            .cloned()
            .ok_or_else(|| RouteError::NoPort(spec.name.clone()))?;

        if let Some(domain) = &route.domain {
            self.verifier
                .verify_domain(domain, tenant, progress, cancel)
                .await?;
        }

        let request = RouteRequest {
            name: spec.name.clone(),
            tenant_id: tenant.id.clone(),
            port,
            domain: route.domain.clone(),
        };
        progress
            .progress(format!("configuring route for container '{}'", spec.name))
            .await;
        let url = tokio::select! {
            _ = cancel.cancelled() => return Err(CoreError::Aborted("routing")),
            url = self.routes.ensure_route(&tenant.namespace, &request) => url?,
        };
        progress
            .progress(format!("container '{}' is available at {url}", spec.name))
            .await;
        Ok(url)
    }

    async fn attach_to(
        &self,
        ns: &str,
        name: &str,
        opts: TunnelOptions,
        local: LocalIo,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunResult, CoreError> {
        self.require(ns, name, cancel).await?;
        let process = abortable(cancel, self.cluster.attach(ns, name, process_options(opts))).await?;
        progress
            .progress(format!("attached to container '{name}'"))
            .await;
        session::run(name.to_string(), process, local, opts, cancel).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn exec_in(
        &self,
        ns: &str,
        name: &str,
        command: &[String],
        opts: TunnelOptions,
        local: LocalIo,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunResult, CoreError> {
        if command.is_empty() {
            return Err(CoreError::Invalid(berth_model::ModelError::Invalid(
                "exec needs a command".into(),
            )));
        }
        self.require(ns, name, cancel).await?;
        let process = abortable(
            cancel,
            self.cluster.exec(ns, name, command, process_options(opts)),
        )
        .await?;
        progress
            .progress(format!("running '{}' in container '{name}'", command.join(" ")))
            .await;
        session::run(name.to_string(), process, local, opts, cancel).await
    }

    async fn require(&self, ns: &str, name: &str, cancel: &CancellationToken) -> Result<(), CoreError> {
        match abortable(cancel, self.cluster.get_workload(ns, name)).await? {
            Some(_) => Ok(()),
            None => Err(CoreError::NotFound(name.to_string())),
        }
    }

    async fn measured<F>(&self, op: &'static str, fut: F) -> Result<RunResult, CoreError>
    where
        F: Future<Output = Result<RunResult, CoreError>>,
    {
        let started = Instant::now();
        self.metrics.record_run_started(op);

        let res = fut.await;
        let outcome = match &res {
            Ok(RunResult::AlreadyExists { .. }) => RunOutcome::NoOp,
            Ok(_) => RunOutcome::Success,
            Err(e) if e.is_aborted() => RunOutcome::Canceled,
            Err(e) => {
                warn!(op, error = %e, "operation failed");
                RunOutcome::Failure
            }
        };
        let elapsed = started.elapsed().as_millis() as u64;
        debug!(op, outcome = outcome.as_label(), elapsed_ms = elapsed, "operation finished");
        self.metrics.record_run_completed(op, outcome, elapsed);
        res
    }
}

fn process_options(opts: TunnelOptions) -> ProcessOptions {
    ProcessOptions {
        stdin: opts.interactive,
        tty: opts.terminal,
    }
}
