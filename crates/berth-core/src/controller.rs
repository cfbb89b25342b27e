//! Create-or-recreate of a workload, driven by its watch stream.
use std::{future::Future, sync::Arc};

use berth_model::{ContainerSpec, RunResult, WorkloadState};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::{
    cluster::Cluster,
    error::{ClusterError, CoreError, Phase},
    progress::{ProgressSink, ProgressStream},
    watcher::{Condition, Wait, wait_for},
    workload::WorkloadDescription,
};

/// Result of a successful convergence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Convergence {
    /// A workload with that name exists and `force` was not set. Nothing was changed.
    AlreadyExists,
    /// The workload was created and reached readiness.
    Running(WorkloadState),
}

/// Drives cluster state towards a [`ContainerSpec`].
///
/// Holds no workload state between calls: every decision is made on a fresh read or a watch
/// event.
#[derive(Clone)]
pub struct Controller {
    cluster: Arc<dyn Cluster>,
}

impl Controller {
    pub fn new(cluster: Arc<dyn Cluster>) -> Self {
        Self { cluster }
    }

    /// Converge and stream progress, ending with `Done(AlreadyExists | Running)` or `Failed`.
    pub fn converge_stream(
        &self,
        ns: impl Into<String>,
        spec: ContainerSpec,
        cancel: &CancellationToken,
    ) -> ProgressStream {
        let this = self.clone();
        let ns = ns.into();
        ProgressStream::spawn(cancel, move |sink, cancel| async move {
            let name = spec.name.clone();
            match this.converge(&ns, &spec, &sink, &cancel).await {
                Ok(Convergence::AlreadyExists) => Ok(RunResult::AlreadyExists { name }),
                Ok(Convergence::Running(state)) => Ok(RunResult::Running {
                    name,
                    replicas: state.ready_replicas,
                    url: None,
                }),
                Err(e) => Err(e),
            }
        })
    }

    /// Create the workload, or recreate it under `force`, and wait until it is ready.
    ///
    /// The watch is opened before anything is changed so no transition can be missed. Under
    /// `force` the deletion request and the wait for the `Deleted` event run concurrently, and
    /// the create is only issued after that event arrived. A create conflict is returned as
    /// [`CoreError::Conflict`]; nothing is retried.
    #[instrument(skip_all, fields(namespace = %ns, name = %spec.name, force = spec.force))]
    pub async fn converge(
        &self,
        ns: &str,
        spec: &ContainerSpec,
        progress: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Convergence, CoreError> {
        let name = spec.name.as_str();
        let selector = spec.selector();

        let mut watch = abortable(cancel, self.cluster.watch_workloads(ns, &selector)).await?;
        let existing = abortable(cancel, self.cluster.get_workload(ns, name)).await?;

        if let Some(existing) = existing {
            if !spec.force {
                debug!(phase = ?existing.phase(), "workload exists, nothing to do");
                return Ok(Convergence::AlreadyExists);
            }

            progress
                .progress(format!("container '{name}' exists, recreating it"))
                .await;

            let delete = async {
                abortable(cancel, self.cluster.delete_workload(ns, name, true))
                    .await
                    .or_else(ignore_not_found)?;
                abortable(cancel, self.cluster.delete_pods(ns, &selector))
                    .await
                    .or_else(ignore_not_found)?;
                Ok::<_, CoreError>(())
            };
            let gone = Condition::deleted(name);
            let deleted = wait_for(&mut watch, &gone, cancel);
            let ((), deleted) = tokio::try_join!(delete, deleted)?;

            if let Wait::Ended(_) = deleted {
                return Err(CoreError::NotConverged {
                    name: name.to_string(),
                    phase: Phase::Stop,
                });
            }
            info!("previous workload deleted");
            progress
                .progress(format!("container '{name}' deleted"))
                .await;
        }

        let desc = WorkloadDescription::from_spec(spec);
        progress
            .progress(format!(
                "creating container '{name}' from {} with {} replica(s)",
                desc.image, desc.replicas
            ))
            .await;
        abortable(cancel, self.cluster.create_workload(ns, &desc)).await?;
        progress
            .progress(format!("container '{name}' created, waiting for it to become ready"))
            .await;

        match wait_for(&mut watch, &Condition::ready(name), cancel).await? {
            Wait::Matched(state) => {
                info!(replicas = state.ready_replicas, "workload ready");
                progress
                    .progress(format!(
                        "container '{name}' is running with {} replica(s)",
                        state.ready_replicas
                    ))
                    .await;
                Ok(Convergence::Running(state))
            }
            Wait::Ended(last) => {
                debug!(last = ?last, "watch ended before readiness");
                Err(CoreError::NotConverged {
                    name: name.to_string(),
                    phase: Phase::Start,
                })
            }
        }
    }
}

fn ignore_not_found(e: CoreError) -> Result<(), CoreError> {
    match e {
        CoreError::NotFound(name) => {
            debug!(%name, "nothing to delete");
            Ok(())
        }
        other => Err(other),
    }
}

/// Run a cluster call unless `cancel` fires first.
pub(crate) async fn abortable<T, F>(cancel: &CancellationToken, call: F) -> Result<T, CoreError>
where
    F: Future<Output = Result<T, ClusterError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(CoreError::Aborted("cluster call")),
        res = call => res.map_err(CoreError::from),
    }
}
