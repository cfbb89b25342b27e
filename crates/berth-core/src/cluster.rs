//! Cluster substrate interface consumed by the controller and the pipeline.
use async_trait::async_trait;
use berth_model::{Labels, WatchEvent, WorkloadState};
use berth_session::RemoteProcess;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::{error::ClusterError, workload::WorkloadDescription};

/// Live change stream of workloads matching a selector.
pub type WatchStream = BoxStream<'static, Result<WatchEvent, ClusterError>>;

/// Followed log output of a workload.
pub type LogStream = BoxStream<'static, Result<Bytes, ClusterError>>;

/// How a remote process is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Keep the process stdin open.
    pub stdin: bool,
    /// Allocate a terminal.
    pub tty: bool,
}

/// Typed operations against the cluster API for one tenant namespace.
///
/// Implementations are expected to be atomic per call. No method retries.
#[async_trait]
pub trait Cluster: Send + Sync + 'static {
    /// Current state of a workload, `None` if absent.
    async fn get_workload(&self, ns: &str, name: &str)
    -> Result<Option<WorkloadState>, ClusterError>;

    /// Submit a new workload. Fails with [`ClusterError::Conflict`] if the name is taken.
    async fn create_workload(&self, ns: &str, desc: &WorkloadDescription)
    -> Result<(), ClusterError>;

    /// Request deletion of a workload. Completion is observed through the watch stream.
    async fn delete_workload(&self, ns: &str, name: &str, force: bool)
    -> Result<(), ClusterError>;

    /// Delete pods matching `selector`.
    async fn delete_pods(&self, ns: &str, selector: &Labels) -> Result<(), ClusterError>;

    /// Open a change stream of workloads matching `selector`.
    ///
    /// Only changes that happen after this call returns are guaranteed to be delivered.
    async fn watch_workloads(&self, ns: &str, selector: &Labels)
    -> Result<WatchStream, ClusterError>;

    /// Follow the logs of a workload.
    async fn stream_logs(&self, ns: &str, name: &str) -> Result<LogStream, ClusterError>;

    /// Attach to the main process of a workload.
    async fn attach(
        &self,
        ns: &str,
        name: &str,
        opts: ProcessOptions,
    ) -> Result<RemoteProcess, ClusterError>;

    /// Start `command` inside a workload.
    async fn exec(
        &self,
        ns: &str,
        name: &str,
        command: &[String],
        opts: ProcessOptions,
    ) -> Result<RemoteProcess, ClusterError>;
}
