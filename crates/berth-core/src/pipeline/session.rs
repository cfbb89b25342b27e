use std::time::Duration;

use berth_model::{RunResult, SessionEnd};
use berth_session::{Completion, LocalIo, Pipe, RemoteProcess, Tunnel, TunnelOptions};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    cluster::Cluster,
    controller::abortable,
    error::CoreError,
    progress::ProgressSink,
};

/// How long to wait for the exit status once output has closed.
const EXIT_STATUS_GRACE: Duration = Duration::from_secs(5);

/// Tunnel `process` to `local` and report how the session ended.
///
/// The exit code is read after the tunnel's own cleanup (terminal restored) and only when a pipe
/// closed; a detached process keeps running and has no exit code yet.
pub(super) async fn run(
    name: String,
    process: RemoteProcess,
    mut local: LocalIo,
    opts: TunnelOptions,
    cancel: &CancellationToken,
) -> Result<RunResult, CoreError> {
    let (remote, status) = process.split();
    let exit = local.take_exit();

    let mut tunnel = Tunnel::new(opts);
    tunnel.defer("exit-code", move |completion| async move {
        if !matches!(completion, Completion::Closed(_)) {
            return Ok(());
        }
        match tokio::time::timeout(EXIT_STATUS_GRACE, status).await {
            Ok(Ok(code)) => {
                debug!(code, "remote process exited");
                exit.deliver(code);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!("remote process did not report an exit status");
                Ok(())
            }
        }
    });

    let end = match tunnel.run(remote, local, cancel).await? {
        Completion::Detached => SessionEnd::Detached,
        Completion::Closed(Pipe::Stdin) => SessionEnd::InputClosed,
        Completion::Closed(_) => SessionEnd::OutputClosed,
        Completion::Aborted => return Err(CoreError::Aborted("session")),
    };
    Ok(RunResult::SessionEnded { name, end })
}

/// Copy the workload log stream to local stdout until it ends.
pub(super) async fn follow_logs(
    cluster: &dyn Cluster,
    ns: &str,
    name: String,
    mut local: LocalIo,
    progress: &ProgressSink,
    cancel: &CancellationToken,
) -> Result<RunResult, CoreError> {
    let mut logs = abortable(cancel, cluster.stream_logs(ns, &name)).await?;
    progress
        .progress(format!("following logs of container '{name}'"))
        .await;

    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Err(CoreError::Aborted("log stream")),
            chunk = logs.next() => chunk,
        };
        let Some(chunk) = chunk else { break };
        let chunk = chunk?;
        if let Err(e) = local.stdout.write_all(&chunk).await {
            debug!(error = %e, "local stdout closed, no longer following logs");
            break;
        }
    }
    if let Err(e) = local.stdout.flush().await {
        debug!(error = %e, "flushing local stdout failed");
    }
    Ok(RunResult::LogsEnded { name })
}
