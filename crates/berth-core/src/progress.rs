//! Ordered progress delivery from a running pipeline operation to its driver.
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use berth_model::{ProgressEvent, RunResult};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace};

use crate::error::CoreError;

const PROGRESS_BUFFER: usize = 64;

type Item = Result<ProgressEvent, CoreError>;

/// Emitting end of a progress stream.
///
/// Emission never fails: once the driver is gone events are dropped.
#[derive(Clone, Debug)]
pub struct ProgressSink {
    tx: mpsc::Sender<Item>,
}

impl ProgressSink {
    pub async fn emit(&self, event: ProgressEvent) {
        trace!(%event, "progress");
        if self.tx.send(Ok(event)).await.is_err() {
            debug!("progress receiver dropped");
        }
    }

    /// Emit an informational line.
    pub async fn progress(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::progress(message)).await;
    }

    async fn fail(&self, err: CoreError) {
        let _ = self.tx.send(Err(err)).await;
    }
}

/// Events of one pipeline operation, in emission order.
///
/// Yields `Ok` for progress and for the terminal `Done`/`Failed` event. Cancellation is the one
/// failure not turned into a `Failed` event: it is yielded as `Err(CoreError::Aborted)` so the
/// driver can tell a cancelled operation from a failed one. The stream ends after the terminal
/// item.
///
/// Dropping the stream cancels the operation.
pub struct ProgressStream {
    rx: mpsc::Receiver<Item>,
    _cancel_on_drop: DropGuard,
}

impl ProgressStream {
    /// Run `op` on a new task and stream its progress.
    ///
    /// `op` receives a sink and a child of `cancel`; the child is also cancelled when the stream
    /// is dropped.
    pub fn spawn<F, Fut>(cancel: &CancellationToken, op: F) -> Self
    where
        F: FnOnce(ProgressSink, CancellationToken) -> Fut,
        Fut: Future<Output = Result<RunResult, CoreError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
        let token = cancel.child_token();
        let sink = ProgressSink { tx };
        let fut = op(sink.clone(), token.clone());

        tokio::spawn(async move {
            match fut.await {
                Ok(result) => sink.emit(ProgressEvent::Done { result }).await,
                Err(e) if e.is_aborted() => sink.fail(e).await,
                Err(e) => sink.emit(e.to_event()).await,
            }
        });

        Self {
            rx,
            _cancel_on_drop: token.drop_guard(),
        }
    }

    /// Drain the stream, returning every event and the cancellation error if one ended it.
    pub async fn collect_all(mut self) -> (Vec<ProgressEvent>, Option<CoreError>) {
        let mut events = Vec::new();
        while let Some(item) = self.rx.recv().await {
            match item {
                Ok(event) => events.push(event),
                Err(e) => return (events, Some(e)),
            }
        }
        (events, None)
    }
}

impl Stream for ProgressStream {
    type Item = Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
