use std::{convert::Infallible, pin::Pin};

use berth_core::progress::ProgressStream;
use berth_model::{FailureKind, ProgressEvent, RunResult, SessionFrame};
use bytes::Bytes;
use futures::{
    Stream, StreamExt,
    stream::{self, BoxStream},
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

/// One line of a response stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum WireMessage {
    Progress { message: String },
    Result { result: RunResult },
    Error { error: FailureKind, message: String },
    Frame { frame: SessionFrame },
}

impl From<ProgressEvent> for WireMessage {
    fn from(event: ProgressEvent) -> Self {
        match event {
            ProgressEvent::Progress { message } => WireMessage::Progress { message },
            ProgressEvent::Done { result } => WireMessage::Result { result },
            ProgressEvent::Failed { kind, message } => WireMessage::Error {
                error: kind,
                message,
            },
        }
    }
}

pub type WireStream = BoxStream<'static, WireMessage>;

struct Merge {
    progress: Option<ProgressStream>,
    frames: mpsc::UnboundedReceiver<SessionFrame>,
    _cancel_on_drop: DropGuard,
}

/// Interleave pipeline events with the session frames produced by the local end.
///
/// Frames already queued are always emitted before the next event, so the output of a
/// session precedes its `result`. The stream ends after the pipeline stream closes and the
/// queued frames are drained. Dropping it cancels `cancel`.
pub(crate) fn merge(
    progress: ProgressStream,
    frames: mpsc::UnboundedReceiver<SessionFrame>,
    cancel: CancellationToken,
) -> WireStream {
    let state = Merge {
        progress: Some(progress),
        frames,
        _cancel_on_drop: cancel.drop_guard(),
    };

    stream::unfold(state, |mut st| async move {
        loop {
            let Some(progress) = st.progress.as_mut() else {
                let frame = st.frames.try_recv().ok()?;
                return Some((WireMessage::Frame { frame }, st));
            };

            tokio::select! {
                biased;
                Some(frame) = st.frames.recv() => {
                    return Some((WireMessage::Frame { frame }, st));
                }
                item = progress.next() => match item {
                    Some(Ok(event)) => return Some((event.into(), st)),
                    Some(Err(e)) => {
                        debug!(error = %e, "operation stopped");
                        st.progress = None;
                    }
                    None => st.progress = None,
                },
            }
        }
    })
    .boxed()
}

/// Encode messages as newline-delimited JSON.
pub(crate) fn ndjson(
    messages: WireStream,
) -> Pin<Box<dyn Stream<Item = Result<Bytes, Infallible>> + Send>> {
    messages
        .filter_map(|msg| async move {
            match serde_json::to_vec(&msg) {
                Ok(mut line) => {
                    line.push(b'\n');
                    Some(Ok(Bytes::from(line)))
                }
                Err(e) => {
                    warn!(error = %e, "dropping unencodable message");
                    None
                }
            }
        })
        .boxed()
}
