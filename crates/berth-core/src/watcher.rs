//! Waiting on a workload change stream for a condition.
use std::fmt;

use berth_model::{WatchEventKind, WorkloadState};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::{cluster::WatchStream, error::CoreError};

type Predicate = Box<dyn Fn(&WorkloadState) -> bool + Send + Sync>;

/// What a wait is looking for: a predicate over one named workload and, optionally, an event
/// kind that ends the wait on its own (used to wait for deletion).
pub struct Condition {
    name: String,
    predicate: Predicate,
    terminal: Option<WatchEventKind>,
}

impl Condition {
    pub fn new<P>(name: impl Into<String>, predicate: P) -> Self
    where
        P: Fn(&WorkloadState) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
            terminal: None,
        }
    }

    /// Any event of `kind` for the named workload satisfies the condition.
    pub fn with_terminal(mut self, kind: WatchEventKind) -> Self {
        self.terminal = Some(kind);
        self
    }

    /// `ready == available == desired`.
    pub fn ready(name: impl Into<String>) -> Self {
        Self::new(name, WorkloadState::is_ready)
    }

    /// The workload was deleted.
    pub fn deleted(name: impl Into<String>) -> Self {
        Self::new(name, |_| false).with_terminal(WatchEventKind::Deleted)
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("name", &self.name)
            .field("terminal", &self.terminal)
            .finish_non_exhaustive()
    }
}

/// Outcome of [`wait_for`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Wait {
    /// An event satisfied the condition; carries its object.
    Matched(WorkloadState),
    /// The stream ended first; carries the last object seen for the name, if any.
    ///
    /// This never means success, even when an object is present.
    Ended(Option<WorkloadState>),
}

/// Consume `stream` until an event for the condition's workload satisfies it.
///
/// No retries and no timeout of its own: the wait ends when the stream ends or `cancel` fires.
/// Stream errors are returned as they are.
pub async fn wait_for(
    stream: &mut WatchStream,
    cond: &Condition,
    cancel: &CancellationToken,
) -> Result<Wait, CoreError> {
    let mut last = None;
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(CoreError::Aborted("watch")),
            next = stream.next() => next,
        };
        let Some(event) = next.transpose()? else {
            trace!(name = %cond.name, "watch stream ended");
            return Ok(Wait::Ended(last));
        };
        if event.object.name != cond.name {
            continue;
        }
        trace!(name = %cond.name, kind = ?event.kind, phase = ?event.object.phase(), "watch event");
        if cond.terminal == Some(event.kind) || (cond.predicate)(&event.object) {
            return Ok(Wait::Matched(event.object));
        }
        last = Some(event.object);
    }
}

#[cfg(test)]
mod tests {
    use berth_model::{Labels, WatchEvent};
    use futures::stream::{self, StreamExt};

    use super::*;
    use crate::error::ClusterError;

    fn state(name: &str, desired: u32, ready: u32, available: u32) -> WorkloadState {
        WorkloadState {
            name: name.into(),
            namespace: "t-1".into(),
            labels: Labels::default(),
            desired_replicas: desired,
            ready_replicas: ready,
            available_replicas: available,
            deleting: false,
        }
    }

    fn events(items: Vec<(WatchEventKind, WorkloadState)>) -> WatchStream {
        stream::iter(
            items
                .into_iter()
                .map(|(kind, obj)| Ok(WatchEvent::new(kind, obj))),
        )
        .boxed()
    }

    #[tokio::test]
    async fn matches_ready_object_for_name_only() {
        let mut s = events(vec![
            (WatchEventKind::Added, state("web", 2, 0, 0)),
            (WatchEventKind::Modified, state("other", 1, 1, 1)),
            (WatchEventKind::Modified, state("web", 2, 2, 1)),
            (WatchEventKind::Modified, state("web", 2, 2, 2)),
        ]);
        let got = wait_for(&mut s, &Condition::ready("web"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(got, Wait::Matched(state("web", 2, 2, 2)));
    }

    #[tokio::test]
    async fn ended_stream_returns_last_unmatched_object() {
        let mut s = events(vec![
            (WatchEventKind::Added, state("web", 2, 0, 0)),
            (WatchEventKind::Modified, state("web", 2, 1, 1)),
            (WatchEventKind::Modified, state("other", 1, 1, 1)),
        ]);
        let got = wait_for(&mut s, &Condition::ready("web"), &CancellationToken::new())
            .await
            .unwrap();
        let Wait::Ended(Some(last)) = got else {
            panic!("expected ended with an object, got {got:?}");
        };
        assert_eq!(last, state("web", 2, 1, 1));
        assert!(!last.is_ready());
    }

    #[tokio::test]
    async fn ended_without_events_for_name() {
        let mut s = events(vec![(WatchEventKind::Added, state("other", 1, 1, 1))]);
        let got = wait_for(&mut s, &Condition::ready("web"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(got, Wait::Ended(None));
    }

    #[tokio::test]
    async fn terminal_kind_matches_regardless_of_predicate() {
        let mut gone = state("web", 1, 1, 1);
        gone.deleting = true;
        let mut s = events(vec![
            (WatchEventKind::Modified, state("web", 1, 1, 1)),
            (WatchEventKind::Deleted, gone.clone()),
        ]);
        let got = wait_for(&mut s, &Condition::deleted("web"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(got, Wait::Matched(gone));
    }

    #[tokio::test]
    async fn stream_errors_propagate() {
        let mut s: WatchStream =
            stream::iter(vec![Err(ClusterError::Watch("reset".into()))]).boxed();
        let err = wait_for(&mut s, &Condition::ready("web"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Cluster(ClusterError::Watch(_))));
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_silent_stream() {
        let mut s: WatchStream = stream::pending().boxed();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = wait_for(&mut s, &Condition::ready("web"), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_aborted());
    }
}
