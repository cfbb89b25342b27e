use std::sync::Arc;

/// How a pipeline operation ended, for metrics classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Operation reached its goal.
    Success,
    /// Workload already existed and nothing was changed.
    NoOp,
    /// Operation ended with a terminal failure.
    Failure,
    /// Cancellation fired.
    Canceled,
}

impl RunOutcome {
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            RunOutcome::Success => "success",
            RunOutcome::NoOp => "noop",
            RunOutcome::Failure => "failure",
            RunOutcome::Canceled => "canceled",
        }
    }
}

/// Backend metrics collection interface.
pub trait MetricsBackend: Send + Sync + 'static {
    /// Record the start of a pipeline operation (`run`, `attach`, `exec`).
    fn record_run_started(&self, op: &str);
    /// Record the end of a pipeline operation.
    ///
    /// # Arguments
    /// - `op`: operation name
    /// - `outcome`: how it ended
    /// - `duration_ms`: wall time in milliseconds
    fn record_run_completed(&self, op: &str, outcome: RunOutcome, duration_ms: u64);
    /// Record one DNS poll of the domain verification loop.
    fn record_dns_poll(&self, matched: bool);
}

pub type MetricsHandle = Arc<dyn MetricsBackend>;
