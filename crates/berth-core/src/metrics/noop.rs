use crate::metrics::backend::{MetricsBackend, RunOutcome};

#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl MetricsBackend for NoOpMetrics {
    #[inline(always)]
    fn record_run_started(&self, _: &str) {}

    #[inline(always)]
    fn record_run_completed(&self, _: &str, _: RunOutcome, _: u64) {}

    #[inline(always)]
    fn record_dns_poll(&self, _: bool) {}
}
