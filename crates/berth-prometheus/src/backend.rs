use std::sync::Arc;

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
    proto::MetricFamily,
};

use berth_core::metrics::{MetricsBackend, RunOutcome};

const NAMESPACE: &str = "berth";

/// Prometheus metrics backend.
///
/// Label values are bounded:
/// - `op`: "run", "attach", "exec"
/// - `outcome`: "success", "noop", "failure", "canceled"
/// - `matched`: "true", "false"
#[derive(Clone)]
pub struct PrometheusMetrics {
    runs_started: CounterVec,
    runs_completed: CounterVec,
    run_duration: HistogramVec,
    dns_polls: CounterVec,
    registry: Arc<Registry>,
}

impl PrometheusMetrics {
    pub fn new_with_registry(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let runs_started = CounterVec::new(
            Opts::new("runs_started_total", "Pipeline operations started").namespace(NAMESPACE),
            &["op"],
        )?;
        registry.register(Box::new(runs_started.clone()))?;

        let runs_completed = CounterVec::new(
            Opts::new("runs_completed_total", "Pipeline operations completed")
                .namespace(NAMESPACE),
            &["op", "outcome"],
        )?;
        registry.register(Box::new(runs_completed.clone()))?;

        // Runs include readiness waits and whole interactive sessions, hence the long tail.
        let run_duration = HistogramVec::new(
            HistogramOpts::new("run_duration_seconds", "Pipeline operation wall time")
                .namespace(NAMESPACE)
                .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 1800.0]),
            &["op", "outcome"],
        )?;
        registry.register(Box::new(run_duration.clone()))?;

        let dns_polls = CounterVec::new(
            Opts::new("dns_polls_total", "Domain verification lookups").namespace(NAMESPACE),
            &["matched"],
        )?;
        registry.register(Box::new(dns_polls.clone()))?;

        Ok(Self {
            runs_started,
            runs_completed,
            run_duration,
            dns_polls,
            registry,
        })
    }

    pub fn new() -> Result<Self, prometheus::Error> {
        Self::new_with_registry(Arc::new(Registry::new()))
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Render all metrics in the text exposition format.
    ///
    /// Returns the body and its content type.
    pub fn encode(&self) -> Result<(Vec<u8>, String), prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.gather(), &mut buf)?;
        Ok((buf, encoder.format_type().to_string()))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn record_run_started(&self, op: &str) {
        self.runs_started.with_label_values(&[op]).inc();
    }

    fn record_run_completed(&self, op: &str, outcome: RunOutcome, duration_ms: u64) {
        let labels = [op, outcome.as_label()];
        self.runs_completed.with_label_values(&labels).inc();
        self.run_duration
            .with_label_values(&labels)
            .observe(duration_ms as f64 / 1000.0);
    }

    fn record_dns_poll(&self, matched: bool) {
        let matched = if matched { "true" } else { "false" };
        self.dns_polls.with_label_values(&[matched]).inc();
    }
}
