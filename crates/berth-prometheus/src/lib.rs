//! Prometheus implementation of [`berth_core::metrics::MetricsBackend`].
//!
//! ## Metrics
//! - `berth_runs_started_total{op}` - Counter
//! - `berth_runs_completed_total{op, outcome}` - Counter
//! - `berth_run_duration_seconds{op, outcome}` - Histogram
//! - `berth_dns_polls_total{matched}` - Counter
//!
//! The crate does not serve `/metrics` itself; `berth-api` mounts [`PrometheusMetrics::encode`].

mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Error as PrometheusError, Registry, TextEncoder};
