//! Metrics collection abstraction.
//!
//! Backends (prometheus, statsd, ...) implement [`MetricsBackend`] and are handed to the
//! [`crate::pipeline::Pipeline`].
mod backend;
pub use backend::{MetricsBackend, MetricsHandle, RunOutcome};

mod noop;
pub use noop::NoOpMetrics;

use std::sync::Arc;

#[inline]
pub fn noop_metrics() -> MetricsHandle {
    Arc::new(NoOpMetrics)
}
