//! Orchestration core: converge a container spec against a cluster, wait for readiness, verify
//! custom domains, then attach a session or follow logs.
//!
//! Collaborators (cluster API, DNS, routing) are traits; [`memory`] provides in-process
//! implementations of all three.
pub mod cluster;
pub mod controller;
pub mod domain;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod watcher;
pub mod workload;

pub mod prelude {
    pub use crate::cluster::{Cluster, LogStream, ProcessOptions, WatchStream};
    pub use crate::controller::{Controller, Convergence};
    pub use crate::domain::{DnsResolver, DomainChallenge, RecordType, Verified, Verifier, VerifyConfig};
    pub use crate::error::{ClusterError, CoreError, DnsError, Phase, RouteError};
    pub use crate::metrics::{MetricsBackend, MetricsHandle, NoOpMetrics, RunOutcome, noop_metrics};
    pub use crate::pipeline::{Pipeline, PipelineConfig, RouteProvisioner, RouteRequest};
    pub use crate::progress::{ProgressSink, ProgressStream};
    pub use crate::watcher::{Condition, Wait, wait_for};
    pub use crate::workload::{WorkloadDescription, SecurityPosture};
}
