mod domain;
pub use domain::{Env, KeyValue, Labels, Namespace};
pub use domain::{LABEL_MANAGED_BY, LABEL_NAME, MANAGED_BY_VALUE};

mod error;
pub use error::{ModelError, ModelResult};

mod spec;
pub use spec::{ContainerSpec, PortSpec, Protocol, Replicas, RouteSpec};

mod tenant;
pub use tenant::Tenant;

mod workload;
pub use workload::{WatchEvent, WatchEventKind, WorkloadPhase, WorkloadState};

mod progress;
pub use progress::{FailureKind, ProgressEvent, RunResult, SessionEnd};

mod session;
pub use session::{LocalSignal, RemoteSignal, SessionFrame, TerminalSize};
